use std::sync::Arc;
use std::time::Duration;

use bitcoin::ScriptBuf;
use gateway::{FeeOracle, Gateway, GatewayConfig, HttpGateway, TxSpeed, MAX_CONFIRMATIONS};
use tracing::{debug, info};
use utxo_core::{
    build, estimate_size, verify, Address, Amount, CoreError, Network, OutPoint, Recipient, SignedTx, TxHash,
    UnsignedTx, Utxo,
};

use crate::error::ClientError;

/// Client for one `(chain, variant)`.
///
/// Bitcoin, ZCash and Bitcoin Cash share every operation. Segwit address
/// derivation is only available where the network supports it and fails
/// with [`CoreError::UnsupportedOperation`] elsewhere.
pub struct ChainClient {
    network: Network,
    gateway: Arc<dyn Gateway>,
    fees: FeeOracle,
}

impl ChainClient {
    /// Client talking HTTP to the configured gateway and fee source.
    pub fn new(network: Network, config: &GatewayConfig) -> Result<Self, ClientError> {
        let gateway = HttpGateway::new(network, config)?;
        let fees = FeeOracle::from_config(config)?;
        debug!(%network, endpoint = gateway.endpoint(), "chain client created");
        Ok(ChainClient::with_parts(network, Arc::new(gateway), fees))
    }

    /// Parse `chain` and `variant` names, then build as in [`ChainClient::new`].
    pub fn from_names(chain: &str, variant: &str, config: &GatewayConfig) -> Result<Self, ClientError> {
        ChainClient::new(Network::from_names(chain, variant)?, config)
    }

    pub fn with_parts(network: Network, gateway: Arc<dyn Gateway>, fees: FeeOracle) -> Self {
        ChainClient { network, gateway, fees }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn supports_segwit(&self) -> bool {
        self.network.params().supports_segwit()
    }

    pub fn fee_oracle(&self) -> &FeeOracle {
        &self.fees
    }

    /// Fetch the output `vout` of transaction `tx_hash`.
    ///
    /// Malformed hashes are rejected before any request is made.
    pub async fn utxo(&self, tx_hash: &str, vout: u32, timeout: Duration) -> Result<Utxo, ClientError> {
        let outpoint = OutPoint::parse(tx_hash, vout)?;
        Ok(self.gateway.fetch_utxo(outpoint, timeout).await?)
    }

    /// UTXOs of `address` known to the gateway's node, at any confirmation depth.
    pub async fn utxos_from_address(&self, address: &Address, timeout: Duration) -> Result<Vec<Utxo>, ClientError> {
        self.require_network(address)?;
        Ok(self.gateway.list_utxos(address, 0, MAX_CONFIRMATIONS, timeout).await?)
    }

    pub async fn confirmations(&self, tx_hash: &str, timeout: Duration) -> Result<u64, ClientError> {
        let tx_hash: TxHash = tx_hash.parse()?;
        Ok(self.gateway.confirmations(tx_hash, timeout).await?)
    }

    /// Build an unsigned transaction spending every UTXO in `utxos`.
    ///
    /// See [`utxo_core::build`] for the checks and the refund rule.
    pub fn build_unsigned_tx(
        &self,
        utxos: &[Utxo],
        recipients: &[Recipient],
        refund_to: &Address,
        fee: Amount,
    ) -> Result<UnsignedTx, CoreError> {
        build(self.network, utxos, recipients, refund_to, fee)
    }

    /// Verify and broadcast a signed transaction.
    ///
    /// Unsigned transactions and transactions failing local verification are
    /// never sent.
    pub async fn submit_signed_tx(&self, tx: &SignedTx, timeout: Duration) -> Result<TxHash, ClientError> {
        if tx.network() != self.network {
            return Err(ClientError::NetworkMismatch {
                expected: self.network,
                actual: tx.network(),
            });
        }
        if !tx.is_signed() {
            return Err(ClientError::NotSigned);
        }
        self.verify_tx(tx).map_err(ClientError::VerificationFailed)?;

        let tx_hash = self.gateway.broadcast(tx, timeout).await?;
        info!(network = %self.network, %tx_hash, inputs = tx.utxos().len(), "transaction broadcast");
        Ok(tx_hash)
    }

    /// Approximate size in bytes; see [`utxo_core::estimate_size`].
    pub fn estimate_tx_size(&self, num_utxos: usize, num_recipients: usize) -> usize {
        estimate_size(num_utxos, num_recipients)
    }

    pub fn verify_tx(&self, tx: &SignedTx) -> Result<(), CoreError> {
        verify(tx)
    }

    /// Total fee for a transaction of `tx_size` bytes at `speed`.
    pub async fn suggest_fee(&self, speed: TxSpeed, tx_size: usize) -> Amount {
        self.fees.suggest_fee(speed, tx_size).await
    }

    pub fn address_from_base58(&self, text: &str) -> Result<Address, CoreError> {
        Address::from_base58(text, self.network)
    }

    /// Base58 or, where supported, bech32 address text.
    pub fn decode_address(&self, text: &str) -> Result<Address, CoreError> {
        Address::decode(text, self.network)
    }

    pub fn address_from_pubkey(&self, pubkey: &[u8]) -> Result<Address, CoreError> {
        Address::from_pubkey(pubkey, self.network)
    }

    pub fn address_from_script(&self, script: &[u8]) -> Result<Address, CoreError> {
        Address::from_script(script, self.network)
    }

    pub fn segwit_address_from_pubkey(&self, pubkey: &[u8]) -> Result<Address, CoreError> {
        Address::segwit_from_pubkey(pubkey, self.network)
    }

    pub fn segwit_address_from_script(&self, script: &[u8]) -> Result<Address, CoreError> {
        Address::segwit_from_script(script, self.network)
    }

    /// Locking script paying to `address`.
    pub fn pay_to_addr_script(&self, address: &Address) -> Result<ScriptBuf, CoreError> {
        self.require_network(address)?;
        Ok(address.script_pubkey())
    }

    fn require_network(&self, address: &Address) -> Result<(), CoreError> {
        if !address.is_valid_for(self.network) {
            return Err(CoreError::WrongNetwork {
                address: address.to_string(),
                expected: self.network,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_performs_no_io() {
        let config = GatewayConfig::default();
        for network in Network::all() {
            let client = ChainClient::new(network, &config).unwrap();
            assert_eq!(client.network(), network);
            assert_eq!(client.supports_segwit(), network.chain() == utxo_core::Chain::Bitcoin);
        }
    }

    #[test]
    fn unknown_names_are_errors() {
        let config = GatewayConfig::default();
        assert!(matches!(
            ChainClient::from_names("doge", "mainnet", &config),
            Err(ClientError::Core(CoreError::UnknownChain(_)))
        ));
        assert!(matches!(
            ChainClient::from_names("btc", "signet", &config),
            Err(ClientError::Core(CoreError::UnknownNetwork(_)))
        ));
    }

    #[test]
    fn estimate_matches_formula() {
        let client = ChainClient::from_names("bch", "mainnet", &GatewayConfig::default()).unwrap();
        assert_eq!(client.estimate_tx_size(2, 1), 335);
    }
}
