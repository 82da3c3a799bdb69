use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::ScriptBuf;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use utxo_core::{Address, Amount, Network, OutPoint, SignedTx, TxHash, Utxo};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::rpc::RpcClient;

/// Upper confirmation bound used when listing UTXOs.
pub const MAX_CONFIRMATIONS: u32 = 999_999;

/// bitcoind's RPC_INVALID_ADDRESS_OR_KEY, returned for unknown transactions.
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

/// The gateway operations the chain client depends on.
///
/// Every call takes a timeout; when it elapses the call fails with
/// [`GatewayError::Cancelled`] and no partial result is returned.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Look up one output. Fails with `TxHashNotFound` when the transaction is
    /// unknown and `UtxoSpent` when the output is spent or does not exist.
    async fn fetch_utxo(&self, outpoint: OutPoint, timeout: Duration) -> Result<Utxo, GatewayError>;

    /// UTXOs the gateway's node has indexed for `address`.
    ///
    /// Addresses never imported into the node yield an empty list.
    async fn list_utxos(
        &self,
        address: &Address,
        min_confirmations: u32,
        max_confirmations: u32,
        timeout: Duration,
    ) -> Result<Vec<Utxo>, GatewayError>;

    async fn confirmations(&self, tx_hash: TxHash, timeout: Duration) -> Result<u64, GatewayError>;

    /// Submit a signed transaction, returning the hash reported by the node.
    async fn broadcast(&self, tx: &SignedTx, timeout: Duration) -> Result<TxHash, GatewayError>;
}

/// Run `fut`, giving up after `timeout`.
pub async fn with_timeout<T>(
    op: &'static str,
    timeout: Duration,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| GatewayError::Cancelled { op, timeout })?
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    txid: String,
    #[serde(default)]
    confirmations: u64,
}

#[derive(Debug, Deserialize)]
struct TxOut {
    value: f64,
    #[serde(default)]
    confirmations: u64,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    hex: String,
}

#[derive(Debug, Deserialize)]
struct Unspent {
    txid: String,
    vout: u32,
    amount: f64,
    #[serde(rename = "scriptPubKey")]
    script_pubkey: String,
    #[serde(default)]
    confirmations: u64,
    #[serde(rename = "redeemScript", default)]
    redeem_script: Option<String>,
}

/// [`Gateway`] over the gateway's HTTP JSON-RPC endpoint for one network.
pub struct HttpGateway {
    network: Network,
    rpc: RpcClient,
}

impl HttpGateway {
    pub fn new(network: Network, config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_url(network, config.endpoint(network), config)
    }

    /// Like [`HttpGateway::new`] but against an explicit endpoint URL.
    pub fn with_url(network: Network, url: String, config: &GatewayConfig) -> Result<Self, GatewayError> {
        let rpc = RpcClient::new(
            url,
            config.username.clone(),
            config.password.clone(),
            config.request_timeout(),
        )?;
        Ok(HttpGateway { network, rpc })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn endpoint(&self) -> &str {
        self.rpc.url()
    }

    async fn raw_transaction(&self, op: &'static str, tx_hash: &str) -> Result<RawTransaction, GatewayError> {
        let not_found = || GatewayError::TxHashNotFound(tx_hash.to_string());
        match self.rpc.call(op, "getrawtransaction", json!([tx_hash, true])).await {
            Ok(Some(tx)) => Ok(tx),
            Ok(None) => Err(not_found()),
            Err(GatewayError::Node { code, .. }) if code == RPC_INVALID_ADDRESS_OR_KEY => Err(not_found()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn fetch_utxo(&self, outpoint: OutPoint, timeout: Duration) -> Result<Utxo, GatewayError> {
        const OP: &str = "fetch_utxo";
        with_timeout(OP, timeout, async {
            let hash = outpoint.tx_hash.to_string();
            let tx = self.raw_transaction(OP, &hash).await?;

            let out: TxOut = self
                .rpc
                .call(OP, "gettxout", json!([hash, outpoint.vout, true]))
                .await?
                .ok_or(GatewayError::UtxoSpent { outpoint })?;

            let tx_hash: TxHash = tx.txid.parse()?;
            let utxo = Utxo::new(
                OutPoint::new(tx_hash, outpoint.vout),
                Amount::from_coins(out.value)?,
                decode_script(OP, &out.script_pubkey.hex)?,
                out.confirmations,
                None,
            )?;
            Ok(utxo)
        })
        .await
    }

    async fn list_utxos(
        &self,
        address: &Address,
        min_confirmations: u32,
        max_confirmations: u32,
        timeout: Duration,
    ) -> Result<Vec<Utxo>, GatewayError> {
        const OP: &str = "list_utxos";
        with_timeout(OP, timeout, async {
            let address = address.encode()?;
            let unspent: Vec<Unspent> = self
                .rpc
                .call(OP, "listunspent", json!([min_confirmations, max_confirmations, [address]]))
                .await?
                .unwrap_or_default();
            debug!(%address, count = unspent.len(), "listed utxos");

            unspent
                .into_iter()
                .map(|entry| -> Result<Utxo, GatewayError> {
                    let redeem_script = entry
                        .redeem_script
                        .as_deref()
                        .map(|hex| decode_script(OP, hex))
                        .transpose()?;
                    Ok(Utxo::new(
                        OutPoint::parse(&entry.txid, entry.vout)?,
                        Amount::from_coins(entry.amount)?,
                        decode_script(OP, &entry.script_pubkey)?,
                        entry.confirmations,
                        redeem_script,
                    )?)
                })
                .collect()
        })
        .await
    }

    async fn confirmations(&self, tx_hash: TxHash, timeout: Duration) -> Result<u64, GatewayError> {
        const OP: &str = "confirmations";
        with_timeout(OP, timeout, async {
            let tx = self.raw_transaction(OP, &tx_hash.to_string()).await?;
            Ok(tx.confirmations)
        })
        .await
    }

    async fn broadcast(&self, tx: &SignedTx, timeout: Duration) -> Result<TxHash, GatewayError> {
        const OP: &str = "broadcast";
        let raw = tx.serialize_hex()?;
        with_timeout(OP, timeout, async {
            let hash: String = match self.rpc.call(OP, "sendrawtransaction", json!([raw])).await {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    return Err(GatewayError::InvalidResponse {
                        op: OP,
                        detail: "null transaction hash".into(),
                    })
                }
                Err(GatewayError::Node { code, message, .. }) => {
                    return Err(GatewayError::Rejected { code, message })
                }
                Err(e) => return Err(e),
            };
            Ok(hash.parse()?)
        })
        .await
    }
}

fn decode_script(op: &'static str, hex_script: &str) -> Result<ScriptBuf, GatewayError> {
    hex::decode(hex_script)
        .map(ScriptBuf::from)
        .map_err(|e| GatewayError::InvalidResponse {
            op,
            detail: format!("script {hex_script:?}: {e}"),
        })
}
