use std::fmt;

use bitcoin::address::NetworkUnchecked;
use bitcoin::hashes::Hash;
use bitcoin::{PubkeyHash, ScriptBuf, ScriptHash, WPubkeyHash, WScriptHash};

use crate::error::CoreError;
use crate::hash::{hash160, sha256};
use crate::network::Network;

/// Script type an address pays to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    KeyHash,
    ScriptHash,
    SegwitKeyHash,
    SegwitScriptHash,
}

/// Decoded address payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Payload {
    KeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    SegwitKeyHash([u8; 20]),
    SegwitScriptHash([u8; 32]),
}

/// A chain- and network-specific address.
///
/// Two addresses are equal when their payloads and version prefixes (or
/// bech32 networks) match. Networks sharing a prefix, such as Bitcoin
/// testnet and localnet, therefore share their base58 addresses.
#[derive(Debug, Clone, Copy)]
pub struct Address {
    network: Network,
    payload: Payload,
}

/// What the encoded form commits to besides the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Version {
    Base58(&'static [u8]),
    Bech32(Option<bitcoin::Network>),
}

impl Version {
    fn of(payload: &Payload, network: Network) -> Self {
        let params = network.params();
        match payload {
            Payload::KeyHash(_) => Version::Base58(params.p2pkh_prefix),
            Payload::ScriptHash(_) => Version::Base58(params.p2sh_prefix),
            Payload::SegwitKeyHash(_) | Payload::SegwitScriptHash(_) => Version::Bech32(params.segwit),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload && self.version() == other.version()
    }
}

impl Eq for Address {}

impl Address {
    pub fn new(network: Network, payload: Payload) -> Result<Self, CoreError> {
        if matches!(payload, Payload::SegwitKeyHash(_) | Payload::SegwitScriptHash(_)) {
            require_segwit(network, "segwit address")?;
        }
        Ok(Address { network, payload })
    }

    /// Decode a base58check P2PKH or P2SH address.
    ///
    /// A string that is not valid base58check is `InvalidAddress`; a valid
    /// string whose version prefix belongs to another network is
    /// `WrongNetwork`.
    pub fn from_base58(text: &str, network: Network) -> Result<Self, CoreError> {
        let data = bs58::decode(text)
            .with_check(None)
            .into_vec()
            .map_err(|e| CoreError::InvalidAddress(format!("invalid base58check: {e}")))?;

        let params = network.params();
        if let Some(hash) = strip_prefix(&data, params.p2pkh_prefix) {
            return Ok(Address { network, payload: Payload::KeyHash(hash) });
        }
        if let Some(hash) = strip_prefix(&data, params.p2sh_prefix) {
            return Ok(Address { network, payload: Payload::ScriptHash(hash) });
        }

        let known_elsewhere = Network::all().any(|other| {
            let p = other.params();
            strip_prefix(&data, p.p2pkh_prefix).is_some() || strip_prefix(&data, p.p2sh_prefix).is_some()
        });
        if known_elsewhere {
            Err(CoreError::WrongNetwork { address: text.to_string(), expected: network })
        } else {
            Err(CoreError::InvalidAddress(format!("unknown version prefix in {text}")))
        }
    }

    /// Decode a bech32 segwit v0 address (Bitcoin only).
    pub fn from_bech32(text: &str, network: Network) -> Result<Self, CoreError> {
        let btc_network = require_segwit(network, "segwit address")?;
        let unchecked = text
            .parse::<bitcoin::Address<NetworkUnchecked>>()
            .map_err(|e| CoreError::InvalidAddress(format!("failed to parse address: {e}")))?;
        let checked = unchecked
            .require_network(btc_network)
            .map_err(|_| CoreError::WrongNetwork { address: text.to_string(), expected: network })?;

        let script = checked.script_pubkey();
        let bytes = script.as_bytes();
        let payload = if script.is_p2wpkh() {
            Payload::SegwitKeyHash(copy_array(&bytes[2..22]))
        } else if script.is_p2wsh() {
            Payload::SegwitScriptHash(copy_array(&bytes[2..34]))
        } else {
            return Err(CoreError::InvalidAddress(format!("{text} is not a segwit v0 address")));
        };
        Ok(Address { network, payload })
    }

    /// Decode any address text valid for `network`.
    pub fn decode(text: &str, network: Network) -> Result<Self, CoreError> {
        match Address::from_base58(text, network) {
            Err(CoreError::InvalidAddress(_)) if network.params().supports_segwit() => {
                Address::from_bech32(text, network)
            }
            other => other,
        }
    }

    /// P2PKH address of a serialized secp256k1 public key (33 or 65 bytes).
    pub fn from_pubkey(pubkey: &[u8], network: Network) -> Result<Self, CoreError> {
        let key = parse_pubkey(pubkey)?;
        Ok(Address { network, payload: Payload::KeyHash(hash160(&key.to_bytes())) })
    }

    /// P2SH address paying to `script`.
    pub fn from_script(script: &[u8], network: Network) -> Result<Self, CoreError> {
        Ok(Address { network, payload: Payload::ScriptHash(hash160(script)) })
    }

    /// P2WPKH address of a compressed public key.
    pub fn segwit_from_pubkey(pubkey: &[u8], network: Network) -> Result<Self, CoreError> {
        require_segwit(network, "segwit address derivation")?;
        let key = parse_pubkey(pubkey)?;
        if !key.compressed {
            return Err(CoreError::InvalidPublicKey(
                "segwit addresses require a compressed public key".into(),
            ));
        }
        Ok(Address { network, payload: Payload::SegwitKeyHash(hash160(&key.to_bytes())) })
    }

    /// P2WSH address paying to `script`.
    pub fn segwit_from_script(script: &[u8], network: Network) -> Result<Self, CoreError> {
        require_segwit(network, "segwit address derivation")?;
        Ok(Address { network, payload: Payload::SegwitScriptHash(sha256(script)) })
    }

    /// Network the address was decoded or derived for.
    pub fn network(&self) -> Network {
        self.network
    }

    /// True if this address encodes identically on `network`.
    pub fn is_valid_for(&self, network: Network) -> bool {
        self.version() == Version::of(&self.payload, network)
    }

    fn version(&self) -> Version {
        Version::of(&self.payload, self.network)
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn kind(&self) -> AddressKind {
        match self.payload {
            Payload::KeyHash(_) => AddressKind::KeyHash,
            Payload::ScriptHash(_) => AddressKind::ScriptHash,
            Payload::SegwitKeyHash(_) => AddressKind::SegwitKeyHash,
            Payload::SegwitScriptHash(_) => AddressKind::SegwitScriptHash,
        }
    }

    /// The locking script that pays to this address.
    pub fn script_pubkey(&self) -> ScriptBuf {
        match self.payload {
            Payload::KeyHash(h) => ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(h)),
            Payload::ScriptHash(h) => ScriptBuf::new_p2sh(&ScriptHash::from_byte_array(h)),
            Payload::SegwitKeyHash(h) => ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(h)),
            Payload::SegwitScriptHash(h) => ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array(h)),
        }
    }

    /// Text form: base58check for hash addresses, bech32 for segwit.
    pub fn encode(&self) -> Result<String, CoreError> {
        let params = self.network.params();
        let (prefix, hash) = match &self.payload {
            Payload::KeyHash(h) => (params.p2pkh_prefix, h),
            Payload::ScriptHash(h) => (params.p2sh_prefix, h),
            Payload::SegwitKeyHash(_) | Payload::SegwitScriptHash(_) => {
                let btc_network = require_segwit(self.network, "segwit address")?;
                let address = bitcoin::Address::from_script(&self.script_pubkey(), btc_network)
                    .map_err(|e| CoreError::InvalidAddress(e.to_string()))?;
                return Ok(address.to_string());
            }
        };

        let mut data = Vec::with_capacity(prefix.len() + hash.len());
        data.extend_from_slice(prefix);
        data.extend_from_slice(hash);
        Ok(bs58::encode(data).with_check().into_string())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn require_segwit(network: Network, operation: &'static str) -> Result<bitcoin::Network, CoreError> {
    network
        .params()
        .segwit
        .ok_or(CoreError::UnsupportedOperation { operation, network })
}

fn parse_pubkey(pubkey: &[u8]) -> Result<bitcoin::PublicKey, CoreError> {
    bitcoin::PublicKey::from_slice(pubkey)
        .map_err(|e| CoreError::InvalidPublicKey(format!("failed to parse public key: {e}")))
}

fn strip_prefix(data: &[u8], prefix: &[u8]) -> Option<[u8; 20]> {
    match data.strip_prefix(prefix) {
        Some(hash) if hash.len() == 20 => Some(copy_array(hash)),
        _ => None,
    }
}

fn copy_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Chain, Variant};

    /// Compressed public key of private key 1.
    const G_PUBKEY: &str = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";

    fn g_pubkey() -> Vec<u8> {
        hex::decode(G_PUBKEY).unwrap()
    }

    fn net(chain: Chain, variant: Variant) -> Network {
        Network::new(chain, variant).unwrap()
    }

    #[test]
    fn p2pkh_mainnet_test_vector() {
        let addr = Address::from_pubkey(&g_pubkey(), net(Chain::Bitcoin, Variant::Mainnet)).unwrap();
        assert_eq!(addr.to_string(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
        assert_eq!(addr.kind(), AddressKind::KeyHash);
    }

    #[test]
    fn p2wpkh_mainnet_test_vector() {
        let addr =
            Address::segwit_from_pubkey(&g_pubkey(), net(Chain::Bitcoin, Variant::Mainnet)).unwrap();
        assert_eq!(addr.to_string(), "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
    }

    #[test]
    fn testnet_p2pkh_starts_with_m_or_n() {
        let addr = Address::from_pubkey(&g_pubkey(), net(Chain::Bitcoin, Variant::Testnet)).unwrap();
        let text = addr.to_string();
        assert!(text.starts_with('m') || text.starts_with('n'), "got {text}");
    }

    #[test]
    fn zcash_addresses_use_two_byte_prefixes() {
        let main = Address::from_pubkey(&g_pubkey(), net(Chain::ZCash, Variant::Mainnet)).unwrap();
        let test = Address::from_pubkey(&g_pubkey(), net(Chain::ZCash, Variant::Testnet)).unwrap();
        assert!(main.to_string().starts_with("t1"), "got {main}");
        assert!(test.to_string().starts_with("tm"), "got {test}");

        let script = Address::from_script(&[0x51], net(Chain::ZCash, Variant::Mainnet)).unwrap();
        assert!(script.to_string().starts_with("t3"), "got {script}");
    }

    #[test]
    fn bitcoin_cash_legacy_matches_bitcoin_text() {
        let bch = Address::from_pubkey(&g_pubkey(), net(Chain::BitcoinCash, Variant::Mainnet)).unwrap();
        assert_eq!(bch.to_string(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn round_trip_on_every_network() {
        for network in Network::all() {
            let mut addresses = vec![
                Address::from_pubkey(&g_pubkey(), network).unwrap(),
                Address::from_script(&[0x51, 0x52, 0x93], network).unwrap(),
            ];
            if network.params().supports_segwit() {
                addresses.push(Address::segwit_from_pubkey(&g_pubkey(), network).unwrap());
                addresses.push(Address::segwit_from_script(&[0x51], network).unwrap());
            }
            for addr in addresses {
                let decoded = Address::decode(&addr.to_string(), network).unwrap();
                assert_eq!(decoded, addr, "{network}");
            }
        }
    }

    #[test]
    fn genesis_address_decodes_as_key_hash() {
        let addr = Address::from_base58(
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
            net(Chain::Bitcoin, Variant::Mainnet),
        )
        .unwrap();
        assert_eq!(addr.kind(), AddressKind::KeyHash);
    }

    #[test]
    fn wrong_network_is_distinct_from_bad_encoding() {
        let testnet = net(Chain::Bitcoin, Variant::Testnet);

        let err = Address::from_base58("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", testnet).unwrap_err();
        assert!(matches!(err, CoreError::WrongNetwork { .. }), "got {err:?}");

        let err = Address::from_base58("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb", testnet).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress(_)), "got {err:?}");

        let err = Address::decode("notanaddress!!!", testnet).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAddress(_)), "got {err:?}");
    }

    #[test]
    fn mainnet_bech32_on_testnet_is_wrong_network() {
        let err = Address::decode(
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            net(Chain::Bitcoin, Variant::Testnet),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::WrongNetwork { .. }), "got {err:?}");
    }

    #[test]
    fn segwit_is_unsupported_outside_bitcoin() {
        for chain in [Chain::ZCash, Chain::BitcoinCash] {
            let err = Address::segwit_from_pubkey(&g_pubkey(), net(chain, Variant::Mainnet)).unwrap_err();
            assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
            let err = Address::segwit_from_script(&[0x51], net(chain, Variant::Testnet)).unwrap_err();
            assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
        }
    }

    #[test]
    fn invalid_pubkey_returns_error() {
        let err = Address::from_pubkey(&[0u8; 33], net(Chain::Bitcoin, Variant::Mainnet)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidPublicKey(_)));
    }

    #[test]
    fn equality_follows_version_prefix_and_payload() {
        let testnet = net(Chain::Bitcoin, Variant::Testnet);
        let localnet = net(Chain::Bitcoin, Variant::Localnet);
        let mainnet = net(Chain::Bitcoin, Variant::Mainnet);

        let on_testnet = Address::from_pubkey(&g_pubkey(), testnet).unwrap();
        let on_localnet = Address::from_base58(&on_testnet.to_string(), localnet).unwrap();
        assert_eq!(on_testnet.to_string(), on_localnet.to_string());
        assert_eq!(on_testnet, on_localnet);
        assert!(on_testnet.is_valid_for(localnet));

        let on_mainnet = Address::from_pubkey(&g_pubkey(), mainnet).unwrap();
        assert_ne!(on_testnet, on_mainnet);
        assert!(!on_testnet.is_valid_for(mainnet));

        // Same hash, different kind.
        let p2sh = Address::new(testnet, Payload::ScriptHash(match on_testnet.payload() {
            Payload::KeyHash(h) => h,
            other => panic!("unexpected payload {other:?}"),
        }))
        .unwrap();
        assert_ne!(on_testnet, p2sh);
    }

    #[test]
    fn bech32_equality_follows_hrp() {
        let testnet = net(Chain::Bitcoin, Variant::Testnet);
        let localnet = net(Chain::Bitcoin, Variant::Localnet);
        let tb = Address::segwit_from_pubkey(&g_pubkey(), testnet).unwrap();
        let bcrt = Address::segwit_from_pubkey(&g_pubkey(), localnet).unwrap();
        assert!(tb.to_string().starts_with("tb1"));
        assert!(bcrt.to_string().starts_with("bcrt1"));
        assert_ne!(tb, bcrt);
        assert!(!tb.is_valid_for(localnet));
        assert!(tb.is_valid_for(testnet));
    }

    #[test]
    fn script_pubkeys_match_templates() {
        let network = net(Chain::Bitcoin, Variant::Mainnet);
        assert!(Address::from_pubkey(&g_pubkey(), network).unwrap().script_pubkey().is_p2pkh());
        assert!(Address::from_script(&[0x51], network).unwrap().script_pubkey().is_p2sh());
        assert!(Address::segwit_from_pubkey(&g_pubkey(), network).unwrap().script_pubkey().is_p2wpkh());
        assert!(Address::segwit_from_script(&[0x51], network).unwrap().script_pubkey().is_p2wsh());
    }
}
