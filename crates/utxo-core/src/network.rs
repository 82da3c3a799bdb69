use std::fmt;
use std::str::FromStr;

use crate::amount::Amount;
use crate::error::CoreError;

/// Smallest output value worth creating, shared by every supported chain.
pub const DUST: Amount = Amount::from_sat(600);

/// UTXO ledgers supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Bitcoin,
    ZCash,
    BitcoinCash,
}

impl Chain {
    /// Short code used in gateway paths.
    pub fn code(self) -> &'static str {
        match self {
            Chain::Bitcoin => "btc",
            Chain::ZCash => "zec",
            Chain::BitcoinCash => "bch",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Chain {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "btc" | "bitcoin" => Ok(Chain::Bitcoin),
            "zec" | "zcash" => Ok(Chain::ZCash),
            "bch" | "bitcoincash" => Ok(Chain::BitcoinCash),
            _ => Err(CoreError::UnknownChain(s.to_string())),
        }
    }
}

/// Deployment of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Mainnet,
    Testnet,
    Localnet,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Mainnet => write!(f, "mainnet"),
            Variant::Testnet => write!(f, "testnet"),
            Variant::Localnet => write!(f, "localnet"),
        }
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Variant::Mainnet),
            "testnet" | "testnet3" => Ok(Variant::Testnet),
            "localnet" | "regtest" => Ok(Variant::Localnet),
            _ => Err(CoreError::UnknownNetwork(s.to_string())),
        }
    }
}

/// Which script checks a chain's transactions get before broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptRules {
    /// Run the script engine with the standard verification flags.
    Standard,
    /// No local script model; verification reports success without executing.
    Unchecked,
}

/// Constants for one `(chain, variant)` pair.
#[derive(Debug)]
pub struct NetworkParams {
    pub chain: Chain,
    pub variant: Variant,
    /// Base58check version prefix for pay-to-key-hash addresses.
    pub p2pkh_prefix: &'static [u8],
    /// Base58check version prefix for pay-to-script-hash addresses.
    pub p2sh_prefix: &'static [u8],
    pub dust: Amount,
    pub script_rules: ScriptRules,
    /// Network used for bech32 segwit addresses; `None` where segwit is unavailable.
    pub segwit: Option<bitcoin::Network>,
    /// Consensus branch id committed to by ZCash v5 transactions.
    pub consensus_branch_id: Option<u32>,
}

impl NetworkParams {
    pub fn supports_segwit(&self) -> bool {
        self.segwit.is_some()
    }
}

const fn params(
    chain: Chain,
    variant: Variant,
    p2pkh_prefix: &'static [u8],
    p2sh_prefix: &'static [u8],
    script_rules: ScriptRules,
    segwit: Option<bitcoin::Network>,
    consensus_branch_id: Option<u32>,
) -> NetworkParams {
    NetworkParams {
        chain,
        variant,
        p2pkh_prefix,
        p2sh_prefix,
        dust: DUST,
        script_rules,
        segwit,
        consensus_branch_id,
    }
}

/// NU6.1, active on ZCash mainnet and testnet.
const ZEC_BRANCH_ID: u32 = 0x4DEC_4DF0;

static NETWORKS: [NetworkParams; 9] = [
    params(
        Chain::Bitcoin,
        Variant::Mainnet,
        &[0x00],
        &[0x05],
        ScriptRules::Standard,
        Some(bitcoin::Network::Bitcoin),
        None,
    ),
    params(
        Chain::Bitcoin,
        Variant::Testnet,
        &[0x6f],
        &[0xc4],
        ScriptRules::Standard,
        Some(bitcoin::Network::Testnet),
        None,
    ),
    params(
        Chain::Bitcoin,
        Variant::Localnet,
        &[0x6f],
        &[0xc4],
        ScriptRules::Standard,
        Some(bitcoin::Network::Regtest),
        None,
    ),
    params(
        Chain::ZCash,
        Variant::Mainnet,
        &[0x1c, 0xb8],
        &[0x1c, 0xbd],
        ScriptRules::Unchecked,
        None,
        Some(ZEC_BRANCH_ID),
    ),
    params(
        Chain::ZCash,
        Variant::Testnet,
        &[0x1d, 0x25],
        &[0x1c, 0xba],
        ScriptRules::Unchecked,
        None,
        Some(ZEC_BRANCH_ID),
    ),
    params(
        Chain::ZCash,
        Variant::Localnet,
        &[0x1d, 0x25],
        &[0x1c, 0xba],
        ScriptRules::Unchecked,
        None,
        Some(ZEC_BRANCH_ID),
    ),
    params(
        Chain::BitcoinCash,
        Variant::Mainnet,
        &[0x00],
        &[0x05],
        ScriptRules::Unchecked,
        None,
        None,
    ),
    params(
        Chain::BitcoinCash,
        Variant::Testnet,
        &[0x6f],
        &[0xc4],
        ScriptRules::Unchecked,
        None,
        None,
    ),
    params(
        Chain::BitcoinCash,
        Variant::Localnet,
        &[0x6f],
        &[0xc4],
        ScriptRules::Unchecked,
        None,
        None,
    ),
];

/// A validated `(chain, variant)` pair.
///
/// Only obtainable through [`Network::new`] (or parsing), so every value
/// carries a parameter set from the table above.
#[derive(Clone, Copy)]
pub struct Network {
    params: &'static NetworkParams,
}

impl Network {
    pub fn new(chain: Chain, variant: Variant) -> Result<Self, CoreError> {
        NETWORKS
            .iter()
            .find(|p| p.chain == chain && p.variant == variant)
            .map(|params| Network { params })
            .ok_or_else(|| CoreError::UnknownNetwork(format!("{chain}/{variant}")))
    }

    /// Parse a network from its chain and variant names, e.g. `("btc", "testnet")`.
    pub fn from_names(chain: &str, variant: &str) -> Result<Self, CoreError> {
        Network::new(chain.parse()?, variant.parse()?)
    }

    /// Every supported network, in table order.
    pub fn all() -> impl Iterator<Item = Network> {
        NETWORKS.iter().map(|params| Network { params })
    }

    pub fn chain(self) -> Chain {
        self.params.chain
    }

    pub fn variant(self) -> Variant {
        self.params.variant
    }

    pub fn params(self) -> &'static NetworkParams {
        self.params
    }

    pub fn dust(self) -> Amount {
        self.params.dust
    }
}

impl PartialEq for Network {
    fn eq(&self, other: &Self) -> bool {
        self.chain() == other.chain() && self.variant() == other.variant()
    }
}

impl Eq for Network {}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Network({self})")
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.chain(), self.variant())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pair_is_in_the_table() {
        for chain in [Chain::Bitcoin, Chain::ZCash, Chain::BitcoinCash] {
            for variant in [Variant::Mainnet, Variant::Testnet, Variant::Localnet] {
                let network = Network::new(chain, variant).unwrap();
                assert_eq!(network.chain(), chain);
                assert_eq!(network.variant(), variant);
            }
        }
        assert_eq!(Network::all().count(), 9);
    }

    #[test]
    fn dust_is_600_everywhere() {
        for network in Network::all() {
            assert_eq!(network.dust(), Amount::from_sat(600));
        }
    }

    #[test]
    fn only_bitcoin_supports_segwit() {
        for network in Network::all() {
            assert_eq!(
                network.params().supports_segwit(),
                network.chain() == Chain::Bitcoin,
                "{network}"
            );
        }
    }

    #[test]
    fn only_bitcoin_runs_the_script_engine() {
        for network in Network::all() {
            let expected = if network.chain() == Chain::Bitcoin {
                ScriptRules::Standard
            } else {
                ScriptRules::Unchecked
            };
            assert_eq!(network.params().script_rules, expected);
        }
    }

    #[test]
    fn only_zcash_has_a_branch_id() {
        for network in Network::all() {
            let branch_id = network.params().consensus_branch_id;
            match network.chain() {
                Chain::ZCash => assert_eq!(branch_id, Some(0x4DEC_4DF0), "{network}"),
                _ => assert_eq!(branch_id, None, "{network}"),
            }
        }
    }

    #[test]
    fn parse_names() {
        let network = Network::from_names("btc", "testnet3").unwrap();
        assert_eq!(network.chain(), Chain::Bitcoin);
        assert_eq!(network.variant(), Variant::Testnet);

        let network = Network::from_names("ZCash", "regtest").unwrap();
        assert_eq!(network.chain(), Chain::ZCash);
        assert_eq!(network.variant(), Variant::Localnet);
    }

    #[test]
    fn unknown_chain_is_an_error() {
        let err = Network::from_names("doge", "mainnet").unwrap_err();
        assert_eq!(err, CoreError::UnknownChain("doge".into()));
    }

    #[test]
    fn unknown_variant_is_an_error() {
        let err = Network::from_names("bch", "signet").unwrap_err();
        assert_eq!(err, CoreError::UnknownNetwork("signet".into()));
    }

    #[test]
    fn display_names() {
        let network = Network::new(Chain::BitcoinCash, Variant::Localnet).unwrap();
        assert_eq!(network.to_string(), "bch/localnet");
    }
}
