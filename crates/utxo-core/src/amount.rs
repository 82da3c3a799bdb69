use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A value in the smallest unit of a chain (satoshi, zatoshi).
///
/// Signed so that intermediate balances can go negative and be checked
/// before they are used as an output value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const SAT: Amount = Amount(1);
    /// One whole coin (1e8 base units) on every supported chain.
    pub const COIN: Amount = Amount(100_000_000);
    /// Upper bound on any single value: the 21M coin supply.
    pub const MAX_MONEY: Amount = Amount(21_000_000 * 100_000_000);

    pub const fn from_sat(sat: i64) -> Self {
        Amount(sat)
    }

    pub const fn to_sat(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Amount> {
        self.0.checked_mul(rhs).map(Amount)
    }

    /// Reject values outside `0..=MAX_MONEY`; used for anything that ends up
    /// in an output or is read back from a node.
    pub fn check_output_range(self) -> Result<Amount, CoreError> {
        if self.0 < 0 || self > Amount::MAX_MONEY {
            return Err(CoreError::InvalidAmount(format!(
                "{self} is outside 0..={}",
                Amount::MAX_MONEY
            )));
        }
        Ok(self)
    }

    /// Convert to the `bitcoin` crate's unsigned amount.
    pub fn to_bitcoin(self) -> Result<bitcoin::Amount, CoreError> {
        let sat = u64::try_from(self.check_output_range()?.0)
            .map_err(|e| CoreError::InvalidAmount(e.to_string()))?;
        Ok(bitcoin::Amount::from_sat(sat))
    }

    /// Parse a decimal coin value as reported by node RPCs (e.g. `0.0015`).
    pub fn from_coins(value: f64) -> Result<Amount, CoreError> {
        let amount = bitcoin::Amount::from_btc(value)
            .map_err(|e| CoreError::InvalidAmount(format!("{value}: {e}")))?;
        let sat = i64::try_from(amount.to_sat())
            .map_err(|e| CoreError::InvalidAmount(e.to_string()))?;
        Amount(sat).check_output_range()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<bitcoin::Amount> for Amount {
    fn from(value: bitcoin::Amount) -> Self {
        // Any consensus-valid bitcoin amount fits in i64.
        Amount(i64::try_from(value.to_sat()).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_is_1e8_sat() {
        assert_eq!(Amount::SAT.checked_mul(100_000_000), Some(Amount::COIN));
    }

    #[test]
    fn checked_sub_can_go_negative() {
        let refund = Amount::from_sat(1_000).checked_sub(Amount::from_sat(1_500)).unwrap();
        assert!(refund.is_negative());
        assert_eq!(refund.to_sat(), -500);
    }

    #[test]
    fn checked_add_overflow_is_none() {
        assert_eq!(Amount::from_sat(i64::MAX).checked_add(Amount::SAT), None);
    }

    #[test]
    fn negative_amount_does_not_convert() {
        assert!(Amount::from_sat(-1).to_bitcoin().is_err());
        assert_eq!(
            Amount::from_sat(546).to_bitcoin().unwrap(),
            bitcoin::Amount::from_sat(546)
        );
    }

    #[test]
    fn above_max_money_is_rejected() {
        let too_much = Amount::MAX_MONEY.checked_add(Amount::SAT).unwrap();
        assert!(too_much.check_output_range().is_err());
        assert!(Amount::MAX_MONEY.check_output_range().is_ok());
    }

    #[test]
    fn parses_node_decimal_values() {
        assert_eq!(Amount::from_coins(0.0015).unwrap(), Amount::from_sat(150_000));
        assert_eq!(Amount::from_coins(1.0).unwrap(), Amount::COIN);
        assert!(Amount::from_coins(-0.1).is_err());
    }
}
