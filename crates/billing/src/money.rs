//! Money in minor units and the fixed currency table.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use billfold_core::{DomainError, DomainResult, ValueObject};

/// Integer amount in the smallest denomination (cents, tetri).
pub type MinorUnit = i64;

/// Supported currencies (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Gel,
}

impl Currency {
    /// Fixed exchange rate relative to the common base.
    ///
    /// 275 tetri per 100 cents.
    fn rate(self) -> i64 {
        match self {
            Currency::Usd => 100,
            Currency::Gel => 275,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Gel => "GEL",
        }
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        match s {
            "USD" => Ok(Currency::Usd),
            "GEL" => Ok(Currency::Gel),
            other => Err(DomainError::validation(format!(
                "invalid currency: {other}"
            ))),
        }
    }
}

/// An amount of money in a specific currency.
///
/// Amounts are integer minor units; arithmetic truncates toward zero the way
/// integer division does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: MinorUnit,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount: MinorUnit, currency: Currency) -> Self {
        Self { amount, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Convert this amount into `to`, using the fixed rate table.
    ///
    /// Conversion between the same currency is the identity.
    pub fn convert_to(self, to: Currency) -> Money {
        if self.currency == to {
            return self;
        }
        let converted = self.amount * to.rate() / self.currency.rate();
        Money::new(converted, to)
    }
}

impl ValueObject for Money {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_currency_conversion_is_identity() {
        let m = Money::new(1234, Currency::Usd);
        assert_eq!(m.convert_to(Currency::Usd), m);
    }

    #[test]
    fn gel_to_usd_uses_fixed_table() {
        let m = Money::new(275, Currency::Gel);
        assert_eq!(m.convert_to(Currency::Usd).amount, 100);
    }

    #[test]
    fn usd_to_gel_uses_fixed_table() {
        let m = Money::new(100, Currency::Usd);
        assert_eq!(m.convert_to(Currency::Gel).amount, 275);
    }

    #[test]
    fn conversion_truncates_fractional_minor_units() {
        // 10 tetri * 100 / 275 = 3.63... -> 3 cents
        let m = Money::new(10, Currency::Gel);
        assert_eq!(m.convert_to(Currency::Usd).amount, 3);
    }

    #[test]
    fn unknown_currency_fails_validation() {
        let err = "XYZ".parse::<Currency>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn currency_parse_round_trips() {
        for c in [Currency::Usd, Currency::Gel] {
            assert_eq!(c.as_str().parse::<Currency>().unwrap(), c);
        }
    }
}
