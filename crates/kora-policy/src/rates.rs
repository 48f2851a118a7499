//! Fixed-point SA→fiat conversion.
//!
//! Rates are rational integers (fiat units per SA = `numer / denom`);
//! there is no floating point anywhere in the conversion path. A quote is
//! only produced when the amount divides exactly, so repeated conversions
//! can never accumulate rounding drift.
//!
//! Reference rates: 1 USD = 100 SA, 1 USD = 144,000 NGN, hence
//! 1 SA = 1/100 USD = 1,440 NGN.

use serde::{Deserialize, Serialize};

use kora_types::Currency;

use crate::{PolicyError, Result};

/// SA per USD at the reference rate.
pub const SA_PER_USD: u64 = 100;

/// NGN per USD at the reference rate.
pub const NGN_PER_USD: u64 = 144_000;

/// A rational exchange rate: fiat units per SA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub numer: u64,
    pub denom: u64,
}

impl Rate {
    /// Quote `sa_amount` in fiat units.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::ZeroAmount`] for a zero amount
    /// - [`PolicyError::Overflow`] if `sa_amount * numer` overflows
    /// - [`PolicyError::InexactConversion`] if the amount does not divide
    ///   exactly at this rate
    pub fn quote(&self, sa_amount: u64) -> Result<u64> {
        if sa_amount == 0 {
            return Err(PolicyError::ZeroAmount);
        }
        let scaled = sa_amount
            .checked_mul(self.numer)
            .ok_or(PolicyError::Overflow)?;
        if scaled % self.denom != 0 {
            return Err(PolicyError::InexactConversion {
                sa_amount,
                numer: self.numer,
                denom: self.denom,
            });
        }
        Ok(scaled / self.denom)
    }

    /// The smallest SA amount this rate converts exactly.
    pub fn granularity(&self) -> u64 {
        // denom / gcd(numer, denom)
        let mut a = self.numer;
        let mut b = self.denom;
        while b != 0 {
            let r = a % b;
            a = b;
            b = r;
        }
        self.denom / a.max(1)
    }
}

/// The configured exchange table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateTable {
    pub usd: Rate,
    pub ngn: Rate,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            usd: Rate {
                numer: 1,
                denom: SA_PER_USD,
            },
            ngn: Rate {
                numer: NGN_PER_USD / SA_PER_USD,
                denom: 1,
            },
        }
    }
}

impl RateTable {
    /// The rate for a currency.
    pub fn rate(&self, currency: Currency) -> Rate {
        match currency {
            Currency::Usd => self.usd,
            Currency::Ngn => self.ngn,
        }
    }

    /// Quote an SA amount in the given currency.
    pub fn quote(&self, sa_amount: u64, currency: Currency) -> Result<u64> {
        self.rate(currency).quote(sa_amount)
    }

    /// Reject rate tables with zero terms. Run once at configuration
    /// load.
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [("usd", self.usd), ("ngn", self.ngn)] {
            if rate.numer == 0 || rate.denom == 0 {
                return Err(PolicyError::InvalidRate(format!(
                    "{name} rate has a zero term ({}/{})",
                    rate.numer, rate.denom
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_valid() {
        RateTable::default().validate().expect("default rates valid");
    }

    #[test]
    fn test_usd_quote() {
        let table = RateTable::default();
        assert_eq!(table.quote(100, Currency::Usd).expect("quote"), 1);
        assert_eq!(table.quote(10_000, Currency::Usd).expect("quote"), 100);
    }

    #[test]
    fn test_usd_inexact_rejected() {
        let table = RateTable::default();
        assert!(matches!(
            table.quote(150, Currency::Usd),
            Err(PolicyError::InexactConversion { .. })
        ));
        assert!(matches!(
            table.quote(99, Currency::Usd),
            Err(PolicyError::InexactConversion { .. })
        ));
    }

    #[test]
    fn test_ngn_quote() {
        let table = RateTable::default();
        // 1 SA = 1,440 NGN
        assert_eq!(table.quote(1, Currency::Ngn).expect("quote"), 1_440);
        assert_eq!(table.quote(100, Currency::Ngn).expect("quote"), 144_000);
    }

    #[test]
    fn test_zero_amount() {
        let table = RateTable::default();
        assert!(matches!(
            table.quote(0, Currency::Usd),
            Err(PolicyError::ZeroAmount)
        ));
    }

    #[test]
    fn test_overflow() {
        let rate = Rate {
            numer: u64::MAX,
            denom: 1,
        };
        assert!(matches!(rate.quote(2), Err(PolicyError::Overflow)));
    }

    #[test]
    fn test_granularity() {
        assert_eq!(RateTable::default().usd.granularity(), 100);
        assert_eq!(RateTable::default().ngn.granularity(), 1);
        assert_eq!(Rate { numer: 50, denom: 100 }.granularity(), 2);
    }

    #[test]
    fn test_invalid_rate_rejected() {
        let table = RateTable {
            usd: Rate { numer: 0, denom: 100 },
            ngn: RateTable::default().ngn,
        };
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_repeated_conversion_no_drift() {
        // Draining 10,000 SA in 100-SA conversions leaves exactly zero.
        let table = RateTable::default();
        let mut balance = 10_000u64;
        let mut fiat = 0u64;
        for _ in 0..100 {
            fiat += table.quote(100, Currency::Usd).expect("quote");
            balance -= 100;
        }
        assert_eq!(balance, 0);
        assert_eq!(fiat, 100);
    }
}
