//! Money amounts in cents
//!
//! Clients send amounts either as JSON numbers (`1500`, `1500.5`) or strings
//! (`"1,500.50"`). Everything is stored as BIGINT cents.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Non-negative amount in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Money(i64);

/// Amount as it arrives in a request body
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Number(f64),
    Text(String),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Result<Self, ValidationError> {
        if cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "amount",
                min: 0,
                max: i64::MAX,
            });
        }
        Ok(Self(cents))
    }

    /// Parse a decimal amount with at most two fraction digits.
    ///
    /// # Example
    /// ```
    /// use hope_server::models::Money;
    ///
    /// assert_eq!(Money::parse("amount", "1,250.5").unwrap().cents(), 125_050);
    /// assert!(Money::parse("amount", "1.999").is_err());
    /// ```
    pub fn parse(field: &'static str, s: &str) -> Result<Self, ValidationError> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
        if cleaned.is_empty() {
            return Err(ValidationError::Empty { field });
        }

        let invalid = ValidationError::InvalidFormat {
            field,
            reason: "must be a non-negative amount with at most two decimals",
        };

        let (whole, frac) = match cleaned.split_once('.') {
            Some((w, f)) => (w, f),
            None => (cleaned.as_str(), ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid);
        }
        if frac.len() > 2
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid);
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid.clone())?
        };
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid.clone())? * 10,
            _ => frac.parse().map_err(|_| invalid.clone())?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Self)
            .ok_or(invalid)
    }

    /// Convert a request amount.
    pub fn from_input(field: &'static str, input: &AmountInput) -> Result<Self, ValidationError> {
        match input {
            AmountInput::Text(s) => Self::parse(field, s),
            AmountInput::Number(n) => {
                if !n.is_finite() || *n < 0.0 {
                    return Err(ValidationError::InvalidFormat {
                        field,
                        reason: "must be a non-negative amount with at most two decimals",
                    });
                }
                // Shortest round-trip form, so 1.999 stays three decimals.
                Self::parse(field, &n.to_string())
            }
        }
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!(Money::parse("amount", "1500").unwrap().cents(), 150_000);
        assert_eq!(Money::parse("amount", "1,500.5").unwrap().cents(), 150_050);
        assert_eq!(Money::parse("amount", "0.07").unwrap().cents(), 7);
        assert_eq!(Money::parse("amount", ".5").unwrap().cents(), 50);
    }

    #[test]
    fn rejects_bad_amounts() {
        assert!(Money::parse("amount", "").is_err());
        assert!(Money::parse("amount", "-5").is_err());
        assert!(Money::parse("amount", "1.234").is_err());
        assert!(Money::parse("amount", "abc").is_err());
        assert!(Money::parse("amount", ".").is_err());
        assert!(Money::parse("amount", "99999999999999999999").is_err());
    }

    #[test]
    fn numbers_convert_to_cents() {
        let m = Money::from_input("amount", &AmountInput::Number(250.25)).unwrap();
        assert_eq!(m.cents(), 25_025);
        let m = Money::from_input("amount", &AmountInput::Number(1500.0)).unwrap();
        assert_eq!(m.cents(), 150_000);
        assert!(Money::from_input("amount", &AmountInput::Number(-1.0)).is_err());
    }

    #[test]
    fn numbers_with_three_decimals_are_rejected() {
        let err = Money::from_input("amount", &AmountInput::Number(1.999)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { field: "amount", .. }));
        assert_eq!(
            Money::from_input("amount", &AmountInput::Text("1.999".into())).unwrap_err(),
            err
        );
    }

    #[test]
    fn display_has_two_decimals() {
        assert_eq!(Money::from_cents(150_005).unwrap().to_string(), "1500.05");
        assert!(Money::from_cents(-1).is_err());
    }
}
