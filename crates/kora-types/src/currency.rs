//! Fiat currencies the platform quotes and pays out in.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Ngn,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Ngn => "NGN",
        }
    }

    pub fn parse(s: &str) -> Result<Self, crate::ParseEnumError> {
        match s {
            "USD" => Ok(Self::Usd),
            "NGN" => Ok(Self::Ngn),
            other => Err(crate::ParseEnumError {
                what: "currency",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        assert_eq!(Currency::parse("USD").expect("parse"), Currency::Usd);
        assert_eq!(Currency::parse("NGN").expect("parse"), Currency::Ngn);
        assert!(Currency::parse("EUR").is_err());
        assert_eq!(Currency::Ngn.to_string(), "NGN");
    }
}
