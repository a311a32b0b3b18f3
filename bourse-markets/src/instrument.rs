use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Identifier for a tradable asset (ticker symbol or ISIN).
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct Symbol(SmolStr);

impl Symbol {
    pub fn new(symbol: impl Into<SmolStr>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

/// A tradable instrument as known by the engine and its bundle.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Instrument {
    pub symbol: Symbol,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<SmolStr>,
}

impl Instrument {
    pub fn new(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            name: None,
            exchange: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_serialises_as_bare_string() {
        let symbol = Symbol::from("AAPL");
        assert_eq!(serde_json::to_string(&symbol).expect("serialise"), "\"AAPL\"");
    }

    #[test]
    fn test_instrument_round_trip() {
        let instrument = Instrument::new("TSLA");
        let loaded: Instrument =
            serde_json::from_str(&serde_json::to_string(&instrument).expect("serialise"))
                .expect("deserialise");
        assert_eq!(loaded, instrument);
    }
}
