use crate::{error::MarketError, instrument::Symbol};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// One time-bucket of price data for one instrument.
///
/// Invariant: `low <= open, close <= high`. Within a single feed stream,
/// `time` is monotonically non-decreasing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Ohlc {
    pub instrument: Symbol,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub time: DateTime<Utc>,
}

impl Ohlc {
    pub fn validate(&self) -> Result<(), MarketError> {
        let Self {
            open,
            high,
            low,
            close,
            ..
        } = self;

        if low > high {
            return Err(self.invalid(format!("low {low} above high {high}")));
        }
        if open < low || open > high {
            return Err(self.invalid(format!("open {open} outside [{low}, {high}]")));
        }
        if close < low || close > high {
            return Err(self.invalid(format!("close {close} outside [{low}, {high}]")));
        }
        if !(open.is_finite() && high.is_finite() && low.is_finite() && close.is_finite()) {
            return Err(self.invalid("non-finite price".to_string()));
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> MarketError {
        MarketError::InvalidBar {
            symbol: self.instrument.as_str().into(),
            reason,
        }
    }
}
