//! Record timestamps.

use std::cmp::Ordering;
use std::fmt;

use crate::error::DecodeError;
use crate::layout::FieldValue;

/// Timestamp decoded from a record, in the stream's own units
/// (microseconds for every recording we replay).
///
/// Integer timestamps stay exact so large counters compare correctly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Int(i128),
    Float(f64),
}

impl Timestamp {
    /// Interpret a decoded field as a timestamp.
    ///
    /// Booleans count as 0 and 1. Byte strings and non-finite floats are
    /// rejected.
    pub fn from_field(value: FieldValue, name: &str) -> Result<Self, DecodeError> {
        match value {
            FieldValue::Int(v) => Ok(Timestamp::Int(v as i128)),
            FieldValue::UInt(v) => Ok(Timestamp::Int(v as i128)),
            FieldValue::Bool(v) => Ok(Timestamp::Int(v as i128)),
            FieldValue::Float(v) if v.is_finite() => Ok(Timestamp::Float(v)),
            // NaN and infinity cannot be turned into a wait
            FieldValue::Float(v) => Err(DecodeError::NotFinite(v)),
            FieldValue::Bytes(_) => Err(DecodeError::NotNumeric(name.to_string())),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Timestamp::Int(v) => v as f64,
            Timestamp::Float(v) => v,
        }
    }

    /// Units elapsed since `earlier` (negative if `earlier` is later)
    pub fn units_since(&self, earlier: &Timestamp) -> f64 {
        match (self, earlier) {
            (Timestamp::Int(a), Timestamp::Int(b)) => (a - b) as f64,
            _ => self.as_f64() - earlier.as_f64(),
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Timestamp::Int(a), Timestamp::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Int(v) => write!(f, "{}", v),
            Timestamp::Float(v) => write!(f, "{}", v),
        }
    }
}
