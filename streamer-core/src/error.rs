//! Error types for layout parsing and record decoding

use thiserror::Error;

/// Errors that can occur when parsing a record layout string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Layout string contains no fields at all
    #[error("Layout '{0}' describes no fields")]
    Empty(String),

    /// Character is not a known type code
    #[error("Unknown type code '{code}' at position {position}")]
    UnknownCode { code: char, position: usize },

    /// Count prefix with nothing after it
    #[error("Repeat count at position {0} is not followed by a type code")]
    DanglingCount(usize),

    /// Count prefix does not fit in usize
    #[error("Repeat count at position {0} is too large")]
    CountOverflow(usize),

    /// Byte order character somewhere other than the start
    #[error("Byte order '{code}' is only allowed as the first character (found at {position})")]
    MisplacedByteOrder { code: char, position: usize },

    /// `n`, `N` and `P` have no standard size
    #[error("Type code '{0}' is only available in native mode")]
    NativeOnly(char),
}

/// Errors that can occur when building a stream descriptor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// Layout string did not parse
    #[error("{0}")]
    Layout(#[from] LayoutError),

    /// Keys do not name a timestamp field
    #[error("No 'timestamp' key in {0:?}")]
    MissingTimestamp(Vec<String>),

    /// Timestamp key points past the end of the layout
    #[error("Timestamp is field {index} but the layout only has {fields} fields")]
    TimestampOutOfRange { index: usize, fields: usize },
}

/// Errors that can occur when decoding a record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Record has the wrong number of bytes for its layout
    #[error("Record size mismatch: layout needs {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Requested field does not exist in the layout
    #[error("No field at index {0}")]
    NoSuchField(usize),

    /// Timestamp field decoded to something that is not a number
    #[error("Field '{0}' is not numeric and cannot be used as a timestamp")]
    NotNumeric(String),

    /// Float timestamp is NaN or infinite
    #[error("Timestamp {0} is not finite")]
    NotFinite(f64),
}
