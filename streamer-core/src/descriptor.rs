//! Stream descriptors: everything a replay needs to know about one stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{DecodeError, DescriptorError};
use crate::layout::{FieldValue, RecordLayout};
use crate::settings::DatastreamSettings;
use crate::timestamp::Timestamp;

/// Name of the field every record must carry
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Stream identifier as written in the settings file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamId {
    Number(i64),
    Name(String),
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamId::Number(n) => write!(f, "{}", n),
            StreamId::Name(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        StreamId::Name(s.to_string())
    }
}

/// Immutable description of one replayed stream
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    id: StreamId,
    layout: RecordLayout,
    field_index: HashMap<String, usize>,
    timestamp_index: usize,
    destination_port: u16,
}

impl StreamDescriptor {
    /// Build a descriptor from a parsed layout and the field names in order.
    ///
    /// When a name is repeated the first position wins.
    pub fn new(
        id: StreamId,
        layout: RecordLayout,
        keys: &[String],
        destination_port: u16,
    ) -> Result<Self, DescriptorError> {
        let mut field_index = HashMap::new();
        for (i, key) in keys.iter().enumerate() {
            field_index.entry(key.clone()).or_insert(i);
        }

        let timestamp_index = *field_index
            .get(TIMESTAMP_KEY)
            .ok_or_else(|| DescriptorError::MissingTimestamp(keys.to_vec()))?;
        if timestamp_index >= layout.fields().len() {
            return Err(DescriptorError::TimestampOutOfRange {
                index: timestamp_index,
                fields: layout.fields().len(),
            });
        }

        Ok(Self {
            id,
            layout,
            field_index,
            timestamp_index,
            destination_port,
        })
    }

    /// Build a descriptor from one datastream entry of the settings file.
    pub fn from_settings(settings: &DatastreamSettings) -> Result<Self, DescriptorError> {
        let layout = RecordLayout::parse(&settings.fstring)?;
        Self::new(settings.id.clone(), layout, &settings.keys, settings.port)
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Size in bytes of every record in this stream
    pub fn record_size(&self) -> usize {
        self.layout.size()
    }

    pub fn timestamp_index(&self) -> usize {
        self.timestamp_index
    }

    pub fn destination_port(&self) -> u16 {
        self.destination_port
    }

    /// Decode every named field of one record.
    pub fn decode_named(&self, record: &[u8]) -> Result<HashMap<String, FieldValue>, DecodeError> {
        self.layout.decode_named(record, &self.field_index)
    }

    /// Decode the timestamp field of one record.
    pub fn decode_timestamp(&self, record: &[u8]) -> Result<Timestamp, DecodeError> {
        let value = self.layout.decode_field(record, self.timestamp_index)?;
        Timestamp::from_field(value, TIMESTAMP_KEY)
    }
}
