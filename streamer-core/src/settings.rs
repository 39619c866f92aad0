//! Data model of the `settings.json` file that sits next to a recording.
//!
//! ```json
//! {
//!   "flight_computer": {
//!     "imu": { "id": "imu", "fstring": "<Q6f", "keys": ["timestamp", "ax", ...], "port": 9001 }
//!   }
//! }
//! ```
//!
//! Devices and their datastreams are kept sorted by key so the replay order
//! is stable between runs.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::descriptor::StreamId;

/// One datastream entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatastreamSettings {
    /// Stream id, also the base name of the `.bin` file
    pub id: StreamId,
    /// Record layout string, see [`crate::layout`]
    pub fstring: String,
    /// Field names in layout order
    pub keys: Vec<String>,
    /// Destination UDP port
    pub port: u16,
}

/// Device key -> datastream name -> datastream.
///
/// Only the outer object is checked when loading. Each device and each
/// datastream is decoded on its own by [`Settings::datastreams`], so one bad
/// entry does not hide the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    pub devices: BTreeMap<String, Value>,
}

/// A datastream as found in the file, decoded or not
#[derive(Debug)]
pub struct DatastreamEntry<'a> {
    pub device: &'a str,
    /// Empty when the device itself is not an object
    pub name: &'a str,
    pub settings: serde_json::Result<DatastreamSettings>,
}

impl Settings {
    /// Fails only if `json` is not a JSON object.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Every datastream in key order, each decoded separately
    pub fn datastreams(&self) -> Vec<DatastreamEntry<'_>> {
        let mut entries = Vec::new();
        for (device, streams) in &self.devices {
            match streams {
                Value::Object(streams) => {
                    for (name, value) in streams {
                        entries.push(DatastreamEntry {
                            device,
                            name,
                            settings: DatastreamSettings::deserialize(value),
                        });
                    }
                }
                other => entries.push(DatastreamEntry {
                    device,
                    name: "",
                    settings: Err(serde_json::Error::custom(format!(
                        "expected an object of datastreams, found {}",
                        other
                    ))),
                }),
            }
        }
        entries
    }
}
