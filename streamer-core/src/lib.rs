//! # Streamer Core
//!
//! Platform-independent logic for replaying recorded sensor logs.
//!
//! This crate contains pure parsing and pacing logic with **zero I/O
//! dependencies**: no files, no sockets, no async runtime. The server crate
//! owns all of that and calls into here for every record it reads.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  streamer-core (no tokio, no sockets)                    │
//! │  ├── layout      (format string -> fixed record layout)  │
//! │  ├── descriptor  (per-stream layout, keys, port)         │
//! │  ├── timestamp   (exact integer / finite float stamps)   │
//! │  ├── pacing      (epochs, due times, reset detection)    │
//! │  └── settings    (settings.json data model)              │
//! └──────────────────────────────────────────────────────────┘
//!                          ▲
//!              ┌───────────┴───────────┐
//!              │  streamer-server      │
//!              │  (files, UDP, tokio)  │
//!              └───────────────────────┘
//! ```
//!
//! ## Example: decoding a timestamp
//!
//! ```rust
//! use streamer_core::{RecordLayout, StreamDescriptor, Timestamp};
//!
//! let layout = RecordLayout::parse("<Qf").unwrap();
//! let keys = vec!["timestamp".to_string(), "pressure".to_string()];
//! let stream = StreamDescriptor::new("baro".into(), layout, &keys, 9002).unwrap();
//!
//! let mut record = 1_500_000u64.to_le_bytes().to_vec();
//! record.extend_from_slice(&1013.25f32.to_le_bytes());
//! assert_eq!(stream.decode_timestamp(&record), Ok(Timestamp::Int(1_500_000)));
//! ```

pub mod descriptor;
pub mod error;
pub mod layout;
pub mod pacing;
pub mod settings;
pub mod timestamp;

pub use descriptor::{StreamDescriptor, StreamId, TIMESTAMP_KEY};
pub use error::{DecodeError, DescriptorError, LayoutError};
pub use layout::{ByteOrder, Field, FieldKind, FieldValue, RecordLayout};
pub use pacing::{Advance, Epoch, ReplayCursor, TIMESCALE};
pub use settings::{DatastreamEntry, DatastreamSettings, Settings};
pub use timestamp::Timestamp;
