//! Paced replay of recorded streams.
//!
//! - [`ReplayWorker`] replays one `.bin` file to one UDP destination
//! - [`ReplayCoordinator`] runs one worker per stream and cancels them all
//!
//! Worker lifecycle:
//!
//! ```text
//! Init ──▶ Primed ──▶ Running ◀──▶ Resetting
//!   │         │          │
//!   │         │          ├──▶ Done    (end of file / cancelled)
//!   └─────────┴──────────┴──▶ Failed  (missing, empty, undecodable)
//! ```

use std::path::PathBuf;
use streamer_core::{DecodeError, StreamId};
use thiserror::Error;

pub mod coordinator;
pub mod worker;

pub use coordinator::{ReplayCoordinator, ReplaySummary, WorkerOutcome};
pub use worker::{ReplayWorker, WorkerOptions};

/// Per-stream replay failure. None of these affect other streams.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("File {} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("File {} is empty", .0.display())]
    EmptyFile(PathBuf),
    #[error("Cannot decode record at offset {offset} (data: {data:02X?}): {source}")]
    Decode {
        offset: u64,
        data: Vec<u8>,
        #[source]
        source: DecodeError,
    },
    #[error("I/O operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Primed,
    Running,
    Resetting,
    Done,
    Failed,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Init => write!(f, "init"),
            WorkerState::Primed => write!(f, "primed"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Resetting => write!(f, "resetting"),
            WorkerState::Done => write!(f, "done"),
            WorkerState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a worker that did not fail stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    EndOfFile,
    Cancelled,
}

/// Summary of a finished replay
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub stream_id: StreamId,
    /// Datagrams handed to the socket without error
    pub records_sent: u64,
    /// Datagrams the socket refused
    pub send_errors: u64,
    /// Number of times the pacing epoch was restarted
    pub epoch_resets: u32,
    pub end: EndReason,
}
