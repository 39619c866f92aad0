//! # Streamer Server
//!
//! Replays recorded binary sensor logs over UDP at their original cadence.
//!
//! Every datastream listed in `<base>/settings.json` is replayed by its own
//! tokio task. The task reads fixed-size records from
//! `<base>/<device>/<id>.bin`, waits until each record's timestamp comes due,
//! and sends the raw bytes as one datagram to the stream's port.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     streamer-server                      │
//! │  ┌───────────────┐      ┌─────────────────────────────┐  │
//! │  │ resolver      │ ───▶ │ ReplayCoordinator           │  │
//! │  │ settings.json │      │ (tokio-graceful-shutdown)   │  │
//! │  └───────────────┘      └──────┬──────────┬───────────┘  │
//! │                                ▼          ▼              │
//! │                   ┌──────────────┐ ┌──────────────┐      │
//! │                   │ ReplayWorker │ │ ReplayWorker │ …    │
//! │                   │ file → UDP   │ │ file → UDP   │      │
//! │                   └──────────────┘ └──────────────┘      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Streams are independent: a missing, empty or corrupt file stops only its
//! own worker. Layout parsing, timestamps and pacing arithmetic live in
//! [`streamer_core`].
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `BASE_PATH` - directory holding `settings.json`
//! - `--host` - where to send datagrams (default: localhost)
//! - `--no-prompt` - do not cancel on Enter
//! - `-v` / `-q` - more or less logging

use clap::Parser;
use std::path::PathBuf;

pub mod network;
pub mod replay;
pub mod resolver;

use replay::WorkerOptions;
use resolver::ResolverConfig;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Directory holding settings.json and one sub-directory per device
    pub base_path: PathBuf,

    /// Host that receives the datagrams
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Do not wait for Enter on stdin to cancel streaming
    #[arg(long, default_value_t = false)]
    pub no_prompt: bool,

    /// Replay the first record of every file instead of skipping it
    #[arg(long, default_value_t = false)]
    pub keep_first_record: bool,

    /// Seconds to wait for streams to stop after a shutdown request
    #[arg(long, default_value_t = 5)]
    pub shutdown_timeout: u64,
}

impl Cli {
    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig::new(self.base_path.clone())
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            host: self.host.clone(),
            skip_first_record: !self.keep_first_record,
        }
    }
}
