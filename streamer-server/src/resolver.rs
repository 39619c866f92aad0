//! Stream discovery.
//!
//! A recording directory looks like this:
//!
//! ```text
//! <base>/settings.json
//! <base>/<device>/<id>.bin
//! ```
//!
//! `settings.json` maps every device to its datastreams (see
//! [`streamer_core::settings`]). Resolving produces one [`ResolvedStream`] per
//! datastream whose descriptor could be built. Whether the `.bin` file exists
//! is left to the replay worker, so one missing file does not hide the others.

use log::{debug, info, warn};
use miette::Diagnostic;
use std::fs;
use std::path::{Path, PathBuf};
use streamer_core::{Settings, StreamDescriptor, StreamId};
use thiserror::Error;

/// Name of the settings file inside the base directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Extension of recorded stream files
pub const DATAFILE_EXTENSION: &str = "bin";

#[derive(Error, Diagnostic, Debug)]
pub enum ResolveError {
    #[error("Cannot read {}", path.display())]
    #[diagnostic(
        code(streamer::settings::read),
        help("pass the directory that contains settings.json")
    )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse {}", path.display())]
    #[diagnostic(code(streamer::settings::parse))]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where to look for recordings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub base_path: PathBuf,
}

impl ResolverConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_path.join(SETTINGS_FILE)
    }

    /// `<base>/<device>/<id>.bin`
    pub fn datafile_path(&self, device: &str, id: &StreamId) -> PathBuf {
        let mut path = self.base_path.join(device);
        path.push(format!("{}.{}", id, DATAFILE_EXTENSION));
        path
    }
}

/// A stream ready to be replayed
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStream {
    pub path: PathBuf,
    pub descriptor: StreamDescriptor,
}

/// Read `settings.json` and build a descriptor for every datastream.
///
/// Only an unreadable settings file, or one that is not a JSON object, is an
/// error. Datastreams with missing or out-of-range members, a bad layout or
/// no timestamp key are logged and skipped.
pub fn resolve_streams(config: &ResolverConfig) -> Result<Vec<ResolvedStream>, ResolveError> {
    let settings_path = config.settings_path();
    let settings = load_settings(&settings_path)?;

    let mut streams = Vec::new();
    for entry in settings.datastreams() {
        let (device, name) = (entry.device, entry.name);
        let datastream = match entry.settings {
            Ok(datastream) => datastream,
            Err(e) => {
                warn!("Skipping datastream {}/{}: {}", device, name, e);
                continue;
            }
        };
        match StreamDescriptor::from_settings(&datastream) {
            Ok(descriptor) => {
                let path = config.datafile_path(device, descriptor.id());
                debug!(
                    "Datastream {}/{}: {} -> port {}",
                    device,
                    name,
                    descriptor.layout(),
                    descriptor.destination_port()
                );
                streams.push(ResolvedStream { path, descriptor });
            }
            Err(e) => {
                warn!("Skipping datastream {}/{}: {}", device, name, e);
            }
        }
    }

    info!(
        "Found {} datastreams in {}",
        streams.len(),
        settings_path.display()
    );
    Ok(streams)
}

fn load_settings(path: &Path) -> Result<Settings, ResolveError> {
    let json = fs::read_to_string(path).map_err(|source| ResolveError::Read {
        path: path.to_owned(),
        source,
    })?;
    Settings::from_json(&json).map_err(|source| ResolveError::Parse {
        path: path.to_owned(),
        source,
    })
}
