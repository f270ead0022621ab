use std::path::PathBuf;

use thiserror::Error;

use crate::bencoding::DecodeError;

// problems that stop the engine from ever being built
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("couldn't read torrent file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("torrent file is not valid bencode: {0}")]
    Decode(#[from] DecodeError),
    #[error("torrent metadata has a missing or malformed `{0}` field")]
    MissingField(&'static str),
    #[error("no http(s) tracker url found in torrent")]
    NoHttpTracker,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("couldn't build the http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("the system random source is unavailable")]
    RandomSource,
}

// failure of a single announce (possibly after retries)
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker refused the announce: {0}")]
    Protocol(String),
    #[error("malformed tracker response: {0}")]
    Malformed(String),
    #[error("no tracker reachable: {0}")]
    Transport(String),
    #[error("announce timed out")]
    Timeout,
    #[error("announce cancelled by shutdown")]
    Cancelled,
}

impl TrackerError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TrackerError::Protocol(_) | TrackerError::Malformed(_) | TrackerError::Transport(_)
        )
    }
}

#[derive(Debug, Error)]
#[error("final announce failed: {0}")]
pub struct ShutdownError(#[from] pub TrackerError);
