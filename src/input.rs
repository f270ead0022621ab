use std::path::PathBuf;

use crate::{error::ConfigurationError, torrent::Torrent};

// what the user asked for, already converted to bytes and bytes per second
#[derive(Debug, Clone)]
pub struct Input {
    pub torrent_path: PathBuf,
    pub initial_downloaded: u64,
    pub download_speed: u64,
    pub initial_uploaded: u64,
    pub upload_speed: u64,
    pub port: u16,
    pub num_want: Option<u32>,
    pub debug: bool,
}

impl Input {
    // checks the parts that depend on the torrent itself
    pub fn validate(&self, torrent: &Torrent) -> Result<(), ConfigurationError> {
        if self.initial_downloaded > torrent.total_size {
            return Err(ConfigurationError::InvalidInput(format!(
                "initial downloaded ({} bytes) can not be higher than the torrent size ({} bytes)",
                self.initial_downloaded, torrent.total_size
            )));
        }
        if self.port == 0 {
            return Err(ConfigurationError::InvalidInput(
                "port number must be between 1 and 65535".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent() -> Torrent {
        Torrent {
            name: "x".to_string(),
            piece_length: 16_384,
            total_size: 1_048_576,
            tracker_urls: vec!["http://t.example/announce".to_string()],
            info_hash: [0; 20],
        }
    }

    fn input() -> Input {
        Input {
            torrent_path: PathBuf::from("x.torrent"),
            initial_downloaded: 0,
            download_speed: 0,
            initial_uploaded: 0,
            upload_speed: 0,
            port: 8999,
            num_want: None,
            debug: false,
        }
    }

    #[test]
    fn accepts_sane_input() {
        let full = Input { initial_downloaded: 1_048_576, ..input() };
        assert!(full.validate(&torrent()).is_ok());
    }

    #[test]
    fn rejects_more_downloaded_than_the_torrent_holds() {
        let over = Input { initial_downloaded: 1_048_577, ..input() };
        assert!(matches!(over.validate(&torrent()), Err(ConfigurationError::InvalidInput(_))));
    }

    #[test]
    fn rejects_port_zero() {
        let bad = Input { port: 0, ..input() };
        assert!(matches!(bad.validate(&torrent()), Err(ConfigurationError::InvalidInput(_))));
    }
}
