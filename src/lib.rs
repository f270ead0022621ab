pub mod bencoding;
pub mod config;
pub mod emulation;
pub mod engine;
pub mod error;
pub mod history;
pub mod input;
pub mod logging;
pub mod shutdown;
pub mod state;
pub mod torrent;
pub mod tracker;
