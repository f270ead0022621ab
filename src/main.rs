use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use log::LevelFilter;

use ratio_emu::{
    config::EngineConfig,
    emulation::Emulation,
    engine::Engine,
    input::Input,
    logging::{level_from_flags, setup_logging},
};

#[derive(Parser, Debug)]
#[command(version, about = "Reports simulated torrent progress to http trackers")]
struct Args {
    /// Path to the .torrent file
    #[arg(short = 't', long = "torrent")]
    torrent: PathBuf,

    /// Initially downloaded amount, in bytes
    #[arg(short = 'd', long = "downloaded")]
    downloaded: u64,

    /// Download speed, in bytes per second
    #[arg(long = "download-speed")]
    download_speed: u64,

    /// Initially uploaded amount, in bytes
    #[arg(short = 'u', long = "uploaded")]
    uploaded: u64,

    /// Upload speed, in bytes per second
    #[arg(long = "upload-speed")]
    upload_speed: u64,

    #[arg(short = 'p', long, default_value_t = 8999)]
    port: u16,

    /// Peers to ask the tracker for
    #[arg(long = "numwant")]
    num_want: Option<u32>,

    /// Log announce requests and tracker responses
    #[arg(long)]
    debug: bool,

    /// off, error, warn, info, debug or trace
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = match args.log_level.as_deref().map(str::parse::<LevelFilter>).transpose() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("error: invalid log level: {}", e);
            return ExitCode::FAILURE;
        }
    };
    setup_logging(level_from_flags(log_level, args.debug));

    let input = Input {
        torrent_path: args.torrent,
        initial_downloaded: args.downloaded,
        download_speed: args.download_speed,
        initial_uploaded: args.uploaded,
        upload_speed: args.upload_speed,
        port: args.port,
        num_want: args.num_want,
        debug: args.debug,
    };

    let engine = Emulation::qbittorrent()
        .and_then(|emulation| Engine::new(input, emulation, EngineConfig::default()));
    let engine = match engine {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    engine.run_until_signal().await;
    ExitCode::SUCCESS
}
