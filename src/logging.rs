use std::sync::Once;

use log::{info, LevelFilter};

static INIT: Once = Once::new();

pub fn setup_logging(level: LevelFilter) {
    if level == LevelFilter::Off {
        return;
    }

    INIT.call_once(|| {
        stdout_config(level);
    });
}

// `--log-level` wins, then `--debug`, then info
pub fn level_from_flags(log_level: Option<LevelFilter>, debug: bool) -> LevelFilter {
    match (log_level, debug) {
        (Some(level), _) => level,
        (None, true) => LevelFilter::Debug,
        (None, false) => LevelFilter::Info,
    }
}

fn stdout_config(level: LevelFilter) {
    if let Err(err) = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("%+"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        // reqwest and hyper are chatty at debug
        .level_for("hyper", LevelFilter::Warn)
        .level_for("hyper_util", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()
    {
        eprintln!("couldn't initialize logging: {}", err);
        return;
    }

    info!("logging initialized.");
}
