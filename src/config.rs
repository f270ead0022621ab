use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    // first retry delay, doubled after every failed attempt
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
    // used when a tracker answers with a non-positive interval
    pub default_interval: Duration,
    // upper bound for the whole stop announce
    pub shutdown_timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(900),
            request_timeout: Duration::from_secs(10),
            default_interval: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub num_want: u32,
    pub tick: Duration,
    pub history_capacity: usize,
    pub tracker: TrackerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            num_want: 200,
            tick: Duration::from_secs(1),
            history_capacity: 10,
            tracker: TrackerConfig::default(),
        }
    }
}
