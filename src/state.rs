use std::{fmt, time::Duration};

use parking_lot::Mutex;

use crate::{
    history::{AnnounceEntry, AnnounceHistory},
    tracker::AnnounceObserver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

// the `event` sent with the next announce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    Started,
    // a regular update carries an empty event
    Update,
    Stopped,
}

impl AnnounceEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnounceEvent::Started => "started",
            AnnounceEvent::Update => "",
            AnnounceEvent::Stopped => "stopped",
        }
    }
}

impl fmt::Display for AnnounceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// owned copy of the state, for displays
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub phase: Phase,
    pub event: AnnounceEvent,
    pub num_want: u32,
    pub interval: u64,
    pub countdown: u64,
    pub seeders: u64,
    pub leechers: u64,
    pub retry_attempt: u32,
    pub history: Vec<AnnounceEntry>,
    pub last_request: String,
    pub last_response: String,
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    event: AnnounceEvent,
    num_want: u32,
    interval: u64,
    countdown: u64,
    seeders: u64,
    leechers: u64,
    retry_attempt: u32,
    history: AnnounceHistory,
    last_request: String,
    last_response: String,
}

// state touched by more than one task. the countdown only changes through
// `set_interval`, `reset_countdown`, `tick` and a scheduled retry, all under
// the same lock.
#[derive(Debug)]
pub struct SharedState {
    inner: Mutex<Inner>,
}

impl SharedState {
    pub fn new(num_want: u32, history_capacity: usize) -> SharedState {
        SharedState {
            inner: Mutex::new(Inner {
                phase: Phase::Initializing,
                event: AnnounceEvent::Started,
                num_want,
                interval: 0,
                countdown: 0,
                seeders: 0,
                leechers: 0,
                retry_attempt: 0,
                history: AnnounceHistory::new(history_capacity),
                last_request: String::new(),
                last_response: String::new(),
            }),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot {
            phase: inner.phase,
            event: inner.event,
            num_want: inner.num_want,
            interval: inner.interval,
            countdown: inner.countdown,
            seeders: inner.seeders,
            leechers: inner.leechers,
            retry_attempt: inner.retry_attempt,
            history: inner.history.iter().copied().collect(),
            last_request: inner.last_request.clone(),
            last_response: inner.last_response.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    pub fn set_phase(&self, phase: Phase) {
        self.inner.lock().phase = phase;
    }

    pub fn event(&self) -> AnnounceEvent {
        self.inner.lock().event
    }

    // once the tracker has seen `started`, later announces are plain updates
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock();
        if inner.event == AnnounceEvent::Started {
            inner.event = AnnounceEvent::Update;
        }
    }

    pub fn num_want(&self) -> u32 {
        self.inner.lock().num_want
    }

    // flips to the stopped event and stops asking for peers
    pub fn begin_shutdown(&self) {
        let mut inner = self.inner.lock();
        inner.phase = Phase::ShuttingDown;
        inner.event = AnnounceEvent::Stopped;
        inner.num_want = 0;
    }

    pub fn interval(&self) -> u64 {
        self.inner.lock().interval
    }

    // a new announce interval also restarts the countdown
    pub fn set_interval(&self, seconds: u64) {
        let mut inner = self.inner.lock();
        inner.interval = seconds;
        inner.countdown = seconds;
    }

    pub fn reset_countdown(&self, seconds: u64) {
        self.inner.lock().countdown = seconds;
    }

    pub fn countdown(&self) -> u64 {
        self.inner.lock().countdown
    }

    // one second has passed
    pub fn tick(&self) {
        let mut inner = self.inner.lock();
        inner.countdown = inner.countdown.saturating_sub(1);
    }

    pub fn set_peers(&self, seeders: u64, leechers: u64) {
        let mut inner = self.inner.lock();
        inner.seeders = seeders;
        inner.leechers = leechers;
    }

    pub fn set_retry_attempt(&self, attempt: u32) {
        self.inner.lock().retry_attempt = attempt;
    }

    pub fn push_history(&self, entry: AnnounceEntry) {
        self.inner.lock().history.push(entry);
    }

    pub fn last_entry(&self) -> Option<AnnounceEntry> {
        self.inner.lock().history.last().copied()
    }
}

impl AnnounceObserver for SharedState {
    fn request_sent(&self, url: &str) {
        self.inner.lock().last_request = url.to_string();
    }

    fn response_received(&self, body: &str) {
        self.inner.lock().last_response = body.to_string();
    }

    fn retry_scheduled(&self, attempt: u32, delay: Duration) {
        let mut inner = self.inner.lock();
        inner.retry_attempt = attempt;
        inner.countdown = delay.as_secs();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn interval_change_resets_countdown() {
        let state = SharedState::new(200, 10);
        state.set_interval(1800);
        state.tick();
        state.tick();
        assert_eq!(state.countdown(), 1798);
        assert_eq!(state.interval(), 1800);

        state.set_interval(60);
        assert_eq!(state.countdown(), 60);
    }

    #[test]
    fn countdown_stops_at_zero() {
        let state = SharedState::new(200, 10);
        state.reset_countdown(1);
        state.tick();
        state.tick();
        assert_eq!(state.countdown(), 0);
    }

    #[test]
    fn retry_shows_backoff_in_countdown() {
        let state = SharedState::new(200, 10);
        state.set_interval(1800);
        state.retry_scheduled(3, Duration::from_secs(120));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.retry_attempt, 3);
        assert_eq!(snapshot.countdown, 120);
        assert_eq!(snapshot.interval, 1800);
    }

    #[test]
    fn event_moves_from_started_to_update_to_stopped() {
        let state = SharedState::new(200, 10);
        assert_eq!(state.event(), AnnounceEvent::Started);

        state.mark_started();
        assert_eq!(state.event(), AnnounceEvent::Update);
        assert_eq!(state.event().to_string(), "");

        state.begin_shutdown();
        assert_eq!(state.phase(), Phase::ShuttingDown);
        assert_eq!(state.event().to_string(), "stopped");
        assert_eq!(state.num_want(), 0);

        // a late success does not undo the stop
        state.mark_started();
        assert_eq!(state.event(), AnnounceEvent::Stopped);
    }

    #[test]
    fn records_diagnostics_and_history() {
        let state = SharedState::new(200, 2);
        state.request_sent("http://t.example/announce?x=1");
        state.response_received("d8:intervali60ee");
        for seq in 1..=3 {
            state.push_history(AnnounceEntry::new(seq, 0, 0, 100, 100));
        }

        let snapshot = state.snapshot();
        assert_eq!(snapshot.last_request, "http://t.example/announce?x=1");
        assert_eq!(snapshot.last_response, "d8:intervali60ee");
        assert_eq!(snapshot.history.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(state.last_entry().map(|e| e.sequence), Some(3));
    }
}
