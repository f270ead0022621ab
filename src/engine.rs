use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::task::JoinHandle;

use crate::{
    config::EngineConfig,
    emulation::{Emulation, QueryValues},
    error::{ConfigurationError, ShutdownError, TrackerError},
    history::AnnounceEntry,
    input::Input,
    shutdown::{self, Shutdown},
    state::{AnnounceEvent, Phase, SharedState},
    torrent::Torrent,
    tracker::Tracker,
};

// byte counts of one announce, after rounding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
}

// the next total to report: last amount plus what `throughput` would have
// moved in `elapsed_secs`, plus 1 to 9 whole pieces so progress is never
// perfectly linear. a zero throughput holds the amount.
pub fn next_candidate(
    throughput: u64,
    last: u64,
    piece_length: u64,
    elapsed_secs: u64,
    ceiling: Option<u64>,
    rng: &mut impl Rng,
) -> u64 {
    if throughput == 0 {
        return last;
    }

    let jitter = piece_length.saturating_mul(rng.random_range(1..=9));
    let candidate = last
        .saturating_add(throughput.saturating_mul(elapsed_secs))
        .saturating_add(jitter);

    match ceiling {
        Some(ceiling) if candidate > ceiling => ceiling,
        _ => candidate,
    }
}

pub struct Engine {
    torrent: Torrent,
    info_hash: String,
    input: Input,
    emulation: Emulation,
    tracker: Tracker,
    config: EngineConfig,
    state: Arc<SharedState>,
    rng: StdRng,
    announce_count: u64,
    last_announce: Instant,
}

impl Engine {
    pub fn new(
        input: Input,
        emulation: Emulation,
        config: EngineConfig,
    ) -> Result<Engine, ConfigurationError> {
        let torrent = Torrent::from_file(&input.torrent_path)?;
        Engine::with_torrent(torrent, input, emulation, config)
    }

    pub fn with_torrent(
        torrent: Torrent,
        input: Input,
        emulation: Emulation,
        config: EngineConfig,
    ) -> Result<Engine, ConfigurationError> {
        input.validate(&torrent)?;

        let tracker = Tracker::new(torrent.tracker_urls.clone(), config.tracker.clone())?;
        let num_want = input.num_want.unwrap_or(config.num_want);
        let state = Arc::new(SharedState::new(num_want, config.history_capacity));

        Ok(Engine {
            info_hash: torrent.info_hash_urlencoded(),
            torrent,
            input,
            emulation,
            tracker,
            config,
            state,
            rng: StdRng::from_os_rng(),
            announce_count: 0,
            last_announce: Instant::now(),
        })
    }

    // handle for displays, stays valid after `run` returns
    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    pub fn torrent(&self) -> &Torrent {
        &self.torrent
    }

    pub fn emulation(&self) -> &Emulation {
        &self.emulation
    }

    // runs until ctrl-c or SIGTERM
    pub async fn run_until_signal(self) {
        let (trigger, shutdown) = shutdown::channel();
        let listener = tokio::spawn(shutdown::listen_for_signals(trigger));
        self.run(shutdown).await;
        listener.abort();
    }

    pub async fn run(mut self, mut shutdown: Shutdown) {
        info!(
            "emulating {} for {} ({} bytes, piece length {})",
            self.emulation.name,
            self.torrent.name,
            self.torrent.total_size,
            self.torrent.piece_length
        );

        let ticker = spawn_ticker(self.state.clone(), self.config.tick, shutdown.clone());

        let started = self.start(&mut shutdown).await;
        if started {
            self.state.set_phase(Phase::Running);
            self.announce_loop(&mut shutdown).await;
        } else if shutdown.is_triggered() {
            info!("stopped before the tracker accepted the first announce");
        }

        info!("shutting down");
        self.state.begin_shutdown();
        if started {
            match self.stop(&mut shutdown).await {
                Ok(()) => info!("stop announce sent"),
                Err(e) => warn!("{}", e),
            }
        }

        ticker.abort();
        self.state.set_phase(Phase::Stopped);
    }

    // first announce, from the amounts the user supplied
    async fn start(&mut self, shutdown: &mut Shutdown) -> bool {
        let downloaded = self.input.initial_downloaded;
        let amounts = Amounts {
            downloaded,
            uploaded: self.input.initial_uploaded,
            left: self.torrent.total_size.saturating_sub(downloaded),
        };

        match self.announce(amounts, true, shutdown).await {
            Ok(()) => true,
            Err(e) => {
                warn!("first announce abandoned: {}", e);
                false
            }
        }
    }

    async fn announce_loop(&mut self, shutdown: &mut Shutdown) {
        loop {
            let wait = Duration::from_secs(self.state.interval());
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = shutdown.wait() => return,
            }

            let amounts = self.next_amounts();
            match self.announce(amounts, true, shutdown).await {
                Ok(()) => {}
                Err(TrackerError::Cancelled) => return,
                Err(e) => warn!("announce failed: {}", e),
            }
        }
    }

    // best effort, bounded by the shutdown timeout and never retried
    async fn stop(&mut self, shutdown: &mut Shutdown) -> Result<(), ShutdownError> {
        let amounts = match self.state.last_entry() {
            Some(last) => Amounts {
                downloaded: last.downloaded,
                uploaded: last.uploaded,
                left: last.left,
            },
            None => return Ok(()),
        };

        let limit = self.config.tracker.shutdown_timeout;
        tokio::time::timeout(limit, self.announce(amounts, false, shutdown))
            .await
            .map_err(|_| TrackerError::Timeout)??;
        Ok(())
    }

    fn next_amounts(&mut self) -> Amounts {
        let total = self.torrent.total_size;
        let piece_length = self.torrent.piece_length;
        let (last_downloaded, last_uploaded) = match self.state.last_entry() {
            Some(last) => (last.downloaded, last.uploaded),
            None => (self.input.initial_downloaded, self.input.initial_uploaded),
        };
        let elapsed = self.last_announce.elapsed().as_secs();

        let downloaded = next_candidate(
            self.input.download_speed,
            last_downloaded,
            piece_length,
            elapsed,
            Some(total),
            &mut self.rng,
        );
        let uploaded = next_candidate(
            self.input.upload_speed,
            last_uploaded,
            piece_length,
            elapsed,
            None,
            &mut self.rng,
        );
        let left = total.saturating_sub(downloaded);

        let (downloaded, uploaded, left) =
            self.emulation.rounding.round(downloaded, uploaded, left, piece_length);
        Amounts { downloaded, uploaded, left }
    }

    // sends one announce with the current event and, once the tracker
    // accepted it, records it
    async fn announce(
        &mut self,
        amounts: Amounts,
        retry: bool,
        shutdown: &mut Shutdown,
    ) -> Result<(), TrackerError> {
        let event = self.state.event();
        let query = self.emulation.render_query(&QueryValues {
            info_hash: self.info_hash.clone(),
            port: self.input.port,
            uploaded: amounts.uploaded,
            downloaded: amounts.downloaded,
            left: amounts.left,
            event: event.as_str().to_string(),
            num_want: self.state.num_want(),
        });

        let response = self
            .tracker
            .announce(&query, &self.emulation.headers, retry, self.state.as_ref(), shutdown)
            .await?;

        self.state.set_retry_attempt(0);
        self.state.mark_started();
        match response {
            Some(response) => {
                self.state.set_peers(response.seeders, response.leechers);
                let interval = response.effective_interval();
                if interval != self.state.interval() {
                    info!("announce interval is now {}s", interval);
                }
                self.state.set_interval(interval);
            }
            // nothing to learn from an empty reply, keep the old interval
            None => match self.state.interval() {
                0 => {
                    let default = self.config.tracker.default_interval.as_secs().max(1);
                    self.state.set_interval(default);
                }
                interval => self.state.reset_countdown(interval),
            },
        }

        self.announce_count += 1;
        self.last_announce = Instant::now();
        let entry = AnnounceEntry::new(
            self.announce_count,
            amounts.downloaded,
            amounts.uploaded,
            amounts.left,
            self.torrent.total_size,
        );
        self.state.push_history(entry);

        info!(
            "#{} downloaded: {} ({:.2}%) | left: {} | uploaded: {} | event: {}",
            entry.sequence,
            entry.downloaded,
            entry.percent_downloaded,
            entry.left,
            entry.uploaded,
            if event == AnnounceEvent::Update { "none" } else { event.as_str() }
        );
        if self.input.debug {
            let snapshot = self.state.snapshot();
            debug!("last request: {}", snapshot.last_request);
            debug!("last response: {}", snapshot.last_response);
        }
        Ok(())
    }
}

// decrements the visible countdown once per period until shutdown
fn spawn_ticker(
    state: Arc<SharedState>,
    period: Duration,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => state.tick(),
            }
        }
    })
}
