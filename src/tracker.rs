use std::{io::Read, time::Duration};

use flate2::read::GzDecoder;
use log::{debug, info, warn};
use reqwest::{header::HeaderMap, Client};

use crate::{
    bencoding::{decoder, Bencode, Dict},
    config::TrackerConfig,
    error::{ConfigurationError, TrackerError},
    shutdown::Shutdown,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// hooks for whoever displays announce progress. all default to no-ops.
pub trait AnnounceObserver: Send + Sync {
    fn request_sent(&self, _url: &str) {}
    fn response_received(&self, _body: &str) {}
    fn retry_scheduled(&self, _attempt: u32, _delay: Duration) {}
}

impl AnnounceObserver for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerResponse {
    // seconds, never zero
    pub interval: u64,
    pub min_interval: Option<u64>,
    pub seeders: u64,
    pub leechers: u64,
}

impl TrackerResponse {
    // decodes an (already decompressed) announce reply. a non-empty
    // `failure reason` makes the whole reply an error.
    pub fn parse(body: &[u8], default_interval: Duration) -> Result<TrackerResponse, TrackerError> {
        let bencode = decoder::decode(body).map_err(|e| TrackerError::Malformed(e.to_string()))?;

        let dict = match bencode {
            Bencode::Dict(d) => d,
            _ => {
                let detail = "top-level value is not a dictionary".to_string();
                return Err(TrackerError::Malformed(detail));
            }
        };

        if let Some(reason) = dict.get_str(b"failure reason") {
            if !reason.is_empty() {
                return Err(TrackerError::Protocol(reason));
            }
        }

        let interval = dict
            .get_int(b"interval")
            .filter(|&i| i > 0)
            .map(|i| i as u64)
            .unwrap_or_else(|| default_interval.as_secs().max(1));

        Ok(TrackerResponse {
            interval,
            min_interval: dict.get_int(b"min interval").and_then(|i| u64::try_from(i).ok()),
            seeders: count(&dict, b"complete"),
            leechers: count(&dict, b"incomplete"),
        })
    }

    // seconds until the next regular announce. a `min interval` above the
    // advertised interval wins.
    pub fn effective_interval(&self) -> u64 {
        match self.min_interval {
            Some(min) if min > self.interval => min,
            _ => self.interval,
        }
    }
}

// absent or negative counts read as zero
fn count(dict: &Dict, key: &[u8]) -> u64 {
    dict.get_int(key).and_then(|i| u64::try_from(i).ok()).unwrap_or(0)
}

// doubling delay between failed announce attempts
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Backoff {
        Backoff { next: initial.min(max), max }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.max);
        delay
    }
}

pub struct Tracker {
    // the first url is always tried first
    urls: Vec<String>,
    http_client: Client,
    config: TrackerConfig,
    retry_attempt: u32,
}

impl Tracker {
    pub fn new(urls: Vec<String>, config: TrackerConfig) -> Result<Tracker, ConfigurationError> {
        if urls.is_empty() {
            return Err(ConfigurationError::NoHttpTracker);
        }

        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ConfigurationError::HttpClient)?;

        Ok(Tracker {
            urls,
            http_client,
            config,
            retry_attempt: 0,
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    // announces `query` to the trackers. with `retry` set, failed attempts
    // are repeated with growing delays until one succeeds or `shutdown` fires.
    // without it, the first failed attempt is returned and `shutdown` is not
    // consulted.
    pub async fn announce(
        &mut self,
        query: &str,
        headers: &HeaderMap,
        retry: bool,
        observer: &dyn AnnounceObserver,
        shutdown: &mut Shutdown,
    ) -> Result<Option<TrackerResponse>, TrackerError> {
        if !retry {
            let response = self.try_announce(query, headers, observer).await?;
            self.retry_attempt = 0;
            return Ok(response);
        }

        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        loop {
            let attempt = tokio::select! {
                res = self.try_announce(query, headers, observer) => res,
                _ = shutdown.wait() => return Err(TrackerError::Cancelled),
            };

            match attempt {
                Ok(response) => {
                    self.retry_attempt = 0;
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = backoff.next_delay();
                    self.retry_attempt += 1;
                    warn!(
                        "announce attempt {} failed: {}; retrying in {}s",
                        self.retry_attempt,
                        e,
                        delay.as_secs()
                    );
                    observer.retry_scheduled(self.retry_attempt, delay);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait() => return Err(TrackerError::Cancelled),
                    }
                }
            }
        }
    }

    // one pass over every url, in order
    async fn try_announce(
        &mut self,
        query: &str,
        headers: &HeaderMap,
        observer: &dyn AnnounceObserver,
    ) -> Result<Option<TrackerResponse>, TrackerError> {
        let mut failures: Vec<String> = Vec::new();

        for idx in 0..self.urls.len() {
            let url = build_full_url(&self.urls[idx], query);
            observer.request_sent(&url);
            debug!("announce request: {}", url);

            let res = match self.http_client.get(&url).headers(headers.clone()).send().await {
                Ok(res) => res,
                Err(e) => {
                    debug!("tracker {} unreachable: {}", self.urls[idx], e);
                    failures.push(format!("{}: {}", self.urls[idx], e));
                    continue;
                }
            };

            if !res.status().is_success() {
                debug!("tracker {} answered {}", self.urls[idx], res.status());
                failures.push(format!("{}: http status {}", self.urls[idx], res.status()));
                continue;
            }

            let body = match res.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    failures.push(format!("{}: {}", self.urls[idx], e));
                    continue;
                }
            };

            if body.is_empty() {
                debug!("tracker {} sent an empty reply", self.urls[idx]);
                return Ok(None);
            }

            let body = decompress(&body)?;
            let text = String::from_utf8_lossy(&body);
            observer.response_received(&text);
            debug!("announce response: {}", text);

            let response = TrackerResponse::parse(&body, self.config.default_interval)?;

            if idx != 0 {
                info!("tracker {} answered, trying it first from now on", self.urls[idx]);
                self.urls.swap(0, idx);
            }
            return Ok(Some(response));
        }

        Err(TrackerError::Transport(failures.join("; ")))
    }
}

// appends the query to the base url, respecting a query string already there
pub fn build_full_url(base_url: &str, query: &str) -> String {
    if base_url.contains('?') {
        format!("{}&{}", base_url, query.trim_start_matches('&'))
    } else {
        format!("{}?{}", base_url, query.trim_start_matches('?'))
    }
}

// trackers may gzip their reply whatever the headers say, so sniff the body
pub fn decompress(body: &[u8]) -> Result<Vec<u8>, TrackerError> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Ok(body.to_vec());
    }

    let mut out = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut out)
        .map_err(|e| TrackerError::Malformed(format!("bad gzip body: {}", e)))?;
    Ok(out)
}
