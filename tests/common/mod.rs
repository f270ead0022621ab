#![allow(dead_code)]

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    task::JoinHandle,
};

use ratio_emu::{
    bencoding::{encoder::encode, Bencode, Dict},
    config::{EngineConfig, TrackerConfig},
};

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn ok(body: &[u8]) -> Reply {
        Reply { status: 200, body: body.to_vec() }
    }

    pub fn status(status: u16) -> Reply {
        Reply { status, body: b"nope".to_vec() }
    }
}

// a tiny http tracker. connection n gets reply n, the last reply repeats.
pub struct FakeTracker {
    pub url: String,
    heads: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeTracker {
    pub async fn start(replies: Vec<Reply>) -> FakeTracker {
        assert!(!replies.is_empty());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let heads = Arc::new(Mutex::new(Vec::new()));
        let seen = heads.clone();

        let handle = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }

                let reply = {
                    let mut seen = seen.lock();
                    seen.push(String::from_utf8_lossy(&buf).into_owned());
                    replies[(seen.len() - 1).min(replies.len() - 1)].clone()
                };

                let head = format!(
                    "HTTP/1.1 {} Fake\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    reply.status,
                    reply.body.len()
                );
                let _ = stream.write_all(head.as_bytes()).await;
                let _ = stream.write_all(&reply.body).await;
                let _ = stream.shutdown().await;
            }
        });

        FakeTracker { url: format!("http://{}/announce", addr), heads, handle }
    }

    // raw request heads, in arrival order
    pub fn heads(&self) -> Vec<String> {
        self.heads.lock().clone()
    }

    // request targets, e.g. `/announce?info_hash=...`
    pub fn targets(&self) -> Vec<String> {
        self.heads()
            .iter()
            .map(|head| head.split_whitespace().nth(1).unwrap_or_default().to_string())
            .collect()
    }

    pub fn hits(&self) -> usize {
        self.heads.lock().len()
    }
}

impl Drop for FakeTracker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn param(target: &str, key: &str) -> Option<String> {
    let query = target.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}

pub fn bytes(s: &str) -> Bencode {
    Bencode::Bytes(s.as_bytes().to_vec())
}

pub fn dict(pairs: Vec<(&str, Bencode)>) -> Bencode {
    let entries: BTreeMap<Vec<u8>, Bencode> =
        pairs.into_iter().map(|(k, v)| (k.as_bytes().to_vec(), v)).collect();
    Bencode::Dict(Dict::new(entries))
}

pub fn single_file_torrent(announce: &str, length: i64, piece_length: i64) -> Vec<u8> {
    let info = dict(vec![
        ("length", Bencode::Int(length)),
        ("name", bytes("fixture.iso")),
        ("piece length", Bencode::Int(piece_length)),
        ("pieces", Bencode::Bytes(vec![0; 20])),
    ]);
    encode(&dict(vec![("announce", bytes(announce)), ("info", info)]))
}

pub fn fast_tracker_config() -> TrackerConfig {
    TrackerConfig {
        initial_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
        request_timeout: Duration::from_secs(2),
        default_interval: Duration::from_secs(1800),
        shutdown_timeout: Duration::from_secs(2),
    }
}

pub fn fast_engine_config() -> EngineConfig {
    EngineConfig { tracker: fast_tracker_config(), ..EngineConfig::default() }
}

// polls `check` until it holds or five seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
