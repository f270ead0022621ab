use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::ConfigurationError;

const QBITTORRENT_NAME: &str = "qBittorrent v4.0.3";
const QBITTORRENT_PEER_PREFIX: &str = "-qB4030-";
const QBITTORRENT_QUERY: &str = "info_hash={infohash}&peer_id={peerid}&port={port}\
    &uploaded={uploaded}&downloaded={downloaded}&left={left}&corrupt=0&key={key}&event={event}\
    &numwant={numwant}&compact=1&no_peer_id=1&supportcrypto=1&redundant=0";
const PEER_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

const UPLOAD_ALIGNMENT: u64 = 16 * 1024;

// final adjustment a client applies to the amounts it reports
pub trait Rounding: Send + Sync {
    fn round(
        &self,
        downloaded: u64,
        uploaded: u64,
        left: u64,
        piece_length: u64,
    ) -> (u64, u64, u64);
}

// downloaded as-is, uploaded down to 16 KiB, left down to a whole piece
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRounding;

impl Rounding for DefaultRounding {
    fn round(
        &self,
        downloaded: u64,
        uploaded: u64,
        left: u64,
        piece_length: u64,
    ) -> (u64, u64, u64) {
        let uploaded = uploaded - uploaded % UPLOAD_ALIGNMENT;
        let left = if piece_length == 0 { left } else { left - left % piece_length };
        (downloaded, uploaded, left)
    }
}

// everything that makes announces look like they come from one client
pub struct Emulation {
    pub name: String,
    pub peer_id: String,
    pub key: String,
    pub query: String,
    pub headers: HeaderMap,
    pub rounding: Box<dyn Rounding>,
}

impl Emulation {
    pub fn qbittorrent() -> Result<Emulation, ConfigurationError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("qBittorrent/4.0.3"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        Ok(Emulation {
            name: QBITTORRENT_NAME.to_string(),
            peer_id: calculate_peer_id(QBITTORRENT_PEER_PREFIX, &mut rand::rng()),
            key: generate_key()?,
            query: QBITTORRENT_QUERY.to_string(),
            headers,
            rounding: Box::new(DefaultRounding),
        })
    }

    pub fn render_query(&self, values: &QueryValues) -> String {
        render_query(&self.query, self, values)
    }
}

// per-announce values substituted into the query template
#[derive(Debug, Clone)]
pub struct QueryValues {
    pub info_hash: String,
    pub port: u16,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
    pub event: String,
    pub num_want: u32,
}

// single pass over the template, substituted text is never rescanned.
// unknown placeholders are copied through.
fn render_query(template: &str, emulation: &Emulation, values: &QueryValues) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };

        let placeholder = &tail[1..close];
        match placeholder {
            "infohash" => out.push_str(&values.info_hash),
            "port" => out.push_str(&values.port.to_string()),
            "peerid" => out.push_str(&emulation.peer_id),
            "uploaded" => out.push_str(&values.uploaded.to_string()),
            "downloaded" => out.push_str(&values.downloaded.to_string()),
            "left" => out.push_str(&values.left.to_string()),
            "key" => out.push_str(&emulation.key),
            "event" => out.push_str(&values.event),
            "numwant" => out.push_str(&values.num_want.to_string()),
            _ => out.push_str(&tail[..=close]),
        }
        rest = &tail[close + 1..];
    }

    out.push_str(rest);
    out
}

// client prefix followed by random url-safe characters, 20 bytes in total
pub fn calculate_peer_id(prefix: &str, rng: &mut impl Rng) -> String {
    let mut peer_id = String::from(prefix);
    while peer_id.len() < 20 {
        let idx = rng.random_range(0..PEER_ID_ALPHABET.len());
        peer_id.push(PEER_ID_ALPHABET[idx] as char);
    }
    peer_id
}

// four bytes from the os random source, as uppercase hex
fn generate_key() -> Result<String, ConfigurationError> {
    let mut bytes = [0u8; 4];
    SystemRandom::new().fill(&mut bytes).map_err(|_| ConfigurationError::RandomSource)?;
    Ok(hex::encode_upper(bytes))
}
