use std::{fs, path::Path};

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::{Digest, Sha1};

use crate::{
    bencoding::{decoder, Bencode, Dict},
    error::ConfigurationError,
};

// rfc 3986 unreserved characters pass through untouched
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_').remove(b'~');

// the parts of a .torrent file the announce cycle needs
#[derive(Debug, Clone)]
pub struct Torrent {
    pub name: String,
    pub piece_length: u64,
    pub total_size: u64,
    // http(s) only, deduplicated, in first-seen order
    pub tracker_urls: Vec<String>,
    pub info_hash: [u8; 20],
}

impl Torrent {
    pub fn from_file(path: &Path) -> Result<Torrent, ConfigurationError> {
        let data = fs::read(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        build_torrent(&data)
    }

    // info hash as it goes into the announce query
    pub fn info_hash_urlencoded(&self) -> String {
        urlencode(&self.info_hash)
    }
}

// percent-encodes everything outside the unreserved set, with lowercase hex
pub fn urlencode(bytes: &[u8]) -> String {
    percent_encode(bytes, UNRESERVED)
        .map(|chunk| {
            if chunk.starts_with('%') {
                chunk.to_ascii_lowercase()
            } else {
                chunk.to_string()
            }
        })
        .collect()
}

// hashes the info dict exactly as it appears in the original file
pub fn get_sha1_info_hash(data: &[u8], info: &Dict) -> Result<[u8; 20], ConfigurationError> {
    let raw = data.get(info.span.clone()).ok_or(ConfigurationError::MissingField("info"))?;
    Ok(sha1_digest(raw))
}

pub(crate) fn sha1_digest(data: &[u8]) -> [u8; 20] {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&Sha1::digest(data));
    hash
}

// torrent building function that takes in the raw file bytes, decodes them
// and extracts the fields used for announcing
pub fn build_torrent(data: &[u8]) -> Result<Torrent, ConfigurationError> {
    let bencode = decoder::decode(data)?;
    let dict = match &bencode {
        Bencode::Dict(d) => d,
        _ => return Err(ConfigurationError::MissingField("root dictionary")),
    };

    let info = dict.get_dict(b"info").ok_or(ConfigurationError::MissingField("info"))?;

    let name = info.get_str(b"name").ok_or(ConfigurationError::MissingField("name"))?;

    let piece_length = info
        .get_int(b"piece length")
        .and_then(|i| u64::try_from(i).ok())
        .filter(|&len| len > 0)
        .ok_or(ConfigurationError::MissingField("piece length"))?;

    Ok(Torrent {
        name,
        piece_length,
        total_size: total_size(info)?,
        tracker_urls: tracker_urls(dict)?,
        info_hash: get_sha1_info_hash(data, info)?,
    })
}

// single-file torrents carry `length`, multi-file ones a `files` list
fn total_size(info: &Dict) -> Result<u64, ConfigurationError> {
    if let Some(length) = info.get_int(b"length") {
        return u64::try_from(length).map_err(|_| ConfigurationError::MissingField("length"));
    }

    let files = info.get_list(b"files").ok_or(ConfigurationError::MissingField("length"))?;
    files.iter().try_fold(0u64, |total, file| {
        let length = match file {
            Bencode::Dict(f) => f.get_int(b"length").and_then(|l| u64::try_from(l).ok()),
            _ => None,
        };
        length
            .and_then(|l| total.checked_add(l))
            .ok_or(ConfigurationError::MissingField("files.length"))
    })
}

fn tracker_urls(dict: &Dict) -> Result<Vec<String>, ConfigurationError> {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(main) = dict.get_str(b"announce") {
        candidates.push(main);
    }

    // announce-list is a list of tiers, each a list of urls
    for tier in dict.get_list(b"announce-list").unwrap_or_default() {
        if let Bencode::List(urls) = tier {
            for url in urls {
                if let Bencode::Bytes(b) = url {
                    candidates.push(String::from_utf8_lossy(b).into_owned());
                }
            }
        }
    }

    let mut urls: Vec<String> = Vec::new();
    for url in candidates {
        if is_http(&url) && !urls.contains(&url) {
            urls.push(url);
        }
    }

    if urls.is_empty() {
        return Err(ConfigurationError::NoHttpTracker);
    }
    Ok(urls)
}

fn is_http(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
