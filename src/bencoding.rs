use std::{collections::BTreeMap, ops::Range};

use thiserror::Error;

const LIST_INDICATOR: u8 = b'l';
const INT_INDICATOR: u8 = b'i';
const DICT_INDICATOR: u8 = b'd';
const END_INDICATOR: u8 = b'e';
const LENGTH_SEPARATOR: u8 = b':';
const BYTES_INDICATOR: std::ops::RangeInclusive<u8> = b'0'..=b'9';

// torrent files and tracker replies never nest anywhere near this deep
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum Bencode {
    Int(i64),
    List(Vec<Bencode>),
    Bytes(Vec<u8>),
    Dict(Dict)
}

// a decoded dictionary. `span` is the half-open byte range the dictionary
// occupied in the buffer it was decoded from, `d` through the closing `e`.
// dictionaries built by hand have an empty span.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    pub entries: BTreeMap<Vec<u8>, Bencode>,
    pub span: Range<usize>,
}

impl Dict {
    pub fn new(entries: BTreeMap<Vec<u8>, Bencode>) -> Dict {
        Dict { entries, span: 0..0 }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Bencode> {
        self.entries.get(key)
    }

    pub fn get_int(&self, key: &[u8]) -> Option<i64> {
        match self.get(key) {
            Some(Bencode::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &[u8]) -> Option<&[u8]> {
        match self.get(key) {
            Some(Bencode::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    // byte strings the protocol treats as text. invalid utf-8 is replaced
    // rather than rejected, tracker messages are free-form.
    pub fn get_str(&self, key: &[u8]) -> Option<String> {
        self.get_bytes(key).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn get_dict(&self, key: &[u8]) -> Option<&Dict> {
        match self.get(key) {
            Some(Bencode::Dict(d)) => Some(d),
            _ => None,
        }
    }

    pub fn get_list(&self, key: &[u8]) -> Option<&[Bencode]> {
        match self.get(key) {
            Some(Bencode::List(l)) => Some(l.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input ended unexpectedly at byte {offset}")]
    UnexpectedEnd { offset: usize },
    #[error("unrecognised token {byte:#04x} at byte {offset}")]
    InvalidToken { offset: usize, byte: u8 },
    #[error("unparseable string length at byte {offset}")]
    InvalidLength { offset: usize },
    #[error("unparseable integer at byte {offset}")]
    InvalidInteger { offset: usize },
    #[error("dictionary key at byte {offset} is not a byte string")]
    InvalidKey { offset: usize },
    #[error("nesting too deep at byte {offset}")]
    TooDeep { offset: usize },
}

pub mod encoder {
    use super::Bencode;

    // canonical encoding: dictionary keys come out in sorted byte order
    pub fn encode(data: &Bencode) -> Vec<u8> {
        match data {
            Bencode::Int(i) => format!("i{}e", i).into_bytes(),
            Bencode::Bytes(b) => [b.len().to_string().into_bytes(), vec![b':'], b.clone()].concat(),
            Bencode::List(items) => {
                let mut v = vec![b'l'];
                for item in items {
                    v.extend(encode(item))
                }
                v.push(b'e');
                v
            }
            Bencode::Dict(dict) => {
                let mut v = vec![b'd'];
                for (key, value) in &dict.entries {
                    v.extend(encode(&Bencode::Bytes(key.clone())));
                    v.extend(encode(value));
                }
                v.push(b'e');
                v
            }
        }
    }
}

pub mod decoder {
    use super::{
        Bencode, DecodeError, Dict, BYTES_INDICATOR, DICT_INDICATOR, END_INDICATOR, INT_INDICATOR,
        LENGTH_SEPARATOR, LIST_INDICATOR, MAX_DEPTH,
    };
    use std::collections::BTreeMap;

    // decodes the first value in `input`. anything after it is ignored,
    // some trackers pad their replies with a newline.
    pub fn decode(input: &[u8]) -> Result<Bencode, DecodeError> {
        let mut parser = Parser { input, pos: 0, depth: 0 };
        parser.value()
    }

    struct Parser<'a> {
        input: &'a [u8],
        pos: usize,
        depth: usize,
    }

    impl<'a> Parser<'a> {
        fn peek(&self) -> Result<u8, DecodeError> {
            self.input
                .get(self.pos)
                .copied()
                .ok_or(DecodeError::UnexpectedEnd { offset: self.pos })
        }

        fn value(&mut self) -> Result<Bencode, DecodeError> {
            match self.peek()? {
                INT_INDICATOR => self.int(),
                LIST_INDICATOR => self.nested(Self::list),
                DICT_INDICATOR => self.nested(Self::dict),
                b if BYTES_INDICATOR.contains(&b) => self.bytes().map(Bencode::Bytes),
                byte => Err(DecodeError::InvalidToken { offset: self.pos, byte }),
            }
        }

        fn nested(
            &mut self,
            parse: fn(&mut Self) -> Result<Bencode, DecodeError>,
        ) -> Result<Bencode, DecodeError> {
            if self.depth >= MAX_DEPTH {
                return Err(DecodeError::TooDeep { offset: self.pos });
            }
            self.depth += 1;
            let value = parse(self);
            self.depth -= 1;
            value
        }

        // scans forward to `terminator` and returns the ascii digits before it
        fn digits_until(&mut self, terminator: u8) -> Result<&'a str, DecodeError> {
            let start = self.pos;
            let input = self.input;
            let rest = &input[start..];
            let len = rest
                .iter()
                .position(|&b| b == terminator)
                .ok_or(DecodeError::UnexpectedEnd { offset: self.input.len() })?;
            self.pos = start + len + 1;
            std::str::from_utf8(&rest[..len])
                .map_err(|_| DecodeError::InvalidInteger { offset: start })
        }

        fn int(&mut self) -> Result<Bencode, DecodeError> {
            self.pos += 1;
            let start = self.pos;
            let text = self.digits_until(END_INDICATOR)?;
            let unsigned = text.strip_prefix('-').unwrap_or(text);
            if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DecodeError::InvalidInteger { offset: start });
            }
            let number = text
                .parse::<i64>()
                .map_err(|_| DecodeError::InvalidInteger { offset: start })?;
            Ok(Bencode::Int(number))
        }

        fn bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
            let start = self.pos;
            let text = self.digits_until(LENGTH_SEPARATOR)?;
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(DecodeError::InvalidLength { offset: start });
            }
            let length = text
                .parse::<usize>()
                .map_err(|_| DecodeError::InvalidLength { offset: start })?;

            let end = self
                .pos
                .checked_add(length)
                .filter(|&end| end <= self.input.len())
                .ok_or(DecodeError::UnexpectedEnd { offset: self.input.len() })?;

            let bytes = self.input[self.pos..end].to_vec();
            self.pos = end;
            Ok(bytes)
        }

        fn list(&mut self) -> Result<Bencode, DecodeError> {
            self.pos += 1;
            let mut items = Vec::new();

            while self.peek()? != END_INDICATOR {
                items.push(self.value()?);
            }
            self.pos += 1;

            Ok(Bencode::List(items))
        }

        fn dict(&mut self) -> Result<Bencode, DecodeError> {
            let start = self.pos;
            self.pos += 1;
            let mut entries: BTreeMap<Vec<u8>, Bencode> = BTreeMap::new();

            loop {
                let b = self.peek()?;
                if b == END_INDICATOR {
                    break;
                }
                if !BYTES_INDICATOR.contains(&b) {
                    return Err(DecodeError::InvalidKey { offset: self.pos });
                }
                let key = self.bytes()?;
                let value = self.value()?;
                entries.insert(key, value);
            }
            self.pos += 1;

            Ok(Bencode::Dict(Dict { entries, span: start..self.pos }))
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::{decoder::decode, encoder::encode, Bencode, Dict};
    use proptest::prelude::*;
    use sha1::{Digest, Sha1};

    fn arb_bencode() -> impl Strategy<Value = Bencode> {
        let leaf = prop_oneof![
            any::<i64>().prop_map(Bencode::Int),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Bencode::Bytes),
        ];
        leaf.prop_recursive(4, 64, 8, |inner| {
            let key = proptest::collection::vec(any::<u8>(), 0..8);
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..8).prop_map(Bencode::List),
                proptest::collection::btree_map(key, inner, 0..8)
                    .prop_map(|entries| Bencode::Dict(Dict::new(entries))),
            ]
        })
    }

    fn collect_dicts<'a>(value: &'a Bencode, out: &mut Vec<&'a Dict>) {
        match value {
            Bencode::Dict(dict) => {
                out.push(dict);
                for child in dict.entries.values() {
                    collect_dicts(child, out);
                }
            }
            Bencode::List(items) => {
                for child in items {
                    collect_dicts(child, out);
                }
            }
            _ => {}
        }
    }

    proptest! {
        #[test]
        fn reencoding_is_byte_identical(value in arb_bencode()) {
            let bytes = encode(&value);
            let decoded = decode(&bytes).unwrap();
            prop_assert_eq!(encode(&decoded), bytes);
        }

        #[test]
        fn every_dict_span_matches_its_encoding(value in arb_bencode()) {
            let bytes = encode(&value);
            let decoded = decode(&bytes).unwrap();

            let mut dicts = Vec::new();
            collect_dicts(&decoded, &mut dicts);
            for dict in dicts {
                let from_span = &bytes[dict.span.clone()];
                let reencoded = encode(&Bencode::Dict(dict.clone()));
                prop_assert_eq!(from_span, reencoded.as_slice());
                prop_assert_eq!(Sha1::digest(from_span), Sha1::digest(&reencoded));
            }
        }
    }
}
