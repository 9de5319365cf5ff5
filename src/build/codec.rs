//! Share-token codec for builds.
//!
//! Three token generations exist. New builds are always written as V3; V1
//! and V2 are only read, so links shared before the points system keep
//! working.
//!
//! ```text
//! V3  "3" + entries, each entry:
//!       varint((delta << 1) | has_extra)  [varint(points - 2) if has_extra]
//!     varint = 5 data bits per char, LSB chunk first, 0x20 = more follows,
//!     chars drawn from A-Z a-z 0-9 - _
//! V2  base64url("v2|" + "idx" | "idx:points" joined by ',')
//! V1  base64url(bitset), bit i set = catalog index i holds 1 point
//! ```
//!
//! Indices are catalog indices, so a token is only meaningful against the
//! catalog it was written with.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::build::state::Allocation;
use crate::catalog::Catalog;
use crate::error::Result;
use crate::util::{get_param, parse_query};

/// Version written into the `v` query parameter alongside `build`.
pub const ENCODER_VERSION: u32 = 3;

const VARINT_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: u64 = 0x1F;
const CONTINUATION: usize = 0x20;

const V3_MARKER: char = '3';
const V2_PREFIX: &[u8] = b"v2|";

/// URL-safe base64, padding optional, lenient trailing bits (legacy links
/// were produced by `btoa` with characters swapped and padding stripped).
const LEGACY_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// A share token split by format generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Empty,
    /// Decoded bitset bytes.
    V1(Vec<u8>),
    /// Pair list after the `v2|` prefix.
    V2(String),
    /// Varint stream after the `3` marker.
    V3(&'a str),
}

impl<'a> Token<'a> {
    /// Classify a token. Only the legacy base64 step can fail.
    pub fn parse(token: &'a str) -> Result<Token<'a>> {
        if token.is_empty() {
            return Ok(Token::Empty);
        }
        if let Some(body) = token.strip_prefix(V3_MARKER) {
            return Ok(Token::V3(body));
        }
        let bytes = LEGACY_BASE64.decode(token)?;
        match bytes.strip_prefix(V2_PREFIX) {
            Some(pairs) => Ok(Token::V2(String::from_utf8_lossy(pairs).into_owned())),
            None => Ok(Token::V1(bytes)),
        }
    }

    /// Format generation, 0 for the empty token.
    pub fn version(&self) -> u32 {
        match self {
            Token::Empty => 0,
            Token::V1(_) => 1,
            Token::V2(_) => 2,
            Token::V3(_) => 3,
        }
    }

    /// Resolve indices against `catalog`. Best effort: stops at the first
    /// unreadable V3 character and skips entries outside the catalog.
    pub fn decode(&self, catalog: &Catalog) -> Allocation {
        match self {
            Token::Empty => Allocation::new(),
            Token::V1(bits) => decode_v1(bits, catalog),
            Token::V2(pairs) => decode_v2(pairs, catalog),
            Token::V3(body) => decode_v3(body, catalog),
        }
    }
}

/// Encode an allocation as a V3 token; empty or unmappable maps give `""`.
pub fn encode(allocation: &Allocation, catalog: &Catalog) -> String {
    let mut entries: Vec<(usize, u32)> = allocation
        .iter()
        .filter(|&(_, points)| points > 0)
        .filter_map(|(id, points)| catalog.index_of(id).map(|index| (index, points)))
        .collect();
    if entries.is_empty() {
        return String::new();
    }
    entries.sort_unstable_by_key(|&(index, _)| index);

    let mut out = String::with_capacity(1 + entries.len() * 2);
    out.push(V3_MARKER);
    let mut last = 0usize;
    for (index, points) in entries {
        let delta = (index - last) as u64;
        last = index;
        if points == 1 {
            push_varint(&mut out, delta << 1);
        } else {
            push_varint(&mut out, (delta << 1) | 1);
            push_varint(&mut out, u64::from(points - 2));
        }
    }
    out
}

/// Decode any token generation. Malformed input yields an empty (or
/// partial) allocation, never an error.
pub fn decode(token: &str, catalog: &Catalog) -> Allocation {
    match Token::parse(token) {
        Ok(parsed) => parsed.decode(catalog),
        Err(e) => {
            tracing::warn!("Discarding unreadable build token: {}", e);
            Allocation::new()
        }
    }
}

/// Decode the `build` parameter of a page URL; no parameter → empty.
pub fn decode_page_url(page_url: &str, catalog: &Catalog) -> Allocation {
    let query = page_url
        .split('#')
        .next()
        .and_then(|u| u.split_once('?'))
        .map_or("", |(_, q)| q);
    let params = parse_query(query);
    match get_param(&params, "build") {
        Some(token) => decode(token, catalog),
        None => Allocation::new(),
    }
}

/// Merge a token into `page_url`: `v` and `build` are replaced together, or
/// both removed when the token is empty. Other parameters and any fragment
/// are kept in place.
pub fn share_url(page_url: &str, token: &str) -> String {
    let (without_fragment, fragment) = match page_url.split_once('#') {
        Some((url, frag)) => (url, Some(frag)),
        None => (page_url, None),
    };
    let (base, query) = without_fragment
        .split_once('?')
        .unwrap_or((without_fragment, ""));

    let mut pairs: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            key != "v" && key != "build"
        })
        .map(str::to_string)
        .collect();
    if !token.is_empty() {
        pairs.push(format!("v={}", ENCODER_VERSION));
        pairs.push(format!("build={}", token));
    }

    let mut url = String::with_capacity(page_url.len() + token.len() + 12);
    url.push_str(base);
    if !pairs.is_empty() {
        url.push('?');
        url.push_str(&pairs.join("&"));
    }
    if let Some(frag) = fragment {
        url.push('#');
        url.push_str(frag);
    }
    url
}

fn push_varint(out: &mut String, mut value: u64) {
    loop {
        let mut chunk = (value & CHUNK_MASK) as usize;
        value >>= CHUNK_BITS;
        if value > 0 {
            chunk |= CONTINUATION;
        }
        out.push(VARINT_ALPHABET[chunk] as char);
        if value == 0 {
            break;
        }
    }
}

fn alphabet_index(c: u8) -> Option<usize> {
    let digit = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'-' => 62,
        b'_' => 63,
        _ => return None,
    };
    Some(digit as usize)
}

/// Read one varint. Returns the value and chars consumed, or `None` if not
/// even one char could be read. A stream cut mid-varint yields what was read.
fn read_varint(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut consumed = 0usize;
    for &c in bytes {
        let Some(digit) = alphabet_index(c) else {
            break;
        };
        if shift >= u64::BITS {
            return None;
        }
        value |= ((digit as u64) & CHUNK_MASK) << shift;
        shift += CHUNK_BITS;
        consumed += 1;
        if digit & CONTINUATION == 0 {
            break;
        }
    }
    (consumed > 0).then_some((value, consumed))
}

fn decode_v3(body: &str, catalog: &Catalog) -> Allocation {
    let bytes = body.as_bytes();
    let mut allocation = Allocation::new();
    let mut pos = 0usize;
    let mut index = 0usize;

    while pos < bytes.len() {
        let Some((flagged, used)) = read_varint(&bytes[pos..]) else {
            break;
        };
        pos += used;
        let delta = usize::try_from(flagged >> 1).unwrap_or(usize::MAX);
        index = index.saturating_add(delta);

        let points = if flagged & 1 == 1 {
            let Some((extra, used)) = read_varint(&bytes[pos..]) else {
                break;
            };
            pos += used;
            u32::try_from(extra.saturating_add(2)).unwrap_or(u32::MAX)
        } else {
            1
        };
        place(&mut allocation, catalog, index, points);
    }
    allocation
}

fn decode_v2(pairs: &str, catalog: &Catalog) -> Allocation {
    let mut allocation = Allocation::new();
    for pair in pairs.split(',') {
        let mut parts = pair.split(':');
        let Some(Ok(index)) = parts.next().map(|s| s.trim().parse::<usize>()) else {
            continue;
        };
        let points = match parts.next() {
            None => 1,
            Some(s) => match s.trim().parse::<u32>() {
                Ok(p) => p,
                Err(_) => continue,
            },
        };
        place(&mut allocation, catalog, index, points);
    }
    allocation
}

fn decode_v1(bits: &[u8], catalog: &Catalog) -> Allocation {
    let mut allocation = Allocation::new();
    for (byte_index, byte) in bits.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                place(&mut allocation, catalog, byte_index * 8 + bit, 1);
            }
        }
    }
    allocation
}

/// Record `points` at catalog `index`, clamped to the node's max. Zero
/// counts and indices outside the catalog are dropped.
fn place(allocation: &mut Allocation, catalog: &Catalog, index: usize, points: u32) {
    if points == 0 {
        return;
    }
    match catalog.node_at(index) {
        Some(node) => allocation.set(&node.id, points.min(node.max_points())),
        None => tracing::debug!("Build token index {} outside catalog", index),
    }
}
