//! Core data types: prefixes, chunks, and line rendering
//!
//! A [`Prefix`] (country code + area code) identifies one space of
//! [`SUBSCRIBER_SPACE`] numbers. A [`Chunk`] is a half-open slice of that
//! space handed to a worker as one unit of work.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Number of subscriber numbers per prefix (0000000-9999999)
pub const SUBSCRIBER_SPACE: u64 = 10_000_000;

/// Width of the zero-padded subscriber suffix
pub const SUFFIX_DIGITS: usize = 7;

static COUNTRY_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("Invalid country code regex"));

static AREA_CODE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,5}$").expect("Invalid area code regex"));

/// A (country code, area code) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Prefix {
    /// Country code digits (e.g. "1")
    pub country_code: String,

    /// Area code digits (e.g. "212")
    pub area_code: String,
}

impl Prefix {
    /// Create a validated prefix
    pub fn new(country_code: &str, area_code: &str) -> Result<Self, ConfigError> {
        let country_code = country_code.trim();
        let area_code = area_code.trim();

        if !COUNTRY_CODE_REGEX.is_match(country_code) || country_code.bytes().all(|b| b == b'0') {
            return Err(ConfigError::InvalidCountryCode {
                code: country_code.to_string(),
            });
        }

        if !AREA_CODE_REGEX.is_match(area_code) {
            return Err(ConfigError::InvalidAreaCode {
                code: area_code.to_string(),
            });
        }

        Ok(Self {
            country_code: country_code.to_string(),
            area_code: area_code.to_string(),
        })
    }

    /// Parse the `COUNTRY:AREA` form used by `--prefix`
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let (cc, ac) = value
            .split_once([':', '-'])
            .ok_or_else(|| ConfigError::InvalidPrefix {
                value: value.to_string(),
            })?;
        Self::new(cc, ac)
    }

    /// The digits that lead every number in this space, with the optional marker
    pub fn dial_string(&self, format: NumberFormat) -> String {
        match format.marker() {
            Some(m) => format!("{}{}{}", m, self.country_code, self.area_code),
            None => format!("{}{}", self.country_code, self.area_code),
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} {}", self.country_code, self.area_code)
    }
}

/// Line formatting policy
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum NumberFormat {
    /// Digits only: 12125551234
    #[default]
    Plain,
    /// Leading plus marker: +12125551234
    Plus,
}

impl NumberFormat {
    /// Leading marker character, if any
    pub fn marker(self) -> Option<char> {
        match self {
            NumberFormat::Plain => None,
            NumberFormat::Plus => Some('+'),
        }
    }
}

/// A contiguous, half-open range `[start, end)` of one prefix's space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of the prefix in the run's prefix list
    pub prefix_index: usize,

    /// The prefix being expanded
    pub prefix: Arc<Prefix>,

    /// First subscriber number (inclusive)
    pub start: u64,

    /// Last subscriber number (exclusive)
    pub end: u64,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(prefix_index: usize, prefix: Arc<Prefix>, start: u64, end: u64) -> Self {
        debug_assert!(start < end && end <= SUBSCRIBER_SPACE);
        Self {
            prefix_index,
            prefix,
            start,
            end,
        }
    }

    /// Number of lines this chunk produces
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Check if the chunk covers no numbers
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} [{}, {})",
            self.prefix.country_code, self.prefix.area_code, self.start, self.end
        )
    }
}

/// Reusable line buffer for one prefix
///
/// Holds `<marker><cc><ac>0000000\n` and rewrites only the suffix digits
/// for each number.
pub struct LineTemplate {
    line: Vec<u8>,
    suffix_at: usize,
}

impl LineTemplate {
    /// Build the template for a prefix and format
    pub fn new(prefix: &Prefix, format: NumberFormat) -> Self {
        let mut line = Vec::with_capacity(24);
        if let Some(m) = format.marker() {
            line.push(m as u8);
        }
        line.extend_from_slice(prefix.country_code.as_bytes());
        line.extend_from_slice(prefix.area_code.as_bytes());
        let suffix_at = line.len();
        line.extend_from_slice(b"0000000\n");

        Self { line, suffix_at }
    }

    /// Bytes per rendered line, newline included
    pub fn line_len(&self) -> usize {
        self.line.len()
    }

    /// Append the line for subscriber number `n` to `out`
    pub fn render_into(&mut self, n: u64, out: &mut Vec<u8>) {
        debug_assert!(n < SUBSCRIBER_SPACE);
        let mut rest = n;
        for pos in (self.suffix_at..self.suffix_at + SUFFIX_DIGITS).rev() {
            self.line[pos] = b'0' + (rest % 10) as u8;
            rest /= 10;
        }
        out.extend_from_slice(&self.line);
    }
}

/// Render every number of a chunk into one newline-terminated buffer
pub fn render_chunk(chunk: &Chunk, format: NumberFormat) -> Vec<u8> {
    let mut template = LineTemplate::new(&chunk.prefix, format);
    let mut out = Vec::with_capacity(chunk.len() as usize * template.line_len());
    for n in chunk.start..chunk.end {
        template.render_into(n, &mut out);
    }
    out
}
