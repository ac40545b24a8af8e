//! POTCAR record text format.
//!
//! # Responsibility
//! - Extract `title`, `functional`, `element` and `symbol` from one record.
//! - Locate record boundaries inside a concatenated multi-record file.
//!
//! # Invariants
//! - A single record carries exactly one `TITEL` assignment.
//! - A record ends at its terminator line (`End of Dataset`, or `END` with
//!   optional leading dots); concatenated files have no other separator.
//! - Blank lines after a terminator belong to the record they follow.
//! - Splitting never rewrites bytes: every segment is a verbatim sub-slice.

use crate::model::potcar::{PotcarAttributes, PotcarHash};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([A-Za-z][A-Za-z0-9_]*)\s*=\s*([^;\r\n]*)").expect("valid assignment regex")
});

const DATASET_TERMINATOR: &[u8] = b"End of Dataset";
const BARE_TERMINATOR: &[u8] = b"END";

/// Payload could not be read as one POTCAR record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// Payload has no bytes.
    Empty,
    /// Payload is not valid UTF-8 text.
    NotUtf8,
    /// No `TITEL` assignment found.
    MissingTitle,
    /// More than one `TITEL`; the payload is a concatenated file.
    MultipleTitles(usize),
    /// `TITEL` does not contain at least a prefix and a symbol.
    InvalidTitle(String),
    /// Bytes after the last terminator line are not whitespace.
    UnterminatedRecord { offset: usize },
}

impl Display for HeaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "payload is empty"),
            Self::NotUtf8 => write!(f, "payload is not valid UTF-8 text"),
            Self::MissingTitle => write!(f, "payload has no TITEL assignment"),
            Self::MultipleTitles(count) => write!(
                f,
                "payload has {count} TITEL assignments; concatenated files must be split first"
            ),
            Self::InvalidTitle(title) => write!(f, "cannot read symbol from TITEL `{title}`"),
            Self::UnterminatedRecord { offset } => {
                write!(f, "record starting at byte {offset} has no end-of-record line")
            }
        }
    }
}

impl Error for HeaderError {}

/// Metadata read from a record header, before hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHeader {
    pub title: String,
    pub functional: String,
    pub element: String,
    pub symbol: String,
}

impl ParsedHeader {
    pub fn into_attributes(self, hash: PotcarHash) -> PotcarAttributes {
        PotcarAttributes {
            hash,
            title: self.title,
            functional: self.functional,
            element: self.element,
            symbol: self.symbol,
        }
    }
}

/// Hashes `payload` and parses its header into the full attribute set.
pub fn parse_attributes(payload: &[u8]) -> Result<PotcarAttributes, HeaderError> {
    let header = parse_header(payload)?;
    Ok(header.into_attributes(PotcarHash::of(payload)))
}

/// Parses the identifying header fields of one record.
///
/// Rules:
/// - `title`: the single `TITEL` value, e.g. `PAW_PBE In_d 06Sep2000`.
/// - `symbol`: second token of the title.
/// - `functional`: from `LEXCH` when present, else from the title prefix.
/// - `element`: from `VRHFIN` (text before `:`) when present, else the
///   leading letters of the symbol.
pub fn parse_header(payload: &[u8]) -> Result<ParsedHeader, HeaderError> {
    if payload.is_empty() {
        return Err(HeaderError::Empty);
    }
    let text = std::str::from_utf8(payload).map_err(|_| HeaderError::NotUtf8)?;

    let mut titles = Vec::new();
    let mut lexch = None;
    let mut vrhfin = None;
    for caps in ASSIGNMENT_RE.captures_iter(text) {
        let value = caps[2].trim();
        match &caps[1] {
            "TITEL" => titles.push(value.to_string()),
            "LEXCH" if lexch.is_none() => lexch = Some(value.to_string()),
            "VRHFIN" if vrhfin.is_none() => vrhfin = Some(value.to_string()),
            _ => {}
        }
    }

    let title = match titles.len() {
        0 => return Err(HeaderError::MissingTitle),
        1 => titles.remove(0),
        count => return Err(HeaderError::MultipleTitles(count)),
    };

    let mut tokens = title.split_whitespace();
    let (prefix, symbol) = match (tokens.next(), tokens.next()) {
        (Some(prefix), Some(symbol)) => (prefix.to_string(), symbol.to_string()),
        _ => return Err(HeaderError::InvalidTitle(title)),
    };

    let functional = lexch
        .as_deref()
        .and_then(functional_from_lexch)
        .unwrap_or_else(|| functional_from_prefix(&prefix));

    let element = vrhfin
        .as_deref()
        .and_then(element_from_vrhfin)
        .unwrap_or_else(|| element_from_symbol(&symbol));
    if element.is_empty() {
        return Err(HeaderError::InvalidTitle(title));
    }

    Ok(ParsedHeader {
        title,
        functional,
        element,
        symbol,
    })
}

/// Splits a concatenated file into verbatim record segments.
///
/// Each segment runs through its terminator line and any whitespace-only
/// lines after it, so the segments concatenate back to `content`. Bytes
/// after the last terminator that are not whitespace form an unterminated
/// record and are rejected.
pub fn split_records(content: &[u8]) -> Result<Vec<&[u8]>, HeaderError> {
    let mut bounds: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    let mut pos = 0;

    while pos < content.len() {
        let line_end = content[pos..]
            .iter()
            .position(|&byte| byte == b'\n')
            .map_or(content.len(), |idx| pos + idx + 1);
        let line = &content[pos..line_end];
        if start == pos && line.iter().all(u8::is_ascii_whitespace) {
            if let Some(last) = bounds.last_mut() {
                last.1 = line_end;
                start = line_end;
            }
        } else if is_record_terminator(line) {
            bounds.push((start, line_end));
            start = line_end;
        }
        pos = line_end;
    }

    if !content[start..].iter().all(u8::is_ascii_whitespace) {
        return Err(HeaderError::UnterminatedRecord { offset: start });
    }

    Ok(bounds
        .into_iter()
        .map(|(from, to)| &content[from..to])
        .collect())
}

/// Returns whether `payload` reads back as exactly itself through
/// [`split_records`].
pub fn is_single_record(payload: &[u8]) -> bool {
    matches!(split_records(payload).as_deref(), Ok([segment]) if segment.len() == payload.len())
}

/// Returns whether one line (with or without its line break) ends a record.
///
/// `END of PSCTR-controll parameters` inside the header is not a terminator.
pub fn is_record_terminator(line: &[u8]) -> bool {
    let trimmed = line.trim_ascii();
    if trimmed.eq_ignore_ascii_case(DATASET_TERMINATOR) {
        return true;
    }
    let mut bare = trimmed;
    while let [b'.', rest @ ..] = bare {
        bare = rest;
    }
    bare == BARE_TERMINATOR
}

/// Returns whether another record can be appended after `payload` and still
/// be found by [`split_records`].
pub fn ends_with_line_break(payload: &[u8]) -> bool {
    payload.last() == Some(&b'\n')
}

fn functional_from_lexch(value: &str) -> Option<String> {
    let functional = match value.trim().to_ascii_uppercase().as_str() {
        "" => return None,
        "PE" => "PBE".to_string(),
        "91" => "PW91".to_string(),
        "RP" => "revPBE".to_string(),
        "PS" => "PBEsol".to_string(),
        "AM" => "AM05".to_string(),
        "CA" => "LDA".to_string(),
        other => other.to_string(),
    };
    Some(functional)
}

fn functional_from_prefix(prefix: &str) -> String {
    let upper = prefix.to_ascii_uppercase();
    match upper.as_str() {
        "PAW" | "PAW_LDA" => "LDA".to_string(),
        "PAW_PBE" | "PAW_GGA_PBE" => "PBE".to_string(),
        "PAW_GGA" => "PW91".to_string(),
        other => other.strip_prefix("PAW_").unwrap_or(other).to_string(),
    }
}

fn element_from_vrhfin(value: &str) -> Option<String> {
    let element = value.split(':').next().unwrap_or_default().trim();
    if element.is_empty() || !element.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some(element.to_string())
}

fn element_from_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect()
}
