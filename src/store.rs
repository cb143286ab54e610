//! Flat-text record store.
//!
//! Each record is five labelled lines followed by a 40-dash delimiter line:
//!
//! ```text
//! 1. Player: somebody
//!    SteamID: 76561198000000001
//!    Created: 31.12.2024 21:30:00
//!    Expires: Navsegda
//!    Reason: читы
//! ----------------------------------------
//! ```
//!
//! Reading is best-effort: every block parses to either a record or a
//! [`MalformedRecord`] and the bad ones are dropped.
use std::fs;
use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::PrimitiveDateTime;
use tracing::debug;

use crate::error::{Error, MalformedRecord, Result};
use crate::types::PersistedRecord;

pub const DELIMITER: &str = "----------------------------------------";

/// Token written in place of an expiry date for permanent punishments.
pub const PERMANENT: &str = "Navsegda";

pub const STORE_FILE_NAME: &str = "output.txt";

const TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[day].[month].[year] [hour]:[minute]:[second]");

pub fn format_timestamp(at: PrimitiveDateTime) -> String {
    // The description only uses components a PrimitiveDateTime always has.
    at.format(TIMESTAMP).unwrap_or_default()
}

pub fn parse_timestamp(s: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(s.trim(), TIMESTAMP).ok()
}

/// Render records in store format. Indices are renumbered from 1.
pub fn serialize(records: &[PersistedRecord]) -> String {
    let mut out = String::new();
    for (i, r) in records.iter().enumerate() {
        let expires = r
            .expires
            .map(format_timestamp)
            .unwrap_or_else(|| PERMANENT.to_string());
        out.push_str(&format!("{}. Player: {}\n", i + 1, single_line(&r.name)));
        out.push_str(&format!("   SteamID: {}\n", single_line(&r.steamid)));
        out.push_str(&format!("   Created: {}\n", format_timestamp(r.created)));
        out.push_str(&format!("   Expires: {expires}\n"));
        out.push_str(&format!("   Reason: {}\n", single_line(&r.reason)));
        out.push_str(DELIMITER);
        out.push('\n');
    }
    out
}

/// Split store text into raw blocks, each keeping its trailing delimiter
/// line. Only a line holding nothing but the delimiter ends a block.
/// Concatenating the blocks reproduces the input exactly.
pub fn split_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        pos += line.len();
        if line.trim() == DELIMITER {
            blocks.push(&text[start..pos]);
            start = pos;
        }
    }
    if start < text.len() {
        blocks.push(&text[start..]);
    }
    blocks
}

/// Parse one raw block (with or without its delimiter).
///
/// Only the indentation before a label and the single space after it are
/// stripped, so names and reasons come back exactly as they were written.
pub fn parse_block(block: &str) -> Result<PersistedRecord, MalformedRecord> {
    let mut lines: Vec<&str> = block
        .lines()
        .map(str::trim_start)
        .skip_while(|l| l.is_empty())
        .collect();
    while lines
        .last()
        .is_some_and(|l| l.is_empty() || l.trim_end() == DELIMITER)
    {
        lines.pop();
    }
    if lines.len() < 5 {
        return Err(MalformedRecord::TooShort(lines.len()));
    }

    let (index, name) = lines[0]
        .split_once(". Player:")
        .ok_or(MalformedRecord::MissingPrefix {
            line: 1,
            prefix: "Player:",
        })?;
    let name = value(name);
    let steamid = labelled(lines[1], 2, "SteamID:")?.trim();
    let created_raw = labelled(lines[2], 3, "Created:")?.trim();
    let expires_raw = labelled(lines[3], 4, "Expires:")?.trim();
    let reason = labelled(lines[4], 5, "Reason:")?;

    let created = parse_timestamp(created_raw).ok_or_else(|| MalformedRecord::BadTimestamp {
        line: 3,
        value: created_raw.to_string(),
    })?;
    let expires = if expires_raw.eq_ignore_ascii_case(PERMANENT) {
        None
    } else {
        Some(
            parse_timestamp(expires_raw).ok_or_else(|| MalformedRecord::BadTimestamp {
                line: 4,
                value: expires_raw.to_string(),
            })?,
        )
    };

    Ok(PersistedRecord {
        index: index.trim().parse().unwrap_or(0),
        name: name.to_string(),
        steamid: steamid.to_string(),
        created,
        expires,
        reason: reason.to_string(),
    })
}

/// Parse every well-formed block, dropping the rest.
pub fn deserialize(text: &str) -> Vec<PersistedRecord> {
    let mut out = Vec::new();
    for (i, block) in split_blocks(text).into_iter().enumerate() {
        if block.trim().is_empty() || block.trim() == DELIMITER {
            continue;
        }
        match parse_block(block) {
            Ok(record) => out.push(record),
            Err(e) => debug!(block = i + 1, "dropping store block: {e}"),
        }
    }
    out
}

/// Steamid of a raw block, when it carries one on its second line.
pub fn block_steamid(block: &str) -> Option<&str> {
    let body = block.trim();
    let mut lines = body.lines().map(str::trim);
    lines.next()?;
    lines.next()?.strip_prefix("SteamID:").map(str::trim)
}

fn labelled<'a>(line: &'a str, line_no: usize, prefix: &'static str) -> Result<&'a str, MalformedRecord> {
    line.strip_prefix(prefix)
        .map(value)
        .ok_or(MalformedRecord::MissingPrefix {
            line: line_no,
            prefix,
        })
}

/// Text after a label, minus the one separating space.
fn value(rest: &str) -> &str {
    rest.strip_prefix(' ').unwrap_or(rest)
}

fn single_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

/// Legacy locations probed for an existing store, in order.
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(STORE_FILE_NAME)];
    if let Some(dir) = exe_dir() {
        paths.push(dir.join(STORE_FILE_NAME));
    }
    paths
}

/// Canonical store location next to the executable.
pub fn default_store_path() -> PathBuf {
    exe_dir()
        .map(|dir| dir.join(STORE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(STORE_FILE_NAME))
}

/// First candidate that exists, otherwise `default`.
pub fn resolve_store_path(candidates: &[PathBuf], default: PathBuf) -> PathBuf {
    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .unwrap_or(default)
}

/// Resolve the store with the built-in candidates and default.
pub fn locate() -> PathBuf {
    resolve_store_path(&candidate_paths(), default_store_path())
}

pub fn read_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(|source| Error::Store {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace the store contents. Writes a sibling temp file and renames it
/// over the target so an interrupted write never leaves a truncated store.
pub fn write_text(path: impl AsRef<Path>, text: &str) -> Result<()> {
    let path = path.as_ref();
    let store_err = |source: std::io::Error| Error::Store {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, text).map_err(store_err)?;
    fs::rename(&tmp, path).map_err(store_err)
}

pub fn load(path: impl AsRef<Path>) -> Result<Vec<PersistedRecord>> {
    Ok(deserialize(&read_text(path)?))
}

pub fn save(path: impl AsRef<Path>, records: &[PersistedRecord]) -> Result<()> {
    write_text(path, &serialize(records))
}

fn exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(steamid: &str, expires: Option<PrimitiveDateTime>) -> PersistedRecord {
        PersistedRecord {
            index: 1,
            name: "Player One".into(),
            steamid: steamid.into(),
            created: datetime!(2024-12-31 21:30:00),
            expires,
            reason: "читы (aim)".into(),
        }
    }

    #[test]
    fn serialize_layout() {
        let text = serialize(&[record("76561198000000001", None)]);
        assert_eq!(
            text,
            "1. Player: Player One\n   SteamID: 76561198000000001\n   Created: 31.12.2024 21:30:00\n   Expires: Navsegda\n   Reason: читы (aim)\n----------------------------------------\n"
        );
    }

    #[test]
    fn blocks_concatenate_to_input() {
        let text = serialize(&[
            record("76561198000000001", None),
            record("76561198000000002", Some(datetime!(2025-01-07 00:00:00))),
        ]);
        let blocks = split_blocks(&text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks.concat(), text);
        assert_eq!(block_steamid(blocks[1]), Some("76561198000000002"));
    }

    #[test]
    fn short_block_is_too_short() {
        let err = parse_block("1. Player: x\n   SteamID: 1\n").unwrap_err();
        assert_eq!(err, MalformedRecord::TooShort(2));
    }

    #[test]
    fn missing_prefix_is_reported() {
        let block = "1. Player: x\n   Steam: 1\n   Created: 01.01.2025 00:00:00\n   Expires: Navsegda\n   Reason: r\n";
        assert_eq!(
            parse_block(block).unwrap_err(),
            MalformedRecord::MissingPrefix {
                line: 2,
                prefix: "SteamID:"
            }
        );
    }

    #[test]
    fn permanent_token_is_case_insensitive() {
        let block = "3. Player: x\nSteamID: 1\nCreated: 01.01.2025 00:00:00\nExpires: NAVSEGDA\nReason: r";
        let rec = parse_block(block).unwrap();
        assert_eq!(rec.expires, None);
        assert_eq!(rec.index, 3);
    }

    #[test]
    fn newlines_in_fields_are_flattened() {
        let mut r = record("76561198000000001", None);
        r.reason = "line one\nline two".into();
        let back = deserialize(&serialize(&[r]));
        assert_eq!(back[0].reason, "line one line two");
    }
}
