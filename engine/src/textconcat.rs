//! The TextConcat container: framing on write, record parsing on restore.
//!
//! Plain layout:
//!
//! ```text
//! Backup created on 2024-05-01T10:00:00.000000\n\n
//! --- docs/a.txt ---\n<content>\n\n
//! Error reading file /src/locked.txt: Permission denied\n\n
//! --- docs/b.txt ---\n<content>\n\n
//! ```
//!
//! Encrypted archives carry the same units (preamble, header, content, error),
//! each sealed separately and stored as one token per line.

use chrono::{DateTime, Local};

use crate::crypto::CryptoCodec;
use crate::error::{EngineError, Result};

pub const PREAMBLE_PREFIX: &str = "Backup created on ";
pub const SEPARATOR: &str = "\n\n";
pub const ERROR_PREFIX: &str = "Error reading file ";
const HEADER_OPEN: &str = "--- ";
const HEADER_CLOSE: &str = " ---";

/// One logical record recovered from a TextConcat archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// A stored file: archive-relative name and its text content
    File { name: String, content: String },
    /// A synthetic entry written when a source could not be read
    Error { message: String },
}

/// `"Backup created on <ISO-8601>\n\n"`.
pub fn preamble(timestamp: &DateTime<Local>) -> String {
    format!(
        "{}{}{}",
        PREAMBLE_PREFIX,
        timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
        SEPARATOR
    )
}

/// `"--- <name> ---\n"`.
pub fn header(archive_name: &str) -> String {
    format!("{}{}{}\n", HEADER_OPEN, archive_name, HEADER_CLOSE)
}

/// Content decoded as UTF-8 (invalid sequences replaced) plus the record separator.
pub fn content(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    text.push_str(SEPARATOR);
    text
}

/// `"Error reading file <path>: <reason>\n"` plus the blank separator line.
pub fn error_record(path: &str, reason: &str) -> String {
    format!("{}{}: {}\n\n", ERROR_PREFIX, path, reason)
}

fn parse_header(line: &str) -> Option<&str> {
    line.strip_prefix(HEADER_OPEN)?
        .strip_suffix(HEADER_CLOSE)
        .filter(|name| !name.is_empty())
}

/// True when `text` begins with a complete header or error line.
fn is_record_start(text: &str) -> bool {
    match text.split_once('\n') {
        Some((line, _)) => parse_header(line).is_some() || line.starts_with(ERROR_PREFIX),
        None => false,
    }
}

/// Offset of the separator that ends the current record's content, if another
/// record follows. Blank lines inside content do not count.
fn find_boundary(text: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = text[from..].find(SEPARATOR) {
        let at = from + offset;
        if is_record_start(&text[at + SEPARATOR.len()..]) {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

fn looks_like_token(line: &str) -> bool {
    line.len() >= 40
        && line
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Parse an unencrypted archive.
///
/// # Errors
/// Returns `Format` when a record does not start with a header or error line.
pub fn parse_plain(text: &str) -> Result<Vec<Record>> {
    let mut rest = text;
    if let Some(after) = rest.strip_prefix(PREAMBLE_PREFIX) {
        rest = match after.find(SEPARATOR) {
            Some(at) => &after[at + SEPARATOR.len()..],
            None => "",
        };
    }

    let mut records = Vec::new();
    while !rest.is_empty() {
        // Blank lines between records are tolerated.
        if let Some(stripped) = rest.strip_prefix('\n') {
            rest = stripped;
            continue;
        }

        let (line, after_line) = rest.split_once('\n').unwrap_or((rest, ""));
        if line.starts_with(ERROR_PREFIX) {
            records.push(Record::Error {
                message: line.to_string(),
            });
            rest = after_line;
            continue;
        }

        let name = match parse_header(line) {
            Some(name) => name,
            None if records.is_empty() && looks_like_token(line) => {
                return Err(EngineError::format(
                    "archive appears to be encrypted; an encryption key is required",
                ))
            }
            None => {
                return Err(EngineError::format(format!(
                    "expected an entry header, found {:?}",
                    truncate(line)
                )))
            }
        };

        let (body, next) = match find_boundary(after_line) {
            Some(at) => (&after_line[..at], &after_line[at + SEPARATOR.len()..]),
            None => (after_line.strip_suffix(SEPARATOR).unwrap_or(after_line), ""),
        };
        records.push(Record::File {
            name: name.to_string(),
            content: body.to_string(),
        });
        rest = next;
    }

    Ok(records)
}

/// Parse an encrypted archive: one token per line, decrypted unit by unit.
///
/// # Errors
/// `Decryption` if any unit fails authentication, `Format` if the decrypted
/// units do not follow header/content pairing.
pub fn parse_encrypted(text: &str, codec: &CryptoCodec) -> Result<Vec<Record>> {
    let mut units = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|token| {
            let plain = codec.decrypt_token(token)?;
            String::from_utf8(plain)
                .map_err(|_| EngineError::format("decrypted unit is not valid UTF-8"))
        })
        .peekable();

    if let Some(Ok(first)) = units.peek() {
        if first.starts_with(PREAMBLE_PREFIX) {
            units.next();
        }
    }

    let mut records = Vec::new();
    while let Some(unit) = units.next() {
        let unit = unit?;
        if unit.starts_with(ERROR_PREFIX) {
            records.push(Record::Error {
                message: unit.trim_end().to_string(),
            });
            continue;
        }

        let name = unit
            .strip_suffix('\n')
            .and_then(parse_header)
            .ok_or_else(|| {
                EngineError::format(format!(
                    "expected an entry header unit, found {:?}",
                    truncate(&unit)
                ))
            })?
            .to_string();

        let body = match units.next() {
            Some(body) => body?,
            None => {
                return Err(EngineError::format(format!(
                    "entry {} has no content unit",
                    name
                )))
            }
        };
        let content = match body.strip_suffix(SEPARATOR) {
            Some(stripped) => stripped.to_string(),
            None => body,
        };
        records.push(Record::File { name, content });
    }

    Ok(records)
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(60) {
        Some((at, _)) => &text[..at],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content: &str) -> Record {
        Record::File {
            name: name.to_string(),
            content: content.to_string(),
        }
    }

    fn build(entries: &[(&str, &str)]) -> String {
        let mut text = preamble(&Local::now());
        for (name, body) in entries {
            text.push_str(&header(name));
            text.push_str(&content(body.as_bytes()));
        }
        text
    }

    #[test]
    fn test_framing_strings() {
        assert_eq!(header("docs/a.txt"), "--- docs/a.txt ---\n");
        assert_eq!(content(b"hi"), "hi\n\n");
        assert_eq!(
            error_record("/x", "denied"),
            "Error reading file /x: denied\n\n"
        );
        assert!(preamble(&Local::now()).starts_with("Backup created on "));
        assert!(preamble(&Local::now()).ends_with("\n\n"));
    }

    #[test]
    fn test_content_replaces_invalid_utf8() {
        assert_eq!(content(&[b'o', b'k', 0xFF]), "ok\u{FFFD}\n\n");
    }

    #[test]
    fn test_parse_plain_simple() {
        let text = build(&[("a.txt", "alpha"), ("dir/b.txt", "beta")]);
        let records = parse_plain(&text).expect("Failed to parse");
        assert_eq!(records, vec![file("a.txt", "alpha"), file("dir/b.txt", "beta")]);
    }

    #[test]
    fn test_parse_plain_keeps_blank_lines_and_trailing_newlines() {
        let text = build(&[
            ("a.txt", "line one\n\nline three\n"),
            ("empty.txt", ""),
            ("b.txt", "\n\nleading blanks"),
            ("c.txt", "ends with blanks\n\n"),
        ]);
        let records = parse_plain(&text).expect("Failed to parse");
        assert_eq!(
            records,
            vec![
                file("a.txt", "line one\n\nline three\n"),
                file("empty.txt", ""),
                file("b.txt", "\n\nleading blanks"),
                file("c.txt", "ends with blanks\n\n"),
            ]
        );
    }

    #[test]
    fn test_parse_plain_error_records() {
        let mut text = build(&[("a.txt", "alpha")]);
        text.push_str(&error_record("/src/locked.txt", "Permission denied"));
        text.push_str(&header("b.txt"));
        text.push_str(&content(b"beta"));

        let records = parse_plain(&text).expect("Failed to parse");
        assert_eq!(
            records,
            vec![
                file("a.txt", "alpha"),
                Record::Error {
                    message: "Error reading file /src/locked.txt: Permission denied".to_string()
                },
                file("b.txt", "beta"),
            ]
        );
    }

    #[test]
    fn test_parse_plain_accepts_missing_final_separator() {
        let text = "Backup created on 2024-01-01T00:00:00\n\n--- a.txt ---\nalpha";
        let records = parse_plain(text).expect("Failed to parse");
        assert_eq!(records, vec![file("a.txt", "alpha")]);
    }

    #[test]
    fn test_parse_plain_preamble_only() {
        let records = parse_plain(&build(&[])).expect("Failed to parse");
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_plain_rejects_garbage() {
        let result = parse_plain("Backup created on now\n\nnot a header\nbody\n\n");
        assert!(matches!(result, Err(EngineError::Format { .. })));
    }

    #[test]
    fn test_parse_plain_detects_encrypted_input() {
        let codec = CryptoCodec::from_key_bytes(&[7u8; 32]).expect("Failed to build codec");
        let token = codec.encrypt_token(b"Backup created on now\n\n").expect("Failed to encrypt");
        let err = parse_plain(&token).expect_err("encrypted input must not parse");
        assert!(err.to_string().contains("encryption key"));
    }

    #[test]
    fn test_parse_encrypted_units() {
        let codec = CryptoCodec::from_key_bytes(&[7u8; 32]).expect("Failed to build codec");
        let mut text = String::new();
        for unit in [
            preamble(&Local::now()),
            header("a.txt"),
            content(b"alpha\n\n--- fake ---\nstill alpha"),
            error_record("/locked", "denied"),
            header("b.txt"),
            content(b""),
        ] {
            text.push_str(&codec.encrypt_token(unit.as_bytes()).expect("Failed to encrypt"));
        }

        let records = parse_encrypted(&text, &codec).expect("Failed to parse");
        assert_eq!(
            records,
            vec![
                file("a.txt", "alpha\n\n--- fake ---\nstill alpha"),
                Record::Error {
                    message: "Error reading file /locked: denied".to_string()
                },
                file("b.txt", ""),
            ]
        );
    }

    #[test]
    fn test_parse_encrypted_header_without_content() {
        let codec = CryptoCodec::from_key_bytes(&[7u8; 32]).expect("Failed to build codec");
        let text = codec.encrypt_token(header("a.txt").as_bytes()).expect("Failed to encrypt");
        let result = parse_encrypted(&text, &codec);
        assert!(matches!(result, Err(EngineError::Format { .. })));
    }
}
