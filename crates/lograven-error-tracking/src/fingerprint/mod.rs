//! Fingerprinting engine
//!
//! A fingerprint is the SHA-256 (hex) of
//! `error_type || normalized_message || frame_signature`, where the frame
//! signature is the top N parsed stack frames rendered as
//! `function@file:line`. Without a usable stack trace the key falls back to
//! type and message only, which merges more eagerly.

mod stack;

pub use stack::{basename, parse_stack_trace, StackFrame};

use lograven_config::{FingerprintConfig, LineMode};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

const MAX_NORMALIZED_LEN: usize = 200;

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("valid uuid regex")
});
static HEX_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(0x[0-9a-f]+|[0-9a-f]{8,})\b").expect("valid hex regex"));
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[\w./\-?=&%:#]+").expect("valid url regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[\w._%+-]+@[\w.-]+\.[a-z]{2,}\b").expect("valid email regex")
});
static QUOTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""[^"\n]*"|'[^'\n]*'|`[^`\n]*`"#).expect("valid quoted string regex")
});
/// Absolute or `./`, `../` relative path starting a word; `and/or` is not a path
static UNIX_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\s)((?:\.{1,2})?/[\w.\-]+(?:/[\w.\-]+)*)").expect("valid unix path regex")
});
static WINDOWS_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-z]:\\(?:[\w.\-]+\\)*[\w.\-]+").expect("valid windows path regex")
});
static IP_V4: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("valid ip regex")
});
static TABLE_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([a-z_]+)_\d+\b").expect("valid table ref regex"));
static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid number regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Derives grouping keys. Pure: no I/O, same input always yields the same key.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    frame_depth: usize,
    line_mode: LineMode,
    line_bucket: u32,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(&FingerprintConfig::default())
    }
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            frame_depth: config.frame_depth.max(1),
            line_mode: config.line_mode,
            line_bucket: config.line_bucket.max(1),
        }
    }

    pub fn fingerprint(&self, error_type: &str, message: &str, stack_trace: Option<&str>) -> String {
        let mut components = vec![
            normalize_error_type(error_type),
            normalize_message(message),
        ];
        if let Some(signature) = stack_trace.and_then(|raw| self.stack_signature(raw)) {
            components.push(signature);
        }

        let mut hasher = Sha256::new();
        hasher.update(components.join("||").as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Top frames joined by `|`, or `None` when nothing parses
    pub fn stack_signature(&self, raw: &str) -> Option<String> {
        let frames = parse_stack_trace(raw);
        if frames.is_empty() {
            return None;
        }
        Some(
            frames
                .iter()
                .take(self.frame_depth)
                .map(|frame| self.frame_signature(frame))
                .collect::<Vec<_>>()
                .join("|"),
        )
    }

    fn frame_signature(&self, frame: &StackFrame) -> String {
        match self.line_mode {
            LineMode::Exact => format!("{}@{}:{}", frame.function, frame.file, frame.line),
            LineMode::Rounded => {
                let bucket = frame.line / self.line_bucket * self.line_bucket;
                format!("{}@{}:{}", frame.function, frame.file, bucket)
            }
            LineMode::Drop => format!("{}@{}", frame.function, frame.file),
        }
    }
}

pub fn normalize_error_type(error_type: &str) -> String {
    error_type.trim().to_string()
}

/// Elide the variable parts of a message
///
/// Order matters: structured tokens (uuids, urls, emails) go before the
/// generic number rule so their digits are not rewritten piecemeal.
pub fn normalize_message(message: &str) -> String {
    let mut normalized = message.to_lowercase();

    normalized = UUID.replace_all(&normalized, "<uuid>").into_owned();
    normalized = URL.replace_all(&normalized, "<url>").into_owned();
    normalized = EMAIL.replace_all(&normalized, "<email>").into_owned();
    normalized = QUOTED.replace_all(&normalized, "<str>").into_owned();
    normalized = WINDOWS_PATH
        .replace_all(&normalized, |caps: &Captures| basename(&caps[0]))
        .into_owned();
    normalized = UNIX_PATH
        .replace_all(&normalized, |caps: &Captures| {
            format!("{}{}", &caps[1], basename(&caps[2]))
        })
        .into_owned();
    normalized = HEX_ID.replace_all(&normalized, "<hex>").into_owned();
    normalized = IP_V4.replace_all(&normalized, "<ip>").into_owned();
    normalized = TABLE_REF.replace_all(&normalized, "${1}_<id>").into_owned();
    normalized = NUMBER.replace_all(&normalized, "<num>").into_owned();
    normalized = WHITESPACE.replace_all(normalized.trim(), " ").into_owned();

    normalized.chars().take(MAX_NORMALIZED_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STACK_A: &str = "TypeError: x\n    at foo (app.js:10:5)\n    at bar (app.js:20:3)";
    const STACK_B: &str = "TypeError: x\n    at baz (other.js:10:5)\n    at bar (app.js:20:3)";

    fn with_mode(line_mode: LineMode) -> Fingerprinter {
        Fingerprinter::new(&FingerprintConfig {
            frame_depth: 5,
            line_mode,
            line_bucket: 10,
        })
    }

    #[test]
    fn test_normalize_message_elides_literals() {
        assert_eq!(
            normalize_message("Cannot read property 'x' of undefined"),
            "cannot read property <str> of undefined"
        );
        assert_eq!(
            normalize_message("User 550e8400-e29b-41d4-a716-446655440000 not found"),
            "user <uuid> not found"
        );
        assert_eq!(
            normalize_message("Timeout after 3000 ms on attempt 2"),
            "timeout after <num> ms on attempt <num>"
        );
        assert_eq!(
            normalize_message("ENOENT: no such file /var/data/uploads/report.csv"),
            "enoent: no such file report.csv"
        );
        assert_eq!(
            normalize_message("Fetch https://api.example.com/v1/users?id=7 failed"),
            "fetch <url> failed"
        );
        assert_eq!(
            normalize_message("Duplicate key in users_42 from 10.0.0.12"),
            "duplicate key in users_<id> from <ip>"
        );
        assert_eq!(
            normalize_message("Invalid pointer 0x7ffde4a2"),
            "invalid pointer <hex>"
        );
    }

    #[test]
    fn test_normalize_message_only_rewrites_real_paths() {
        assert_eq!(
            normalize_message("Expected number and/or string"),
            "expected number and/or string"
        );
        assert_eq!(
            normalize_message("Cannot find module ./src/lib/app.js"),
            "cannot find module app.js"
        );
        assert_eq!(
            normalize_message("/etc/app/config.toml missing, tried ../conf/app.toml"),
            "config.toml missing, tried app.toml"
        );
    }

    #[test]
    fn test_normalize_message_collapses_whitespace_and_truncates() {
        assert_eq!(normalize_message("  a \n\t b  "), "a b");
        let long = "word ".repeat(100);
        assert_eq!(normalize_message(&long).chars().count(), MAX_NORMALIZED_LEN);
    }

    #[test]
    fn test_same_bug_with_different_literals_groups_together() {
        let fp = Fingerprinter::default();
        assert_eq!(
            fp.fingerprint("TypeError", "Cannot read property 'x' of undefined", Some(STACK_A)),
            fp.fingerprint("TypeError", "Cannot read property 'y' of undefined", Some(STACK_A)),
        );
        assert_eq!(
            fp.fingerprint("NotFound", "order 1234 missing", None),
            fp.fingerprint("NotFound", "order 98 missing", None),
        );
    }

    #[test]
    fn test_different_call_paths_split() {
        let fp = Fingerprinter::default();
        assert_ne!(
            fp.fingerprint("TypeError", "boom", Some(STACK_A)),
            fp.fingerprint("TypeError", "boom", Some(STACK_B)),
        );
    }

    #[test]
    fn test_different_error_types_split() {
        let fp = Fingerprinter::default();
        assert_ne!(
            fp.fingerprint("TypeError", "boom", None),
            fp.fingerprint("RangeError", "boom", None),
        );
    }

    #[test]
    fn test_missing_or_unparseable_stack_falls_back_to_message() {
        let fp = Fingerprinter::default();
        let without = fp.fingerprint("TypeError", "boom", None);
        assert_eq!(without, fp.fingerprint("TypeError", "boom", Some("no frames here")));
        assert_ne!(without, fp.fingerprint("TypeError", "boom", Some(STACK_A)));
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        let key = Fingerprinter::default().fingerprint("E", "m", None);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_only_top_frames_count() {
        let fp = Fingerprinter::new(&FingerprintConfig {
            frame_depth: 1,
            line_mode: LineMode::Exact,
            line_bucket: 10,
        });
        let deep_a = "at foo (app.js:10:5)\nat bar (app.js:20:3)";
        let deep_b = "at foo (app.js:10:5)\nat qux (lib.js:99:1)";
        assert_eq!(
            fp.fingerprint("E", "m", Some(deep_a)),
            fp.fingerprint("E", "m", Some(deep_b))
        );
    }

    #[test]
    fn test_line_modes() {
        let frame = StackFrame {
            function: "foo".to_string(),
            file: "app.js".to_string(),
            line: 47,
            column: Some(3),
        };
        assert_eq!(with_mode(LineMode::Exact).frame_signature(&frame), "foo@app.js:47");
        assert_eq!(with_mode(LineMode::Rounded).frame_signature(&frame), "foo@app.js:40");
        assert_eq!(with_mode(LineMode::Drop).frame_signature(&frame), "foo@app.js");

        let moved_a = "at foo (app.js:41:1)";
        let moved_b = "at foo (app.js:48:1)";
        let rounded = with_mode(LineMode::Rounded);
        assert_eq!(
            rounded.fingerprint("E", "m", Some(moved_a)),
            rounded.fingerprint("E", "m", Some(moved_b))
        );
        let exact = with_mode(LineMode::Exact);
        assert_ne!(
            exact.fingerprint("E", "m", Some(moved_a)),
            exact.fingerprint("E", "m", Some(moved_b))
        );
    }
}
