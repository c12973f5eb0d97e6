//! Stack trace parsing
//!
//! Understands V8 (`at fn (file:line:col)`, `at file:line:col`) and
//! Gecko/Safari (`fn@file:line:col`) frame lines. Anything else is skipped.

use once_cell::sync::Lazy;
use regex::Regex;

static V8_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*at\s+(?:(?P<func>.+?)\s+\()?(?P<file>.+?):(?P<line>\d+)(?::(?P<col>\d+))?\)?\s*$")
        .expect("valid V8 frame regex")
});

static GECKO_FRAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<func>[^@\s]*)@(?P<file>.+?):(?P<line>\d+)(?::(?P<col>\d+))?\s*$")
        .expect("valid Gecko frame regex")
});

pub const ANONYMOUS: &str = "<anonymous>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    /// Basename only, without query string or fragment
    pub file: String,
    pub line: u32,
    pub column: Option<u32>,
}

/// Parse every recognizable frame, top of the stack first
pub fn parse_stack_trace(raw: &str) -> Vec<StackFrame> {
    raw.lines().filter_map(parse_frame).collect()
}

fn parse_frame(line: &str) -> Option<StackFrame> {
    let caps = V8_FRAME
        .captures(line)
        .or_else(|| GECKO_FRAME.captures(line))?;

    let file = basename(caps.name("file")?.as_str());
    if file.is_empty() {
        return None;
    }

    let function = caps
        .name("func")
        .map(|m| clean_function(m.as_str()))
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| ANONYMOUS.to_string());

    Some(StackFrame {
        function,
        file,
        line: caps.name("line")?.as_str().parse().ok()?,
        column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
    })
}

fn clean_function(raw: &str) -> String {
    raw.trim().trim_start_matches("async ").trim().to_string()
}

/// `https://cdn.example.com/static/app.js?v=3#x` -> `app.js`
pub fn basename(path: &str) -> String {
    let path = path.trim().trim_start_matches('(');
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_string()
}
