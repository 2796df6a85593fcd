//! TeX log parsing
//!
//! Splits a compiler log into error blocks and warnings. Both error styles
//! are understood: the classic `! message` block followed by an `l.<n>`
//! context line, and the `file:line: message` form of `-file-line-error`.
//! Warnings wrapped at the engine's line width are re-joined.

use regex::Regex;
use std::sync::OnceLock;

/// Log line opening a region of deliberately hidden structural content
pub const HIDDEN_BEGIN_MARKER: &str = "[passbuild:hidden-begin]";
pub const HIDDEN_END_MARKER: &str = "[passbuild:hidden-end]";

const WRAP_WIDTH: usize = 79;
const MAX_CONTEXT_LINES: usize = 4;
const MAX_WARNING_LINES: usize = 6;

fn file_line_error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\.?/)?[^:\s]+\.(?:tex|sty|cls|bib|aux|bbl|def|cfg):(\d+): (.+)$").unwrap()
    })
}

fn context_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^l\.(\d+)").unwrap())
}

fn input_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"on input line (\d+)").unwrap())
}

fn package_continuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\([A-Za-z0-9_.-]+\)\s+(.*)$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Error,
    Warning,
    /// `==> Fatal error occurred`, the engine giving up
    FatalAbort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub message: String,
    pub line: Option<u32>,
    pub context: String,
    /// Emitted inside a hidden-content region
    pub hidden: bool,
}

pub fn parse_log(text: &str) -> Vec<LogEntry> {
    let lines: Vec<&str> = text.lines().collect();
    let mut entries = Vec::new();
    let mut hidden = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if line.contains(HIDDEN_BEGIN_MARKER) {
            hidden = true;
            i += 1;
            continue;
        }
        if line.contains(HIDDEN_END_MARKER) {
            hidden = false;
            i += 1;
            continue;
        }

        if let Some(message) = line.strip_prefix("! ") {
            let (context, context_line, consumed) = error_context(&lines[i + 1..]);
            entries.push(LogEntry {
                kind: EntryKind::Error,
                message: message.trim().to_string(),
                line: context_line,
                context,
                hidden,
            });
            i += 1 + consumed;
            continue;
        }

        if let Some(cap) = file_line_error_re().captures(line) {
            let (context, _, consumed) = error_context(&lines[i + 1..]);
            entries.push(LogEntry {
                kind: EntryKind::Error,
                message: cap[2].trim().to_string(),
                line: cap[1].parse().ok(),
                context,
                hidden,
            });
            i += 1 + consumed;
            continue;
        }

        if line.starts_with("==> Fatal error occurred") {
            entries.push(LogEntry {
                kind: EntryKind::FatalAbort,
                message: line.trim().to_string(),
                line: None,
                context: String::new(),
                hidden,
            });
            i += 1;
            continue;
        }

        if line.contains("Warning:") {
            let (message, consumed) = join_warning(&lines[i..]);
            let input_line = input_line_re()
                .captures(&message)
                .and_then(|cap| cap[1].parse().ok());
            entries.push(LogEntry {
                kind: EntryKind::Warning,
                message,
                line: input_line,
                context: String::new(),
                hidden,
            });
            i += consumed;
            continue;
        }

        i += 1;
    }

    entries
}

/// Collects the lines following an error up to a blank line
fn error_context(rest: &[&str]) -> (String, Option<u32>, usize) {
    let mut context = Vec::new();
    let mut line_number = None;

    for line in rest.iter().take(MAX_CONTEXT_LINES) {
        if line.trim().is_empty() || line.starts_with("! ") || file_line_error_re().is_match(line)
        {
            break;
        }
        if line_number.is_none() {
            line_number = context_line_re()
                .captures(line)
                .and_then(|cap| cap[1].parse().ok());
        }
        context.push(line.trim_end());
    }

    let consumed = context.len();
    (context.join("\n"), line_number, consumed)
}

/// Re-joins a warning that the engine wrapped over several lines
fn join_warning(lines: &[&str]) -> (String, usize) {
    let mut message = lines[0].trim_end().to_string();
    let mut consumed = 1;
    let mut previous_len = lines[0].chars().count();

    while consumed < lines.len() && consumed < MAX_WARNING_LINES {
        let next = lines[consumed];
        if next.trim().is_empty() {
            break;
        }
        if previous_len == WRAP_WIDTH {
            message.push_str(next.trim_end());
        } else if let Some(cap) = package_continuation_re().captures(next) {
            message.push(' ');
            message.push_str(cap[1].trim_end());
        } else {
            break;
        }
        previous_len = next.chars().count();
        consumed += 1;
    }

    (message, consumed)
}
