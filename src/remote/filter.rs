//! Line-level output cleaning and filtering.
//!
//! - ANSI escape sequences are stripped before lines are filtered or emitted.
//! - A line is kept iff (no include patterns, or at least one include pattern
//!   matches) and no exclude pattern matches.
//! - Each pattern is tried as a case-insensitive regular expression. A pattern
//!   that does not compile is matched as a case-insensitive substring instead,
//!   so a bad pattern never aborts a command.
//! - Patterns use the `regex` crate dialect, which has no lookaround
//!   (`(?=..)`, `(?!..)`, `(?<=..)`) and no backreferences (`\1`). Such
//!   patterns do not compile and are matched as literal substrings.
//! - [`LineBuffer`] carries a partial trailing line across stream chunks so a
//!   line split between two packets is only seen once it is complete.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::remote::types::CommandConfig;

/// CSI sequences (colors, cursor movement) plus bare `[0;31m`-style color
/// codes left behind when the escape byte was already lost.
static ANSI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\[\d+(?:;\d+)*m").unwrap_or_else(|e| {
        unreachable!("ANSI pattern is a valid constant expression: {}", e)
    })
});

/// Remove ANSI escape sequences from `text`.
pub fn strip_ansi_codes(text: &str) -> String {
    ANSI_PATTERN.replace_all(text, "").into_owned()
}

/// One compiled include/exclude pattern.
#[derive(Debug, Clone)]
enum LinePattern {
    Regex(Regex),
    Literal(String),
}

impl LinePattern {
    fn compile(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(regex) => LinePattern::Regex(regex),
            Err(e) => {
                debug!("Pattern {:?} is not a valid regex ({}), matching as text", pattern, e);
                LinePattern::Literal(pattern.to_lowercase())
            }
        }
    }

    fn is_match(&self, line: &str) -> bool {
        match self {
            LinePattern::Regex(regex) => regex.is_match(line),
            LinePattern::Literal(needle) => line.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// Compiled include/exclude filter for a [`CommandConfig`].
#[derive(Debug, Clone, Default)]
pub struct LineFilter {
    include: Vec<LinePattern>,
    exclude: Vec<LinePattern>,
}

impl LineFilter {
    pub fn new(config: &CommandConfig) -> Self {
        Self {
            include: config
                .include_patterns
                .iter()
                .map(|p| LinePattern::compile(p))
                .collect(),
            exclude: config
                .exclude_patterns
                .iter()
                .map(|p| LinePattern::compile(p))
                .collect(),
        }
    }

    /// Whether this filter lets every line through.
    pub fn is_passthrough(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether `line` survives the filter.
    pub fn keep(&self, line: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.is_match(line));
        included && !self.exclude.iter().any(|p| p.is_match(line))
    }

    /// Filter `text` line by line, preserving order. Text is returned
    /// unchanged when there are no patterns.
    pub fn filter_output(&self, text: &str) -> String {
        if self.is_passthrough() {
            return text.to_string();
        }
        text.split('\n')
            .filter(|line| self.keep(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Whether `line` matches `pattern` as a case-insensitive regex, or as a
/// case-insensitive substring when `pattern` is not a valid regex.
pub fn matches_pattern(line: &str, pattern: &str) -> bool {
    LinePattern::compile(pattern).is_match(line)
}

/// Filter `output` with the patterns of `config`.
pub fn filter_command_output(output: &str, config: &CommandConfig) -> String {
    LineFilter::new(config).filter_output(output)
}

/// Splits a byte stream into complete lines, carrying any partial trailing
/// line over to the next chunk.
///
/// Bytes are carried rather than text so a multi-byte character split across
/// chunks is decoded intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let Some(last_newline) = chunk.iter().rposition(|&b| b == b'\n') else {
            self.carry.extend_from_slice(chunk);
            return Vec::new();
        };

        self.carry.extend_from_slice(&chunk[..last_newline]);
        let complete = std::mem::take(&mut self.carry);
        self.carry.extend_from_slice(&chunk[last_newline + 1..]);

        String::from_utf8_lossy(&complete)
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect()
    }

    /// Return the remaining partial line, if any, and reset.
    pub fn finish(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.carry);
        let line = String::from_utf8_lossy(&rest);
        Some(line.strip_suffix('\r').unwrap_or(&line).to_string())
    }
}
