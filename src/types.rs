use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canonical job identifier type used throughout the crate.
pub type JobId = String;

/// Direction of a file transfer, seen from the local machine.
///
/// - `Pull`: copy a remote path to a local path.
/// - `Push`: copy a local path to a remote path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Push,
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => f.write_str("push"),
            Direction::Pull => f.write_str("pull"),
        }
    }
}

pub const DEFAULT_LABEL: &str = "hopdag";
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 20;

/// Per-graph settings, passed explicitly instead of living in globals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphOptions {
    /// Name used in logs, plans and the DOT export.
    pub label: String,
    /// How long running jobs get to acknowledge a cancellation request
    /// before they are force-finalized as `Cancelled`.
    pub grace_period: Duration,
    /// Number of trailing output lines kept per job in the debrief.
    pub output_tail_lines: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            grace_period: DEFAULT_GRACE_PERIOD,
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
        }
    }
}

impl GraphOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn with_output_tail_lines(mut self, lines: usize) -> Self {
        self.output_tail_lines = lines;
        self
    }
}

/// Parse a duration such as `"500ms"`, `"15s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

    let seconds = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => seconds(60),
        "h" => seconds(60 * 60),
        unit => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
