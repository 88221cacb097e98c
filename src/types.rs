use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Za-z_-]+$").expect("static regex is valid"));

/// Names that end up in file names and build names: letters, digits,
/// underscore and dash only.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Status of a supervised program as reported by the process supervisor.
///
/// Only `Running` and `Fatal` are terminal for readiness polling; every other
/// string the supervisor may print (`STARTING`, `BACKOFF`, ...) is kept
/// verbatim in `Transitional`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramStatus {
    Running,
    Fatal,
    Transitional(String),
}

impl ProgramStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "RUNNING" => ProgramStatus::Running,
            "FATAL" => ProgramStatus::Fatal,
            other => ProgramStatus::Transitional(other.to_string()),
        }
    }
}

impl std::fmt::Display for ProgramStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgramStatus::Running => f.write_str("RUNNING"),
            ProgramStatus::Fatal => f.write_str("FATAL"),
            ProgramStatus::Transitional(s) => f.write_str(s),
        }
    }
}

/// Package manager used to install tools on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Yum,
    Apt,
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}
