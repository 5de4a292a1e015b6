//! Machine configuration.
//!
//! The configuration file is line-oriented `key value` text. `#` starts a
//! comment that runs to end of line; values may be double-quoted (quotes
//! are stripped). All seven keys are required:
//!
//! ```text
//! # machine shape
//! num-cpu 4
//! scheduler "rr"
//! quantum-cycles 5
//!
//! # batch generator
//! batch-process-freq 1
//! min-ins 100
//! max-ins 100
//! delays-per-exec 0
//! ```
//!
//! Parsing is strict: a missing key, an unknown key, an out-of-range
//! number, or `min-ins > max-ins` is a [`ConfigError`] naming the
//! offending key, and initialization does not proceed.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use strum_macros::{Display, EnumString};
use thiserror::Error;

/// The seven recognized configuration keys.
const REQUIRED_KEYS: [&str; 7] = [
    "num-cpu",
    "scheduler",
    "quantum-cycles",
    "batch-process-freq",
    "min-ins",
    "max-ins",
    "delays-per-exec",
];

// ---------------------------------------------------------------------------
// SchedulerKind
// ---------------------------------------------------------------------------

/// Which scheduling policy the machine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SchedulerKind {
    /// First come, first served: a pulled process runs to completion.
    Fcfs,
    /// Round-Robin: a pulled process runs at most `quantum-cycles` ticks.
    Rr,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("missing required config key: {0}")]
    MissingKey(&'static str),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{key} must be between {min} and {max}")]
    OutOfRange { key: &'static str, min: u64, max: u64 },
    #[error("min-ins cannot exceed max-ins")]
    InstructionBounds,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Validated machine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Number of worker cores, `[1, 128]`.
    pub num_cpu: u32,
    /// Scheduling policy.
    pub scheduler: SchedulerKind,
    /// Ticks per Round-Robin slice; ignored under FCFS.
    pub quantum_cycles: u32,
    /// Emit a batch process every this many cycles.
    pub batch_process_freq: u32,
    /// Lower bound on generated program length.
    pub min_ins: u32,
    /// Upper bound on generated program length.
    pub max_ins: u32,
    /// Sleep ticks used inside generated For bodies.
    pub delays_per_exec: u32,
}

impl EngineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        text.parse()
    }
}

impl FromStr for EngineConfig {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Self, ConfigError> {
        let raw = parse_pairs(text)?;
        for key in REQUIRED_KEYS {
            if !raw.contains_key(key) {
                return Err(ConfigError::MissingKey(key));
            }
        }

        let scheduler = {
            let value = &raw["scheduler"];
            SchedulerKind::from_str(&value.to_lowercase()).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "scheduler",
                    value: value.clone(),
                }
            })?
        };

        let config = EngineConfig {
            num_cpu: ranged(&raw, "num-cpu", 1, 128)?,
            scheduler,
            quantum_cycles: ranged(&raw, "quantum-cycles", 1, u64::from(u32::MAX))?,
            batch_process_freq: ranged(&raw, "batch-process-freq", 1, u64::from(u32::MAX))?,
            min_ins: ranged(&raw, "min-ins", 1, u64::from(u32::MAX))?,
            max_ins: ranged(&raw, "max-ins", 1, u64::from(u32::MAX))?,
            delays_per_exec: ranged(&raw, "delays-per-exec", 0, u64::from(u32::MAX))?,
        };

        if config.min_ins > config.max_ins {
            return Err(ConfigError::InstructionBounds);
        }
        Ok(config)
    }
}

/// Split the file into `key value` pairs, rejecting keys we don't know.
fn parse_pairs(text: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut pairs = HashMap::new();
    for line in text.lines() {
        let line = line.split('#').next().unwrap_or("");
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else { continue };
        if !REQUIRED_KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        let value = tokens.collect::<Vec<_>>().join(" ");
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(&value);
        pairs.insert(key.to_string(), value.to_string());
    }
    Ok(pairs)
}

fn ranged(
    raw: &HashMap<String, String>,
    key: &'static str,
    min: u64,
    max: u64,
) -> Result<u32, ConfigError> {
    let value = &raw[key];
    let parsed: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.clone(),
    })?;
    if parsed < min || parsed > max {
        return Err(ConfigError::OutOfRange { key, min, max });
    }
    Ok(parsed as u32)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "\
num-cpu 4
scheduler rr
quantum-cycles 5
batch-process-freq 1
min-ins 10
max-ins 20
delays-per-exec 2
";

    #[test]
    fn parses_a_complete_file() {
        let cfg: EngineConfig = GOOD.parse().unwrap();
        assert_eq!(cfg.num_cpu, 4);
        assert_eq!(cfg.scheduler, SchedulerKind::Rr);
        assert_eq!(cfg.quantum_cycles, 5);
        assert_eq!(cfg.batch_process_freq, 1);
        assert_eq!(cfg.min_ins, 10);
        assert_eq!(cfg.max_ins, 20);
        assert_eq!(cfg.delays_per_exec, 2);
    }

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let text = format!("# header comment\n\n{GOOD}\nnum-cpu 8 # trailing\n");
        let cfg: EngineConfig = text.parse().unwrap();
        // The later assignment wins.
        assert_eq!(cfg.num_cpu, 8);
    }

    #[test]
    fn quoted_values_are_stripped() {
        let text = GOOD.replace("scheduler rr", "scheduler \"fcfs\"");
        let cfg: EngineConfig = text.parse().unwrap();
        assert_eq!(cfg.scheduler, SchedulerKind::Fcfs);
    }

    #[test]
    fn scheduler_name_is_case_insensitive() {
        let text = GOOD.replace("scheduler rr", "scheduler FCFS");
        let cfg: EngineConfig = text.parse().unwrap();
        assert_eq!(cfg.scheduler, SchedulerKind::Fcfs);
    }

    #[test]
    fn missing_key_names_the_key() {
        let text = GOOD.replace("quantum-cycles 5\n", "");
        match text.parse::<EngineConfig>() {
            Err(ConfigError::MissingKey(key)) => assert_eq!(key, "quantum-cycles"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_key_is_rejected() {
        let text = format!("{GOOD}turbo-mode 1\n");
        match text.parse::<EngineConfig>() {
            Err(ConfigError::UnknownKey(key)) => assert_eq!(key, "turbo-mode"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn bad_scheduler_name_is_rejected() {
        let text = GOOD.replace("scheduler rr", "scheduler sjf");
        assert!(matches!(
            text.parse::<EngineConfig>(),
            Err(ConfigError::InvalidValue {
                key: "scheduler",
                ..
            })
        ));
    }

    #[test]
    fn num_cpu_range_is_enforced() {
        for bad in ["num-cpu 0", "num-cpu 129"] {
            let text = GOOD.replace("num-cpu 4", bad);
            assert!(matches!(
                text.parse::<EngineConfig>(),
                Err(ConfigError::OutOfRange { key: "num-cpu", .. })
            ));
        }
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let text = GOOD.replace("min-ins 10", "min-ins lots");
        assert!(matches!(
            text.parse::<EngineConfig>(),
            Err(ConfigError::InvalidValue { key: "min-ins", .. })
        ));
    }

    #[test]
    fn min_above_max_is_rejected() {
        let text = GOOD.replace("min-ins 10", "min-ins 30");
        assert!(matches!(
            text.parse::<EngineConfig>(),
            Err(ConfigError::InstructionBounds)
        ));
    }

    #[test]
    fn zero_delay_is_allowed() {
        let text = GOOD.replace("delays-per-exec 2", "delays-per-exec 0");
        let cfg: EngineConfig = text.parse().unwrap();
        assert_eq!(cfg.delays_per_exec, 0);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.txt")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn scheduler_kind_round_trips_through_strings() {
        assert_eq!(SchedulerKind::Fcfs.to_string(), "fcfs");
        assert_eq!(SchedulerKind::Rr.to_string(), "rr");
        assert_eq!(SchedulerKind::from_str("fcfs").unwrap(), SchedulerKind::Fcfs);
        assert_eq!(SchedulerKind::from_str("rr").unwrap(), SchedulerKind::Rr);
    }
}
