//! Measurement modes and output time units

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a result reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Mean time per operation
    #[default]
    AverageTime,
    /// Operations per time unit
    Throughput,
    /// Both of the above plus percentiles
    All,
}

impl Mode {
    /// Whether the average-time estimate is part of this mode
    pub fn reports_average_time(self) -> bool {
        matches!(self, Mode::AverageTime | Mode::All)
    }

    /// Whether the throughput estimate is part of this mode
    pub fn reports_throughput(self) -> bool {
        matches!(self, Mode::Throughput | Mode::All)
    }

    /// Whether percentiles are computed
    pub fn reports_percentiles(self) -> bool {
        matches!(self, Mode::All)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Mode::AverageTime => "avgt",
            Mode::Throughput => "thrpt",
            Mode::All => "all",
        })
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avgt" | "average-time" | "average" => Ok(Mode::AverageTime),
            "thrpt" | "throughput" => Ok(Mode::Throughput),
            "all" => Ok(Mode::All),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

/// Unit results are expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// 1e-9 s
    Nanoseconds,
    /// 1e-6 s
    #[default]
    Microseconds,
    /// 1e-3 s
    Milliseconds,
    /// 1 s
    Seconds,
}

impl TimeUnit {
    /// Nanoseconds in one unit
    pub fn nanos_per_unit(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1.0,
            TimeUnit::Microseconds => 1_000.0,
            TimeUnit::Milliseconds => 1_000_000.0,
            TimeUnit::Seconds => 1_000_000_000.0,
        }
    }

    /// Convert a nanosecond quantity to this unit
    pub fn from_nanos(self, nanos: f64) -> f64 {
        nanos / self.nanos_per_unit()
    }

    /// Short suffix, e.g. `us`
    pub fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.suffix())
    }
}

impl FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ns" | "nanoseconds" => Ok(TimeUnit::Nanoseconds),
            "us" | "µs" | "microseconds" => Ok(TimeUnit::Microseconds),
            "ms" | "milliseconds" => Ok(TimeUnit::Milliseconds),
            "s" | "seconds" => Ok(TimeUnit::Seconds),
            other => Err(format!("Unknown time unit: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversion() {
        assert!((TimeUnit::Milliseconds.from_nanos(20_000_000.0) - 20.0).abs() < 1e-12);
        assert!((TimeUnit::Microseconds.from_nanos(1_500.0) - 1.5).abs() < 1e-12);
        assert!((TimeUnit::Seconds.from_nanos(1e9) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse() {
        assert_eq!("ms".parse::<TimeUnit>().unwrap(), TimeUnit::Milliseconds);
        assert_eq!("thrpt".parse::<Mode>().unwrap(), Mode::Throughput);
        assert_eq!("All".parse::<Mode>().unwrap(), Mode::All);
        assert!("fortnights".parse::<TimeUnit>().is_err());
    }

    #[test]
    fn test_mode_coverage() {
        assert!(Mode::All.reports_average_time() && Mode::All.reports_throughput());
        assert!(!Mode::AverageTime.reports_throughput());
        assert!(!Mode::Throughput.reports_average_time());
    }
}
