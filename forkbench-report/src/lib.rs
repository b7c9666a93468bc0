#![warn(missing_docs)]
//! forkbench report
//!
//! The serializable record of a run and its machine-readable renderings:
//! - JSON (the whole report, pretty-printed)
//! - CSV (one row per descriptor)

mod csv;
mod json;
#[allow(missing_docs)]
mod report;

pub use csv::generate_csv_report;
pub use json::generate_json_report;
pub use report::{Report, ReportConfig, ReportMeta, ReportSummary, SCHEMA_VERSION, SystemInfo};

use serde::{Deserialize, Serialize};

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable terminal table
    #[default]
    Human,
    /// JSON with full schema
    Json,
    /// CSV for spreadsheets
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "human" | "text" => Ok(OutputFormat::Human),
            other => Err(format!("Unknown output format: {}", other)),
        }
    }
}
