//! CSV Output
//!
//! One row per descriptor. Values are in the descriptor's own unit, named in
//! the `unit` column.

use crate::report::Report;
use forkbench_core::OutcomeStatus;
use std::fmt::Write;

const HEADER: &str = "group,name,mode,unit,scope,forks,threads,status,error_kind,samples,\
avg_time,avg_time_error,throughput,throughput_error,min,max,p50,p90,p99,p999,failed_forks,error";

/// Generate a CSV report
pub fn generate_csv_report(report: &Report) -> String {
    let mut out = String::with_capacity(128 * (report.results.len() + 1));
    out.push_str(HEADER);
    out.push('\n');

    for outcome in &report.results {
        let mut row: Vec<String> = vec![
            escape(&outcome.group),
            escape(&outcome.name),
            outcome.mode.to_string(),
            outcome.unit.to_string(),
            outcome.scope.to_string(),
            outcome.forks.to_string(),
            outcome.threads.to_string(),
        ];
        match &outcome.status {
            OutcomeStatus::Measured(m) => {
                let r = &m.result;
                let avg = r.average_time();
                let thrpt = r.throughput();
                let p = r.percentiles();
                row.extend([
                    "measured".to_string(),
                    String::new(),
                    r.sample_count().to_string(),
                    opt(avg.map(|e| e.value)),
                    opt(avg.map(|e| e.std_error)),
                    opt(thrpt.map(|e| e.value)),
                    opt(thrpt.map(|e| e.std_error)),
                    num(r.min()),
                    num(r.max()),
                    opt(p.map(|p| p.p50)),
                    opt(p.map(|p| p.p90)),
                    opt(p.map(|p| p.p99)),
                    opt(p.map(|p| p.p999)),
                    m.failed_forks.len().to_string(),
                    String::new(),
                ]);
            }
            OutcomeStatus::Unmeasurable {
                error,
                failed_forks,
            } => {
                row.extend(["unmeasurable".to_string(), error.kind().to_string()]);
                row.extend(std::iter::repeat_n(String::new(), 11));
                row.push(failed_forks.len().to_string());
                row.push(escape(error.message()));
            }
        }
        let _ = writeln!(out, "{}", row.join(","));
    }
    out
}

fn num(v: f64) -> String {
    format!("{v:.6}")
}

fn opt(v: Option<f64>) -> String {
    v.map(num).unwrap_or_default()
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
