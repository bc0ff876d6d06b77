//! Report storage: `<output-dir>/{host_port}_{timestamp}/`
//!
//! Every `apiconform run` is saved regardless of `--output` mode.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use apiconform_core::{Config, SuiteReport};

/// Save a suite report under `output_dir`.
///
/// Writes `report.json` (full results), `summary.json` (verdict and counts)
/// and `config.toml` (the effective configuration). Returns the report
/// directory path on success.
pub fn save_report(
    output_dir: &Path,
    report: &SuiteReport,
    config: &Config,
) -> Result<PathBuf, std::io::Error> {
    let report_dir = output_dir.join(build_dir_name(&report.server));
    std::fs::create_dir_all(&report_dir)?;

    let config_toml =
        toml::to_string_pretty(config).map_err(|e| std::io::Error::other(e.to_string()))?;
    std::fs::write(report_dir.join("config.toml"), config_toml)?;

    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(report_dir.join("report.json"), json)?;

    let summary = &report.summary;
    let overview = serde_json::json!({
        "verdict": {
            "status": summary.status().to_string(),
            "exit_code": summary.exit_code(),
            "reason": summary.reason(),
        },
        "stats": {
            "total": summary.total,
            "passed": summary.passed.len(),
            "failed": summary.failed.len(),
            "skipped": summary.skipped.len(),
            "infrastructure": summary.infrastructure_failures(),
        },
        "meta": {
            "server": report.server,
            "version": report.version,
            "started": report.started,
            "finished": report.finished,
        },
    });
    std::fs::write(
        report_dir.join("summary.json"),
        serde_json::to_string_pretty(&overview).unwrap_or_default(),
    )?;

    Ok(report_dir)
}

/// `{host_port}_{timestamp}` e.g. `localhost_8000_20260205T193000`
fn build_dir_name(server: &str) -> String {
    format!("{}_{}", extract_host_port(server), timestamp_compact())
}

/// `"http://localhost:8000/ga4gh/tes/"` → `"localhost_8000"`
fn extract_host_port(url: &str) -> String {
    url.split("://")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .filter(|h| !h.is_empty())
        .unwrap_or("unknown")
        .replace(':', "_")
}

/// `"20260205T193000"`: filesystem-safe compact timestamp.
fn timestamp_compact() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}{mo:02}{d:02}T{h:02}{mi:02}{s:02}")
}

/// `"2026-02-05T19:30:00Z"`: ISO 8601 for JSON.
pub fn timestamp_iso() -> String {
    let (y, mo, d, h, mi, s) = utc_now();
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

fn utc_now() -> (i64, u64, u64, u64, u64, u64) {
    let epoch_secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days = i64::try_from(epoch_secs / 86_400).unwrap_or(0);
    let tod = epoch_secs % 86_400;
    let (y, m, d) = civil_from_days(days);
    (y, m, d, tod / 3600, (tod % 3600) / 60, tod % 60)
}

/// Epoch days → (year, month, day) in the proleptic Gregorian calendar.
///
/// Reference: <https://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(days: i64) -> (i64, u64, u64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + i64::from(m <= 2);
    (y, m.unsigned_abs(), d.unsigned_abs())
}
