//! Access-log statistics for the stats page.
//!
//! Reads the tail of Caddy's JSON access log (one JSON object per line) and
//! aggregates it into the report consumed by `/api/stats/global`. Every query
//! re-reads and re-aggregates the bounded tail from scratch; nothing is cached
//! between requests and nothing here ever fails outward. Unusable lines are
//! dropped with a diagnostic and the report is always structurally complete.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Upper bound on how many log lines a single stats query will process.
pub const MAX_LOG_RECORDS: usize = 5000;

/// Width of one time-series bucket in seconds (10 minutes).
const TIME_SLOT_SECONDS: i64 = 600;

/// One normalized access-log record. Everything downstream of the reader can
/// assume `ts > 0` and typed fields; records that cannot be normalized never
/// get this far.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub ts: f64,
    pub host: String,
    /// Part of the normalized shape, not used by the aggregation itself.
    #[allow(dead_code)]
    pub method: String,
    pub uri: String,
    pub user_agent: String,
    pub status: i64,
    pub size: i64,
    pub duration: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCodesDist {
    #[serde(rename = "1xx")]
    pub informational: u64,
    #[serde(rename = "2xx")]
    pub success: u64,
    #[serde(rename = "3xx")]
    pub redirect: u64,
    #[serde(rename = "4xx")]
    pub client_error: u64,
    #[serde(rename = "5xx")]
    pub server_error: u64,
    pub other: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostCount {
    pub host: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathCount {
    pub path: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentCount {
    pub agent: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesPoint {
    /// Bucket start, formatted `YYYY-MM-DD HH:MM` in UTC.
    pub time: String,
    pub count: u64,
}

/// Aggregate traffic report. Built fresh on every stats query, never mutated
/// after construction. `log_read_error` stays `None` here; the HTTP layer
/// fills it in when the reader found nothing usable.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsReport {
    pub total_requests: u64,
    pub requests_by_host: Vec<HostCount>,
    pub status_codes_dist: StatusCodesDist,
    pub top_paths: Vec<PathCount>,
    pub top_user_agents: Vec<AgentCount>,
    pub avg_response_time_ms: f64,
    pub avg_response_size_kb: f64,
    pub error_rate_percent: f64,
    pub requests_timeseries: Vec<TimeseriesPoint>,
    pub data_from_utc: Option<String>,
    pub data_to_utc: Option<String>,
    pub log_read_error: Option<String>,
}

/// One-shot stats query: read the bounded tail of the access log at
/// `log_path` and aggregate it. Never fails; a missing or unreadable file
/// yields the zero-valued report.
pub fn compute_stats(log_path: &Path, max_records: usize) -> StatsReport {
    let records = read_access_log(log_path, max_records);
    aggregate(&records)
}

/// Read and normalize at most the last `max_records` lines of the JSON
/// access log.
///
/// A missing file is a valid "no data yet" state and yields an empty vec;
/// the caller is responsible for distinguishing that from an empty result.
/// An unreadable file also yields an empty vec, with the cause logged.
/// Lines that are not valid JSON, lack a numeric `ts`, or carry a field of
/// an unexpected type are dropped individually.
pub fn read_access_log(path: &Path, max_records: usize) -> Vec<LogRecord> {
    if !path.exists() {
        debug!(path = %path.display(), "access log not found, no data yet");
        return Vec::new();
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read access log");
            return Vec::new();
        }
    };

    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(max_records);
    let mut records = Vec::with_capacity(lines.len() - start);
    for line in &lines[start..] {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(entry) => match normalize(&entry) {
                Some(record) => records.push(record),
                None => debug!(line = %snippet(line), "skipping unusable log record"),
            },
            Err(e) => warn!(error = %e, line = %snippet(line), "skipping malformed log line"),
        }
    }
    debug!(count = records.len(), path = %path.display(), "read access log tail");
    records
}

/// Normalize one parsed log line. `None` means the record is dropped: either
/// the timestamp is missing/invalid, or a field that is present has a type we
/// cannot convert (one bad record must not abort the whole pass).
fn normalize(entry: &Value) -> Option<LogRecord> {
    let ts = entry.get("ts")?.as_f64()?;
    if ts <= 0.0 {
        return None;
    }

    let request = entry.get("request").unwrap_or(&Value::Null);

    // Caddy nests the host under `request`, but some shippers put it at the
    // top level. Either works; both absent falls back to "Unknown".
    let top_host = match entry.get("host") {
        None | Some(Value::Null) => "Unknown",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return None,
    };
    let host = string_field(request.get("host"), top_host)?;
    let method = string_field(request.get("method"), "GET")?;
    let uri = string_field(request.get("uri"), "/")?;
    let user_agent = first_user_agent(request)?;

    Some(LogRecord {
        ts,
        host,
        method,
        uri,
        user_agent,
        status: int_field(entry.get("status"))?,
        size: int_field(entry.get("size"))?,
        duration: float_field(entry.get("duration"))?,
    })
}

fn string_field(value: Option<&Value>, default: &str) -> Option<String> {
    match value {
        None | Some(Value::Null) => Some(default.to_string()),
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => None,
    }
}

fn int_field(value: Option<&Value>) -> Option<i64> {
    match value {
        None | Some(Value::Null) => Some(0),
        Some(v) => v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)),
    }
}

fn float_field(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(v) => v.as_f64(),
    }
}

/// First value of `request.headers.User-Agent`. Caddy logs headers as lists;
/// an absent header defaults to "Unknown", an empty list to "UnknownUA".
fn first_user_agent(request: &Value) -> Option<String> {
    match request.get("headers").and_then(|h| h.get("User-Agent")) {
        None | Some(Value::Null) => Some("Unknown".to_string()),
        Some(Value::Array(values)) => match values.first() {
            None => Some("UnknownUA".to_string()),
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => None,
        },
        Some(_) => None,
    }
}

/// Counting map that remembers first-seen order so that top-K reductions
/// break count ties by discovery order, deterministically.
#[derive(Default)]
struct OrderedCounter {
    counts: HashMap<String, u64>,
    order: Vec<String>,
}

impl OrderedCounter {
    fn incr(&mut self, key: &str) {
        match self.counts.get_mut(key) {
            Some(n) => *n += 1,
            None => {
                self.counts.insert(key.to_string(), 1);
                self.order.push(key.to_string());
            }
        }
    }

    /// Top `n` entries by count descending; stable sort keeps ties in
    /// first-seen order.
    fn top(&self, n: usize) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .order
            .iter()
            .map(|key| (key.clone(), self.counts[key]))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        entries
    }
}

/// Single-pass aggregation over normalized records. Deterministic for a given
/// input; empty input yields the canonical zero-valued report.
pub fn aggregate(records: &[LogRecord]) -> StatsReport {
    if records.is_empty() {
        return StatsReport::default();
    }

    let total = records.len() as u64;
    let mut hosts = OrderedCounter::default();
    let mut paths = OrderedCounter::default();
    let mut agents = OrderedCounter::default();
    let mut dist = StatusCodesDist::default();
    let mut error_count: u64 = 0;
    let mut total_duration = 0.0_f64;
    let mut total_size = 0.0_f64;
    let mut min_ts = records[0].ts;
    let mut max_ts = records[0].ts;
    let mut slots: BTreeMap<i64, u64> = BTreeMap::new();

    for record in records {
        min_ts = min_ts.min(record.ts);
        max_ts = max_ts.max(record.ts);

        hosts.incr(&record.host);

        match record.status {
            100..=199 => dist.informational += 1,
            200..=299 => dist.success += 1,
            300..=399 => dist.redirect += 1,
            400..=499 => {
                dist.client_error += 1;
                error_count += 1;
            }
            500..=599 => {
                dist.server_error += 1;
                error_count += 1;
            }
            _ => dist.other += 1,
        }

        let path = record.uri.split('?').next().unwrap_or(&record.uri);
        paths.incr(path);
        agents.incr(&simplify_user_agent(&record.user_agent));

        total_duration += record.duration;
        total_size += record.size as f64;

        let slot = (record.ts / TIME_SLOT_SECONDS as f64).floor() as i64 * TIME_SLOT_SECONDS;
        *slots.entry(slot).or_insert(0) += 1;
    }

    // Contiguous series from the earliest to the latest occupied bucket;
    // buckets nobody hit report zero so the chart has no gaps.
    let mut timeseries = Vec::new();
    if let (Some(&first), Some(&last)) = (slots.keys().next(), slots.keys().next_back()) {
        let mut slot = first;
        while slot <= last {
            timeseries.push(TimeseriesPoint {
                time: slot_label(slot),
                count: slots.get(&slot).copied().unwrap_or(0),
            });
            slot += TIME_SLOT_SECONDS;
        }
    }

    StatsReport {
        total_requests: total,
        requests_by_host: hosts
            .top(7)
            .into_iter()
            .map(|(host, count)| HostCount { host, count })
            .collect(),
        status_codes_dist: dist,
        top_paths: paths
            .top(10)
            .into_iter()
            .map(|(path, count)| PathCount { path, count })
            .collect(),
        top_user_agents: agents
            .top(5)
            .into_iter()
            .map(|(agent, count)| AgentCount { agent, count })
            .collect(),
        avg_response_time_ms: total_duration / total as f64 * 1000.0,
        avg_response_size_kb: total_size / total as f64 / 1024.0,
        error_rate_percent: error_count as f64 / total as f64 * 100.0,
        requests_timeseries: timeseries,
        data_from_utc: Some(boundary_label(min_ts)),
        data_to_utc: Some(boundary_label(max_ts)),
        log_read_error: None,
    }
}

/// "Mozilla/5.0 (Windows NT 10.0)" -> "Mozilla". First token before `/` and
/// `(`, trimmed; empty results collapse to "UnknownUA".
fn simplify_user_agent(ua: &str) -> String {
    let simplified = ua
        .split('/')
        .next()
        .unwrap_or("")
        .split('(')
        .next()
        .unwrap_or("")
        .trim();
    if simplified.is_empty() {
        "UnknownUA".to_string()
    } else {
        simplified.to_string()
    }
}

fn slot_label(slot: i64) -> String {
    Utc.timestamp_opt(slot, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn boundary_label(ts: f64) -> String {
    Utc.timestamp_opt(ts as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default()
}

fn snippet(line: &str) -> String {
    line.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn log_line(ts: f64, host: &str, uri: &str, status: i64, ua: &str) -> String {
        format!(
            r#"{{"ts":{ts},"status":{status},"size":2048,"duration":0.25,"request":{{"host":"{host}","method":"GET","uri":"{uri}","headers":{{"User-Agent":["{ua}"]}}}}}}"#
        )
    }

    fn write_log(lines: &[String]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn missing_file_yields_zero_report() {
        let report = compute_stats(Path::new("/nonexistent/access.json.log"), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 0);
        assert!(report.requests_by_host.is_empty());
        assert!(report.top_paths.is_empty());
        assert!(report.requests_timeseries.is_empty());
        assert_eq!(report.avg_response_time_ms, 0.0);
        assert_eq!(report.error_rate_percent, 0.0);
        assert_eq!(report.data_from_utc, None);
        assert_eq!(report.data_to_utc, None);
        // The empty report still carries all six status buckets, zeroed.
        let dist = serde_json::to_value(&report.status_codes_dist).unwrap();
        let dist = dist.as_object().unwrap();
        assert_eq!(dist.len(), 6);
        for key in ["1xx", "2xx", "3xx", "4xx", "5xx", "other"] {
            assert_eq!(dist[key], 0, "bucket {key}");
        }
    }

    #[test]
    fn status_buckets_and_error_rate() {
        let file = write_log(&[
            log_line(1000.0, "a.example", "/", 200, "curl/8.0"),
            log_line(1010.0, "a.example", "/missing", 404, "curl/8.0"),
            log_line(1020.0, "a.example", "/boom", 500, "curl/8.0"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 3);
        assert_eq!(report.status_codes_dist.informational, 0);
        assert_eq!(report.status_codes_dist.success, 1);
        assert_eq!(report.status_codes_dist.redirect, 0);
        assert_eq!(report.status_codes_dist.client_error, 1);
        assert_eq!(report.status_codes_dist.server_error, 1);
        assert_eq!(report.status_codes_dist.other, 0);
        assert!((report.error_rate_percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn bucket_counts_sum_to_total() {
        let file = write_log(&[
            log_line(1000.0, "a", "/", 101, "x"),
            log_line(1001.0, "a", "/", 204, "x"),
            log_line(1002.0, "a", "/", 301, "x"),
            log_line(1003.0, "a", "/", 403, "x"),
            log_line(1004.0, "a", "/", 502, "x"),
            log_line(1005.0, "a", "/", 999, "x"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        let dist = &report.status_codes_dist;
        let sum = dist.informational
            + dist.success
            + dist.redirect
            + dist.client_error
            + dist.server_error
            + dist.other;
        assert_eq!(sum, report.total_requests);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let file = write_log(&[
            log_line(1000.0, "a.example", "/", 200, "curl/8.0"),
            "not-json".to_string(),
            log_line(1010.0, "a.example", "/", 200, "curl/8.0"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 2);
    }

    #[test]
    fn records_without_numeric_ts_are_dropped() {
        let file = write_log(&[
            r#"{"status":200}"#.to_string(),
            r#"{"ts":"yesterday","status":200}"#.to_string(),
            r#"{"ts":0,"status":200}"#.to_string(),
            log_line(1000.0, "a.example", "/", 200, "curl/8.0"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 1);
    }

    #[test]
    fn record_with_bad_field_type_is_dropped_individually() {
        let file = write_log(&[
            r#"{"ts":1000.0,"status":"not-a-number"}"#.to_string(),
            log_line(1010.0, "a.example", "/", 200, "curl/8.0"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 1);
        assert_eq!(report.status_codes_dist.success, 1);
    }

    #[test]
    fn numeric_strings_are_not_coerced() {
        // "404" is a string, not a number; the record is dropped.
        assert!(normalize(&serde_json::json!({ "ts": 1.0, "status": "404" })).is_none());
    }

    #[test]
    fn missing_fields_get_defaults() {
        let record = normalize(&serde_json::json!({ "ts": 1234.5 })).unwrap();
        assert_eq!(record.host, "Unknown");
        assert_eq!(record.method, "GET");
        assert_eq!(record.uri, "/");
        assert_eq!(record.user_agent, "Unknown");
        assert_eq!(record.status, 0);
        assert_eq!(record.size, 0);
        assert_eq!(record.duration, 0.0);
    }

    #[test]
    fn host_falls_back_to_top_level_field() {
        let record = normalize(&serde_json::json!({
            "ts": 1.0,
            "host": "fallback.example",
        }))
        .unwrap();
        assert_eq!(record.host, "fallback.example");
    }

    #[test]
    fn user_agent_simplification() {
        assert_eq!(simplify_user_agent("Mozilla/5.0 (Windows NT 10.0)"), "Mozilla");
        assert_eq!(simplify_user_agent("curl/8.0.1"), "curl");
        assert_eq!(simplify_user_agent("(weird)"), "UnknownUA");
        assert_eq!(simplify_user_agent("   "), "UnknownUA");
        assert_eq!(simplify_user_agent("Unknown"), "Unknown");
    }

    #[test]
    fn query_string_is_stripped_from_paths() {
        let file = write_log(&[
            log_line(1000.0, "a", "/search?q=one", 200, "x"),
            log_line(1001.0, "a", "/search?q=two", 200, "x"),
            log_line(1002.0, "a", "/other", 200, "x"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.top_paths[0].path, "/search");
        assert_eq!(report.top_paths[0].count, 2);
    }

    #[test]
    fn only_the_most_recent_tail_is_processed() {
        let mut lines = Vec::new();
        for i in 0..1000 {
            lines.push(log_line(1000.0 + i as f64, "old.example", "/", 200, "x"));
        }
        for i in 0..5000 {
            lines.push(log_line(10_000.0 + i as f64, "new.example", "/", 200, "x"));
        }
        let file = write_log(&lines);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.total_requests, 5000);
        assert_eq!(report.requests_by_host.len(), 1);
        assert_eq!(report.requests_by_host[0].host, "new.example");
        assert_eq!(report.requests_by_host[0].count, 5000);
    }

    #[test]
    fn timeseries_is_contiguous_and_gap_filled() {
        let file = write_log(&[
            log_line(600.0, "a", "/", 200, "x"),
            log_line(2405.0, "a", "/", 200, "x"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        let series = &report.requests_timeseries;
        assert_eq!(series.len(), 4);
        let counts: Vec<u64> = series.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![1, 0, 0, 1]);
        // UTC labels, 600s apart, pinned.
        assert_eq!(series[0].time, "1970-01-01 00:10");
        assert_eq!(series[1].time, "1970-01-01 00:20");
        assert_eq!(series[2].time, "1970-01-01 00:30");
        assert_eq!(series[3].time, "1970-01-01 00:40");
    }

    #[test]
    fn boundaries_are_utc_labels() {
        let file = write_log(&[
            log_line(60.0, "a", "/", 200, "x"),
            log_line(120.0, "a", "/", 200, "x"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.data_from_utc.as_deref(), Some("1970-01-01 00:01:00 UTC"));
        assert_eq!(report.data_to_utc.as_deref(), Some("1970-01-01 00:02:00 UTC"));
    }

    #[test]
    fn averages_from_duration_and_size() {
        let file = write_log(&[
            log_line(1000.0, "a", "/", 200, "x"),
            log_line(1001.0, "a", "/", 200, "x"),
        ]);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        // Each record carries duration 0.25s and size 2048 bytes.
        assert!((report.avg_response_time_ms - 250.0).abs() < 1e-9);
        assert!((report.avg_response_size_kb - 2.0).abs() < 1e-9);
    }

    #[test]
    fn top_k_ties_keep_discovery_order() {
        let mut counter = OrderedCounter::default();
        for key in ["b", "a", "c", "a"] {
            counter.incr(key);
        }
        let top = counter.top(3);
        assert_eq!(top[0], ("a".to_string(), 2));
        assert_eq!(top[1], ("b".to_string(), 1));
        assert_eq!(top[2], ("c".to_string(), 1));
    }

    #[test]
    fn host_histogram_is_capped_at_seven() {
        let mut lines = Vec::new();
        for i in 0..9 {
            lines.push(log_line(1000.0 + i as f64, &format!("h{i}.example"), "/", 200, "x"));
        }
        let file = write_log(&lines);
        let report = compute_stats(file.path(), MAX_LOG_RECORDS);
        assert_eq!(report.requests_by_host.len(), 7);
    }
}
