//! `Server-Timing` header parsing.
//!
//! Only the `dur` parameter of each metric is kept. Metrics without a numeric
//! `dur` are skipped, and a metric repeated within the same response keeps its
//! last value.
use std::collections::BTreeMap;

/// Parses one or more `Server-Timing` values (already joined with `,` when the
/// header was repeated) into `name -> duration ms`.
pub fn parse_server_timing(value: &str) -> BTreeMap<String, f64> {
    let mut timings = BTreeMap::new();

    for metric in value.split(',') {
        let mut parts = metric.split(';').map(str::trim);
        let Some(name) = parts.next().filter(|n| !n.is_empty()) else {
            continue;
        };

        let dur = parts.find_map(|param| {
            let (key, value) = param.split_once('=')?;
            if !key.trim().eq_ignore_ascii_case("dur") {
                return None;
            }
            value.trim().trim_matches('"').parse::<f64>().ok()
        });

        if let Some(dur) = dur.filter(|d| d.is_finite()) {
            timings.insert(name.to_string(), dur);
        }
    }

    timings
}

/// Joins every occurrence of the header into a single value.
pub(crate) fn from_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, f64> {
    let joined = headers
        .get_all("server-timing")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    parse_server_timing(&joined)
}
