//! Reduction of collected samples into an [`AggregatedSummary`].
//!
//! Percentiles interpolate linearly between closest ranks. Every average or
//! percentile over an empty set is `None`, never `0`.
use crate::collector::Collected;
use bakeoff_core::{
    AggregatedSummary, ConnectionStats, IterationStats, LatencyBreakdown, LatencyStats,
    RequestSample, RunConfig, StatusClass, ThresholdReport, Thresholds, Throughput, TimingStats,
    Totals,
};
use std::collections::BTreeMap;
use std::time::Duration;

pub fn summarize(collected: &Collected, config: &RunConfig) -> AggregatedSummary {
    let samples = &collected.samples;
    let totals = totals(samples);
    let latency_ms = latency(samples);
    let thresholds = evaluate(&config.thresholds, &totals, &latency_ms);

    let mut debug_samples = collected.debug_samples.clone();
    debug_samples.truncate(config.debug.max_samples);

    AggregatedSummary {
        throughput: throughput(&totals, config.concurrency.duration()),
        latency_breakdown_ms: LatencyBreakdown {
            sending: mean(samples.iter().filter_map(|s| s.phases.sending)),
            waiting: mean(samples.iter().filter_map(|s| s.phases.waiting)),
            receiving: mean(samples.iter().filter_map(|s| s.phases.receiving)),
        },
        connection_ms: ConnectionStats {
            blocked: mean(samples.iter().filter_map(|s| s.phases.blocked)),
            connecting: mean(samples.iter().filter_map(|s| s.phases.connecting)),
            tls_handshaking: mean(samples.iter().filter_map(|s| s.phases.tls_handshaking)),
        },
        iteration_duration_ms: iterations(samples),
        server_timing_ms: server_timing(samples),
        totals,
        latency_ms,
        thresholds,
        samples: debug_samples,
    }
}

fn totals(samples: &[RequestSample]) -> Totals {
    let mut totals = Totals {
        http_reqs: samples.len() as u64,
        ..Default::default()
    };

    let mut failed = 0u64;
    for sample in samples {
        totals.data_received += sample.bytes_received;
        totals.data_sent += sample.bytes_sent;
        if !sample.success {
            failed += 1;
        }
        match sample.class() {
            StatusClass::Success => totals.status_2xx += 1,
            StatusClass::Redirect => totals.status_3xx += 1,
            StatusClass::ClientError => totals.status_4xx += 1,
            StatusClass::ServerError => totals.status_5xx += 1,
        }
    }

    if totals.http_reqs > 0 {
        totals.http_req_failed = failed as f64 / totals.http_reqs as f64;
    }
    totals
}

fn latency(samples: &[RequestSample]) -> LatencyStats {
    let sorted = sorted(samples.iter().map(|s| s.duration_ms));
    LatencyStats {
        avg: mean(sorted.iter().copied()),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
        p50: percentile(&sorted, 50.),
        p90: percentile(&sorted, 90.),
        p95: percentile(&sorted, 95.),
        p99: percentile(&sorted, 99.),
    }
}

fn iterations(samples: &[RequestSample]) -> IterationStats {
    let sorted = sorted(samples.iter().filter_map(|s| s.iteration_ms));
    IterationStats {
        avg: mean(sorted.iter().copied()),
        min: sorted.first().copied(),
        max: sorted.last().copied(),
    }
}

fn server_timing(samples: &[RequestSample]) -> BTreeMap<String, TimingStats> {
    let mut by_name: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        for (name, dur) in &sample.server_timing {
            by_name.entry(name.as_str()).or_default().push(*dur);
        }
    }

    by_name
        .into_iter()
        .filter_map(|(name, values)| {
            let sorted = sorted(values.into_iter());
            let stats = TimingStats {
                avg: mean(sorted.iter().copied())?,
                p95: percentile(&sorted, 95.)?,
            };
            Some((name.to_string(), stats))
        })
        .collect()
}

fn throughput(totals: &Totals, window: Option<Duration>) -> Throughput {
    let est_rps = window
        .map(|w| w.as_secs_f64())
        .filter(|secs| *secs > 0.)
        .map(|secs| round_to(totals.http_reqs as f64 / secs, 2));

    let avg_bytes_per_req = (totals.http_reqs > 0)
        .then(|| round_to(totals.data_received as f64 / totals.http_reqs as f64, 1));

    Throughput {
        est_rps,
        avg_bytes_per_req,
    }
}

fn evaluate(thresholds: &Thresholds, totals: &Totals, latency: &LatencyStats) -> ThresholdReport {
    let p95_ok = latency.p95.map_or(true, |p95| p95 < thresholds.p95_ms);
    let failure_rate_ok = totals.http_req_failed < thresholds.max_failure_rate;

    ThresholdReport {
        enforced: thresholds.enforce,
        p95_limit_ms: thresholds.p95_ms,
        max_failure_rate: thresholds.max_failure_rate,
        p95_ok,
        failure_rate_ok,
        passed: p95_ok && failure_rate_ok,
    }
}

fn sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    values.sort_by(f64::total_cmp);
    values
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0., 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// `p` in `[0, 100]` over an ascending slice.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.).clamp(0., 1.) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
