//! Concurrent query benchmark.
//!
//! A fixed operation count is split across a pool of workers. Each worker
//! owns one connection for its whole lifetime and issues strictly
//! synchronous request/reply pairs. Workers share nothing but the
//! completion counter and the latency recorder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::debug;

use crate::conn::Connection;
use crate::error::{ClientError, Result};
use crate::report::ThroughputSample;

/// The fan-out: how many operations, over how many workers.
#[derive(Debug, Clone, Copy)]
pub struct QueryJob {
    pub total_ops: usize,
    pub workers: usize,
}

impl QueryJob {
    /// Deterministic near-even partition. The first `total_ops % workers`
    /// workers take one extra operation; the shares always sum exactly to
    /// `total_ops`.
    pub fn shares(&self) -> Result<Vec<usize>> {
        if self.workers == 0 {
            return Err(ClientError::Config("worker count must be > 0".into()));
        }
        let base = self.total_ops / self.workers;
        let extra = self.total_ops % self.workers;
        Ok((0..self.workers)
            .map(|w| base + usize::from(w < extra))
            .collect())
    }
}

/// Uniform query coordinates: latitude in [-90, 90), longitude in [-180, 180).
pub fn random_point<R: Rng>(rng: &mut R) -> (f64, f64) {
    let lat = rng.gen::<f64>() * 180.0 - 90.0;
    let lon = rng.gen::<f64>() * 360.0 - 180.0;
    (lat, lon)
}

/// Per-operation wall times, recorded by every worker, summarized once at
/// the end of the run.
#[derive(Default, Clone)]
pub struct LatencyStats {
    samples: Arc<Mutex<Vec<u64>>>,
}

impl LatencyStats {
    pub fn record(&self, nanos: u64) {
        self.samples.lock().push(nanos);
    }

    pub fn summarize(&self) -> Option<LatencySummary> {
        let mut samples = self.samples.lock().clone();
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let len = samples.len();
        let pct = |p: f64| samples[((p / 100.0) * (len as f64 - 1.0)).round() as usize];
        let sum: u128 = samples.iter().map(|&ns| ns as u128).sum();
        Some(LatencySummary {
            min_ns: samples[0],
            p50_ns: pct(50.0),
            p90_ns: pct(90.0),
            p95_ns: pct(95.0),
            p99_ns: pct(99.0),
            max_ns: samples[len - 1],
            avg_ns: (sum / len as u128) as u64,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySummary {
    pub min_ns: u64,
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub avg_ns: u64,
}

impl LatencySummary {
    /// One-line rendering in microseconds.
    pub fn render(&self) -> String {
        let us = |ns: u64| ns as f64 / 1000.0;
        format!(
            "latency (us): min {:.1} p50 {:.1} p90 {:.1} p95 {:.1} p99 {:.1} max {:.1} avg {:.1}",
            us(self.min_ns),
            us(self.p50_ns),
            us(self.p90_ns),
            us(self.p95_ns),
            us(self.p99_ns),
            us(self.max_ns),
            us(self.avg_ns)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryReport {
    pub sample: ThroughputSample,
    pub latency: Option<LatencySummary>,
}

/// Run `job.total_ops` randomized radius queries against `collection`,
/// spread across `job.workers` workers.
///
/// Every worker connects on its own, switches its session to JSON output,
/// and works through its share. The first failing reply or transport fault
/// aborts the remaining workers and surfaces the error; on success the
/// reported completed count equals `job.total_ops` exactly.
pub async fn run(
    addr: &str,
    job: QueryJob,
    collection: &str,
    radius_m: f64,
) -> Result<QueryReport> {
    let shares = job.shares()?;
    let completed = Arc::new(AtomicU64::new(0));
    let latency = LatencyStats::default();
    let start = Instant::now();

    let mut tasks: JoinSet<Result<()>> = JoinSet::new();
    for (worker, share) in shares.into_iter().enumerate() {
        if share == 0 {
            continue;
        }
        let addr = addr.to_string();
        let collection = collection.to_string();
        let completed = Arc::clone(&completed);
        let latency = latency.clone();
        tasks.spawn(async move {
            let mut conn = Connection::connect(&addr).await?;
            conn.do_command(&["OUTPUT", "json"]).await?;
            debug!(worker, share, "query worker started");
            let radius = radius_m.to_string();
            for _ in 0..share {
                let (lat, lon) = random_point(&mut rand::thread_rng());
                let lat = lat.to_string();
                let lon = lon.to_string();
                let op_start = Instant::now();
                let reply = conn
                    .do_command(&["WITHIN", &collection, "COUNT", "CIRCLE", &lat, &lon, &radius])
                    .await?;
                latency.record(op_start.elapsed().as_nanos() as u64);
                let body = reply.into_json()?;
                if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                    return Err(ClientError::Semantic(format!(
                        "within query failed: {body}"
                    )));
                }
                completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tasks.abort_all();
                return Err(err);
            }
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => {}
        }
    }

    let sample = ThroughputSample::new(completed.load(Ordering::Relaxed) as usize, start.elapsed());
    Ok(QueryReport {
        sample,
        latency: latency.summarize(),
    })
}
