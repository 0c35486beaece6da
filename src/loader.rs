//! Pipelined bulk loader.
//!
//! Ingest runs on one connection, single-task. Commands are buffered in
//! batches; each batch is flushed and then exactly as many replies are
//! drained as commands were sent, in order, before the next batch begins.

use std::io::{self, Write};
use std::time::Instant;

use tracing::debug;

use crate::conn::Connection;
use crate::dataset::PointRecord;
use crate::error::{ClientError, Result};
use crate::report::commaize;
use crate::resp::Reply;

/// Commands sent between drains.
pub const BATCH_CAPACITY: usize = 2321;

/// Status the server answers a successful point write with.
const SET_OK: &str = "OK";

#[derive(Debug, Clone, Copy)]
pub struct LoadReport {
    pub loaded: usize,
    pub batches: usize,
    pub elapsed: std::time::Duration,
}

/// Load every record into `collection`, in order, using pipelined writes.
///
/// Any non-`OK` reply or transport fault aborts immediately; there is no
/// partial-batch retry. An empty record slice is a successful no-op.
pub async fn load_points(
    conn: &mut Connection,
    collection: &str,
    records: &[PointRecord],
    batch_capacity: usize,
) -> Result<LoadReport> {
    if batch_capacity == 0 {
        return Err(ClientError::Config("batch capacity must be > 0".into()));
    }
    let start = Instant::now();
    let total_records = records.len();
    let mut in_flight = 0usize;
    let mut loaded = 0usize;
    let mut batches = 0usize;

    for (i, record) in records.iter().enumerate() {
        let lat = record.latitude.to_string();
        let lon = record.longitude.to_string();
        conn.send_command(&["SET", collection, &record.id, "POINT", &lat, &lon])
            .await?;
        in_flight += 1;

        // Drain at capacity, and at the last record even when the final
        // batch is short.
        if in_flight == batch_capacity || i == total_records - 1 {
            drain_batch(conn, in_flight).await?;
            loaded += in_flight;
            batches += 1;
            debug!(loaded, total_records, batches, "batch drained");
            print!("\r{} / {} ", commaize(loaded as u64), commaize(total_records as u64));
            io::stdout().flush().ok();
            in_flight = 0;
        }
    }
    if batches > 0 {
        println!();
    }

    Ok(LoadReport {
        loaded,
        batches,
        elapsed: start.elapsed(),
    })
}

/// Flush the outstanding commands, then consume exactly one reply each.
/// Reply order matches command order, so the first non-`OK` reply names the
/// failing write.
async fn drain_batch(conn: &mut Connection, count: usize) -> Result<()> {
    conn.flush().await?;
    for _ in 0..count {
        match conn.receive_reply().await? {
            Reply::Simple(ref status) if status == SET_OK => {}
            other => {
                return Err(ClientError::Semantic(format!(
                    "expected '{SET_OK}', got '{other}'"
                )))
            }
        }
    }
    Ok(())
}
