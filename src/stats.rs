//! Administrative tail of a run: force a memory reclamation pass, then
//! fetch server statistics and pull out the two fields worth showing.

use serde_json::Value;

use crate::conn::Connection;
use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStats {
    /// Resident heap size in bytes.
    pub heap_size: u64,
    /// Average stored-item size in bytes.
    pub avg_item_size: u64,
}

impl MemoryStats {
    pub fn heap_mb(&self) -> u64 {
        self.heap_size / 1024 / 1024
    }
}

/// Ask the server to reclaim memory, then fetch its statistics. The
/// connection must already be in JSON output mode. No retries; any failure
/// is fatal and reported to the caller.
pub async fn fetch_memory_stats(conn: &mut Connection) -> Result<MemoryStats> {
    conn.do_command(&["GC"]).await?;
    let reply = conn.do_command(&["SERVER"]).await?;
    let body = reply.into_json()?;
    extract_stats(&body)
}

fn extract_stats(body: &Value) -> Result<MemoryStats> {
    let heap_size = numeric_field(body, "/stats/heap_size")?;
    let avg_item_size = numeric_field(body, "/stats/avg_item_size")?;
    Ok(MemoryStats {
        heap_size,
        avg_item_size,
    })
}

fn numeric_field(body: &Value, pointer: &str) -> Result<u64> {
    body.pointer(pointer)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .ok_or_else(|| {
            ClientError::Semantic(format!(
                "server stats reply is missing numeric field {pointer}: {body}"
            ))
        })
}
