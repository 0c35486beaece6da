//! In-process stub of the geospatial server, for integration tests.
//!
//! Speaks just enough of the wire protocol for the client under test:
//! SET answers with an `OK` status, WITHIN / GC / SERVER answer with JSON
//! bulk bodies, OUTPUT answers `OK`. Commands are counted so tests can
//! assert how much the client actually sent, and a single bad reply can be
//! injected at a chosen command index.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use geobench::resp::{self, Reply};

pub struct StubOptions {
    /// Answer the nth SET (0-based) with a status other than `OK`.
    pub fail_set_at: Option<usize>,
    /// Answer the nth WITHIN (0-based) with `"ok":false`.
    pub fail_within_at: Option<usize>,
    pub heap_size: u64,
    pub avg_item_size: u64,
}

impl Default for StubOptions {
    fn default() -> Self {
        Self {
            fail_set_at: None,
            fail_within_at: None,
            heap_size: 134_217_728,
            avg_item_size: 96,
        }
    }
}

#[derive(Default)]
pub struct StubCounters {
    pub sets: AtomicUsize,
    pub withins: AtomicUsize,
}

impl StubCounters {
    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn withins(&self) -> usize {
        self.withins.load(Ordering::SeqCst)
    }
}

/// Bind on an ephemeral port and serve until the test ends.
pub async fn spawn(options: StubOptions) -> (SocketAddr, Arc<StubCounters>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let counters = Arc::new(StubCounters::default());
    let options = Arc::new(options);
    let served = Arc::clone(&counters);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(serve_client(
                socket,
                Arc::clone(&options),
                Arc::clone(&served),
            ));
        }
    });
    (addr, counters)
}

async fn serve_client(socket: TcpStream, options: Arc<StubOptions>, counters: Arc<StubCounters>) {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    loop {
        let request = match resp::read_reply(&mut reader).await {
            Ok(value) => value,
            Err(_) => return,
        };
        let Some(args) = command_args(request) else {
            let _ = write_half.write_all(b"-ERR bad request\r\n").await;
            return;
        };
        let response = respond(&args, &options, &counters);
        if write_half.write_all(&response).await.is_err() {
            return;
        }
    }
}

fn respond(args: &[String], options: &StubOptions, counters: &StubCounters) -> Vec<u8> {
    let command = args.first().map(|c| c.to_ascii_uppercase()).unwrap_or_default();
    match command.as_str() {
        "SET" => {
            let n = counters.sets.fetch_add(1, Ordering::SeqCst);
            if options.fail_set_at == Some(n) {
                b"+NOPE\r\n".to_vec()
            } else {
                b"+OK\r\n".to_vec()
            }
        }
        "OUTPUT" => b"+OK\r\n".to_vec(),
        "WITHIN" => {
            let n = counters.withins.fetch_add(1, Ordering::SeqCst);
            if options.fail_within_at == Some(n) {
                bulk(r#"{"ok":false,"err":"injected failure"}"#)
            } else {
                bulk(r#"{"ok":true,"count":0}"#)
            }
        }
        "GC" => bulk(r#"{"ok":true}"#),
        "SERVER" => bulk(&format!(
            r#"{{"ok":true,"stats":{{"heap_size":{},"avg_item_size":{},"num_points":0}}}}"#,
            options.heap_size, options.avg_item_size
        )),
        _ => b"-ERR unknown command\r\n".to_vec(),
    }
}

fn bulk(body: &str) -> Vec<u8> {
    format!("${}\r\n{}\r\n", body.len(), body).into_bytes()
}

fn command_args(request: Reply) -> Option<Vec<String>> {
    match request {
        Reply::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(arg) => Some(arg),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

/// Synthetic records for load tests.
pub fn make_records(count: usize) -> Vec<geobench::dataset::PointRecord> {
    (0..count)
        .map(|i| geobench::dataset::PointRecord {
            id: format!("p{i}"),
            latitude: (i % 180) as f64 - 90.0,
            longitude: (i % 360) as f64 - 180.0,
        })
        .collect()
}
