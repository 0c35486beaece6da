//! Console entry point: bulk-load the point dataset, then benchmark random
//! radius queries, then report server memory statistics.
//!
//! Usage: geobench [--addr 127.0.0.1:9851] [--noset]

use std::env;
use std::path::Path;
use std::thread;

use geobench::bench::{self, QueryJob};
use geobench::dataset;
use geobench::loader::{self, BATCH_CAPACITY};
use geobench::report::{commaize, ThroughputSample};
use geobench::stats;
use geobench::Connection;

const COLLECTION: &str = "geonames";
const ARCHIVE_PATH: &str = "geonames.bin.gz";
const DUMP_PATH: &str = "allCountries.txt";
const QUERY_COUNT: usize = 10_000;
const QUERY_RADIUS_M: f64 = 10_000.0;

struct Args {
    addr: String,
    noset: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        addr: "127.0.0.1:9851".into(),
        noset: false,
    };
    let mut it = env::args().skip(1);
    while let Some(flag) = it.next() {
        match flag.as_str() {
            "--addr" => {
                if let Some(v) = it.next() {
                    args.addr = v;
                }
            }
            "--noset" => args.noset = true,
            _ => {}
        }
    }
    args
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = parse_args();

    println!("Connecting to server at {}...", args.addr);
    let mut conn = Connection::connect(&args.addr).await?;

    if !args.noset {
        let mut records = load_records()?;
        println!("Shuffling points...");
        dataset::shuffle_records(&mut records);
        println!("Setting points into {}...", COLLECTION);
        let report =
            loader::load_points(&mut conn, COLLECTION, &records, BATCH_CAPACITY).await?;
        let sample = ThroughputSample::new(report.loaded, report.elapsed);
        println!("{}", sample.summary("points"));
    }

    // Switch the loader connection to JSON output for the admin commands;
    // the reply value itself is uninteresting.
    conn.do_command(&["OUTPUT", "json"]).await?;

    let workers = thread::available_parallelism().map(usize::from).unwrap_or(1);
    println!(
        "Sending {} random 10km within queries over {} workers...",
        commaize(QUERY_COUNT as u64),
        workers
    );
    let job = QueryJob {
        total_ops: QUERY_COUNT,
        workers,
    };
    let report = bench::run(&args.addr, job, COLLECTION, QUERY_RADIUS_M).await?;
    println!("{}", report.sample.summary("queries"));
    if let Some(latency) = report.latency {
        println!("{}", latency.render());
    }

    let mem = stats::fetch_memory_stats(&mut conn).await?;
    println!("Heap Size: {} MB", commaize(mem.heap_mb()));
    println!("Avg Item: {} bytes", commaize(mem.avg_item_size));
    Ok(())
}

/// Read the point archive, building it from the raw dump first if needed.
fn load_records() -> anyhow::Result<Vec<dataset::PointRecord>> {
    let archive = Path::new(ARCHIVE_PATH);
    if !archive.exists() {
        let dump = Path::new(DUMP_PATH);
        if !dump.exists() {
            anyhow::bail!(
                "neither {ARCHIVE_PATH} nor {DUMP_PATH} found; download the \
                 GeoNames allCountries dump and place {DUMP_PATH} here"
            );
        }
        println!("Building {ARCHIVE_PATH} from {DUMP_PATH}...");
        dataset::build_archive(dump, archive)?;
    }
    println!("Reading points from {ARCHIVE_PATH} into memory...");
    dataset::read_archive(archive)
}
