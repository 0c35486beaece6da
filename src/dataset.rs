//! Point-record source: the compressed `id,latitude,longitude` archive, and
//! the conversion from the raw tab-separated dump that produces it.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use rand::seq::SliceRandom;

/// One point to load. Out-of-range coordinates are forwarded to the server
/// as-is; only the textual shape of a record is validated here.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl PointRecord {
    fn parse_line(line: &str) -> anyhow::Result<Self> {
        let mut cols = line.splitn(3, ',');
        let id = cols.next().unwrap_or("");
        let lat = cols.next().unwrap_or("");
        let lon = cols.next().unwrap_or("");
        if id.is_empty() {
            bail!("record line '{line}' has an empty id");
        }
        let latitude: f64 = lat
            .parse()
            .with_context(|| format!("record '{id}': bad latitude '{lat}'"))?;
        let longitude: f64 = lon
            .parse()
            .with_context(|| format!("record '{id}': bad longitude '{lon}'"))?;
        Ok(Self {
            id: id.to_string(),
            latitude,
            longitude,
        })
    }
}

/// Read the gzip point archive into memory. The archive ends with a
/// newline, so the final empty line is dropped rather than parsed.
pub fn read_archive(path: &Path) -> anyhow::Result<Vec<PointRecord>> {
    let raw = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut text = String::new();
    GzDecoder::new(&raw[..])
        .read_to_string(&mut text)
        .with_context(|| format!("decompressing {}", path.display()))?;
    let mut records = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        records.push(PointRecord::parse_line(line)?);
    }
    Ok(records)
}

/// Convert the raw tab-separated dump into the compressed archive: id at
/// column 0, latitude at column 4, longitude at column 5, stopping at the
/// first blank line. Written to a temp path and renamed into place so a
/// failed build never leaves a half-written archive behind.
pub fn build_archive(source: &Path, dest: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(source).with_context(|| format!("reading {}", source.display()))?;
    let tmp = dest.with_extension("tmp");
    let result = write_compressed(&raw, &tmp).and_then(|()| {
        fs::rename(&tmp, dest).with_context(|| format!("renaming into {}", dest.display()))
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_compressed(raw: &str, tmp: &Path) -> anyhow::Result<()> {
    let file = File::create(tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::best());
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 6 {
            bail!("dump line has {} columns, expected at least 6", cols.len());
        }
        writeln!(encoder, "{},{},{}", cols[0], cols[4], cols[5])?;
    }
    let mut inner = encoder.finish().context("finishing gzip stream")?;
    inner.flush().context("flushing archive")?;
    Ok(())
}

/// Uniformly shuffle the record order in place. The loader sends records in
/// the order given, so the shuffle happens once, up front.
pub fn shuffle_records(records: &mut [PointRecord]) {
    records.shuffle(&mut rand::thread_rng());
}
