//! Tick recorder for offline replay of the depth model.
//!
//! [`TickRecorder`] appends every depth update the engine accepted to a JSON Lines file, one
//! [`RecordedTick`] per line. Updates that completed a spread row also carry the spread of
//! every ordered pair as the engine saw it, so a replay through [`replay`] into a fresh
//! [`DepthTable`] can be checked row by row against what the engine traded on.
//!
//! Enable via `RECORD_TICKS=true`.

use crate::error::EngineError;
use calendar_data::{books::MarketDepth, depth::DepthTable};
use calendar_instrument::{InstrumentId, InstrumentPair};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};

/// Default number of ticks buffered between flushes.
pub const DEFAULT_FLUSH_INTERVAL: u32 = 100;

/// Latest spread `ask(long) - bid(short)` of one ordered pair.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct RecordedSpread {
    pub pair: InstrumentPair,
    pub spread: Decimal,
}

/// One accepted depth update.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordedTick {
    pub instrument: InstrumentId,
    pub depth: MarketDepth,
    /// Empty unless the update completed a spread row.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spreads: Vec<RecordedSpread>,
}

impl RecordedTick {
    pub fn appended(&self) -> bool {
        !self.spreads.is_empty()
    }
}

/// Appends accepted depth updates and the spread rows they produced to a JSON Lines file.
#[derive(Debug)]
pub struct TickRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    flush_interval: u32,
    unflushed: u32,
    ticks: u64,
    rows: u64,
}

impl TickRecorder {
    /// Create (or truncate) the recording at `path`, flushing every `flush_interval` ticks.
    pub fn create(path: impl Into<PathBuf>, flush_interval: u32) -> Result<Self, EngineError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        info!(?path, flush_interval, "tick recorder initialised");

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            flush_interval: flush_interval.max(1),
            unflushed: 0,
            ticks: 0,
            rows: 0,
        })
    }

    /// Create from environment variables.
    ///
    /// Returns `Some` if `RECORD_TICKS=true`, writing `ticks_<utc timestamp>.jsonl` under:
    /// - `RECORD_DIR` (default: `./recordings`)
    /// - `RECORD_FLUSH_INTERVAL` (default: [`DEFAULT_FLUSH_INTERVAL`])
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("RECORD_TICKS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if !enabled {
            return None;
        }

        let flush_interval = std::env::var("RECORD_FLUSH_INTERVAL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL);
        let dir = std::env::var("RECORD_DIR").unwrap_or_else(|_| "./recordings".to_string());
        let file = format!("ticks_{}.jsonl", Utc::now().format("%Y%m%dT%H%M%S"));

        match Self::create(Path::new(&dir).join(file), flush_interval) {
            Ok(recorder) => Some(recorder),
            Err(error) => {
                error!(%dir, %error, "failed to create tick recording, recording disabled");
                None
            }
        }
    }

    /// Record an update `table` accepted. `appended` is the result of applying it.
    pub fn on_tick(
        &mut self,
        instrument: &InstrumentId,
        depth: &MarketDepth,
        table: &DepthTable,
        pairs: &[InstrumentPair],
        appended: bool,
    ) {
        let spreads = if appended {
            latest_spreads(table, pairs)
        } else {
            Vec::new()
        };
        let tick = RecordedTick {
            instrument: instrument.clone(),
            depth: depth.clone(),
            spreads,
        };

        if let Err(error) = self.write(&tick) {
            warn!(%instrument, ?error, "failed to record tick");
            return;
        }
        self.ticks += 1;
        if tick.appended() {
            self.rows += 1;
        }

        self.unflushed += 1;
        if self.unflushed >= self.flush_interval {
            self.flush();
        }
    }

    fn write(&mut self, tick: &RecordedTick) -> Result<(), EngineError> {
        serde_json::to_writer(&mut self.writer, tick)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn flush(&mut self) {
        match self.writer.flush() {
            Ok(()) => {
                debug!(path = ?self.path, ticks = self.ticks, rows = self.rows, "tick recording flushed");
                self.unflushed = 0;
            }
            Err(error) => error!(path = ?self.path, %error, "failed to flush tick recording"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ticks recorded so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Recorded ticks that completed a spread row.
    pub fn rows(&self) -> u64 {
        self.rows
    }
}

impl Drop for TickRecorder {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Latest spread of every pair with a row in `table`.
fn latest_spreads(table: &DepthTable, pairs: &[InstrumentPair]) -> Vec<RecordedSpread> {
    pairs
        .iter()
        .filter_map(|pair| {
            table
                .spread(&pair.long, &pair.short)
                .ok()
                .map(|spread| RecordedSpread {
                    pair: pair.clone(),
                    spread,
                })
        })
        .collect()
}

/// Read a recording written by [`TickRecorder`]. Blank lines are skipped.
pub fn read_ticks(path: impl AsRef<Path>) -> Result<Vec<RecordedTick>, EngineError> {
    let reader = BufReader::new(File::open(path)?);
    let mut ticks = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        ticks.push(serde_json::from_str(&line)?);
    }
    Ok(ticks)
}

/// Apply recorded ticks to `table`, returning the spread row each appending tick produced.
///
/// Rows are computed for `pairs` from the replayed table, not copied from the recording.
pub fn replay(
    table: &mut DepthTable,
    pairs: &[InstrumentPair],
    ticks: impl IntoIterator<Item = RecordedTick>,
) -> Result<Vec<Vec<RecordedSpread>>, EngineError> {
    let mut rows = Vec::new();
    for tick in ticks {
        if table.apply(&tick.instrument, tick.depth)? {
            rows.push(latest_spreads(table, pairs));
        }
    }
    Ok(rows)
}
