//! Append-only result log with an in-memory index keyed by frame id.
//!
//! The JSONL log is the durable record: one `FrameRecord` per line, never
//! rewritten. Re-saving a frame appends another line; replaying the log in file
//! order means the last line for a frame wins.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::detect::FrameRecord;
use crate::error::{MillError, Result};

pub trait ResultStore {
    /// Index `record` (replacing any prior record for its frame) and persist it.
    fn save(&mut self, record: &FrameRecord) -> Result<()>;

    fn get(&self, frame_id: u64) -> Option<&FrameRecord>;

    /// Rebuild the index from the backing log. Returns the number of indexed frames.
    fn load(&mut self) -> Result<usize>;

    /// Drop every record, including the backing log.
    fn clear(&mut self) -> Result<()>;

    fn len(&self) -> usize;

    /// Indexed frame ids in ascending order.
    fn frame_ids(&self) -> Vec<u64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn contains(&self, frame_id: u64) -> bool {
        self.get(frame_id).is_some()
    }

    /// Number of consecutive frames stored from frame 0.
    fn contiguous_prefix_len(&self) -> u64 {
        let mut next = 0u64;
        for id in self.frame_ids() {
            if id != next {
                break;
            }
            next += 1;
        }
        next
    }
}

/// File-backed store writing one JSON object per line.
pub struct JsonlResultStore {
    path: PathBuf,
    index: BTreeMap<u64, FrameRecord>,
    /// The log ends in a partial line (e.g. an interrupted write).
    needs_newline: bool,
    malformed: usize,
}

impl JsonlResultStore {
    /// Open the log at `path`, replaying it if it already exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self {
            path: path.into(),
            index: BTreeMap::new(),
            needs_newline: false,
            malformed: 0,
        };
        if store.path.exists() {
            let count = store.load()?;
            log::info!("loaded {} frame records from {}", count, store.path.display());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines skipped by the last `load`.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    /// Records in ascending frame order.
    pub fn iter(&self) -> impl Iterator<Item = &FrameRecord> {
        self.index.values()
    }

    fn append_line(&mut self, line: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut buf = String::with_capacity(line.len() + 2);
        if self.needs_newline {
            buf.push('\n');
        }
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        self.needs_newline = false;
        Ok(())
    }
}

impl ResultStore for JsonlResultStore {
    fn save(&mut self, record: &FrameRecord) -> Result<()> {
        let line = serde_json::to_string(record).map_err(|e| {
            MillError::InvalidInput(format!("frame {} is not serializable: {}", record.frame_id, e))
        })?;
        self.append_line(&line)
            .map_err(|e| MillError::store_io(&self.path, e))?;
        self.index.insert(record.frame_id, record.clone());
        Ok(())
    }

    fn get(&self, frame_id: u64) -> Option<&FrameRecord> {
        self.index.get(&frame_id)
    }

    fn load(&mut self) -> Result<usize> {
        self.index.clear();
        self.needs_newline = false;
        self.malformed = 0;
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MillError::store_io(&self.path, e)),
        };

        let mut skipped = 0usize;
        for (lineno, line) in bytes.split(|b| *b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice::<FrameRecord>(line) {
                Ok(record) => {
                    self.index.insert(record.frame_id, record);
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!(
                        "skipping malformed line {} in {}: {}",
                        lineno + 1,
                        self.path.display(),
                        e
                    );
                }
            }
        }
        self.needs_newline = bytes.last().is_some_and(|b| *b != b'\n');
        self.malformed = skipped;
        if skipped > 0 {
            log::warn!("{} malformed lines ignored in {}", skipped, self.path.display());
        }
        Ok(self.index.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.index.clear();
        self.needs_newline = false;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("cleared result log {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MillError::store_io(&self.path, e)),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn frame_ids(&self) -> Vec<u64> {
        self.index.keys().copied().collect()
    }
}

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct InMemoryResultStore {
    index: BTreeMap<u64, FrameRecord>,
    /// Every save in order, mirroring the lines a log would hold.
    saves: Vec<FrameRecord>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total saves, counting re-saves of the same frame.
    pub fn save_count(&self) -> usize {
        self.saves.len()
    }
}

impl ResultStore for InMemoryResultStore {
    fn save(&mut self, record: &FrameRecord) -> Result<()> {
        self.saves.push(record.clone());
        self.index.insert(record.frame_id, record.clone());
        Ok(())
    }

    fn get(&self, frame_id: u64) -> Option<&FrameRecord> {
        self.index.get(&frame_id)
    }

    fn load(&mut self) -> Result<usize> {
        self.index.clear();
        for record in &self.saves {
            self.index.insert(record.frame_id, record.clone());
        }
        Ok(self.index.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.index.clear();
        self.saves.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn frame_ids(&self) -> Vec<u64> {
        self.index.keys().copied().collect()
    }
}
