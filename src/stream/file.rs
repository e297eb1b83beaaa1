//! Segmented on-disk append log.
//!
//! Entries are bincode-encoded and length-prefixed (u32, little endian) in
//! segment files named `segment_<id>.log`. A segment is sealed once it
//! reaches the configured size and a new one is opened. On open, existing
//! segments are scanned to recover the next segment id and per-topic offsets,
//! so offsets keep increasing across restarts.
//!
//! A failed append never leaves a partial frame in front of later entries:
//! the write is cut back and the next append rolls to a fresh segment. A
//! partial frame at the end of a segment (crash mid-write) is dropped on read.

use super::{LogClient, StreamRecord};
use crate::core::error::{StreamError, StreamResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A single persisted entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Offset within the topic.
    pub offset: u64,
    /// Topic.
    pub topic: String,
    /// Partition key.
    pub key: u64,
    /// Payload.
    pub value: Vec<u8>,
    /// JSON-encoded metadata.
    pub metadata: String,
    /// Client that appended the entry.
    pub client_id: String,
    /// Wall-clock append time (diagnostics only).
    pub timestamp_ms: u64,
}

impl LogEntry {
    /// Serialize this entry to bytes.
    pub fn serialize(&self) -> StreamResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StreamError::Encode {
            message: e.to_string(),
        })
    }

    /// Deserialize an entry from bytes.
    pub fn deserialize(bytes: &[u8]) -> StreamResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StreamError::Io {
            message: format!("corrupt log entry: {}", e),
        })
    }

    /// Decode the metadata back into JSON.
    pub fn metadata_json(&self) -> StreamResult<serde_json::Value> {
        serde_json::from_str(&self.metadata).map_err(|e| StreamError::Encode {
            message: e.to_string(),
        })
    }
}

#[derive(Debug)]
struct SegmentState {
    id: u64,
    path: PathBuf,
    size_bytes: u64,
}

#[derive(Debug)]
struct LogState {
    segment: Option<SegmentState>,
    next_segment_id: u64,
    next_offsets: HashMap<String, u64>,
}

/// Segmented append log rooted at a directory.
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    max_segment_size: u64,
    state: Mutex<LogState>,
}

impl FileLog {
    /// Open the log in `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, max_segment_size: u64) -> StreamResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut next_segment_id = 0u64;
        let mut next_offsets = HashMap::new();
        for (id, path) in segment_paths(&dir)? {
            next_segment_id = next_segment_id.max(id + 1);
            for entry in read_segment(&path)? {
                let next = next_offsets.entry(entry.topic).or_insert(0u64);
                *next = (*next).max(entry.offset + 1);
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            next_segment_id,
            topics = next_offsets.len(),
            "file log opened"
        );

        Ok(Self {
            dir,
            max_segment_size: max_segment_size.max(1),
            state: Mutex::new(LogState {
                segment: None,
                next_segment_id,
                next_offsets,
            }),
        })
    }

    /// Log directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a record on behalf of `client_id`, returning its offset.
    pub fn append(&self, record: &StreamRecord, client_id: &str) -> StreamResult<u64> {
        let mut state = self.state.lock();
        let offset = state
            .next_offsets
            .get(&record.topic)
            .copied()
            .unwrap_or(0);

        let entry = LogEntry {
            offset,
            topic: record.topic.clone(),
            key: record.key,
            value: record.value.clone(),
            metadata: serde_json::to_string(&record.metadata).map_err(|e| {
                StreamError::Encode {
                    message: e.to_string(),
                }
            })?,
            client_id: client_id.to_string(),
            timestamp_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        };
        let bytes = entry.serialize()?;
        if u32::try_from(bytes.len()).is_err() {
            return Err(StreamError::Encode {
                message: format!("entry of {} bytes exceeds the frame limit", bytes.len()),
            });
        }

        let needs_new = match &state.segment {
            None => true,
            Some(segment) => segment.size_bytes >= self.max_segment_size,
        };
        if needs_new {
            let id = state.next_segment_id;
            state.next_segment_id += 1;
            state.segment = Some(SegmentState {
                id,
                path: self.dir.join(format!("segment_{:016}.log", id)),
                size_bytes: 0,
            });
            tracing::debug!(segment = id, "log segment opened");
        }

        let Some(segment) = state.segment.as_mut() else {
            return Err(StreamError::delivery(&record.topic, "no open segment"));
        };

        match write_frame(&segment.path, segment.size_bytes, &bytes) {
            Ok(size) => segment.size_bytes = size,
            Err(e) => {
                tracing::warn!(segment = segment.id, error = %e, "log append failed; rolling segment");
                state.segment = None;
                return Err(e.into());
            }
        }
        state.next_offsets.insert(record.topic.clone(), offset + 1);

        Ok(offset)
    }

    /// Read every entry, in append order.
    pub fn read_all(&self) -> StreamResult<Vec<LogEntry>> {
        // Hold the lock so a concurrent append cannot be read half-written.
        let _state = self.state.lock();
        let mut entries = Vec::new();
        for (_, path) in segment_paths(&self.dir)? {
            entries.extend(read_segment(&path)?);
        }
        Ok(entries)
    }

    /// Read the entries of one topic, in offset order.
    pub fn read_topic(&self, topic: &str) -> StreamResult<Vec<LogEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect())
    }

    /// Number of segment files on disk.
    pub fn segment_count(&self) -> StreamResult<usize> {
        Ok(segment_paths(&self.dir)?.len())
    }

    /// Id of the segment currently open for writing.
    pub fn current_segment(&self) -> Option<u64> {
        self.state.lock().segment.as_ref().map(|s| s.id)
    }
}

/// Segment files in `dir`, sorted by id.
fn segment_paths(dir: &Path) -> StreamResult<Vec<(u64, PathBuf)>> {
    let mut segments: Vec<(u64, PathBuf)> = std::fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .filter_map(|p| {
            let id = p
                .file_stem()?
                .to_str()?
                .strip_prefix("segment_")?
                .parse::<u64>()
                .ok()?;
            Some((id, p))
        })
        .collect();
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

/// Write one length-prefixed frame at `at` and sync it, returning the new
/// segment size.
///
/// Bytes past `at` belong to an append that never completed and are cut
/// first. A failed write is cut back to `at` before the error is returned.
fn write_frame(path: &Path, at: u64, bytes: &[u8]) -> std::io::Result<u64> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    let on_disk = file.metadata()?.len();
    if on_disk > at {
        tracing::warn!(path = %path.display(), discarded = on_disk - at, "torn log bytes discarded");
        file.set_len(at)?;
    }
    let start = on_disk.min(at);
    file.seek(SeekFrom::Start(start))?;

    let mut frame = Vec::with_capacity(4 + bytes.len());
    frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    frame.extend_from_slice(bytes);

    if let Err(e) = file.write_all(&frame).and_then(|()| file.sync_data()) {
        if let Err(cut) = file.set_len(start) {
            tracing::warn!(path = %path.display(), error = %cut, "failed to cut back torn append");
        }
        return Err(e);
    }
    Ok(start + frame.len() as u64)
}

/// Read all entries from one segment file.
///
/// A frame that runs past the end of the file, or an undecodable last
/// frame, is a torn write and ends the segment.
fn read_segment(path: &Path) -> StreamResult<Vec<LogEntry>> {
    let file = File::open(path)?;
    let total = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut pos = 0u64;
    let mut len_buf = [0u8; 4];

    while pos < total {
        if total - pos < 4 {
            torn_tail(path, pos, total);
            break;
        }
        reader.read_exact(&mut len_buf)?;

        let len = u64::from(u32::from_le_bytes(len_buf));
        let end = pos + 4 + len;
        if end > total {
            torn_tail(path, pos, total);
            break;
        }

        let mut entry_buf = vec![0u8; len as usize];
        reader.read_exact(&mut entry_buf)?;
        match LogEntry::deserialize(&entry_buf) {
            Ok(entry) => entries.push(entry),
            Err(_) if end == total => {
                torn_tail(path, pos, total);
                break;
            }
            Err(e) => return Err(e),
        }
        pos = end;
    }

    Ok(entries)
}

fn torn_tail(path: &Path, pos: u64, total: u64) {
    tracing::warn!(
        path = %path.display(),
        position = pos,
        discarded = total - pos,
        "truncated log entry ignored"
    );
}

/// Client for a [`FileLog`].
pub struct FileLogClient {
    log: FileLog,
    client_id: String,
}

impl FileLogClient {
    /// Open the log in `dir`.
    pub fn connect(dir: &str, client_id: &str, segment_bytes: u64) -> StreamResult<Self> {
        if dir.is_empty() {
            return Err(StreamError::config_invalid("file:// address needs a directory"));
        }
        Ok(Self {
            log: FileLog::open(dir, segment_bytes)?,
            client_id: client_id.to_string(),
        })
    }

    /// The underlying log.
    pub fn log(&self) -> &FileLog {
        &self.log
    }
}

impl LogClient for FileLogClient {
    fn append(&self, record: &StreamRecord) -> StreamResult<u64> {
        self.log.append(record, &self.client_id)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn address(&self) -> String {
        format!("file://{}", self.log.dir().display())
    }
}
