//! Append-only operation log
//!
//! One record per line, `<operation> <key> <value>\n`, UTF-8, no escaping. Every append is
//! flushed and synced before it returns. Startup replay and the tailing watcher both go
//! through [`OpLog::read_from`], so they share one parsing rule: a line with at least three
//! whitespace-separated fields is a record, anything else is skipped.

use crate::common::protocol::is_valid_token;
use crate::common::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub const OP_WRITE: &str = "WRITE";

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub operation: String,
    pub key: String,
    pub value: String,
}

impl LogRecord {
    pub fn write(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operation: OP_WRITE.to_string(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Parse one line (terminator already stripped). Extra fields are ignored.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let operation = fields.next()?;
        let key = fields.next()?;
        let value = fields.next()?;
        Some(Self {
            operation: operation.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    pub fn encode(&self) -> String {
        format!("{} {} {}", self.operation, self.key, self.value)
    }
}

/// What a pass over the log found
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub malformed: usize,
    /// Byte offset just past the last complete line consumed
    pub offset: u64,
    /// The file was shorter than the starting offset and was read from the beginning
    pub truncated: bool,
}

/// Append handle on the log file
pub struct OpLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl OpLog {
    /// Open or create the log for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        terminate_torn_tail(&mut file, &path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and force it to disk.
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        if !is_valid_token(&record.key) || !is_valid_token(&record.value) {
            return Err(Error::Log(format!(
                "record for {:?} cannot be stored on one line",
                record.key
            )));
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(record.encode().as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Feed every complete line at or after `offset` to `apply`.
    ///
    /// A trailing line without its newline is left for a later pass. A missing file reads as
    /// empty.
    pub fn read_from<F>(path: impl AsRef<Path>, offset: u64, mut apply: F) -> Result<ReplayStats>
    where
        F: FnMut(LogRecord),
    {
        let mut stats = ReplayStats {
            offset,
            ..Default::default()
        };

        let mut file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e.into()),
        };

        let len = file.metadata()?.len();
        if len < offset {
            stats.offset = 0;
            stats.truncated = true;
        }
        if len == stats.offset {
            return Ok(stats);
        }

        file.seek(SeekFrom::Start(stats.offset))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader.read_until(b'\n', &mut buf)?;
            if read == 0 || buf.last() != Some(&b'\n') {
                break;
            }
            stats.offset += read as u64;

            let record = std::str::from_utf8(&buf)
                .ok()
                .map(|line| line.trim_end_matches(['\n', '\r']))
                .and_then(LogRecord::parse);
            match record {
                Some(record) => {
                    apply(record);
                    stats.applied += 1;
                }
                None => stats.malformed += 1,
            }
        }

        Ok(stats)
    }

    /// Replay the whole log from the beginning.
    pub fn replay<F>(path: impl AsRef<Path>, apply: F) -> Result<ReplayStats>
    where
        F: FnMut(LogRecord),
    {
        Self::read_from(path, 0, apply)
    }
}

/// Close off a partial last line so the next append starts a record of its own.
///
/// The fragment stays in the file as one malformed line and replay skips it.
fn terminate_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        tracing::warn!(path = %path.display(), "operation log ends in a partial line, terminating it");
        file.write_all(b"\n")?;
        file.sync_data()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn replay_into(path: &Path, map: &mut HashMap<String, String>) -> ReplayStats {
        OpLog::replay(path, |record| {
            map.insert(record.key, record.value);
        })
        .unwrap()
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");

        {
            let log = OpLog::open(&path).unwrap();
            log.append(&LogRecord::write("a", "1")).unwrap();
            log.append(&LogRecord::write("b", "2")).unwrap();
            log.append(&LogRecord::write("a", "3")).unwrap();
        }

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "WRITE a 1\nWRITE b 2\nWRITE a 3\n");

        let mut map = HashMap::new();
        let stats = replay_into(&path, &mut map);
        assert_eq!(stats.applied, 3);
        assert_eq!(map.get("a").map(String::as_str), Some("3"));
        assert_eq!(map.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");
        std::fs::write(&path, "WRITE x 1\nWRITE y 2\nWRITE x 9\n").unwrap();

        let mut once = HashMap::new();
        replay_into(&path, &mut once);

        let mut twice = HashMap::new();
        replay_into(&path, &mut twice);
        replay_into(&path, &mut twice);

        assert_eq!(once, twice);
        assert_eq!(twice.get("x").map(String::as_str), Some("9"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");
        std::fs::write(&path, "WRITE a 1\ngarbage\nWRITE b\n\nWRITE c 3 extra\r\n").unwrap();

        let mut map = HashMap::new();
        let stats = replay_into(&path, &mut map);

        assert_eq!(stats.applied, 2);
        assert_eq!(stats.malformed, 3);
        assert_eq!(map.get("c").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_read_from_offset_and_partial_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");
        std::fs::write(&path, "WRITE a 1\n").unwrap();

        let first = OpLog::read_from(&path, 0, |_| {}).unwrap();
        assert_eq!(first.offset, 10);

        // A half-written line is not consumed
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"WRITE b 2\nWRITE c").unwrap();

        let mut seen = Vec::new();
        let second = OpLog::read_from(&path, first.offset, |r| seen.push(r.key)).unwrap();
        assert_eq!(seen, vec!["b".to_string()]);
        assert_eq!(second.offset, 20);

        file.write_all(b" 3\n").unwrap();
        let mut seen = Vec::new();
        let third = OpLog::read_from(&path, second.offset, |r| seen.push(r.value)).unwrap();
        assert_eq!(seen, vec!["3".to_string()]);
        assert_eq!(third.offset, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_append_after_torn_tail_starts_new_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");
        std::fs::write(&path, "WRITE a 1\nWRITE b").unwrap();

        {
            let log = OpLog::open(&path).unwrap();
            log.append(&LogRecord::write("k", "v")).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "WRITE a 1\nWRITE b\nWRITE k v\n");

        let mut map = HashMap::new();
        let stats = replay_into(&path, &mut map);
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(map.get("k").map(String::as_str), Some("v"));
        assert!(!map.contains_key("bWRITE"));

        // A clean file is left alone
        OpLog::open(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "WRITE a 1\nWRITE b\nWRITE k v\n");
    }

    #[test]
    fn test_truncated_file_is_reread() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv_store.log");
        std::fs::write(&path, "WRITE a 1\nWRITE b 2\n").unwrap();
        std::fs::write(&path, "WRITE z 0\n").unwrap();

        let stats = OpLog::read_from(&path, 20, |_| {}).unwrap();
        assert!(stats.truncated);
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.offset, 10);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let stats = OpLog::replay(dir.path().join("absent.log"), |_| {}).unwrap();
        assert_eq!(stats, ReplayStats::default());
    }

    #[test]
    fn test_unencodable_record_rejected() {
        let dir = tempdir().unwrap();
        let log = OpLog::open(dir.path().join("kv_store.log")).unwrap();
        assert!(log.append(&LogRecord::write("a key", "v")).is_err());
        assert!(log.append(&LogRecord::write("k", "")).is_err());
    }
}
