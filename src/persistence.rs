use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::Path,
    sync::{Mutex, PoisonError},
};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::StoreError;

/// The single guestbook slot: when it was posted and what it says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

impl StoredMessage {
    /// A message stamped with the current time (whole seconds).
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().trunc_subsecs(0),
            text: text.into(),
        }
    }

    /// `<RFC 3339 timestamp>: <text>`
    pub fn render(&self) -> String {
        format!(
            "{}: {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.text
        )
    }
}

/// Durable storage behind the counter and the guestbook.
///
/// Calls are synchronous and must not return before the write is durable.
/// Failures are reported, never retried.
pub trait Store: Send + Sync {
    fn append_count(&self, value: u64) -> Result<(), StoreError>;

    fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError>;

    fn latest_count(&self) -> Result<Option<u64>, StoreError>;

    fn latest_message(&self) -> Result<Option<StoredMessage>, StoreError>;
}

/// One line of the record file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record {
    Count { value: u64 },
    Message(StoredMessage),
}

#[derive(Debug, Default)]
struct Latest {
    count: Option<u64>,
    message: Option<StoredMessage>,
}

/// What replaying a record file found.
#[derive(Debug, Default)]
struct Replay {
    latest: Latest,
    skipped: usize,
    /// The last line has no terminating newline.
    torn_tail: bool,
}

fn replay(mut reader: impl BufRead) -> Result<Replay, StoreError> {
    let mut replay = Replay::default();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        replay.torn_tail = !line.ends_with('\n');

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(trimmed) {
            Ok(Record::Count { value }) => replay.latest.count = Some(value),
            Ok(Record::Message(message)) => replay.latest.message = Some(message),
            Err(_) => replay.skipped += 1,
        }
    }

    Ok(replay)
}

/// Destination of record lines that can be forced to stable storage.
trait RecordSink: Write {
    fn sync(&mut self) -> std::io::Result<()>;
}

impl RecordSink for File {
    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_data()
    }
}

/// Line writer that keeps a failed, partially written line from swallowing
/// the next record: after a failure the next write starts on a fresh line.
struct RecordWriter<W> {
    sink: W,
    torn: bool,
}

impl<W: RecordSink> RecordWriter<W> {
    fn new(sink: W, torn: bool) -> Self {
        Self { sink, torn }
    }

    /// Write `line` (newline included) and sync it.
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        if self.torn {
            self.sink.write_all(b"\n")?;
            self.torn = false;
        }

        let result = self
            .sink
            .write_all(line.as_bytes())
            .and_then(|()| self.sink.sync());
        if result.is_err() {
            self.torn = true;
        }
        result
    }
}

/// Append-only JSON-lines file.
///
/// Every append is written and synced before returning. The newest record of
/// each kind is cached, so reads never touch the disk.
pub struct FileStore {
    file: Mutex<RecordWriter<File>>,
    latest: Mutex<Latest>,
}

impl FileStore {
    /// Open (or create) the record file at `path` and replay it.
    ///
    /// Lines that fail to parse are skipped.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        let found = match fs::File::open(path) {
            Ok(existing) => {
                let found = replay(BufReader::new(existing))?;
                if found.skipped > 0 {
                    tracing::warn!(
                        "Skipped {} unreadable records in {}",
                        found.skipped,
                        path.display()
                    );
                }
                found
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No record file found at startup (path = {})", path.display());
                Replay::default()
            }
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        tracing::info!(
            count = ?found.latest.count,
            has_message = found.latest.message.is_some(),
            "Loaded records from {}",
            path.display()
        );

        Ok(Self {
            file: Mutex::new(RecordWriter::new(file, found.torn_tail)),
            latest: Mutex::new(found.latest),
        })
    }

    fn append(&self, record: &Record) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_line(&line)?;
        Ok(())
    }

    fn latest(&self) -> std::sync::MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for FileStore {
    fn append_count(&self, value: u64) -> Result<(), StoreError> {
        self.append(&Record::Count { value })?;
        self.latest().count = Some(value);
        Ok(())
    }

    fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        self.append(&Record::Message(message.clone()))?;
        self.latest().message = Some(message.clone());
        Ok(())
    }

    fn latest_count(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.latest().count)
    }

    fn latest_message(&self) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.latest().message.clone())
    }
}

/// Store that keeps everything in memory and never fails.
#[derive(Debug, Default)]
pub struct MemoryStore {
    latest: Mutex<Latest>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn latest(&self) -> std::sync::MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn append_count(&self, value: u64) -> Result<(), StoreError> {
        self.latest().count = Some(value);
        Ok(())
    }

    fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        self.latest().message = Some(message.clone());
        Ok(())
    }

    fn latest_count(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.latest().count)
    }

    fn latest_message(&self) -> Result<Option<StoredMessage>, StoreError> {
        Ok(self.latest().message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn render_uses_rfc3339_seconds() {
        let message = StoredMessage {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
            text: "hello".into(),
        };
        assert_eq!(message.render(), "2024-05-06T07:08:09Z: hello");
    }

    #[test]
    fn file_store_replays_latest_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.latest_count().unwrap(), None);
            assert_eq!(store.latest_message().unwrap(), None);

            store.append_count(1).unwrap();
            store.append_count(2).unwrap();
            store.append_message(&StoredMessage::now("first")).unwrap();
            store.append_message(&StoredMessage::now("second")).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.latest_count().unwrap(), Some(2));
        assert_eq!(reopened.latest_message().unwrap().unwrap().text, "second");
    }

    #[test]
    fn file_store_skips_garbage_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        fs::write(
            &path,
            "{\"kind\":\"count\",\"value\":7}\nnot json at all\n\n{\"kind\":\"count\"}\n",
        )
        .unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.latest_count().unwrap(), Some(7));
    }

    #[test]
    fn memory_store_starts_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_count().unwrap(), None);
        store.append_count(3).unwrap();
        assert_eq!(store.latest_count().unwrap(), Some(3));
    }

    /// Accepts `budget` bytes, then fails once.
    struct FlakySink {
        written: Vec<u8>,
        budget: Option<usize>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match self.budget {
                Some(0) => {
                    self.budget = None;
                    Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                }
                Some(left) => {
                    let n = left.min(buf.len());
                    self.budget = Some(left - n);
                    self.written.extend_from_slice(&buf[..n]);
                    Ok(n)
                }
                None => {
                    self.written.extend_from_slice(buf);
                    Ok(buf.len())
                }
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl RecordSink for FlakySink {
        fn sync(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn count_line(value: u64) -> String {
        format!("{}\n", serde_json::to_string(&Record::Count { value }).unwrap())
    }

    #[test]
    fn torn_write_does_not_swallow_the_next_record() {
        let sink = FlakySink {
            written: count_line(5).into_bytes(),
            budget: Some(6),
        };
        let mut writer = RecordWriter::new(sink, false);

        assert!(writer.write_line(&count_line(6)).is_err());
        writer.write_line(&count_line(7)).unwrap();

        let found = replay(writer.sink.written.as_slice()).unwrap();
        assert_eq!(found.latest.count, Some(7));
        assert_eq!(found.skipped, 1);
        assert!(!found.torn_tail);
    }

    #[test]
    fn file_with_torn_tail_keeps_later_appends_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        fs::write(&path, format!("{}{{\"kind\":\"cou", count_line(3))).unwrap();

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.latest_count().unwrap(), Some(3));
            store.append_count(4).unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.latest_count().unwrap(), Some(4));
    }
}
