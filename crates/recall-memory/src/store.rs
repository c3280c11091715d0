use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use recall_core::{RecallError, RecallResult};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::record::MemoryRecord;

/// Append-only JSONL log of [`MemoryRecord`]s.
///
/// Each record occupies exactly one line. Appends, deletes and clears are
/// serialized by a single writer lock so a delete's read-filter-rewrite can
/// never drop a concurrent append. Scans take no lock: a delete replaces the
/// file by rename, so an open scan keeps reading the log it started on.
///
/// Writers in other processes are not coordinated; keep one store handle
/// per file.
pub struct RecordStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RecordStore {
    /// Open (or lazily create) the log at `path`.
    ///
    /// Creates the parent directory if needed. If a previous process crashed
    /// mid-append and left the file without a trailing newline, the line is
    /// terminated so the next append starts on a fresh line.
    pub async fn open(path: impl Into<PathBuf>) -> RecallResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RecallError::Store(format!(
                        "Failed to create dir {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let store = Self {
            path,
            write_lock: Mutex::new(()),
        };
        store.terminate_partial_line().await?;
        debug!(path = %store.path.display(), "record store opened");
        Ok(store)
    }

    /// Path of the backing log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// Returns only after the line has been handed to the OS. On a failed
    /// write the file is truncated back to its previous length.
    pub async fn append(&self, record: &MemoryRecord) -> RecallResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        self.write_lines(line.as_bytes()).await?;
        debug!(id = %record.id, "record appended");
        Ok(())
    }

    /// Append many records with one write. Either every line lands or none do.
    pub async fn append_batch(&self, records: &[MemoryRecord]) -> RecallResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut data = String::new();
        for record in records {
            data.push_str(&serde_json::to_string(record)?);
            data.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        self.write_lines(data.as_bytes()).await?;
        debug!(count = records.len(), "records appended");
        Ok(records.len())
    }

    /// Start a scan over the log, optionally restricted to one `type`.
    ///
    /// Each call starts again from the first line. A missing file scans as
    /// empty.
    pub async fn scan(&self, type_filter: Option<&str>) -> RecallResult<RecordScan> {
        let reader = match File::open(&self.path).await {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(RecallError::Store(format!(
                    "Failed to open {}: {e}",
                    self.path.display()
                )))
            }
        };
        Ok(RecordScan {
            reader,
            type_filter: type_filter.map(str::to_string),
            buf: Vec::new(),
            line_no: 0,
            skipped: 0,
        })
    }

    /// Read every record passing `type_filter`, in log order.
    pub async fn load(&self, type_filter: Option<&str>) -> RecallResult<Vec<MemoryRecord>> {
        self.scan(type_filter).await?.collect().await
    }

    /// Remove every record with `id` by atomically rewriting the log.
    ///
    /// Returns `false`, leaving the file untouched, when no such record
    /// exists. Unparseable lines are dropped by the rewrite.
    pub async fn delete(&self, id: &str) -> RecallResult<bool> {
        let _guard = self.write_lock.lock().await;

        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut kept = Vec::with_capacity(data.len());
        let mut found = false;
        let mut dropped_corrupt = 0usize;
        for raw in data.split(|b| *b == b'\n') {
            let Some(record) = parse_line(raw) else {
                if !raw.iter().all(u8::is_ascii_whitespace) {
                    dropped_corrupt += 1;
                }
                continue;
            };
            if record.id == id {
                found = true;
                continue;
            }
            kept.extend_from_slice(raw);
            kept.push(b'\n');
        }

        if !found {
            return Ok(false);
        }

        self.replace_contents(&kept).await?;
        info!(
            id,
            dropped_corrupt,
            path = %self.path.display(),
            "record deleted, log rewritten"
        );
        Ok(true)
    }

    /// Remove the backing log entirely. Idempotent.
    pub async fn clear(&self) -> RecallResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "record store cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecallError::Store(format!(
                "Failed to clear {}: {e}",
                self.path.display()
            ))),
        }
    }

    /// Every stored record, in log order.
    pub async fn export(&self) -> RecallResult<Vec<MemoryRecord>> {
        self.load(None).await
    }

    /// Append already-embedded records verbatim. No deduplication against
    /// existing ids is performed.
    pub async fn import(&self, records: &[MemoryRecord]) -> RecallResult<usize> {
        self.append_batch(records).await
    }

    async fn write_lines(&self, bytes: &[u8]) -> RecallResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| {
                RecallError::Store(format!("Failed to open {}: {e}", self.path.display()))
            })?;
        let before = file.metadata().await?.len();

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            if let Err(rollback) = file.set_len(before).await {
                warn!(error = %rollback, "failed to roll back partial append");
            }
            return Err(RecallError::Store(format!(
                "Failed to append to {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }

    async fn replace_contents(&self, bytes: &[u8]) -> RecallResult<()> {
        let tmp_path = self.tmp_path();
        let replaced = async {
            let mut tmp = File::create(&tmp_path).await?;
            tmp.write_all(bytes).await?;
            tmp.sync_all().await?;
            drop(tmp);
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = replaced {
            match tokio::fs::remove_file(&tmp_path).await {
                Ok(()) => {}
                Err(cleanup) if cleanup.kind() == ErrorKind::NotFound => {}
                Err(cleanup) => {
                    warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp log");
                }
            }
            return Err(RecallError::Store(format!(
                "Failed to replace {}: {e}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn terminate_partial_line(&self) -> RecallResult<()> {
        let (mut file, writable) =
            match OpenOptions::new().read(true).append(true).open(&self.path).await {
                Ok(file) => (file, true),
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
                // A read-only log can still be scanned; appends will fail later.
                Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                    (File::open(&self.path).await?, false)
                }
                Err(e) => return Err(e.into()),
            };
        let len = file.metadata().await?.len();
        if len == 0 {
            return Ok(());
        }
        file.seek(std::io::SeekFrom::Start(len - 1)).await?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last).await?;
        if last[0] == b'\n' {
            return Ok(());
        }
        if writable {
            warn!(path = %self.path.display(), "terminating partial trailing line");
            file.write_all(b"\n").await?;
            file.flush().await?;
        } else {
            warn!(path = %self.path.display(), "read-only log ends in a partial line");
        }
        Ok(())
    }
}

/// Lazy, line-at-a-time cursor over a [`RecordStore`] log.
///
/// Lines that fail to decode (a torn write, hand edits, invalid UTF-8) are
/// counted and skipped; only genuine read errors end the scan early.
pub struct RecordScan {
    reader: Option<BufReader<File>>,
    type_filter: Option<String>,
    buf: Vec<u8>,
    line_no: usize,
    skipped: usize,
}

impl RecordScan {
    /// The next record passing the type filter, or `None` at end of log.
    pub async fn next_record(&mut self) -> RecallResult<Option<MemoryRecord>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        loop {
            self.buf.clear();
            if reader.read_until(b'\n', &mut self.buf).await? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let raw = trim_newline(&self.buf);
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match parse_line(raw) {
                Some(record) => {
                    if record.matches_type(self.type_filter.as_deref()) {
                        return Ok(Some(record));
                    }
                }
                None => {
                    self.skipped += 1;
                    warn!(line = self.line_no, "skipping unparseable memory record");
                }
            }
        }
    }

    /// Drain the remaining records into a vector.
    pub async fn collect(mut self) -> RecallResult<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record().await? {
            records.push(record);
        }
        Ok(records)
    }

    /// Lines skipped so far because they could not be decoded.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn trim_newline(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

fn parse_line(raw: &[u8]) -> Option<MemoryRecord> {
    let text = std::str::from_utf8(raw).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    serde_json::from_str(text).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::RecordMetadata;
    use chrono::Utc;

    fn make_record(id: &str, content: &str, kind: &str) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            content: content.to_string(),
            embedding: vec![1.0, 0.0],
            metadata: RecordMetadata {
                kind: kind.to_string(),
                timestamp: Utc::now(),
                extra: serde_json::Map::new(),
            },
        }
    }

    async fn open_tmp() -> (tempfile::TempDir, RecordStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = RecordStore::open(tmp.path().join("memories.jsonl"))
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_missing_file_scans_empty() {
        let (_tmp, store) = open_tmp().await;
        assert!(store.load(None).await.unwrap().is_empty());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("deeper").join("log.jsonl");
        let store = RecordStore::open(&path).await.unwrap();
        store.append(&make_record("a", "hello", "general")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_append_writes_one_line_per_record() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "first", "general")).await.unwrap();
        store.append(&make_record("b", "second", "general")).await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));

        let records = store.load(None).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_scan_type_filter() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "one", "preference")).await.unwrap();
        store.append(&make_record("b", "two", "project")).await.unwrap();
        store.append(&make_record("c", "three", "preference")).await.unwrap();

        let prefs = store.load(Some("preference")).await.unwrap();
        assert_eq!(prefs.len(), 2);
        assert!(prefs.iter().all(|r| r.kind() == "preference"));
        assert!(store.load(Some("missing")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_skips_corrupt_lines() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "good", "general")).await.unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(store.path())
                .await
                .unwrap();
            file.write_all(b"{\"id\":\"broken\",\"cont\n").await.unwrap();
            file.write_all(&[0xff, 0xfe, b'\n']).await.unwrap();
            file.write_all(b"\n").await.unwrap();
        }
        store.append(&make_record("b", "also good", "general")).await.unwrap();

        let mut scan = store.scan(None).await.unwrap();
        let mut ids = Vec::new();
        while let Some(record) = scan.next_record().await.unwrap() {
            ids.push(record.id);
        }
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(scan.skipped(), 2);
    }

    #[tokio::test]
    async fn test_scan_is_restartable() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "x", "general")).await.unwrap();
        let first = store.load(None).await.unwrap();
        let second = store.load(None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_open_terminates_partial_trailing_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        let good = serde_json::to_string(&make_record("a", "ok", "general")).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{\"id\":\"torn")).await.unwrap();

        let store = RecordStore::open(&path).await.unwrap();
        store.append(&make_record("b", "after crash", "general")).await.unwrap();

        let ids: Vec<String> = store.load(None).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_write_errors_reach_the_caller() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "x", "general")).await.unwrap();

        // Swap the log for a directory so every write path hits an I/O error.
        tokio::fs::remove_file(store.path()).await.unwrap();
        tokio::fs::create_dir(store.path()).await.unwrap();

        let err = store.append(&make_record("b", "y", "general")).await.unwrap_err();
        assert!(matches!(err, RecallError::Store(_)));
        assert!(store.append_batch(&[make_record("c", "z", "general")]).await.is_err());
        assert!(store.delete("a").await.is_err());
        assert!(store.clear().await.is_err());
        assert!(store.path().is_dir());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_write_is_reported() {
        // Every write to /dev/full fails with ENOSPC once flushed.
        let store = RecordStore::open("/dev/full").await.unwrap();
        let err = store.append(&make_record("a", "x", "general")).await.unwrap_err();
        assert!(matches!(err, RecallError::Store(_)));
        assert!(err.to_string().contains("Failed to append"));
    }

    #[tokio::test]
    async fn test_failed_rewrite_removes_temp_file() {
        let (_tmp, store) = open_tmp().await;
        // A non-empty directory at the log path makes the final rename fail.
        tokio::fs::create_dir(store.path()).await.unwrap();
        tokio::fs::write(store.path().join("blocker"), b"x").await.unwrap();

        let err = store.replace_contents(b"{}\n").await.unwrap_err();
        assert!(matches!(err, RecallError::Store(_)));
        assert!(!store.tmp_path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_read_only_log_opens_for_scans() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("log.jsonl");
        let good = serde_json::to_string(&make_record("a", "ok", "general")).unwrap();
        tokio::fs::write(&path, format!("{good}\n{{\"id\":\"torn")).await.unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o444)).unwrap();

        // Privileged users ignore file modes; nothing to check then.
        if std::fs::OpenOptions::new().append(true).open(&path).is_ok() {
            return;
        }

        let store = RecordStore::open(&path).await.unwrap();
        let ids: Vec<String> = store.load(None).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(store.append(&make_record("b", "no", "general")).await.is_err());
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!raw.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_delete_rewrites_without_record() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "keep", "general")).await.unwrap();
        store.append(&make_record("b", "drop", "general")).await.unwrap();
        store.append(&make_record("c", "keep too", "general")).await.unwrap();

        assert!(store.delete("b").await.unwrap());
        let ids: Vec<String> = store.load(None).await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn test_delete_missing_id_leaves_file_untouched() {
        let (_tmp, store) = open_tmp().await;
        assert!(!store.delete("nope").await.unwrap());

        store.append(&make_record("a", "keep", "general")).await.unwrap();
        let before = tokio::fs::read(store.path()).await.unwrap();
        assert!(!store.delete("nope").await.unwrap());
        let after = tokio::fs::read(store.path()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_delete_preserves_unknown_metadata_verbatim() {
        let (_tmp, store) = open_tmp().await;
        let mut record = make_record("a", "keep", "general");
        record.metadata.extra.insert("projectName".into(), "atlas".into());
        store.append(&record).await.unwrap();
        store.append(&make_record("b", "drop", "general")).await.unwrap();

        assert!(store.delete("b").await.unwrap());
        let loaded = store.load(None).await.unwrap();
        assert_eq!(loaded, vec![record]);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "x", "general")).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_does_not_deduplicate() {
        let (_tmp, store) = open_tmp().await;
        store.append(&make_record("a", "x", "general")).await.unwrap();
        let exported = store.export().await.unwrap();
        assert_eq!(store.import(&exported).await.unwrap(), 1);
        assert_eq!(store.load(None).await.unwrap().len(), 2);

        // Deleting the duplicated id removes every copy.
        assert!(store.delete("a").await.unwrap());
        assert!(store.load(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_appends_and_deletes_lose_nothing() {
        let (_tmp, store) = open_tmp().await;
        let store = std::sync::Arc::new(store);
        for i in 0..10 {
            store
                .append(&make_record(&format!("old-{i}"), "old", "general"))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..10 {
            let s = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                s.append(&make_record(&format!("new-{i}"), "new", "general"))
                    .await
                    .unwrap();
            }));
            let s = std::sync::Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                assert!(s.delete(&format!("old-{i}")).await.unwrap());
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let records = store.load(None).await.unwrap();
        assert_eq!(records.len(), 10);
        assert!(records.iter().all(|r| r.id.starts_with("new-")));
    }
}
