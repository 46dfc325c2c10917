//! Durable JSON Lines implementation of `BlockStore`.
//!
//! Layout: one block per line, serialized with serde_json, in index order.
//!
//! - `append` writes one line with `O_APPEND` and syncs it. A failed write
//!   is cut back off the file, and `open` drops a torn final line left by a
//!   crash mid-append.
//! - `truncate_from` and `clear` stream the surviving lines into a temp file
//!   and rename it over the original.
//! - `read_all` opens its own handle and reads only up to the file length
//!   observed when the snapshot was taken. Appends only extend the file and
//!   rewrites replace it by rename, so an open snapshot is never disturbed.
//!
//! Nothing is cached: every read goes back to disk, so an edit made directly
//! to the file is seen by the next verification. Reads hold one line in
//! memory at a time.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Read, Seek, SeekFrom, Take, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, warn};

use tamperlog_contracts::{Block, LedgerError, LedgerResult};
use tamperlog_core::{BlockStore, BlockStream};

/// A block store persisted to a single `.jsonl` file.
#[derive(Debug)]
pub struct FileBlockStore {
    path: PathBuf,
    /// Serializes writers against each other and against snapshot opening.
    lock: RwLock<()>,
}

impl FileBlockStore {
    /// Open the store at `path`, creating the file and its parent
    /// directories if they do not exist yet.
    pub fn open(path: impl AsRef<Path>) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_error(&path, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        recover_torn_tail(&path)?;

        info!(path = %path.display(), "opened file block store");
        Ok(Self {
            path,
            lock: RwLock::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn read_lock(&self) -> LedgerResult<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|e| LedgerError::store(format!("file store lock poisoned: {e}")))
    }

    fn write_lock(&self) -> LedgerResult<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|e| LedgerError::store(format!("file store lock poisoned: {e}")))
    }

    /// Open a bounded reader over the current non-blank lines.
    ///
    /// Caller must hold at least the read lock while this runs.
    fn raw_lines(&self) -> LedgerResult<RawLines> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RawLines::empty()),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        let len = file
            .metadata()
            .map_err(|e| io_error(&self.path, e))?
            .len();
        debug!(path = %self.path.display(), bytes = len, "opened block snapshot");
        Ok(RawLines {
            lines: Some(BufReader::new(file.take(len)).lines()),
            line_no: 0,
        })
    }

    fn line_count(&self) -> LedgerResult<u64> {
        let mut count = 0;
        for line in self.raw_lines()? {
            line.map_err(|e| io_error(&self.path, e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Decode only the final record. Earlier lines are skipped unread, so a
    /// damaged record in the middle of the file does not block appends.
    fn last_block(&self) -> LedgerResult<Option<Block>> {
        let mut last = None;
        for line in self.raw_lines()? {
            last = Some(line.map_err(|e| io_error(&self.path, e))?);
        }
        last.map(|(line_no, line)| decode(line_no, &line)).transpose()
    }

    /// Stream the first `keep` records into `tmp`. Returns how many records
    /// the file held in total.
    fn write_prefix(&self, tmp: &Path, keep: u64) -> LedgerResult<u64> {
        let file = File::create(tmp).map_err(|e| io_error(tmp, e))?;
        let mut out = BufWriter::new(file);
        let mut total = 0;
        for line in self.raw_lines()? {
            let (_, line) = line.map_err(|e| io_error(&self.path, e))?;
            if total < keep {
                writeln!(out, "{line}").map_err(|e| io_error(tmp, e))?;
            }
            total += 1;
        }
        let file = out
            .into_inner()
            .map_err(|e| io_error(tmp, e.into_error()))?;
        file.sync_all().map_err(|e| io_error(tmp, e))?;
        Ok(total)
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    fn commit(&self, tmp: &Path) -> LedgerResult<()> {
        fs::rename(tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

impl BlockStore for FileBlockStore {
    fn append(&self, block: &Block) -> LedgerResult<()> {
        let _guard = self.write_lock()?;

        let expected = self.last_block()?.map_or(0, |tail| tail.index + 1);
        if block.index != expected {
            return Err(LedgerError::InvariantViolation {
                reason: format!(
                    "out-of-sequence append: expected index {expected}, got {}",
                    block.index
                ),
            });
        }

        let mut line = serde_json::to_string(block)
            .map_err(|e| LedgerError::store(format!("failed to encode block: {e}")))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_error(&self.path, e))?;
        let prev_len = file
            .metadata()
            .map_err(|e| io_error(&self.path, e))?
            .len();
        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.sync_data()) {
            // Cut off whatever part of the line reached the file.
            match file.set_len(prev_len) {
                Ok(()) => warn!(index = block.index, error = %e, "append failed; rolled back"),
                Err(rollback) => error!(
                    index = block.index,
                    error = %e,
                    rollback_error = %rollback,
                    "append failed and could not be rolled back"
                ),
            }
            return Err(io_error(&self.path, e));
        }

        debug!(index = block.index, path = %self.path.display(), "block appended to file");
        Ok(())
    }

    fn read_all(&self) -> LedgerResult<BlockStream> {
        let _guard = self.read_lock()?;
        Ok(Box::new(FileSnapshot {
            raw: self.raw_lines()?,
        }))
    }

    fn truncate_from(&self, index: u64) -> LedgerResult<u64> {
        let _guard = self.write_lock()?;
        let tmp = self.tmp_path();
        let total = self.write_prefix(&tmp, index)?;
        if index >= total {
            if let Err(e) = fs::remove_file(&tmp) {
                debug!(path = %tmp.display(), error = %e, "could not remove temp file");
            }
            return Err(LedgerError::NotFound { index });
        }
        self.commit(&tmp)?;
        Ok(total - index)
    }

    fn clear(&self) -> LedgerResult<u64> {
        let _guard = self.write_lock()?;
        let tmp = self.tmp_path();
        let total = self.write_prefix(&tmp, 0)?;
        self.commit(&tmp)?;
        Ok(total)
    }

    fn tail(&self) -> LedgerResult<Option<Block>> {
        let _guard = self.read_lock()?;
        self.last_block()
    }

    fn count(&self) -> LedgerResult<u64> {
        let _guard = self.read_lock()?;
        self.line_count()
    }

    fn window(&self, start: u64, limit: usize) -> LedgerResult<(Vec<Block>, u64)> {
        let _guard = self.read_lock()?;
        let end = start.saturating_add(limit as u64);
        let mut items = Vec::new();
        let mut total = 0;
        for line in self.raw_lines()? {
            let (line_no, line) = line.map_err(|e| io_error(&self.path, e))?;
            if (start..end).contains(&total) {
                items.push(decode(line_no, &line)?);
            }
            total += 1;
        }
        Ok((items, total))
    }
}

/// Non-blank lines of a length-bounded file handle, with 1-based line
/// numbers.
struct RawLines {
    lines: Option<Lines<BufReader<Take<File>>>>,
    line_no: u64,
}

impl RawLines {
    fn empty() -> Self {
        Self {
            lines: None,
            line_no: 0,
        }
    }
}

impl Iterator for RawLines {
    type Item = io::Result<(u64, String)>;

    fn next(&mut self) -> Option<Self::Item> {
        let lines = self.lines.as_mut()?;
        loop {
            let line = match lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            self.line_no += 1;
            if !line.trim().is_empty() {
                return Some(Ok((self.line_no, line)));
            }
        }
    }
}

/// Lazily decodes blocks from a snapshot. A line that fails to decode
/// yields `CorruptRecord` and the stream carries on with the next line.
struct FileSnapshot {
    raw: RawLines,
}

impl Iterator for FileSnapshot {
    type Item = LedgerResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(match self.raw.next()? {
            Ok((line_no, line)) => decode(line_no, &line),
            Err(e) => Err(LedgerError::store(e)),
        })
    }
}

fn decode(line_no: u64, line: &str) -> LedgerResult<Block> {
    serde_json::from_str(line).map_err(|e| LedgerError::CorruptRecord {
        line: line_no,
        reason: e.to_string(),
    })
}

/// Repair a final line without its terminating newline.
///
/// A complete record just gets its newline back. Anything else is the
/// remainder of an interrupted append and is cut off.
fn recover_torn_tail(path: &Path) -> LedgerResult<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    let len = file.metadata().map_err(|e| io_error(path, e))?.len();
    if len == 0 {
        return Ok(());
    }

    let start = last_line_start(&mut file, len).map_err(|e| io_error(path, e))?;
    if start == len {
        return Ok(());
    }

    let mut fragment = Vec::new();
    file.seek(SeekFrom::Start(start))
        .and_then(|_| (&mut file).take(len - start).read_to_end(&mut fragment))
        .map_err(|e| io_error(path, e))?;

    if serde_json::from_slice::<Block>(&fragment).is_ok() {
        debug!(path = %path.display(), "restoring missing newline after last record");
        file.seek(SeekFrom::End(0))
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| io_error(path, e))?;
    } else {
        warn!(
            path = %path.display(),
            bytes = len - start,
            "discarding torn record at end of file"
        );
        file.set_len(start).map_err(|e| io_error(path, e))?;
    }
    file.sync_data().map_err(|e| io_error(path, e))
}

/// Offset just past the last `\n` in the first `len` bytes, or 0 if there
/// is none. Scans backwards so only the final line is read.
fn last_line_start(file: &mut File, len: u64) -> io::Result<u64> {
    let mut buf = [0u8; 4096];
    let mut end = len;
    while end > 0 {
        let from = end.saturating_sub(buf.len() as u64);
        let chunk = &mut buf[..(end - from) as usize];
        file.seek(SeekFrom::Start(from))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(from + i as u64 + 1);
        }
        end = from;
    }
    Ok(0)
}

fn io_error(path: &Path, e: io::Error) -> LedgerError {
    LedgerError::store(format!("{}: {e}", path.display()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::TempDir;

    use tamperlog_core::hasher::hash_fields;

    use super::*;

    fn block(index: u64, previous_hash: &str, data: &str) -> Block {
        let timestamp = Utc::now();
        Block {
            index,
            timestamp,
            data: data.to_string(),
            previous_hash: previous_hash.to_string(),
            hash: hash_fields(index, &timestamp, data, previous_hash, 0),
            nonce: 0,
        }
    }

    /// Write `n` linked blocks and return them.
    fn fill(store: &FileBlockStore, n: u64) -> Vec<Block> {
        let mut written: Vec<Block> = Vec::new();
        for i in 0..n {
            let prev = written
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| Block::GENESIS_PREVIOUS_HASH.to_string());
            let b = block(i, &prev, &format!("event {i}"));
            store.append(&b).unwrap();
            written.push(b);
        }
        written
    }

    fn store() -> (TempDir, FileBlockStore) {
        let dir = TempDir::new().unwrap();
        let store = FileBlockStore::open(dir.path().join("nested/chain.jsonl")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_empty_file() {
        let (_dir, store) = store();
        assert!(store.path().exists());
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.tail().unwrap().is_none());
        assert_eq!(store.read_all().unwrap().count(), 0);
    }

    #[test]
    fn blocks_survive_reopen() {
        let (dir, store) = store();
        let written = fill(&store, 4);
        drop(store);

        let reopened = FileBlockStore::open(dir.path().join("nested/chain.jsonl")).unwrap();
        let read: Vec<Block> = reopened
            .read_all()
            .unwrap()
            .collect::<LedgerResult<_>>()
            .unwrap();
        assert_eq!(read, written);
        assert_eq!(reopened.tail().unwrap(), written.last().cloned());
    }

    #[test]
    fn out_of_sequence_append_is_rejected() {
        let (_dir, store) = store();
        fill(&store, 2);
        let err = store.append(&block(5, "x", "skip")).unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation { .. }));
        assert_eq!(store.count().unwrap(), 2);

        let (_dir, empty) = self::store();
        assert!(matches!(
            empty.append(&block(1, "x", "no genesis")),
            Err(LedgerError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn snapshot_ignores_later_appends() {
        let (_dir, store) = store();
        fill(&store, 3);
        let snapshot = store.read_all().unwrap();

        let tail = store.tail().unwrap().unwrap();
        store.append(&block(3, &tail.hash, "late")).unwrap();

        assert_eq!(snapshot.count(), 3);
        assert_eq!(store.read_all().unwrap().count(), 4);
    }

    #[test]
    fn snapshot_survives_truncation() {
        let (_dir, store) = store();
        fill(&store, 5);
        let snapshot = store.read_all().unwrap();
        store.truncate_from(2).unwrap();

        assert_eq!(snapshot.count(), 5);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn truncate_and_clear() {
        let (_dir, store) = store();
        fill(&store, 5);

        assert!(matches!(
            store.truncate_from(5),
            Err(LedgerError::NotFound { index: 5 })
        ));
        assert_eq!(store.truncate_from(3).unwrap(), 2);
        assert_eq!(store.tail().unwrap().unwrap().index, 2);

        assert_eq!(store.clear().unwrap(), 3);
        assert_eq!(store.count().unwrap(), 0);
        assert!(matches!(
            store.truncate_from(0),
            Err(LedgerError::NotFound { index: 0 })
        ));
    }

    #[test]
    fn window_reads_items_and_total() {
        let (_dir, store) = store();
        fill(&store, 10);
        let (items, total) = store.window(4, 3).unwrap();
        let indices: Vec<u64> = items.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![4, 5, 6]);
        assert_eq!(total, 10);

        let (beyond, total) = store.window(10, 3).unwrap();
        assert!(beyond.is_empty());
        assert_eq!(total, 10);
    }

    #[test]
    fn blank_lines_are_not_counted() {
        let (_dir, store) = store();
        fill(&store, 3);
        let contents = fs::read_to_string(store.path()).unwrap();
        fs::write(store.path(), format!("\n{}\n   \n", contents.replace('\n', "\n\n"))).unwrap();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.window(0, 10).unwrap().1, 3);
        assert_eq!(store.tail().unwrap().unwrap().index, 2);
    }

    #[test]
    fn torn_append_is_dropped_on_reopen() {
        let (dir, store) = store();
        let written = fill(&store, 3);
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(br#"{"index":3,"times"#).unwrap();
        drop(file);
        drop(store);

        let reopened = FileBlockStore::open(dir.path().join("nested/chain.jsonl")).unwrap();
        assert_eq!(reopened.count().unwrap(), 3);
        assert_eq!(reopened.tail().unwrap(), written.last().cloned());

        let next = block(3, &written[2].hash, "after crash");
        reopened.append(&next).unwrap();
        let read: Vec<Block> = reopened
            .read_all()
            .unwrap()
            .collect::<LedgerResult<_>>()
            .unwrap();
        assert_eq!(read.len(), 4);
        assert_eq!(read[3], next);
    }

    #[test]
    fn complete_last_record_keeps_its_place_on_reopen() {
        let (dir, store) = store();
        let written = fill(&store, 2);
        let contents = fs::read_to_string(store.path()).unwrap();
        fs::write(store.path(), contents.trim_end()).unwrap();
        drop(store);

        let reopened = FileBlockStore::open(dir.path().join("nested/chain.jsonl")).unwrap();
        assert_eq!(reopened.tail().unwrap(), written.last().cloned());
        reopened
            .append(&block(2, &written[1].hash, "next"))
            .unwrap();
        assert_eq!(reopened.count().unwrap(), 3);
    }

    #[test]
    fn damaged_middle_record_does_not_block_appends() {
        let (_dir, store) = store();
        let written = fill(&store, 3);
        let contents = fs::read_to_string(store.path()).unwrap();
        let mut lines: Vec<&str> = contents.lines().collect();
        lines[1] = "{ damaged";
        fs::write(store.path(), format!("{}\n", lines.join("\n"))).unwrap();

        store.append(&block(3, &written[2].hash, "still writable")).unwrap();
        let results: Vec<LedgerResult<Block>> = store.read_all().unwrap().collect();
        assert_eq!(results.len(), 4);
        assert!(matches!(
            results[1],
            Err(LedgerError::CorruptRecord { line: 2, .. })
        ));
        assert!(results[3].is_ok());
    }

    #[test]
    fn edits_on_disk_are_visible() {
        let (_dir, store) = store();
        fill(&store, 3);

        let contents = fs::read_to_string(store.path()).unwrap();
        fs::write(store.path(), contents.replace("event 1", "event one")).unwrap();

        let blocks: Vec<Block> = store
            .read_all()
            .unwrap()
            .collect::<LedgerResult<_>>()
            .unwrap();
        assert_eq!(blocks[1].data, "event one");
    }

    #[test]
    fn malformed_line_is_reported_with_line_number() {
        let (_dir, store) = store();
        fill(&store, 2);
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(b"{not json\n").unwrap();

        let results: Vec<LedgerResult<Block>> = store.read_all().unwrap().collect();
        assert_eq!(results.len(), 3);
        match &results[2] {
            Err(LedgerError::CorruptRecord { line, .. }) => assert_eq!(*line, 3),
            other => panic!("expected CorruptRecord, got {other:?}"),
        }
    }

    #[test]
    fn truncation_does_not_need_decodable_suffix() {
        let (_dir, store) = store();
        fill(&store, 2);
        let mut file = OpenOptions::new().append(true).open(store.path()).unwrap();
        file.write_all(b"garbage\n").unwrap();

        assert_eq!(store.truncate_from(2).unwrap(), 1);
        assert_eq!(store.read_all().unwrap().count(), 2);
    }
}
