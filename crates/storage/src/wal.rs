// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A generic write-ahead log: newline-delimited JSON entries, append-only,
//! with crash-safe recovery that quarantines a corrupt tail instead of
//! refusing to start.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

const FLUSH_THRESHOLD: usize = 100;
const FLUSH_INTERVAL: Duration = Duration::from_secs(2);
const MAX_BACKUPS: u32 = 3;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry<E> {
    pub seq: u64,
    pub event: E,
}

/// An append-only log of `E` events backed by a single file on disk.
pub struct Wal<E> {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
    processed_seq: u64,
    read_cursor_seq: u64,
    pending_since_flush: usize,
    last_flush: Instant,
    _marker: PhantomData<E>,
}

impl<E> Wal<E>
where
    E: Serialize + DeserializeOwned + Clone,
{
    /// Open (or create) the WAL at `path`. `processed_seq` is the
    /// checkpoint already applied to state (e.g. from a snapshot); only
    /// entries past it are returned from [`Wal::next_unprocessed`].
    ///
    /// If the tail of the file is unreadable (truncated write, bad JSON, or
    /// non-UTF-8 bytes), the file is rotated to `.bak` (keeping up to
    /// [`MAX_BACKUPS`] generations) and a clean file containing only the
    /// entries that parsed is written in its place.
    pub fn open(path: impl AsRef<Path>, processed_seq: u64) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let (valid, corrupt) = Self::read_valid_prefix(&path)?;

        if corrupt {
            Self::rotate_backups(&path)?;
            Self::rewrite_clean(&path, &valid)?;
        }

        let write_seq = valid.last().map(|e| e.seq).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            write_seq,
            processed_seq,
            read_cursor_seq: processed_seq,
            pending_since_flush: 0,
            last_flush: Instant::now(),
            _marker: PhantomData,
        })
    }

    fn read_valid_prefix(path: &Path) -> Result<(Vec<WalEntry<E>>, bool), WalError> {
        if !path.exists() {
            return Ok((Vec::new(), false));
        }
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut valid = Vec::new();
        let mut corrupt = false;
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => {
                    corrupt = true;
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry<E>>(&line) {
                Ok(entry) => valid.push(entry),
                Err(_) => {
                    corrupt = true;
                    break;
                }
            }
        }
        Ok((valid, corrupt))
    }

    fn rotate_backups(path: &Path) -> Result<(), WalError> {
        let bak1 = path.with_extension("bak");
        let bak2 = path.with_extension("bak.2");
        let bak3 = path.with_extension("bak.3");

        if bak3.exists() {
            fs::remove_file(&bak3)?;
        }
        if bak2.exists() {
            fs::rename(&bak2, &bak3)?;
        }
        if bak1.exists() {
            fs::rename(&bak1, &bak2)?;
        }
        fs::rename(path, &bak1)?;
        let _ = MAX_BACKUPS;
        Ok(())
    }

    fn rewrite_clean(path: &Path, entries: &[WalEntry<E>]) -> Result<(), WalError> {
        let mut f = File::create(path)?;
        for entry in entries {
            let line = serde_json::to_string(entry)?;
            writeln!(f, "{line}")?;
        }
        f.flush()?;
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append `event`, assigning it the next sequence number. Buffered;
    /// call [`Wal::flush`] (or rely on [`Wal::needs_flush`]) to make it
    /// durable.
    pub fn append(&mut self, event: &E) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        let line = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{line}")?;
        self.pending_since_flush += 1;
        Ok(entry.seq)
    }

    pub fn flush(&mut self) -> Result<(), WalError> {
        self.writer.flush()?;
        self.pending_since_flush = 0;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Whether enough has been buffered, or enough time has passed, that a
    /// flush is due.
    pub fn needs_flush(&self) -> bool {
        self.pending_since_flush >= FLUSH_THRESHOLD || self.last_flush.elapsed() >= FLUSH_INTERVAL
    }

    /// Mark all entries up to and including `seq` as applied to state.
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Read and return the next entry past the internal read cursor,
    /// advancing it. Returns `None` once the cursor reaches `write_seq` or
    /// hits corruption (treated the same as end-of-log; the caller sees no
    /// error).
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry<E>>, WalError> {
        let (valid, _) = Self::read_valid_prefix(&self.path)?;
        let next = valid.into_iter().find(|e| e.seq > self.read_cursor_seq);
        if let Some(entry) = &next {
            self.read_cursor_seq = entry.seq;
        }
        Ok(next)
    }

    /// All entries with `seq > after`, stopping at the first corrupt entry
    /// encountered (without mutating the file).
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry<E>>, WalError> {
        let (valid, _) = Self::read_valid_prefix(&self.path)?;
        Ok(valid.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Rewrite the file keeping only entries with `seq >= keep_from`.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        let (valid, _) = Self::read_valid_prefix(&self.path)?;
        let keep: Vec<_> = valid.into_iter().filter(|e| e.seq >= keep_from).collect();
        self.writer.flush()?;
        Self::rewrite_clean(&self.path, &keep)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write as _;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum TestEvent {
        Tick(String),
    }

    fn ev(s: &str) -> TestEvent {
        TestEvent::Tick(s.to_string())
    }

    #[test]
    fn open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        assert!(path.exists());
        assert_eq!(wal.write_seq(), 0);
        assert_eq!(wal.processed_seq(), 0);
    }

    #[test]
    fn append_and_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();

        assert_eq!(wal.append(&ev("cmd1")).unwrap(), 1);
        assert_eq!(wal.append(&ev("cmd2")).unwrap(), 2);
        wal.flush().unwrap();

        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn next_unprocessed_advances_cursor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        wal.append(&ev("cmd1")).unwrap();
        wal.append(&ev("cmd2")).unwrap();
        wal.flush().unwrap();

        let e1 = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(e1.seq, 1);
        let e2 = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(e2.seq, 2);
        assert!(wal.next_unprocessed().unwrap().is_none());
    }

    #[test]
    fn reopen_with_processed_seq_skips_applied_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
            wal.append(&ev("cmd1")).unwrap();
            wal.append(&ev("cmd2")).unwrap();
            wal.append(&ev("cmd3")).unwrap();
            wal.flush().unwrap();
        }
        let mut wal: Wal<TestEvent> = Wal::open(&path, 2).unwrap();
        let entry = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(entry.seq, 3);
        assert!(wal.next_unprocessed().unwrap().is_none());
    }

    #[test]
    fn entries_after_returns_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        wal.append(&ev("cmd1")).unwrap();
        wal.append(&ev("cmd2")).unwrap();
        wal.append(&ev("cmd3")).unwrap();
        wal.flush().unwrap();

        let entries = wal.entries_after(1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
        assert_eq!(entries[1].seq, 3);
    }

    #[test]
    fn truncate_before_drops_earlier_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        wal.append(&ev("cmd1")).unwrap();
        wal.append(&ev("cmd2")).unwrap();
        wal.append(&ev("cmd3")).unwrap();
        wal.flush().unwrap();

        wal.truncate_before(2).unwrap();
        let entries = wal.entries_after(0).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
        assert_eq!(entries[1].seq, 3);
    }

    #[test]
    fn needs_flush_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        assert!(!wal.needs_flush());
        for i in 0..101 {
            wal.append(&ev(&format!("cmd{i}"))).unwrap();
        }
        assert!(wal.needs_flush());
    }

    #[test]
    fn open_corrupt_wal_creates_bak_and_preserves_valid_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
            wal.append(&ev("cmd1")).unwrap();
            wal.append(&ev("cmd2")).unwrap();
            wal.flush().unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"not-valid-json\n").unwrap();
        }

        let wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 2);
        assert!(path.with_extension("bak").exists());

        let entries = wal.entries_after(0).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn open_corrupt_wal_rotates_bak_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        for i in 1..=4u8 {
            fs::write(&path, [i; 8]).unwrap();
            let wal: Wal<TestEvent> = Wal::open(&path, 0).unwrap();
            assert_eq!(wal.write_seq(), 0);
        }

        assert_eq!(fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 8]);
        assert_eq!(fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 8]);
        assert_eq!(fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 8]);
        assert!(!path.with_extension("bak.4").exists());
    }
}
