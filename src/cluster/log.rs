//! Durable storage for the Raft log and the small header of per-node state (`current_term`,
//! `voted_for`, `commit_idx`) that must survive a restart alongside it.
//!
//! [`FileLog`] mirrors the shape of `raft`'s own [`InMemoryLog`](raft::log::memory::InMemoryLog) —
//! a `VecDeque` of entries plus the `prev_log_idx`/`prev_log_term` watermark left behind by
//! discarded entries — but backs it with an append-only file so entries survive a crash. Each
//! record on disk is `term: u64 | data_len: u32 | data`, and a parallel `offsets` vector lets
//! [`cancel_from`](raft::log::Log::cancel_from) truncate the file to an earlier length in one
//! syscall.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use raft::log::Log;
use raft::message::{LogEntry, LogIndex, TermId};
use serde::{Deserialize, Serialize};

pub struct FileLog {
    file: File,
    entries: VecDeque<LogEntry>,
    offsets: VecDeque<u64>,
    prev_log_idx: LogIndex,
    prev_log_term: TermId,
    last_taken: LogIndex,
}

impl FileLog {
    /// Opens (creating if absent) the log file at `path`, replaying any entries already on disk.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut entries = VecDeque::new();
        let mut offsets = VecDeque::new();

        let mut offset = 0u64;
        loop {
            let mut header = [0u8; 12];
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e),
            }
            let term = u64::from_be_bytes(header[0..8].try_into().unwrap());
            let data_len = u32::from_be_bytes(header[8..12].try_into().unwrap()) as usize;

            let mut data = vec![0u8; data_len];
            file.read_exact(&mut data)?;

            offsets.push_back(offset);
            offset += 12 + data_len as u64;
            entries.push_back(LogEntry {
                term: TermId { id: term },
                data: Bytes::from(data),
            });
        }

        // `append` mode always writes at the end of the file regardless of the cursor, but reads
        // use the cursor we just walked off the end of; seek back so a later read_exact after a
        // cancel_from doesn't start mid-file.
        file.seek(SeekFrom::Start(offset))?;

        Ok(Self {
            file,
            entries,
            offsets,
            prev_log_idx: LogIndex::default(),
            prev_log_term: TermId::default(),
            last_taken: LogIndex::default(),
        })
    }

    fn entry_index(&self, log_idx: LogIndex) -> Option<usize> {
        log_idx
            .id
            .checked_sub(self.prev_log_idx.id)?
            .checked_sub(1)?
            .try_into()
            .ok()
    }
}

impl Log for FileLog {
    type Error = io::Error;

    fn append(&mut self, entry: LogEntry) -> Result<(), Self::Error> {
        let offset = self.file.metadata()?.len();

        let mut framed = Vec::with_capacity(12 + entry.data.len());
        framed.extend_from_slice(&entry.term.id.to_be_bytes());
        framed.extend_from_slice(&(entry.data.len() as u32).to_be_bytes());
        framed.extend_from_slice(&entry.data);

        self.file.write_all(&framed)?;
        self.file.sync_data()?;

        self.offsets.push_back(offset);
        self.entries.push_back(entry);
        Ok(())
    }

    fn cancel_from(&mut self, from_index: LogIndex) -> Result<usize, Self::Error> {
        let index = self
            .entry_index(from_index)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "index out of range"))?;
        let Some(&truncate_at) = self.offsets.get(index) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "index out of range",
            ));
        };

        self.file.set_len(truncate_at)?;
        self.file.seek(SeekFrom::Start(truncate_at))?;

        let cancelled = self.entries.len() - index;
        self.entries.truncate(index);
        self.offsets.truncate(index);
        Ok(cancelled)
    }

    fn entry_len(&self, entry: &LogEntry) -> usize {
        12 + entry.data.len()
    }

    fn get(&mut self, log_idx: LogIndex) -> Option<LogEntry> {
        let index = self.entry_index(log_idx)?;
        self.entries.get(index).cloned()
    }

    fn get_term(&mut self, log_idx: LogIndex) -> Option<TermId> {
        if log_idx != self.prev_log_idx {
            self.get(log_idx).map(|entry| entry.term)
        } else {
            Some(self.prev_log_term)
        }
    }

    fn last_taken_index(&self) -> LogIndex {
        self.last_taken
    }

    fn last_index(&self) -> LogIndex {
        self.prev_log_idx + self.entries.len() as u64
    }

    fn last_term(&self) -> TermId {
        self.entries
            .iter()
            .map(|entry| entry.term)
            .last()
            .unwrap_or(self.prev_log_term)
    }

    fn prev_index(&self) -> LogIndex {
        self.prev_log_idx
    }

    fn prev_term(&self) -> TermId {
        self.prev_log_term
    }

    fn take_next(&mut self) -> Option<LogEntry> {
        let log_idx = self.last_taken + 1;
        let entry = self.get(log_idx)?;
        self.last_taken = log_idx;
        Some(entry)
    }
}

/// The piece of a node's durable state that isn't the log itself: the term and candidate it last
/// voted for, and the highest index known committed. Flushed to its own small file any time
/// [`callbacks::persist_state`](super::callbacks::persist_state) observes a change, so a restart
/// never replays a vote already cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogHeader {
    pub current_term: u64,
    pub voted_for: Option<u64>,
    pub commit_idx: u64,
}

impl LogHeader {
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        match File::open(path) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                bincode::deserialize(&buf)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Writes the header to `path` via a temporary file and rename, so a crash mid-write never
    /// leaves a corrupt header behind for `load` to choke on.
    pub fn flush(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        let tmp_path: PathBuf = path.with_extension("tmp");

        let encoded =
            bincode::serialize(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            writer.write_all(&encoded)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        std::fs::rename(&tmp_path, path)
    }
}

#[cfg(test)]
mod tests {
    use raft::message::LogIndex;
    use tempfile::NamedTempFile;

    use super::*;

    fn idx(id: u64) -> LogIndex {
        LogIndex { id }
    }

    #[test]
    fn appends_and_replays_entries() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(LogEntry {
                term: TermId { id: 1 },
                data: Bytes::from_static(b"one"),
            })
            .unwrap();
            log.append(LogEntry {
                term: TermId { id: 1 },
                data: Bytes::from_static(b"two"),
            })
            .unwrap();
            assert_eq!(log.last_index(), idx(2));
        }

        let mut reopened = FileLog::open(&path).unwrap();
        assert_eq!(reopened.last_index(), idx(2));
        assert_eq!(reopened.get(idx(1)).unwrap().data, Bytes::from_static(b"one"));
        assert_eq!(reopened.get(idx(2)).unwrap().data, Bytes::from_static(b"two"));
    }

    #[test]
    fn cancel_from_truncates_file_and_survives_reopen() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let mut log = FileLog::open(&path).unwrap();
        for i in 1..=3u64 {
            log.append(LogEntry {
                term: TermId { id: 1 },
                data: Bytes::from(vec![i as u8]),
            })
            .unwrap();
        }

        let cancelled = log.cancel_from(idx(2)).unwrap();
        assert_eq!(cancelled, 2);
        assert_eq!(log.last_index(), idx(1));
        drop(log);

        let reopened = FileLog::open(&path).unwrap();
        assert_eq!(reopened.last_index(), idx(1));
    }

    #[test]
    fn header_round_trips_through_flush_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header");

        let header = LogHeader {
            current_term: 4,
            voted_for: Some(2),
            commit_idx: 9,
        };
        header.flush(&path).unwrap();

        let loaded = LogHeader::load(&path).unwrap();
        assert_eq!(header, loaded);
    }

    #[test]
    fn missing_header_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-header");
        assert_eq!(LogHeader::load(&path).unwrap(), LogHeader::default());
    }
}
