//! Record File — per-model fixed-size slot file plus id → offset table
//!
//! `<model>.dat` holds slots of `8 + record_size` bytes: an i64 LE owner id
//! (-1 = tombstone) followed by the encoded record. `<model>.ix` starts
//! with a 16-byte header and then stores one i64 LE slot offset per assigned
//! id (-1 = deleted). The number of offset entries is the next id to assign.

use crate::config::DurabilityLevel;
use crate::error::{GnxError, GnxResult};
use crate::storage::value::RecordId;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const IX_MAGIC: [u8; 4] = *b"GNXI";
const IX_VERSION: u32 = 1;
const IX_HEADER_LEN: u64 = 16;
const SLOT_HEADER_LEN: u64 = 8;
const DELETED: i64 = -1;

// Model names never contain '.', so the two extensions keep every model's
// files apart.
pub fn data_path(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("{model}.dat"))
}

pub fn offsets_path(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("{model}.ix"))
}

/// Snapshot of every live record, in ascending id order.
pub struct SlotScan {
    buffer: Vec<u8>,
    entries: Vec<(RecordId, usize)>,
    record_size: usize,
}

impl SlotScan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(id, byte position of the record)` pairs.
    pub fn entries(&self) -> &[(RecordId, usize)] {
        &self.entries
    }

    pub fn record(&self, pos: usize) -> &[u8] {
        &self.buffer[pos..pos + self.record_size]
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &[u8])> + '_ {
        self.entries.iter().map(|&(id, pos)| (id, self.record(pos)))
    }
}

/// Slot file of one model.
pub struct RecordFile {
    model: String,
    data: Mutex<File>,
    offsets_file: File,
    record_size: usize,
    offsets: Vec<i64>,
    slots: u64,
    live: usize,
    durability: DurabilityLevel,
}

impl RecordFile {
    /// Create (or truncate) the files of `model` inside `dir`.
    pub fn create(
        dir: &Path,
        model: &str,
        record_size: usize,
        durability: DurabilityLevel,
    ) -> GnxResult<Self> {
        let open = |path: PathBuf| {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)
        };
        let data = open(data_path(dir, model))?;
        let mut offsets_file = open(offsets_path(dir, model))?;

        let mut header = Vec::with_capacity(IX_HEADER_LEN as usize);
        header.extend_from_slice(&IX_MAGIC);
        header.extend_from_slice(&IX_VERSION.to_le_bytes());
        header.extend_from_slice(&(record_size as u64).to_le_bytes());
        offsets_file.write_all(&header)?;

        let file = Self {
            model: model.to_string(),
            data: Mutex::new(data),
            offsets_file,
            record_size,
            offsets: Vec::new(),
            slots: 0,
            live: 0,
            durability,
        };
        file.sync_if_full()?;
        Ok(file)
    }

    /// Open existing files, validating them against `record_size`.
    pub fn open(
        dir: &Path,
        model: &str,
        record_size: usize,
        durability: DurabilityLevel,
    ) -> GnxResult<Self> {
        let open = |path: PathBuf| -> GnxResult<File> {
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)
                .map_err(|e| GnxError::Corrupted(format!("cannot open {}: {e}", path.display())))
        };
        let data = open(data_path(dir, model))?;
        let mut offsets_file = open(offsets_path(dir, model))?;

        let mut raw = Vec::new();
        offsets_file.read_to_end(&mut raw)?;
        if raw.len() < IX_HEADER_LEN as usize || raw[..4] != IX_MAGIC {
            return Err(GnxError::Corrupted(format!("bad offset table header for '{model}'")));
        }
        let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
        if version != IX_VERSION {
            return Err(GnxError::Corrupted(format!(
                "offset table of '{model}' has version {version}, expected {IX_VERSION}"
            )));
        }
        let mut size_bytes = [0u8; 8];
        size_bytes.copy_from_slice(&raw[8..16]);
        let stored_size = u64::from_le_bytes(size_bytes) as usize;
        if stored_size != record_size {
            return Err(GnxError::Corrupted(format!(
                "'{model}' records are {stored_size} bytes on disk, layout says {record_size}"
            )));
        }

        let body = &raw[IX_HEADER_LEN as usize..];
        if body.len() % 8 != 0 {
            return Err(GnxError::Corrupted(format!("truncated offset table for '{model}'")));
        }
        let offsets: Vec<i64> = body
            .chunks_exact(8)
            .map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                i64::from_le_bytes(b)
            })
            .collect();

        let slot_size = SLOT_HEADER_LEN + record_size as u64;
        let data_len = data.metadata()?.len();
        if data_len % slot_size != 0 {
            return Err(GnxError::Corrupted(format!(
                "data file of '{model}' is {data_len} bytes, not a multiple of {slot_size}"
            )));
        }
        for (id, &off) in offsets.iter().enumerate() {
            if off >= 0 && (off as u64 % slot_size != 0 || off as u64 >= data_len) {
                return Err(GnxError::Corrupted(format!(
                    "record {id} of '{model}' points outside the data file"
                )));
            }
        }

        let live = offsets.iter().filter(|&&o| o >= 0).count();
        debug!(model, records = offsets.len(), live, "record file opened");

        Ok(Self {
            model: model.to_string(),
            data: Mutex::new(data),
            offsets_file,
            record_size,
            offsets,
            slots: data_len / slot_size,
            live,
            durability,
        })
    }

    fn slot_size(&self) -> u64 {
        SLOT_HEADER_LEN + self.record_size as u64
    }

    /// Id the next appended record receives.
    pub fn next_id(&self) -> RecordId {
        self.offsets.len() as RecordId
    }

    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn is_live(&self, id: RecordId) -> bool {
        self.offset_of(id).is_some()
    }

    fn offset_of(&self, id: RecordId) -> Option<u64> {
        match self.offsets.get(id as usize) {
            Some(&off) if off >= 0 => Some(off as u64),
            _ => None,
        }
    }

    fn require(&self, id: RecordId) -> GnxResult<u64> {
        self.offset_of(id)
            .ok_or_else(|| GnxError::not_found(&self.model, id as i64))
    }

    fn check_len(&self, bytes: &[u8]) -> GnxResult<()> {
        if bytes.len() != self.record_size {
            return Err(GnxError::Corrupted(format!(
                "record for '{}' is {} bytes, expected {}",
                self.model,
                bytes.len(),
                self.record_size
            )));
        }
        Ok(())
    }

    fn write_offset(&mut self, id: RecordId) -> GnxResult<()> {
        let value = self.offsets[id as usize];
        self.offsets_file
            .seek(SeekFrom::Start(IX_HEADER_LEN + id * 8))?;
        self.offsets_file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn sync_if_full(&self) -> GnxResult<()> {
        if self.durability == DurabilityLevel::Full {
            self.data.lock().sync_data()?;
            self.offsets_file.sync_data()?;
        }
        Ok(())
    }

    /// Append a record, returning its new id.
    pub fn append(&mut self, bytes: &[u8]) -> GnxResult<RecordId> {
        self.check_len(bytes)?;
        let id = self.next_id();
        let off = self.slots * self.slot_size();
        {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(off))?;
            data.write_all(&(id as i64).to_le_bytes())?;
            data.write_all(bytes)?;
        }
        self.offsets.push(off as i64);
        self.write_offset(id)?;
        self.slots += 1;
        self.live += 1;
        self.sync_if_full()?;
        Ok(id)
    }

    /// Read a live record. `None` for deleted or never-assigned ids.
    pub fn read(&self, id: RecordId) -> GnxResult<Option<Vec<u8>>> {
        let Some(off) = self.offset_of(id) else {
            return Ok(None);
        };
        let mut buf = vec![0u8; self.record_size];
        let mut data = self.data.lock();
        data.seek(SeekFrom::Start(off + SLOT_HEADER_LEN))?;
        data.read_exact(&mut buf)?;
        Ok(Some(buf))
    }

    /// Overwrite a live record in place.
    pub fn write(&mut self, id: RecordId, bytes: &[u8]) -> GnxResult<()> {
        self.check_len(bytes)?;
        let off = self.require(id)?;
        {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(off + SLOT_HEADER_LEN))?;
            data.write_all(bytes)?;
        }
        self.sync_if_full()
    }

    /// Lazy delete: mark the slot as a tombstone and retire the id.
    pub fn tombstone(&mut self, id: RecordId) -> GnxResult<()> {
        let off = self.require(id)?;
        {
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(off))?;
            data.write_all(&DELETED.to_le_bytes())?;
        }
        self.offsets[id as usize] = DELETED;
        self.write_offset(id)?;
        self.live -= 1;
        self.sync_if_full()
    }

    /// Eager delete: move the last slot into the hole and shrink the file.
    pub fn remove(&mut self, id: RecordId) -> GnxResult<()> {
        let off = self.require(id)?;
        let slot_size = self.slot_size();
        let last = (self.slots - 1) * slot_size;

        let moved_owner = if off != last {
            let mut slot = vec![0u8; slot_size as usize];
            let mut data = self.data.lock();
            data.seek(SeekFrom::Start(last))?;
            data.read_exact(&mut slot)?;
            data.seek(SeekFrom::Start(off))?;
            data.write_all(&slot)?;
            let mut owner = [0u8; 8];
            owner.copy_from_slice(&slot[..8]);
            Some(i64::from_le_bytes(owner))
        } else {
            None
        };
        self.data.lock().set_len(last)?;
        self.slots -= 1;

        if let Some(owner) = moved_owner.filter(|&o| o >= 0) {
            self.offsets[owner as usize] = off as i64;
            self.write_offset(owner as RecordId)?;
        }
        self.offsets[id as usize] = DELETED;
        self.write_offset(id)?;
        self.live -= 1;
        self.sync_if_full()
    }

    fn read_all(&self) -> GnxResult<Vec<u8>> {
        let mut buffer = Vec::with_capacity((self.slots * self.slot_size()) as usize);
        let mut data = self.data.lock();
        data.seek(SeekFrom::Start(0))?;
        data.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Read every live record in one pass.
    pub fn scan(&self) -> GnxResult<SlotScan> {
        let buffer = self.read_all()?;
        let entries = self
            .offsets
            .iter()
            .enumerate()
            .filter(|&(_, &off)| off >= 0)
            .map(|(id, &off)| (id as RecordId, off as usize + SLOT_HEADER_LEN as usize))
            .collect();
        Ok(SlotScan {
            buffer,
            entries,
            record_size: self.record_size,
        })
    }

    /// Drop tombstoned slots, compacting the data file. Ids are unchanged.
    ///
    /// Returns the number of reclaimed slots.
    pub fn vacuum(&mut self) -> GnxResult<usize> {
        let reclaimable = self.slots as usize - self.live;
        if reclaimable == 0 {
            return Ok(0);
        }

        let slot_size = self.slot_size() as usize;
        let buffer = self.read_all()?;
        let mut compacted = Vec::with_capacity(self.live * slot_size);
        for slot in buffer.chunks_exact(slot_size) {
            let mut owner = [0u8; 8];
            owner.copy_from_slice(&slot[..8]);
            let owner = i64::from_le_bytes(owner);
            if owner >= 0 {
                self.offsets[owner as usize] = compacted.len() as i64;
                compacted.extend_from_slice(slot);
            }
        }

        {
            let mut data = self.data.lock();
            data.set_len(0)?;
            data.seek(SeekFrom::Start(0))?;
            data.write_all(&compacted)?;
        }
        self.slots = (compacted.len() / slot_size) as u64;

        let mut table = Vec::with_capacity(self.offsets.len() * 8);
        for off in &self.offsets {
            table.extend_from_slice(&off.to_le_bytes());
        }
        self.offsets_file.seek(SeekFrom::Start(IX_HEADER_LEN))?;
        self.offsets_file.write_all(&table)?;

        debug!(model = %self.model, reclaimed = reclaimable, "vacuum complete");
        self.sync_if_full()?;
        Ok(reclaimable)
    }

    /// fsync both files.
    pub fn flush(&self) -> GnxResult<()> {
        self.data.lock().sync_all()?;
        self.offsets_file.sync_all()?;
        Ok(())
    }
}
