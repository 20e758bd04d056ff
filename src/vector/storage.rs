//! Durable record storage backed by a memory-mapped, append-only file.
//!
//! # Storage Format
//!
//! A single `records.vec` file per store directory:
//! - Header (16 bytes): magic, version, dimension, record count
//! - Records: `u32` id length, id bytes, `u32` payload length, payload JSON,
//!   then `dimension` little-endian f32 values
//!
//! The header count is rewritten only after a record has been fully appended,
//! so a crash mid-write leaves a trailing fragment. Opening the store cuts
//! the file back to the end of the last counted record, and appends always
//! start there.
//! A dimension of zero in the header means no record has been written yet.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use thiserror::Error;

use crate::vector::record::{Payload, VectorRecord};
use crate::vector::types::{RecordId, VectorDimension, VectorError};

/// Current storage format version.
const STORAGE_VERSION: u32 = 1;

/// Size of the storage header in bytes.
const HEADER_SIZE: usize = 16;

/// Magic bytes to identify record storage files.
const MAGIC_BYTES: &[u8; 4] = b"PFVR";

/// Number of bytes per f32 value.
const BYTES_PER_F32: usize = 4;

/// Number of bytes per length prefix (u32).
const BYTES_PER_LEN: usize = 4;

/// Byte offset of the dimension field in the header.
const DIMENSION_OFFSET: u64 = 8;

/// File name used inside the store directory.
pub const RECORDS_FILE: &str = "records.vec";

/// Errors specific to record storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid storage format: {0}\nSuggestion: The store may be corrupted, re-ingest into a fresh store path")]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Use a store written by a compatible version"
    )]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(
        "Store was built with embedding model '{stored}' but '{configured}' is configured\nSuggestion: Use the original model or point store_path at a fresh directory"
    )]
    ModelMismatch { stored: String, configured: String },

    #[error("Vector error: {0}")]
    Vector(#[from] VectorError),
}

/// Durable storage for vector records.
///
/// The index calls `put` under its write lock and `scan` once when it is
/// built, so implementations do not need their own synchronisation.
pub trait RecordStore: Send + Sync {
    /// Appends a record. Must not leave a partially visible record on failure.
    fn put(&mut self, record: &VectorRecord) -> Result<(), StoreError>;

    /// Reads every stored record in insertion order.
    fn scan(&mut self) -> Result<Vec<VectorRecord>, StoreError>;

    /// Dimension fixed by the first stored record, if any.
    fn dimension(&self) -> Option<VectorDimension>;

    /// Number of records stored.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memory-mapped record storage in a single directory.
#[derive(Debug)]
pub struct MmapRecordStore {
    /// Path to the storage file.
    path: PathBuf,

    /// Memory-mapped file for reading.
    mmap: Option<Mmap>,

    /// Vector dimension, unset until the first record is written.
    dimension: Option<VectorDimension>,

    /// Number of complete records in the file.
    record_count: usize,

    /// Byte offset just past the last complete record.
    data_end: u64,
}

impl MmapRecordStore {
    /// Opens an existing store.
    ///
    /// Returns an error if the file doesn't exist or has an invalid header.
    pub fn open(base_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = Self::records_path(base_path.as_ref());

        if !path.exists() {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Record storage file not found: {path:?}"),
            )));
        }

        let file = File::open(&path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let (dimension, record_count) = Self::read_header(&mmap)?;
        let data_end = records_end(&mmap, dimension, record_count)?;

        if data_end < mmap.len() {
            tracing::warn!(
                "Dropping {} trailing bytes after {} records in {:?}",
                mmap.len() - data_end,
                record_count,
                path
            );
            drop(mmap);
            OpenOptions::new()
                .write(true)
                .open(&path)?
                .set_len(data_end as u64)?;

            return Ok(Self {
                path,
                mmap: None,
                dimension,
                record_count,
                data_end: data_end as u64,
            });
        }

        Ok(Self {
            path,
            mmap: Some(mmap),
            dimension,
            record_count,
            data_end: data_end as u64,
        })
    }

    /// Opens the store, creating the directory and an empty file if needed.
    pub fn open_or_create(base_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_path = base_path.as_ref();
        let path = Self::records_path(base_path);

        if path.exists() {
            return Self::open(base_path);
        }

        std::fs::create_dir_all(base_path)?;
        let mut file = File::create(&path)?;
        Self::write_header(&mut file, None, 0)?;
        file.flush()?;

        Ok(Self {
            path,
            mmap: None,
            dimension: None,
            record_count: 0,
            data_end: HEADER_SIZE as u64,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size of the storage file in bytes.
    pub fn file_size(&self) -> Result<u64, io::Error> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn records_path(base_path: &Path) -> PathBuf {
        base_path.join(RECORDS_FILE)
    }

    fn write_header(
        file: &mut File,
        dimension: Option<VectorDimension>,
        record_count: usize,
    ) -> Result<(), io::Error> {
        file.write_all(MAGIC_BYTES)?;
        file.write_all(&STORAGE_VERSION.to_le_bytes())?;
        file.write_all(&(dimension.map_or(0, |d| d.get()) as u32).to_le_bytes())?;
        file.write_all(&(record_count as u32).to_le_bytes())?;
        Ok(())
    }

    fn read_header(mmap: &[u8]) -> Result<(Option<VectorDimension>, usize), StoreError> {
        if mmap.len() < HEADER_SIZE {
            return Err(StoreError::InvalidFormat(
                "File too small to contain header".to_string(),
            ));
        }

        if &mmap[0..4] != MAGIC_BYTES {
            return Err(StoreError::InvalidFormat("Invalid magic bytes".to_string()));
        }

        let version = read_u32(mmap, 4);
        if version != STORAGE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORAGE_VERSION,
                actual: version,
            });
        }

        let dimension = match read_u32(mmap, 8) {
            0 => None,
            value => Some(VectorDimension::new(value as usize)?),
        };
        let record_count = read_u32(mmap, 12) as usize;

        Ok((dimension, record_count))
    }

    fn encode(record: &VectorRecord) -> Result<Vec<u8>, StoreError> {
        let id = record.id().as_str().as_bytes();
        let payload = serde_json::to_vec(record.payload())
            .map_err(|e| StoreError::Serialization(format!("Failed to encode payload: {e}")))?;

        let mut buf = Vec::with_capacity(
            2 * BYTES_PER_LEN + id.len() + payload.len() + record.dimension() * BYTES_PER_F32,
        );
        buf.extend_from_slice(&(id.len() as u32).to_le_bytes());
        buf.extend_from_slice(id);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        for &value in record.vector() {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        Ok(buf)
    }

    fn decode(
        bytes: &[u8],
        offset: &mut usize,
        dimension: usize,
    ) -> Result<VectorRecord, StoreError> {
        let id = take_prefixed(bytes, offset)?;
        let id = std::str::from_utf8(id)
            .map_err(|e| StoreError::InvalidFormat(format!("Record id is not UTF-8: {e}")))?;
        let id = RecordId::new(id)?;

        let payload = take_prefixed(bytes, offset)?;
        let payload: Payload = serde_json::from_slice(payload)
            .map_err(|e| StoreError::Serialization(format!("Failed to decode payload: {e}")))?;

        let end = *offset + dimension * BYTES_PER_F32;
        if end > bytes.len() {
            return Err(StoreError::InvalidFormat(format!(
                "Record '{id}' is truncated"
            )));
        }
        let vector = bytes[*offset..end]
            .chunks_exact(BYTES_PER_F32)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        *offset = end;

        Ok(VectorRecord::new(id, vector, payload)?)
    }

    fn ensure_mapped(&mut self) -> Result<(), StoreError> {
        if self.mmap.is_none() {
            let file = File::open(&self.path)?;
            let mmap = unsafe { MmapOptions::new().map(&file)? };
            let (dimension, count) = Self::read_header(&mmap)?;
            self.dimension = dimension;
            self.record_count = count;
            self.mmap = Some(mmap);
        }
        Ok(())
    }

    /// Rewrites the dimension and count fields after a successful append.
    fn update_header(&self) -> Result<(), StoreError> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(DIMENSION_OFFSET))?;
        file.write_all(&(self.dimension.map_or(0, |d| d.get()) as u32).to_le_bytes())?;
        file.write_all(&(self.record_count as u32).to_le_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Cuts the file back to `len` bytes after a failed append.
    fn truncate_to(&self, len: u64) {
        if let Ok(file) = OpenOptions::new().write(true).open(&self.path) {
            if let Err(e) = file.set_len(len) {
                tracing::warn!("Failed to truncate partial record in {:?}: {}", self.path, e);
            }
        }
    }
}

impl RecordStore for MmapRecordStore {
    fn put(&mut self, record: &VectorRecord) -> Result<(), StoreError> {
        let dimension = match self.dimension {
            Some(dimension) => {
                dimension.validate_vector(record.vector())?;
                dimension
            }
            None => VectorDimension::new(record.dimension())?,
        };

        let encoded = Self::encode(record)?;

        // Unmap before resizing the file underneath it
        self.mmap = None;

        // Write over any uncounted fragment rather than after it
        let start = self.data_end;
        let end = start + encoded.len() as u64;
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        let written = file
            .seek(SeekFrom::Start(start))
            .and_then(|_| file.write_all(&encoded))
            .and_then(|_| file.set_len(end))
            .and_then(|_| file.flush());
        if let Err(e) = written {
            self.truncate_to(start);
            return Err(e.into());
        }

        let previous = (self.dimension, self.record_count);
        self.dimension = Some(dimension);
        self.record_count += 1;
        if let Err(e) = self.update_header() {
            (self.dimension, self.record_count) = previous;
            self.truncate_to(start);
            return Err(e);
        }
        self.data_end = end;
        Ok(())
    }

    fn scan(&mut self) -> Result<Vec<VectorRecord>, StoreError> {
        self.ensure_mapped()?;
        let bytes: &[u8] = self
            .mmap
            .as_ref()
            .ok_or_else(|| StoreError::InvalidFormat("Storage is not mapped".to_string()))?;
        let (dimension, count) = Self::read_header(bytes)?;

        let Some(dimension) = dimension else {
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(count);
        let mut offset = HEADER_SIZE;
        for _ in 0..count {
            records.push(Self::decode(bytes, &mut offset, dimension.get())?);
        }

        if offset < bytes.len() {
            tracing::warn!(
                "Ignoring {} trailing bytes after {} records in {:?}",
                bytes.len() - offset,
                count,
                self.path
            );
        }

        Ok(records)
    }

    fn dimension(&self) -> Option<VectorDimension> {
        self.dimension
    }

    fn len(&self) -> usize {
        self.record_count
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Offset just past the first `count` records, without decoding payloads.
fn records_end(
    bytes: &[u8],
    dimension: Option<VectorDimension>,
    count: usize,
) -> Result<usize, StoreError> {
    let mut offset = HEADER_SIZE;
    let Some(dimension) = dimension else {
        return Ok(offset);
    };
    for _ in 0..count {
        take_prefixed(bytes, &mut offset)?;
        take_prefixed(bytes, &mut offset)?;
        offset += dimension.get() * BYTES_PER_F32;
        if offset > bytes.len() {
            return Err(StoreError::InvalidFormat(
                "Unexpected end of file reading vector".to_string(),
            ));
        }
    }
    Ok(offset)
}

fn take_prefixed<'a>(bytes: &'a [u8], offset: &mut usize) -> Result<&'a [u8], StoreError> {
    if *offset + BYTES_PER_LEN > bytes.len() {
        return Err(StoreError::InvalidFormat(
            "Unexpected end of file reading length prefix".to_string(),
        ));
    }
    let len = read_u32(bytes, *offset) as usize;
    let start = *offset + BYTES_PER_LEN;
    let end = start + len;
    if end > bytes.len() {
        return Err(StoreError::InvalidFormat(
            "Unexpected end of file reading record field".to_string(),
        ));
    }
    *offset = end;
    Ok(&bytes[start..end])
}
