//! Owned stream buffer with eager, tabular and replay access.
//!
//! A [`BufferStore`] holds the complete stream and the metadata parsed from
//! its head. Records are decoded on demand from the buffer; nothing decoded
//! is cached, so every access mode sees the bytes exactly as stored.
//!
//! Replay comes in two forms:
//!
//! - [`BufferStore::replay`] advances a cursor owned by the store. It takes
//!   `&mut self`, so only one caller can drive it at a time.
//! - [`BufferStore::iter`] hands out an independent [`Replay`] cursor that
//!   borrows the buffer; any number may run side by side.
use crate::codec::{decode_from, decode_one, encode_stream};
use crate::error::Result;
use crate::metadata::Metadata;
use crate::record::{Record, RecordEnum};
use crate::table::{Table, TableOptions, project};
use crate::METADATA_LENGTH;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct BufferStore {
    buffer: Vec<u8>,
    metadata: Metadata,
    /// Offset of the next record to replay, relative to the first record.
    cursor: usize,
}

impl BufferStore {
    /// Take ownership of a complete stream and parse its metadata.
    pub fn new(buffer: Vec<u8>) -> Result<Self> {
        let metadata = Metadata::decode(&buffer)?;
        debug!(
            bytes = buffer.len(),
            schema = %metadata.schema,
            "buffer store ready"
        );
        Ok(Self {
            buffer,
            metadata,
            cursor: 0,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::new(bytes.to_vec())
    }

    /// Read the whole file at `path` into memory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let buffer = fs::read(path)?;
        debug!(path = %path.display(), bytes = buffer.len(), "loaded stream file");
        Self::new(buffer)
    }

    /// Encode `metadata` and `records` into a fresh store.
    pub fn from_parts(metadata: &Metadata, records: &[RecordEnum]) -> Result<Self> {
        Self::new(encode_stream(metadata, records)?)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// The complete stream, metadata block included.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// The record stream following the metadata block.
    pub fn record_bytes(&self) -> &[u8] {
        &self.buffer[METADATA_LENGTH..]
    }

    /// Decode every record. Does not touch the replay cursor.
    pub fn decode_to_array(&self) -> Result<Vec<RecordEnum>> {
        decode_from(&self.buffer, METADATA_LENGTH)
    }

    /// Decode every record and project it into a [`Table`].
    pub fn decode_to_df(&self, opts: TableOptions) -> Result<Table> {
        project(&self.metadata, &self.decode_to_array()?, opts)
    }

    /// Decode the record at the cursor and advance past it.
    ///
    /// Returns `Ok(None)` once every record has been consumed, and keeps
    /// returning it until [`reset`](Self::reset). A decode error leaves the
    /// cursor where it was.
    pub fn replay(&mut self) -> Result<Option<RecordEnum>> {
        let offset = METADATA_LENGTH + self.cursor;
        if offset >= self.buffer.len() {
            return Ok(None);
        }
        let (record, consumed) = decode_one(&self.buffer, offset)?;
        self.cursor += consumed;
        trace!(
            offset,
            rtype = %record.rtype(),
            instrument_id = record.instrument_id(),
            ts_event = record.ts_event(),
            "replayed record"
        );
        Ok(Some(record))
    }

    /// Cursor offset relative to the first record.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Rewind the replay cursor to the first record.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Independent cursor over the records, starting at the first one.
    pub fn iter(&self) -> Replay<'_> {
        Replay {
            bytes: &self.buffer,
            offset: METADATA_LENGTH,
        }
    }

    /// Write the stream to `path` byte for byte.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, &self.buffer)?;
        debug!(path = %path.display(), bytes = self.buffer.len(), "wrote stream file");
        Ok(())
    }
}

impl<'a> IntoIterator for &'a BufferStore {
    type Item = Result<RecordEnum>;
    type IntoIter = Replay<'a>;

    fn into_iter(self) -> Replay<'a> {
        self.iter()
    }
}

/// Cursor over a borrowed stream. Yields each record once, then `None`.
/// After an error it yields `None`.
#[derive(Debug, Clone)]
pub struct Replay<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Replay<'_> {
    /// Absolute offset of the next record.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for Replay<'_> {
    type Item = Result<RecordEnum>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        match decode_one(self.bytes, self.offset) {
            Ok((record, consumed)) => {
                self.offset += consumed;
                Some(Ok(record))
            }
            Err(e) => {
                self.offset = self.bytes.len();
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Replay<'_> {}
