//! Stream header: schema, time bounds and symbol map.
//!
//! The header occupies a fixed [`METADATA_LENGTH`]-byte block at the start of
//! every stream:
//!
//! ```text
//! [schema:u8][start:i64][end:i64][count:u32]
//!     count x ([instrument_id:u32][ticker_len:u32][ticker bytes])
//! [zero padding up to METADATA_LENGTH]
//! ```
//!
//! Because the block size is fixed, the first record always starts at byte
//! [`METADATA_LENGTH`] and a reader never has to interpret record contents to
//! find it.
use crate::enums::Schema;
use crate::error::{Error, Result};
use crate::symbols::SymbolMap;
use crate::wire::{WireReader, WireWrite};
use crate::METADATA_LENGTH;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Bytes used by the fields preceding the symbol entries.
const FIXED_PREFIX: usize = 1 + 8 + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub schema: Schema,
    /// First timestamp covered by the stream, in ns since the UNIX epoch.
    pub start: i64,
    /// Last timestamp covered by the stream. `start <= end` is the producer's
    /// responsibility and is not checked here.
    pub end: i64,
    pub mappings: SymbolMap,
}

impl Metadata {
    pub fn new(schema: Schema, start: i64, end: i64, mappings: SymbolMap) -> Self {
        Self {
            schema,
            start,
            end,
            mappings,
        }
    }

    /// Serialize into a full header block.
    ///
    /// Fails with [`Error::Encode`] when the symbol map does not fit in the
    /// block or a ticker is longer than `u32::MAX` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(METADATA_LENGTH);
        out.put_u8(self.schema.code());
        out.put_i64(self.start);
        out.put_i64(self.end);
        out.put_u32(u32::try_from(self.mappings.len()).map_err(|_| {
            Error::Encode(format!("{} symbol entries exceed u32", self.mappings.len()))
        })?);
        for (id, ticker) in self.mappings.iter() {
            let len = u32::try_from(ticker.len())
                .map_err(|_| Error::Encode(format!("ticker for id {id} is too long")))?;
            out.put_u32(id);
            out.put_u32(len);
            out.extend_from_slice(ticker.as_bytes());
        }
        if out.len() > METADATA_LENGTH {
            return Err(Error::Encode(format!(
                "metadata needs {} bytes but the header block holds {METADATA_LENGTH}",
                out.len()
            )));
        }
        out.put_zeros(METADATA_LENGTH - out.len());
        Ok(out)
    }

    /// Parse the header block at the start of `bytes`.
    ///
    /// Bytes past [`METADATA_LENGTH`] are ignored, so a whole stream may be
    /// passed in.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < METADATA_LENGTH {
            return Err(Error::decode(
                bytes.len(),
                format!(
                    "truncated metadata: need {METADATA_LENGTH} bytes, got {}",
                    bytes.len()
                ),
            ));
        }
        let mut r = WireReader::new(&bytes[..METADATA_LENGTH], 0);
        let code = r.read_u8()?;
        let schema = Schema::try_from(code)
            .map_err(|_| Error::decode(0, format!("unknown schema discriminant {code}")))?;
        let start = r.read_i64()?;
        let end = r.read_i64()?;
        let count = r.read_u32()? as usize;
        // each entry needs at least its id and length words
        if count > (METADATA_LENGTH - FIXED_PREFIX) / 8 {
            return Err(Error::decode(
                FIXED_PREFIX - 4,
                format!("symbol count {count} cannot fit in the header block"),
            ));
        }
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let entry_at = r.offset();
            let id = r.read_u32()?;
            let len = r.read_u32()? as usize;
            let at = r.offset();
            let raw = r.take(len, "ticker")?;
            let ticker = std::str::from_utf8(raw)
                .map_err(|e| Error::decode(at, format!("ticker for id {id} is not UTF-8: {e}")))?;
            if entries.insert(id, ticker.to_string()).is_some() {
                return Err(Error::decode(entry_at, format!("duplicate instrument id {id}")));
            }
        }
        let metadata = Metadata::new(schema, start, end, SymbolMap::new(entries));
        debug!(
            schema = %metadata.schema,
            start = metadata.start,
            end = metadata.end,
            symbols = metadata.mappings.len(),
            "decoded metadata"
        );
        Ok(metadata)
    }
}
