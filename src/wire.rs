//! Little-endian field readers and writers.
//!
//! [`WireReader`] walks a byte slice and reports every short read as a
//! [`Error::Decode`] carrying the absolute offset of the failed field, so a
//! caller decoding a record in the middle of a stream sees where the stream
//! broke rather than an index relative to the record.
use crate::error::{Error, Result};

pub(crate) struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    /// Absolute offset of `bytes[0]` within the enclosing buffer.
    base: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        pub(crate) fn $name(&mut self) -> Result<$ty> {
            let raw = self.take(std::mem::size_of::<$ty>(), stringify!($ty))?;
            let mut tmp = [0u8; std::mem::size_of::<$ty>()];
            tmp.copy_from_slice(raw);
            Ok(<$ty>::from_le_bytes(tmp))
        }
    };
}

impl<'a> WireReader<'a> {
    pub(crate) fn new(bytes: &'a [u8], base: usize) -> Self {
        Self { bytes, pos: 0, base }
    }

    /// Absolute offset of the next unread byte.
    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::decode(
                self.offset(),
                format!("truncated {what}: need {len} bytes, {} left", self.remaining()),
            ));
        }
        let out = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len, "padding").map(|_| ())
    }

    read_le!(read_u8, u8);
    read_le!(read_u32, u32);
    read_le!(read_i32, i32);
    read_le!(read_u64, u64);
    read_le!(read_i64, i64);
}

/// Append-only little-endian writer over a `Vec<u8>`.
pub(crate) trait WireWrite {
    fn put_u8(&mut self, v: u8);
    fn put_u32(&mut self, v: u32);
    fn put_i32(&mut self, v: i32);
    fn put_u64(&mut self, v: u64);
    fn put_i64(&mut self, v: i64);
    fn put_zeros(&mut self, n: usize);
}

impl WireWrite for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }
    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_i32(&mut self, v: i32) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_u64(&mut self, v: u64) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_i64(&mut self, v: i64) {
        self.extend_from_slice(&v.to_le_bytes());
    }
    fn put_zeros(&mut self, n: usize) {
        self.resize(self.len() + n, 0);
    }
}
