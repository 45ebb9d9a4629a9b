//! Bounds-checked byte input shared by the byte-oriented decoders

use crate::error::{DecodeError, DecodeResult};

/// Forward-only reader over a byte slice
///
/// Every read that runs past the end fails with
/// [`DecodeError::TruncatedInput`] counted in bytes.
#[derive(Debug, Clone)]
pub(crate) struct ByteInput<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteInput<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos: pos.min(data.len()),
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, count: usize) -> DecodeResult<&'a [u8]> {
        if count > self.remaining() {
            return Err(DecodeError::truncated(count, self.remaining()));
        }
        let bytes = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub(crate) fn skip(&mut self, count: usize) -> DecodeResult<()> {
        self.take(count).map(|_| ())
    }

    pub(crate) fn u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn pair(&mut self) -> DecodeResult<[u8; 2]> {
        let bytes = self.take(2)?;
        Ok([bytes[0], bytes[1]])
    }

    pub(crate) fn u32_le(&mut self) -> DecodeResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
