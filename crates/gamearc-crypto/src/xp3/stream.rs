//! Segmented, decrypting entry stream
//!
//! XP3 entries are stored as one or more segments, each either raw or zlib
//! compressed. [`Xp3SegmentReader`] presents the concatenated plaintext as a
//! single `Read + Seek` stream and applies the entry cipher at the running
//! absolute offset. Only forward seeks are supported.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use tracing::debug;

use super::{Xp3Crypt, Xp3EntryKey};
use crate::error::CryptoError;

/// One stored segment of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xp3Segment {
    /// Whether the stored bytes are zlib compressed
    pub compressed: bool,
    /// Position of the stored bytes in the archive
    pub archive_offset: u64,
    /// Size of the segment after decompression
    pub original_size: u64,
    /// Size of the stored bytes
    pub packed_size: u64,
}

/// Forward-only reader over an entry's segments
#[derive(Debug)]
pub struct Xp3SegmentReader<R> {
    source: R,
    segments: Vec<Xp3Segment>,
    next_segment: usize,
    buffer: Vec<u8>,
    buffer_pos: usize,
    position: u64,
    total_size: u64,
    crypt: Arc<dyn Xp3Crypt>,
    entry: Xp3EntryKey,
}

impl<R: Read + Seek> Xp3SegmentReader<R> {
    /// Create a reader over `segments` of the archive `source`
    pub fn new(
        source: R,
        segments: Vec<Xp3Segment>,
        crypt: Arc<dyn Xp3Crypt>,
        entry: Xp3EntryKey,
    ) -> Self {
        let total_size = segments.iter().map(|s| s.original_size).sum();
        Self {
            source,
            segments,
            next_segment: 0,
            buffer: Vec::new(),
            buffer_pos: 0,
            position: 0,
            total_size,
            crypt,
            entry,
        }
    }

    /// Plaintext size of the entry
    pub const fn len(&self) -> u64 {
        self.total_size
    }

    /// Whether the entry is empty
    pub const fn is_empty(&self) -> bool {
        self.total_size == 0
    }

    /// Current absolute position
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Load the next segment, returning `false` at the end of the entry
    fn load_segment(&mut self) -> io::Result<bool> {
        let Some(segment) = self.segments.get(self.next_segment).copied() else {
            return Ok(false);
        };
        self.next_segment += 1;

        let packed_len = usize::try_from(segment.packed_size)
            .map_err(|_| invalid_data(format!("segment of {} bytes", segment.packed_size)))?;
        let original_len = usize::try_from(segment.original_size)
            .map_err(|_| invalid_data(format!("segment of {} bytes", segment.original_size)))?;

        self.source.seek(SeekFrom::Start(segment.archive_offset))?;
        let mut stored = vec![0u8; packed_len];
        self.source.read_exact(&mut stored)?;

        let mut plain = if segment.compressed {
            let mut out = Vec::with_capacity(original_len);
            ZlibDecoder::new(stored.as_slice()).read_to_end(&mut out)?;
            out
        } else {
            stored
        };
        if plain.len() != original_len {
            return Err(invalid_data(format!(
                "segment {} decoded to {} bytes, expected {original_len}",
                self.next_segment - 1,
                plain.len()
            )));
        }

        self.crypt.decrypt(&self.entry, self.position, &mut plain);
        debug!(
            segment = self.next_segment - 1,
            compressed = segment.compressed,
            size = original_len,
            "loaded xp3 segment"
        );
        self.buffer = plain;
        self.buffer_pos = 0;
        Ok(true)
    }

    fn skip(&mut self, mut count: u64) -> io::Result<()> {
        while count > 0 {
            if self.buffer_pos == self.buffer.len() {
                // Skip whole segments without decoding them
                match self.segments.get(self.next_segment).copied() {
                    Some(segment) if segment.original_size <= count => {
                        self.next_segment += 1;
                        self.position += segment.original_size;
                        count -= segment.original_size;
                        continue;
                    }
                    Some(_) => {
                        self.load_segment()?;
                    }
                    None => {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "seek past end of entry",
                        ));
                    }
                }
            }
            let available = (self.buffer.len() - self.buffer_pos) as u64;
            let step = available.min(count);
            self.buffer_pos += step as usize;
            self.position += step;
            count -= step;
        }
        Ok(())
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        CryptoError::InvalidSegment(message),
    )
}

impl<R: Read + Seek> Read for Xp3SegmentReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.buffer_pos == self.buffer.len() {
            if !self.load_segment()? {
                return Ok(0);
            }
        }
        let available = &self.buffer[self.buffer_pos..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.buffer_pos += count;
        self.position += count as u64;
        Ok(count)
    }
}

impl<R: Read + Seek> Seek for Xp3SegmentReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.total_size.checked_add_signed(delta),
        }
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid seek target"))?;

        if target < self.position {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "xp3 segment streams only seek forward",
            ));
        }
        if target > self.total_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek past end of entry",
            ));
        }
        self.skip(target - self.position)?;
        Ok(self.position)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::xp3::{NoCrypt, OkibaCrypt, Xp3Crypt};
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use pretty_assertions::assert_eq;
    use std::io::{Cursor, Write};

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).expect("Test operation should succeed");
        encoder.finish().expect("Test operation should succeed")
    }

    /// Archive with a 4-byte junk header, a raw segment and a zlib segment
    fn archive(first: &[u8], second: &[u8]) -> (Vec<u8>, Vec<Xp3Segment>) {
        let mut bytes = b"XP3\0".to_vec();
        let first_offset = bytes.len() as u64;
        bytes.extend_from_slice(first);
        let packed = zlib(second);
        let second_offset = bytes.len() as u64;
        bytes.extend_from_slice(&packed);
        let segments = vec![
            Xp3Segment {
                compressed: false,
                archive_offset: first_offset,
                original_size: first.len() as u64,
                packed_size: first.len() as u64,
            },
            Xp3Segment {
                compressed: true,
                archive_offset: second_offset,
                original_size: second.len() as u64,
                packed_size: packed.len() as u64,
            },
        ];
        (bytes, segments)
    }

    #[test]
    fn test_reads_across_segments() {
        let (bytes, segments) = archive(b"hello, ", b"segmented world");
        let mut reader = Xp3SegmentReader::new(
            Cursor::new(bytes),
            segments,
            Arc::new(NoCrypt),
            Xp3EntryKey::default(),
        );
        assert_eq!(reader.len(), 22);
        let mut out = String::new();
        reader.read_to_string(&mut out).expect("Test operation should succeed");
        assert_eq!(out, "hello, segmented world");
    }

    #[test]
    fn test_decrypts_at_absolute_offset() {
        let entry = Xp3EntryKey::new(0x1357_9BDF);
        // Long enough to cross the header window of the cipher
        let plain = b"abcdefghijklmnopqrstuvwxyz0123456789".repeat(4);
        let encrypted: Vec<u8> = plain
            .iter()
            .enumerate()
            .map(|(i, &b)| OkibaCrypt.decrypt_byte(&entry, i as u64, b))
            .collect();
        let (bytes, segments) = archive(&encrypted[..10], &encrypted[10..]);

        let mut reader =
            Xp3SegmentReader::new(Cursor::new(bytes), segments, Arc::new(OkibaCrypt), entry);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("Test operation should succeed");
        assert_eq!(out, plain);
    }

    #[test]
    fn test_forward_seek_and_backward_rejection() {
        let (bytes, segments) = archive(b"0123456789", b"abcdefghij");
        let mut reader = Xp3SegmentReader::new(
            Cursor::new(bytes),
            segments,
            Arc::new(NoCrypt),
            Xp3EntryKey::default(),
        );

        assert_eq!(reader.seek(SeekFrom::Start(12)).expect("Test operation should succeed"), 12);
        let mut two = [0u8; 2];
        reader.read_exact(&mut two).expect("Test operation should succeed");
        assert_eq!(&two, b"cd");

        let err = reader.seek(SeekFrom::Start(3)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);

        assert_eq!(reader.seek(SeekFrom::End(-1)).expect("Test operation should succeed"), 19);
        let mut last = Vec::new();
        reader.read_to_end(&mut last).expect("Test operation should succeed");
        assert_eq!(last, b"j");
    }

    #[test]
    fn test_corrupt_segment_size() {
        let (bytes, mut segments) = archive(b"abc", b"defg");
        segments[1].original_size = 99;
        let mut reader = Xp3SegmentReader::new(
            Cursor::new(bytes),
            segments,
            Arc::new(NoCrypt),
            Xp3EntryKey::default(),
        );
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
