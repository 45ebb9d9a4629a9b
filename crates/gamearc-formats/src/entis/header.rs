//! Entis file and section headers
//!
//! An Entis file is a 0x40 byte file header followed by tagged sections. A
//! section is an eight byte ASCII tag, a 64-bit body length and the body. The
//! top level holds a `Header  ` section, whose body is itself a list of
//! records (`FileHdr `, `ImageInf`, `SoundInf`, ...), and a `Stream  `
//! section holding the coded frames (`ImageFrm`, `SoundStm`).

use binrw::io::Cursor;
use binrw::{BinRead, BinWrite};
use tracing::{debug, trace};

use crate::error::{DecodeError, DecodeResult};
use crate::input::ByteInput;

/// Signature at the start of every Entis file
pub const ENTIS_MAGIC: [u8; 8] = *b"Entis\x1a\0\0";

/// File id of an ERI image
pub const ENTIS_IMAGE_ID: u32 = 0x0300_0100;

/// File id of a MIO sound
pub const ENTIS_SOUND_ID: u32 = 0x0200_0100;

/// Top level header section
pub const TAG_HEADER: [u8; 8] = *b"Header  ";
/// Top level stream section
pub const TAG_STREAM: [u8; 8] = *b"Stream  ";
/// File header record
pub const TAG_FILE_HEADER: [u8; 8] = *b"FileHdr ";
/// Image information record
pub const TAG_IMAGE_INFO: [u8; 8] = *b"ImageInf";
/// Sound information record
pub const TAG_SOUND_INFO: [u8; 8] = *b"SoundInf";
/// Coded image frame
pub const TAG_IMAGE_FRAME: [u8; 8] = *b"ImageFrm";
/// Coded sound stream
pub const TAG_SOUND_STREAM: [u8; 8] = *b"SoundStm";

/// Transformation code of lossless streams
pub const TRANSFORM_LOSSLESS: u32 = 0x0302_0000;
/// Transformation code of DCT streams
pub const TRANSFORM_DCT: u32 = 0x0000_0001;
/// Transformation code of lapped streams
pub const TRANSFORM_LOT: u32 = 0x0000_0005;
/// Transformation code of lapped mid/side stereo
pub const TRANSFORM_LOT_MSS: u32 = 0x0000_0105;

/// Architecture code of gamma run-length coding
pub const ARCHITECTURE_GAMMA: u32 = 0xFFFF_FFFF;
/// Architecture code of adaptive Huffman run-length coding
pub const ARCHITECTURE_HUFFMAN: u32 = 0xFFFF_FFFC;
/// Architecture code of Nemesis coding
pub const ARCHITECTURE_NEMESIS: u32 = 0xFFFF_FFF0;

/// Format type bit marking an alpha channel
pub const FORMAT_WITH_ALPHA: u32 = 0x0400_0000;
/// Format type of color images
pub const FORMAT_RGB: u32 = 1;
/// Format type of grayscale images
pub const FORMAT_GRAY: u32 = 2;

/// Entis file header
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct EntisFileHeader {
    /// Signature, always `Entis\x1a\0\0`
    #[br(assert(magic == ENTIS_MAGIC, "Invalid Entis magic: {:?}", magic))]
    pub magic: [u8; 8],

    /// Content kind, see [`ENTIS_IMAGE_ID`] and [`ENTIS_SOUND_ID`]
    pub file_id: u32,

    /// Reserved
    pub reserved: u32,

    /// Zero padded description text
    pub description: [u8; 0x30],
}

impl EntisFileHeader {
    /// Encoded header size in bytes
    pub const SIZE: usize = 0x40;

    /// Description with the padding removed
    pub fn description_text(&self) -> String {
        let end = self
            .description
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.description.len());
        String::from_utf8_lossy(&self.description[..end]).into_owned()
    }
}

/// Tag and length preceding every section body
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct SectionHeader {
    /// Eight byte ASCII tag, space padded
    pub tag: [u8; 8],

    /// Body length in bytes
    pub length: u64,
}

impl SectionHeader {
    /// Encoded header size in bytes
    pub const SIZE: usize = 16;
}

/// `FileHdr ` record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct FileRecord {
    /// Format version
    pub version: u32,

    /// Content flags
    pub content_flags: u32,

    /// Number of frame records in the stream
    pub record_count: u32,

    /// Reserved
    pub reserved: u32,
}

/// `ImageInf` record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct ImageInfo {
    /// Record version
    pub version: u32,

    /// Transformation code
    pub transformation: u32,

    /// Entropy coding architecture code
    pub architecture: u32,

    /// Color layout: [`FORMAT_RGB`] or [`FORMAT_GRAY`], optionally with [`FORMAT_WITH_ALPHA`]
    pub format_type: u32,

    /// Width in pixels
    pub width: i32,

    /// Height in pixels; positive for bottom-up images
    pub height: i32,

    /// Bits per pixel
    pub bpp: u32,

    /// Clipped pixel count
    pub clipped_pixel: u32,

    /// Chroma sampling flags
    pub sampling_flags: u32,

    /// Quantized bit count
    pub quantumized_bits: u64,

    /// Allotted bit count
    pub allotted_bits: u64,

    /// Block size as a power of two
    pub blocking_degree: u32,

    /// Lapped block count
    pub lapped_block: u32,

    /// Inter-frame transform
    pub frame_transform: u32,

    /// Inter-frame degree
    pub frame_degree: u32,
}

impl ImageInfo {
    /// Encoded record size in bytes
    pub const SIZE: usize = 68;

    /// Channel count implied by the format type
    pub fn channel_count(&self) -> DecodeResult<u32> {
        let alpha = u32::from(self.format_type & FORMAT_WITH_ALPHA != 0);
        match self.format_type & 0x00FF_FFFF {
            FORMAT_RGB => Ok(3 + alpha),
            FORMAT_GRAY => Ok(1),
            other => Err(DecodeError::unsupported(format!(
                "Entis image format type {other:#x}"
            ))),
        }
    }
}

/// `SoundInf` record
#[derive(Debug, Clone, PartialEq, Eq, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct SoundInfo {
    /// Record version
    pub version: u32,

    /// Transformation code
    pub transformation: u32,

    /// Entropy coding architecture code
    pub architecture: u32,

    /// Channel count
    pub channel_count: u32,

    /// Sample rate in Hz
    pub samples_per_sec: u32,

    /// Blocks per block set
    pub blockset_count: u32,

    /// Block length as a power of two
    pub subband_degree: u32,

    /// Samples per channel
    pub all_sample_count: u32,

    /// Lapped degree
    pub lapped_degree: u32,

    /// Bits per output sample
    pub bits_per_sample: u32,
}

impl SoundInfo {
    /// Encoded record size in bytes
    pub const SIZE: usize = 40;
}

/// One tagged section and its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section<'a> {
    /// Section tag
    pub tag: [u8; 8],
    /// Section body
    pub body: &'a [u8],
}

/// Split `data` into consecutive sections
pub fn read_sections(data: &[u8]) -> DecodeResult<Vec<Section<'_>>> {
    let mut input = ByteInput::new(data);
    let mut sections = Vec::new();
    while input.remaining() > 0 {
        let raw = input.take(SectionHeader::SIZE)?;
        let header = SectionHeader::read(&mut Cursor::new(raw))?;
        let length = usize::try_from(header.length)
            .map_err(|_| DecodeError::truncated(usize::MAX, input.remaining()))?;
        let body = input.take(length)?;
        trace!(
            tag = %String::from_utf8_lossy(&header.tag),
            length,
            "Read Entis section"
        );
        sections.push(Section {
            tag: header.tag,
            body,
        });
    }
    Ok(sections)
}

/// Parsed Entis file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntisFile<'a> {
    /// File header
    pub header: EntisFileHeader,
    /// `FileHdr ` record, when present
    pub file_record: Option<FileRecord>,
    /// `ImageInf` record, when present
    pub image_info: Option<ImageInfo>,
    /// `SoundInf` record, when present
    pub sound_info: Option<SoundInfo>,
    /// `ImageFrm` bodies in stream order
    pub image_frames: Vec<&'a [u8]>,
    /// `SoundStm` bodies in stream order
    pub sound_streams: Vec<&'a [u8]>,
}

impl<'a> EntisFile<'a> {
    /// Parse the file header and every known section
    pub fn parse(data: &'a [u8]) -> DecodeResult<Self> {
        let Some(magic) = data.get(..ENTIS_MAGIC.len()) else {
            return Err(DecodeError::truncated(ENTIS_MAGIC.len(), data.len()));
        };
        if magic != ENTIS_MAGIC {
            return Err(DecodeError::InvalidSignature {
                expected: ENTIS_MAGIC.to_vec(),
                actual: magic.to_vec(),
            });
        }
        let mut cursor = Cursor::new(data);
        let header = EntisFileHeader::read(&mut cursor)?;
        debug!(
            file_id = format_args!("{:#010x}", header.file_id),
            description = %header.description_text(),
            "Parsed Entis file header"
        );

        let mut file = Self {
            header,
            file_record: None,
            image_info: None,
            sound_info: None,
            image_frames: Vec::new(),
            sound_streams: Vec::new(),
        };
        for section in read_sections(&data[EntisFileHeader::SIZE..])? {
            match section.tag {
                TAG_HEADER => file.read_header_records(section.body)?,
                TAG_STREAM => file.read_stream_records(section.body)?,
                _ => trace!("Skipping unknown Entis top level section"),
            }
        }
        Ok(file)
    }

    fn read_header_records(&mut self, body: &'a [u8]) -> DecodeResult<()> {
        for record in read_sections(body)? {
            let mut cursor = Cursor::new(record.body);
            match record.tag {
                TAG_FILE_HEADER => self.file_record = Some(FileRecord::read(&mut cursor)?),
                TAG_IMAGE_INFO => self.image_info = Some(ImageInfo::read(&mut cursor)?),
                TAG_SOUND_INFO => self.sound_info = Some(SoundInfo::read(&mut cursor)?),
                _ => {}
            }
        }
        Ok(())
    }

    fn read_stream_records(&mut self, body: &'a [u8]) -> DecodeResult<()> {
        for record in read_sections(body)? {
            match record.tag {
                TAG_IMAGE_FRAME => self.image_frames.push(record.body),
                TAG_SOUND_STREAM => self.sound_streams.push(record.body),
                _ => {}
            }
        }
        Ok(())
    }
}
