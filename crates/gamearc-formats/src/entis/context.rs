//! Symbol contexts for Entis streams
//!
//! Both architectures code signed residuals with runs of zeros and keep
//! their run state across calls, so a run may continue from one block into
//! the next.

use tracing::trace;

use super::header::{ARCHITECTURE_GAMMA, ARCHITECTURE_HUFFMAN, ARCHITECTURE_NEMESIS};
use crate::bits::BitSource;
use crate::error::{DecodeError, DecodeResult};
use crate::huffman::{EscapeCoding, HuffmanTree};

const CONTEXT_TREES: usize = 256;

/// Entropy coding architecture of an Entis stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Alternating gamma coded runs of zeros and of signed values
    Gamma,
    /// Adaptive Huffman symbols with Huffman coded zero runs
    Huffman,
}

impl Architecture {
    /// Map an architecture code from an info record
    pub fn from_code(code: u32) -> DecodeResult<Self> {
        match code {
            ARCHITECTURE_GAMMA => Ok(Self::Gamma),
            ARCHITECTURE_HUFFMAN => Ok(Self::Huffman),
            ARCHITECTURE_NEMESIS => Err(DecodeError::unsupported("Entis Nemesis coding")),
            other => Err(DecodeError::Format(format!(
                "unknown Entis architecture {other:#010x}"
            ))),
        }
    }
}

/// Run-length state of the gamma architecture
#[derive(Debug, Clone)]
pub(crate) struct GammaContext {
    zero: bool,
    next_zero: bool,
    remaining: u32,
}

impl GammaContext {
    fn prepare(source: &mut dyn BitSource) -> DecodeResult<Self> {
        Ok(Self {
            zero: false,
            next_zero: source.get_bit()? == 1,
            remaining: 0,
        })
    }

    fn decode_symbols(&mut self, source: &mut dyn BitSource, out: &mut [i32]) -> DecodeResult<()> {
        for slot in out.iter_mut() {
            if self.remaining == 0 {
                self.zero = self.next_zero;
                self.next_zero = !self.zero;
                self.remaining = source.get_gamma_code()?;
            }
            self.remaining -= 1;
            *slot = if self.zero {
                0
            } else {
                let negative = source.get_bit()? == 1;
                let magnitude = i32::try_from(source.get_gamma_code()?).map_err(|_| {
                    DecodeError::Format("gamma coded value out of range".to_string())
                })?;
                if negative { -magnitude } else { magnitude }
            };
        }
        Ok(())
    }
}

/// Adaptive Huffman state of the Huffman architecture
#[derive(Debug, Clone)]
pub(crate) struct HuffmanContext {
    trees: Vec<HuffmanTree>,
    runs: HuffmanTree,
    previous: u8,
    pending_zeros: u32,
}

impl HuffmanContext {
    fn prepare(source: &mut dyn BitSource) -> DecodeResult<Self> {
        let tree_count = if source.get_bit()? == 1 { CONTEXT_TREES } else { 1 };
        Ok(Self {
            trees: vec![HuffmanTree::new(EscapeCoding::Byte); tree_count],
            runs: HuffmanTree::new(EscapeCoding::Gamma),
            previous: 0,
            pending_zeros: 0,
        })
    }

    fn tree_index(&self) -> usize {
        if self.trees.len() == 1 { 0 } else { usize::from(self.previous) }
    }

    fn decode_symbols(&mut self, source: &mut dyn BitSource, out: &mut [i32]) -> DecodeResult<()> {
        for slot in out.iter_mut() {
            if self.pending_zeros > 0 {
                self.pending_zeros -= 1;
                *slot = 0;
                continue;
            }
            let index = self.tree_index();
            let symbol = self.trees[index].decode(source)? as u8;
            self.previous = symbol;
            if symbol == 0 {
                let length = self.runs.decode(source)?;
                if length == 0 {
                    return Err(DecodeError::Format("zero length run".to_string()));
                }
                self.pending_zeros = length - 1;
                *slot = 0;
            } else {
                *slot = i32::from(symbol as i8);
            }
        }
        Ok(())
    }
}

/// Decoding state shared by all blocks of a stream
#[derive(Debug, Clone)]
pub(crate) enum SymbolContext {
    Gamma(GammaContext),
    Huffman(Box<HuffmanContext>),
}

impl SymbolContext {
    /// Read the stream prologue of `architecture`
    pub(crate) fn prepare(architecture: Architecture, source: &mut dyn BitSource) -> DecodeResult<Self> {
        let context = match architecture {
            Architecture::Gamma => Self::Gamma(GammaContext::prepare(source)?),
            Architecture::Huffman => Self::Huffman(Box::new(HuffmanContext::prepare(source)?)),
        };
        trace!(?architecture, "Prepared Entis symbol context");
        Ok(context)
    }

    /// Fill `out` with the next symbols
    pub(crate) fn decode_symbols(&mut self, source: &mut dyn BitSource, out: &mut [i32]) -> DecodeResult<()> {
        match self {
            Self::Gamma(context) => context.decode_symbols(source, out),
            Self::Huffman(context) => context.decode_symbols(source, out),
        }
    }
}
