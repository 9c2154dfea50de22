//! DAQ block wire format.
//!
//! A block in the shared ring is `[header][payload × N][descriptor × 3]`, all 64-bit
//! words. The header is `tag << 48 | length` where `length` counts payload and
//! descriptor words. Samples are 16 bits, packed four per word, little-endian
//! within the word. The descriptor is twelve 16-bit words:
//!
//! | word   | content                    |
//! |--------|----------------------------|
//! | 0      | `slot \| channel << 8`     |
//! | 1      | mode selector              |
//! | 2..3   | trigger tag                |
//! | 4..7   | timestamp                  |
//! | 8      | sequence number            |
//! | 9      | CRC-16 over the payload    |
//! | 10..11 | reserved                   |

use std::fmt;

use crc::{CRC_16_IBM_3740, Crc};
use thiserror::Error;

use crate::common::constants::{DAQ_DESCRIPTOR_WORD_SIZE, DAQ_FIFO_DAQ_WORD_SIZE, DAQ_FIFO_PM_HIRES_WORD_SIZE};

/// Header tag of a continuous-mode block.
pub const BLOCK_TAG_SHORT: u16 = 0x00D1;
/// Header tag of a high-resolution or post-mortem block.
pub const BLOCK_TAG_LONG: u16 = 0x00D2;

/// 64-bit words of a descriptor.
pub const DESCRIPTOR_WORDS64: usize = DAQ_DESCRIPTOR_WORD_SIZE / 4;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC-16 over the little-endian bytes of `samples`.
pub fn payload_crc(samples: &[u16]) -> u16 {
    let mut digest = CRC16.digest();
    for s in samples {
        digest.update(&s.to_le_bytes());
    }
    digest.finalize()
}

/// Packs samples four per word; a trailing partial word is zero padded.
pub fn pack_samples(samples: &[u16]) -> Vec<u64> {
    samples
        .chunks(4)
        .map(|c| {
            c.iter()
                .enumerate()
                .fold(0u64, |w, (i, s)| w | u64::from(*s) << (16 * i))
        })
        .collect()
}

/// Unpacks `count` samples from packed words.
pub fn unpack_samples(words: &[u64], count: usize) -> Vec<u16> {
    words
        .iter()
        .flat_map(|w| (0..4).map(move |i| (w >> (16 * i)) as u16))
        .take(count)
        .collect()
}

/// Block size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    /// Continuous mode.
    Short,
    /// High-resolution or post-mortem mode.
    Long,
}

impl BlockKind {
    /// Header tag.
    pub const fn tag(self) -> u16 {
        match self {
            Self::Short => BLOCK_TAG_SHORT,
            Self::Long => BLOCK_TAG_LONG,
        }
    }

    /// Kind of a header tag.
    pub const fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            BLOCK_TAG_SHORT => Some(Self::Short),
            BLOCK_TAG_LONG => Some(Self::Long),
            _ => None,
        }
    }

    /// Payload samples.
    pub const fn payload_samples(self) -> usize {
        match self {
            Self::Short => DAQ_FIFO_DAQ_WORD_SIZE,
            Self::Long => DAQ_FIFO_PM_HIRES_WORD_SIZE,
        }
    }

    /// Payload 64-bit words.
    pub const fn payload_words(self) -> usize {
        self.payload_samples().div_ceil(4)
    }

    /// Fifo words of a complete block: payload samples plus descriptor.
    pub const fn fifo_words(self) -> usize {
        self.payload_samples() + DAQ_DESCRIPTOR_WORD_SIZE
    }

    /// Ring words of a block including its header.
    pub const fn ring_words(self) -> usize {
        1 + self.payload_words() + DESCRIPTOR_WORDS64
    }
}

/// Sample-rate selector recorded in the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaqMode {
    /// Continuous, one sample per millisecond.
    Continuous1ms,
    /// Continuous, one sample per 100 µs.
    Continuous100us,
    /// Continuous, one sample per 10 µs.
    Continuous10us,
    /// High-resolution capture.
    HiRes,
    /// Post-mortem capture.
    PostMortem,
}

impl DaqMode {
    /// Selector bit, identical to the channel control register bit.
    pub const fn selector(self) -> u16 {
        match self {
            Self::Continuous1ms => 1 << 0,
            Self::Continuous100us => 1 << 1,
            Self::Continuous10us => 1 << 2,
            Self::HiRes => 1 << 3,
            Self::PostMortem => 1 << 4,
        }
    }

    /// Mode of a selector word; the lowest set bit wins.
    pub const fn from_selector(sel: u16) -> Option<Self> {
        if sel & (1 << 0) != 0 {
            Some(Self::Continuous1ms)
        } else if sel & (1 << 1) != 0 {
            Some(Self::Continuous100us)
        } else if sel & (1 << 2) != 0 {
            Some(Self::Continuous10us)
        } else if sel & (1 << 3) != 0 {
            Some(Self::HiRes)
        } else if sel & (1 << 4) != 0 {
            Some(Self::PostMortem)
        } else {
            None
        }
    }

    /// Block kind produced in this mode.
    pub const fn block_kind(self) -> BlockKind {
        match self {
            Self::HiRes | Self::PostMortem => BlockKind::Long,
            _ => BlockKind::Short,
        }
    }

    /// Continuous rate index for the `DAQ_CONTINUOUS_ON` argument (0..=2).
    pub const fn continuous(rate: u16) -> Option<Self> {
        match rate {
            0 => Some(Self::Continuous1ms),
            1 => Some(Self::Continuous100us),
            2 => Some(Self::Continuous10us),
            _ => None,
        }
    }
}

/// Block trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Descriptor {
    /// Slot number 1..=12.
    pub slot: u8,
    /// Channel number 1..=4.
    pub channel: u8,
    /// Mode selector.
    pub mode: u16,
    /// Trigger event tag.
    pub trigger: u32,
    /// Accelerator timestamp.
    pub timestamp: u64,
    /// Per-channel sequence number.
    pub sequence: u16,
    /// CRC-16 over the payload.
    pub crc: u16,
}

impl Descriptor {
    /// Encodes into twelve 16-bit words.
    pub fn to_words(&self) -> [u16; DAQ_DESCRIPTOR_WORD_SIZE] {
        let mut w = [0u16; DAQ_DESCRIPTOR_WORD_SIZE];
        w[0] = u16::from(self.slot) | u16::from(self.channel) << 8;
        w[1] = self.mode;
        w[2] = self.trigger as u16;
        w[3] = (self.trigger >> 16) as u16;
        for i in 0..4 {
            w[4 + i] = (self.timestamp >> (16 * i)) as u16;
        }
        w[8] = self.sequence;
        w[9] = self.crc;
        w
    }

    /// Decodes from twelve 16-bit words.
    pub fn from_words(w: &[u16; DAQ_DESCRIPTOR_WORD_SIZE]) -> Self {
        Self {
            slot: w[0] as u8,
            channel: (w[0] >> 8) as u8,
            mode: w[1],
            trigger: u32::from(w[2]) | u32::from(w[3]) << 16,
            timestamp: (0..4).fold(0u64, |t, i| t | u64::from(w[4 + i]) << (16 * i)),
            sequence: w[8],
            crc: w[9],
        }
    }

    /// Decodes from the trailing words of a fifo drain.
    pub fn from_fifo_tail(tail: &[u16]) -> Option<Self> {
        let words: &[u16; DAQ_DESCRIPTOR_WORD_SIZE] = tail.try_into().ok()?;
        Some(Self::from_words(words))
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot {} ch {} seq {} ts {} mode {:#x}",
            self.slot, self.channel, self.sequence, self.timestamp, self.mode
        )
    }
}

/// Failure decoding a block from ring words.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// Fewer words available than the header announces.
    #[error("block truncated: need {need} words, have {have}")]
    Truncated {
        /// Words required.
        need: usize,
        /// Words available.
        have: usize,
    },
    /// The header tag is not a block tag.
    #[error("unknown block tag {0:#06x}")]
    UnknownTag(u16),
    /// The header length does not match the tag.
    #[error("block length {length} invalid for tag {tag:#06x}")]
    BadLength {
        /// Header tag.
        tag: u16,
        /// Header length.
        length: usize,
    },
}

/// One DAQ block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaqBlock {
    /// Size class.
    pub kind: BlockKind,
    /// Trailer.
    pub descriptor: Descriptor,
    /// Samples.
    pub payload: Vec<u16>,
}

impl DaqBlock {
    /// Builds a block from a fifo drain: payload samples followed by the descriptor.
    pub fn from_fifo(kind: BlockKind, words: &[u16]) -> Option<Self> {
        if words.len() != kind.fifo_words() {
            return None;
        }
        let (payload, tail) = words.split_at(kind.payload_samples());
        Some(Self {
            kind,
            descriptor: Descriptor::from_fifo_tail(tail)?,
            payload: payload.to_vec(),
        })
    }

    /// Returns `true` if the descriptor CRC matches the payload.
    pub fn crc_ok(&self) -> bool {
        payload_crc(&self.payload) == self.descriptor.crc
    }

    /// Encodes into ring words: header, payload, descriptor.
    pub fn encode(&self) -> Vec<u64> {
        let payload = pack_samples(&self.payload);
        let descriptor = pack_samples(&self.descriptor.to_words());
        let length = (payload.len() + descriptor.len()) as u64;
        let mut out = Vec::with_capacity(1 + length as usize);
        out.push(u64::from(self.kind.tag()) << 48 | length);
        out.extend(payload);
        out.extend(descriptor);
        out
    }

    /// Decodes the block at the front of `words`.
    ///
    /// # Returns
    ///
    /// The block and the number of words it occupies.
    pub fn decode(words: &[u64]) -> Result<(Self, usize), BlockError> {
        let header = *words.first().ok_or(BlockError::Truncated { need: 1, have: 0 })?;
        let tag = (header >> 48) as u16;
        let length = (header & 0xFFFF_FFFF) as usize;
        let kind = BlockKind::from_tag(tag).ok_or(BlockError::UnknownTag(tag))?;
        if length != kind.payload_words() + DESCRIPTOR_WORDS64 {
            return Err(BlockError::BadLength { tag, length });
        }
        let need = 1 + length;
        if words.len() < need {
            return Err(BlockError::Truncated {
                need,
                have: words.len(),
            });
        }
        let payload_words = &words[1..1 + kind.payload_words()];
        let descriptor_raw = unpack_samples(&words[1 + kind.payload_words()..need], DAQ_DESCRIPTOR_WORD_SIZE);
        let descriptor = Descriptor::from_fifo_tail(&descriptor_raw).ok_or(BlockError::BadLength { tag, length })?;
        Ok((
            Self {
                kind,
                descriptor,
                payload: unpack_samples(payload_words, kind.payload_samples()),
            },
            need,
        ))
    }
}
