// File framing: magic, format code and the metadata header.

use bytemuck::{Pod, Zeroable};

use crate::FstError;
use crate::config::DEFAULT_MAX_KEY_LENGTH;
use crate::state::Addr;

/// Magic tag and format version.
pub const MAGIC: &[u8; 6] = b"FST-01";

/// Size of magic plus format code.
pub const PREFIX_SIZE: usize = 7;

/// Size of the full header; the first node record starts here.
pub const HEADER_SIZE: usize = PREFIX_SIZE + size_of::<RawHeader>();

/// Record encoding of a transducer body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Fixed-width arcs with absolute target addresses.
    #[default]
    Default,
    /// Var-int fields with targets stored as backwards deltas.
    Compressed,
}

impl Format {
    pub fn code(self) -> u8 {
        match self {
            Format::Default => b'D',
            Format::Compressed => b'C',
        }
    }

    pub fn from_code(code: u8) -> Result<Self, FstError> {
        match code {
            b'D' => Ok(Format::Default),
            b'C' => Ok(Format::Compressed),
            other => Err(FstError::UnsupportedFormat(other)),
        }
    }
}

/// On-disk metadata block following the 7-byte prefix.
///
/// Fields are stored little-endian regardless of host byte order.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RawHeader {
    pub root: u64,
    pub term_count: u64,
    pub max_key_length: u32,
    pub state_count: u32,
}

const _: () = assert!(size_of::<RawHeader>() == 24);

/// Parsed transducer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FstHeader {
    pub format: Format,
    /// Address of the root record.
    pub root: Addr,
    pub term_count: u64,
    /// Longest key in chars; zero when the producer did not record it.
    pub max_key_length: u32,
    pub state_count: u32,
}

impl FstHeader {
    /// Key buffer size to use for searches.
    ///
    /// Falls back to [`DEFAULT_MAX_KEY_LENGTH`] when the header carries no
    /// metadata.
    pub fn key_length_limit(&self) -> usize {
        if self.max_key_length == 0 && self.term_count == 0 && self.state_count == 0 {
            DEFAULT_MAX_KEY_LENGTH
        } else {
            self.max_key_length as usize
        }
    }

    /// Serialize prefix and metadata.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let raw = RawHeader {
            root: self.root.to_le(),
            term_count: self.term_count.to_le(),
            max_key_length: self.max_key_length.to_le(),
            state_count: self.state_count.to_le(),
        };
        let mut buf = [0u8; HEADER_SIZE];
        buf[..MAGIC.len()].copy_from_slice(MAGIC);
        buf[MAGIC.len()] = self.format.code();
        buf[PREFIX_SIZE..].copy_from_slice(bytemuck::bytes_of(&raw));
        buf
    }
}

/// Header image written before any record: prefix plus zeroed metadata.
///
/// A zero root can never be valid (address 0 lies inside the magic), so an
/// image whose header was never finalized is rejected by [`parse_header`].
pub fn placeholder_header(format: Format) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[..MAGIC.len()].copy_from_slice(MAGIC);
    buf[MAGIC.len()] = format.code();
    buf
}

/// Parses and validates the header at the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<FstHeader, FstError> {
    if data.len() < PREFIX_SIZE {
        return Err(FstError::TooShort {
            expected: PREFIX_SIZE as u64,
            actual: data.len() as u64,
        });
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(FstError::InvalidMagic);
    }
    let format = Format::from_code(data[MAGIC.len()])?;

    if data.len() < HEADER_SIZE {
        return Err(FstError::TooShort {
            expected: HEADER_SIZE as u64,
            actual: data.len() as u64,
        });
    }
    // The slice may not be aligned for RawHeader.
    let raw: RawHeader = bytemuck::pod_read_unaligned(&data[PREFIX_SIZE..HEADER_SIZE]);
    let root = u64::from_le(raw.root);
    if root < HEADER_SIZE as u64 {
        return Err(FstError::Corrupt(format!(
            "root address {root} lies inside the header"
        )));
    }

    Ok(FstHeader {
        format,
        root,
        term_count: u64::from_le(raw.term_count),
        max_key_length: u32::from_le(raw.max_key_length),
        state_count: u32::from_le(raw.state_count),
    })
}
