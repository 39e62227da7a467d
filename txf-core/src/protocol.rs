use std::fmt;

use anyhow::{Result, bail};
use bytes::{Buf, BufMut, BytesMut};

/// Total header size: magic(4) + size(4) + name(20) + terminator(1) + reserved(3).
pub const HEADER_LEN: usize = 32;
/// Width of the fixed filename field.
pub const FILE_NAME_LEN: usize = 20;
/// Size of one body chunk on the wire.
pub const BLOCK_SIZE: usize = 1024;
/// Largest body a header can announce.
pub const MAX_FILE_SIZE: u32 = 0x7FFF_FFFF;

const OFF_MAGIC: usize = 0;
const OFF_SIZE: usize = 4;
const OFF_NAME: usize = 8;
const OFF_TERMINATOR: usize = OFF_NAME + FILE_NAME_LEN;
/// Width of the trailing reserved area.
pub const RESERVED_LEN: usize = HEADER_LEN - OFF_TERMINATOR - 1;

/// Message discriminator carried in the first four header bytes.
///
/// Both values are ASCII tags; encoded big-endian they read as the tag on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Magic {
    /// Transfer request, followed by `file_size` body bytes.
    Send = u32::from_be_bytes(*b"SEND"),
    /// Acknowledgment sent by the receiver once the body is stored.
    Rcvd = u32::from_be_bytes(*b"RCVD"),
}

impl TryFrom<u32> for Magic {
    type Error = anyhow::Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            v if v == Self::Send as u32 => Ok(Self::Send),
            v if v == Self::Rcvd as u32 => Ok(Self::Rcvd),
            other => bail!("unknown magic: 0x{other:08X}"),
        }
    }
}

impl From<Magic> for u32 {
    fn from(magic: Magic) -> u32 {
        magic as u32
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("SEND"),
            Self::Rcvd => f.write_str("RCVD"),
        }
    }
}

/// The fixed 32-byte record that opens every message.
///
/// `magic` is kept as a raw `u32` so that decoding never fails; callers
/// check it with [`Magic::try_from`] or [`TransferHeader::has_magic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferHeader {
    pub magic: u32,
    pub file_size: u32,
    pub file_name: [u8; FILE_NAME_LEN],
    /// Must be zero. Forced to zero by [`TransferHeader::decode`].
    pub file_name_terminator: u8,
    pub reserved: [u8; RESERVED_LEN],
}

impl TransferHeader {
    /// Builds a header, zero-padding `name` to the field width.
    ///
    /// Names longer than [`FILE_NAME_LEN`] bytes are cut at the field
    /// boundary.
    #[must_use]
    pub fn new(magic: Magic, file_size: u32, name: &str) -> Self {
        let mut file_name = [0u8; FILE_NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(FILE_NAME_LEN);
        file_name[..len].copy_from_slice(&bytes[..len]);

        Self {
            magic: magic.into(),
            file_size,
            file_name,
            file_name_terminator: 0,
            reserved: [0; RESERVED_LEN],
        }
    }

    /// Returns `true` when the raw magic equals `expected`.
    #[must_use]
    pub fn has_magic(&self, expected: Magic) -> bool {
        self.magic == u32::from(expected)
    }

    /// Returns the reply a receiver sends after storing the body: the same
    /// size and name, with magic set to [`Magic::Rcvd`].
    #[must_use]
    pub fn acknowledge(&self) -> Self {
        Self {
            magic: Magic::Rcvd.into(),
            ..*self
        }
    }

    /// Extracts the filename, reading at most [`FILE_NAME_LEN`] bytes and
    /// stopping at the first zero byte.
    #[must_use]
    pub fn file_name(&self) -> String {
        let end = self
            .file_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_NAME_LEN);
        String::from_utf8_lossy(&self.file_name[..end]).into_owned()
    }

    /// Encodes the header into its 32-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        encode_header(self, &mut buf);

        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Decodes a header from its wire form.
    ///
    /// Never fails: any 32 bytes produce a value. The terminator is forced
    /// to zero and the reserved bytes are dropped, so the result is always
    /// safe to read a name from. Validating `magic` is left to the caller.
    #[must_use]
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &raw[..];

        let magic = buf.get_u32();
        let file_size = buf.get_u32();
        let mut file_name = [0u8; FILE_NAME_LEN];
        buf.copy_to_slice(&mut file_name);

        Self {
            magic,
            file_size,
            file_name,
            file_name_terminator: 0,
            reserved: [0; RESERVED_LEN],
        }
    }
}

/// Appends the 32-byte encoding of `header` to `buf`.
///
/// The terminator and reserved bytes are always written as zero.
pub fn encode_header(header: &TransferHeader, buf: &mut BytesMut) {
    buf.reserve(HEADER_LEN);
    buf.put_u32(header.magic);
    buf.put_u32(header.file_size);
    buf.put_slice(&header.file_name);
    buf.put_u8(0);
    buf.put_bytes(0, RESERVED_LEN);
}

/// Yields the length of every body chunk for a file of `size` bytes.
///
/// There are exactly `ceil(size / BLOCK_SIZE)` items; all are
/// [`BLOCK_SIZE`] except the last, which carries the remainder.
pub fn chunk_sizes(size: u32) -> impl Iterator<Item = usize> {
    let size = size as usize;
    (0..size)
        .step_by(BLOCK_SIZE)
        .map(move |offset| (size - offset).min(BLOCK_SIZE))
}
