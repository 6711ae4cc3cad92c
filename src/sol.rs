//! SOL (Flash local shared object) files
//!
//! Layout, all integers big-endian:
//!
//! ```text
//! 00 BF          endianness sentinel
//! size: u32      length of everything after these first 6 bytes
//! "TCSO"         file tag
//! 00 04 00 00 00 00
//! len: u16       followed by the ASCII object name
//! version: u32   AMF version, 3 for AMF3
//! { key: AMF3 string, value: AMF3 value, 0x00 } until end of file
//! ```
//!
//! Strings, traits and leaf objects are shared across entries, so a file
//! is always decoded and encoded as a whole.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use indexmap::IndexMap;

use crate::amf3::{Amf3Decoder, Amf3Encoder, Arena, Value};
use crate::error::{DataError, Error, Result};

/// Endianness sentinel opening every SOL file
pub const SENTINEL: [u8; 2] = [0x00, 0xBF];

/// File tag following the size field
pub const MAGIC: [u8; 4] = *b"TCSO";

/// Bytes between the tag and the name, as written by Flash Player
pub const RESERVED: [u8; 6] = [0x00, 0x04, 0x00, 0x00, 0x00, 0x00];

/// Version written into new files
pub const DEFAULT_SOL_VERSION: u32 = 3;

/// Oldest version the AMF3 codec accepts
pub const MIN_SOL_VERSION: u32 = 3;

/// Sentinel plus size field; the size counts everything after it
const PREFIX_LEN: usize = 6;

/// A decoded SOL file: its name and its entries in file order
#[derive(Debug, Clone, Default)]
pub struct SolFile {
    pub name: String,
    /// Owner of every composite value referenced from `entries`
    pub arena: Arena,
    pub entries: IndexMap<String, Value>,
}

impl SolFile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Insert or replace an entry; a replaced entry keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Structural equality, comparing entries in order
    pub fn structural_eq(&self, other: &SolFile) -> bool {
        self.name == other.name
            && self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|((ka, va), (kb, vb))| {
                    ka == kb && self.arena.structural_eq(va, &other.arena, vb)
                })
    }
}

/// Parsed SOL header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolHeader {
    pub name: String,
    pub version: u32,
    pub declared_size: u32,
}

/// Parse the header, leaving `buf` at the first entry
pub(crate) fn read_header(buf: &mut Bytes, verify_size: bool) -> Result<SolHeader> {
    need(buf, PREFIX_LEN)?;
    let mut sentinel = [0u8; 2];
    buf.copy_to_slice(&mut sentinel);
    if sentinel != SENTINEL {
        return Err(DataError::BadEndianness(sentinel).into());
    }

    let declared_size = buf.get_u32();
    let actual = buf.remaining();
    if declared_size as usize != actual {
        if verify_size {
            return Err(DataError::SizeMismatch {
                declared: declared_size,
                actual,
            }
            .into());
        }
        tracing::warn!(declared = declared_size, actual = actual, "SOL size field mismatch");
    }

    need(buf, MAGIC.len() + RESERVED.len() + 2)?;
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if magic != MAGIC {
        return Err(DataError::BadMagic(magic).into());
    }
    // Reserved bytes vary between writers and are not checked
    buf.advance(RESERVED.len());

    let name_len = buf.get_u16() as usize;
    need(buf, name_len + 4)?;
    let name_bytes = buf.copy_to_bytes(name_len);
    if !name_bytes.is_ascii() {
        return Err(DataError::InvalidName.into());
    }
    let name = String::from_utf8_lossy(&name_bytes).into_owned();

    let version = buf.get_u32();
    if version < MIN_SOL_VERSION {
        return Err(DataError::UnsupportedVersion(version).into());
    }

    tracing::debug!(name = %name, version = version, size = declared_size, "Read SOL header");
    Ok(SolHeader {
        name,
        version,
        declared_size,
    })
}

/// Write a header with a zero size field, to be fixed by [`patch_size`]
pub(crate) fn write_header(buf: &mut BytesMut, name: &str, version: u32) -> Result<()> {
    if !name.is_ascii() {
        return Err(DataError::InvalidName.into());
    }
    let name_len = u16::try_from(name.len()).map_err(|_| DataError::LengthOverflow(name.len()))?;

    buf.put_slice(&SENTINEL);
    buf.put_u32(0);
    buf.put_slice(&MAGIC);
    buf.put_slice(&RESERVED);
    buf.put_u16(name_len);
    buf.put_slice(name.as_bytes());
    buf.put_u32(version.max(MIN_SOL_VERSION));
    Ok(())
}

/// Store the final body length in the size field
pub(crate) fn patch_size(buf: &mut BytesMut) -> Result<()> {
    let body = buf.len().saturating_sub(PREFIX_LEN);
    let size = u32::try_from(body).map_err(|_| DataError::LengthOverflow(body))?;
    if buf.len() < PREFIX_LEN {
        return Err(DataError::LengthOverflow(buf.len()).into());
    }
    buf[2..PREFIX_LEN].copy_from_slice(&size.to_be_bytes());
    Ok(())
}

fn need(buf: &Bytes, len: usize) -> Result<()> {
    if buf.remaining() < len {
        return Err(Error::truncated());
    }
    Ok(())
}

/// Check whether `data` starts like a SOL file
pub fn is_sol(data: &[u8]) -> bool {
    data.len() >= 10 && data[..2] == SENTINEL && data[6..10] == MAGIC
}

/// Check whether the file at `path` starts like a SOL file
pub fn is_sol_file(path: impl AsRef<Path>) -> Result<bool> {
    let mut head = Vec::with_capacity(10);
    File::open(path)?.take(10).read_to_end(&mut head)?;
    Ok(is_sol(&head))
}

/// Decode a SOL file from any reader, without externalizable factories
pub fn read_file<R: Read>(reader: R) -> Result<SolFile> {
    Amf3Decoder::new().read_file(reader)
}

/// Encode a SOL file into any writer
pub fn write_file<W: Write>(file: &SolFile, writer: W) -> Result<()> {
    Amf3Encoder::new().write_file(file, writer)
}

/// Decode the SOL file at `path`
pub fn read_path(path: impl AsRef<Path>) -> Result<SolFile> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Reading SOL file");
    read_file(File::open(path)?)
}

/// Encode `file` and write it to `path`, replacing any existing file
pub fn write_path(file: &SolFile, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Writing SOL file");
    write_file(file, File::create(path)?)
}
