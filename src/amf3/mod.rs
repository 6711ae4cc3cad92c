//! AMF3 (Action Message Format 3) codec
//!
//! AMF3 is the ActionScript 3.0 serialization format. Besides the usual
//! scalar types it carries three per-stream reference tables (strings,
//! objects, traits) so repeated values are written once and later referred
//! to by index.
//!
//! Values that can contain other values live in an [`Arena`]; a decoded
//! bare value comes back as a [`Document`] holding both.

pub mod arena;
pub mod decoder;
pub mod encoder;
pub mod externalizable;
pub mod marker;
mod tables;
pub mod traits;
pub mod value;
pub mod varint;

pub use arena::{Arena, Array, Dictionary, Document, GenericVector, Node, NodeId, Object};
pub use decoder::{decode, Amf3Decoder};
pub use encoder::{encode, Amf3Encoder};
pub use externalizable::{Externalizable, ExternalizableFactory, FactoryRegistry};
pub use marker::TypeMarker;
pub use traits::Trait;
pub use value::{ByteArray, Date, Value, Vector};

use std::io::{Read, Write};

use crate::error::Result;

/// Convenience function to read one bare value from any reader
pub fn read<R: Read>(reader: R) -> Result<Document> {
    Amf3Decoder::new().read(reader)
}

/// Convenience function to write one bare value to any writer
pub fn write<W: Write>(doc: &Document, writer: W) -> Result<()> {
    Amf3Encoder::new().write(&doc.arena, &doc.root, writer)
}
