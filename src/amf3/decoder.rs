//! AMF3 decoder
//!
//! Every top-level call opens a fresh decode session holding the input,
//! the reference tables and the arena being built. Nothing is carried over
//! between calls, so one decoder can be reused freely.
//!
//! Composite values are registered in the object table before their
//! children are read, which is what lets a value refer to itself.

use std::io::Read;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use indexmap::IndexMap;

use super::arena::{Arena, Array, Dictionary, Document, GenericVector, Node, Object};
use super::externalizable::{ExternalizableFactory, FactoryRegistry};
use super::marker::TypeMarker;
use super::tables::ReadTables;
use super::traits::{Trait, TraitHeader};
use super::value::{ByteArray, Date, Value, Vector};
use super::varint::{read_s29, read_u29_flag};
use crate::config::CodecConfig;
use crate::error::{DataError, Error, Result};
use crate::sol::{self, SolFile};

/// AMF3 decoder for bare values and SOL files
#[derive(Debug, Clone, Default)]
pub struct Amf3Decoder {
    config: CodecConfig,
    factories: FactoryRegistry,
}

impl Amf3Decoder {
    /// Create a new decoder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self {
            config,
            factories: FactoryRegistry::new(),
        }
    }

    /// Add an externalizable factory; factories are tried in the order added
    pub fn with_factory<F>(mut self, factory: F) -> Self
    where
        F: ExternalizableFactory + 'static,
    {
        self.factories.register(factory);
        self
    }

    pub fn register_factory<F>(&mut self, factory: F)
    where
        F: ExternalizableFactory + 'static,
    {
        self.factories.register(factory);
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Decode a single bare value
    pub fn decode(&self, data: &[u8]) -> Result<Document> {
        let mut session = self.session(Bytes::copy_from_slice(data));
        let root = session.read_value()?;
        Ok(Document::new(session.arena, root))
    }

    /// Decode a complete SOL file
    pub fn decode_file(&self, data: &[u8]) -> Result<SolFile> {
        let mut session = self.session(Bytes::copy_from_slice(data));
        let header = sol::read_header(&mut session.buf, self.config.verify_declared_size)?;

        let mut entries = IndexMap::new();
        while session.buf.has_remaining() {
            let key = session.read_string()?;
            let value = session.read_value()?;
            session.read_trailer(&key)?;
            tracing::trace!(key = %key, marker = ?value.marker(), "Decoded SOL entry");
            entries.insert(key, value);
        }

        tracing::debug!(
            name = %header.name,
            entries = entries.len(),
            "Decoded SOL file"
        );
        Ok(SolFile {
            name: header.name,
            arena: session.arena,
            entries,
        })
    }

    /// Read all of `reader` and decode it as a single bare value
    pub fn read<R: Read>(&self, mut reader: R) -> Result<Document> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.decode(&data)
    }

    /// Read all of `reader` and decode it as a SOL file
    pub fn read_file<R: Read>(&self, mut reader: R) -> Result<SolFile> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.decode_file(&data)
    }

    fn session(&self, buf: Bytes) -> DecodeSession<'_> {
        DecodeSession {
            buf,
            tables: ReadTables::new(),
            arena: Arena::new(),
            depth: 0,
            max_depth: self.config.max_depth,
            factories: &self.factories,
        }
    }
}

enum Header {
    /// Length, count or trait bits of a value that follows
    Inline(u32),
    /// Earlier value from the object table
    Reference(Value),
}

/// State of one decode call
struct DecodeSession<'a> {
    buf: Bytes,
    tables: ReadTables,
    arena: Arena,
    depth: usize,
    max_depth: usize,
    factories: &'a FactoryRegistry,
}

impl DecodeSession<'_> {
    fn read_value(&mut self) -> Result<Value> {
        self.need(1)?;
        let marker = TypeMarker::try_from(self.buf.get_u8())?;

        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(DataError::NestingTooDeep.into());
        }
        let result = self.read_marked(marker);
        self.depth -= 1;
        result
    }

    fn read_marked(&mut self, marker: TypeMarker) -> Result<Value> {
        match marker {
            TypeMarker::Undefined => Ok(Value::Undefined),
            TypeMarker::Null => Ok(Value::Null),
            TypeMarker::False => Ok(Value::Boolean(false)),
            TypeMarker::True => Ok(Value::Boolean(true)),
            TypeMarker::Integer => Ok(Value::Integer(read_s29(&mut self.buf)?)),
            TypeMarker::Double => {
                self.need(8)?;
                Ok(Value::Double(self.buf.get_f64()))
            }
            TypeMarker::String => Ok(Value::String(self.read_string()?)),
            TypeMarker::XmlDoc | TypeMarker::Xml => self.read_xml(marker),
            TypeMarker::Date => self.read_date(),
            TypeMarker::ByteArray => self.read_byte_array(),
            TypeMarker::Array => self.read_array(),
            TypeMarker::Object => self.read_object(),
            TypeMarker::Dictionary => self.read_dictionary(),
            TypeMarker::VectorInt => {
                self.read_vector(marker, |buf| buf.get_i32(), Value::VectorInt)
            }
            TypeMarker::VectorUInt => {
                self.read_vector(marker, |buf| buf.get_u32(), Value::VectorUInt)
            }
            TypeMarker::VectorDouble => {
                self.read_vector(marker, |buf| buf.get_f64(), Value::VectorDouble)
            }
            TypeMarker::VectorGeneric => self.read_generic_vector(),
        }
    }

    /// Reference-or-value header shared by every table-backed type
    fn read_header(&mut self, marker: TypeMarker) -> Result<Header> {
        let (payload, inline) = read_u29_flag(&mut self.buf)?;
        if inline {
            Ok(Header::Inline(payload))
        } else {
            self.tables.object(payload, marker).map(Header::Reference)
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let (len, inline) = read_u29_flag(&mut self.buf)?;
        if !inline {
            return Ok(self.tables.string(len)?.to_string());
        }
        if len == 0 {
            return Ok(String::new());
        }
        let s = self.read_utf8(len as usize)?;
        self.tables.add_string(&s);
        Ok(s)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String> {
        self.need(len)?;
        let bytes = self.buf.copy_to_bytes(len);
        String::from_utf8(bytes.to_vec()).map_err(|_| DataError::InvalidUtf8.into())
    }

    fn read_xml(&mut self, marker: TypeMarker) -> Result<Value> {
        let len = match self.read_header(marker)? {
            Header::Inline(len) => len,
            Header::Reference(value) => return Ok(value),
        };
        let text = self.read_utf8(len as usize)?;
        let value = if marker == TypeMarker::Xml {
            Value::Xml(text)
        } else {
            Value::XmlDoc(text)
        };
        self.tables.add_object(value.clone());
        Ok(value)
    }

    fn read_date(&mut self) -> Result<Value> {
        if let Header::Reference(value) = self.read_header(TypeMarker::Date)? {
            return Ok(value);
        }
        self.need(8)?;
        let value = Value::Date(Date::from_millis(self.buf.get_f64()));
        self.tables.add_object(value.clone());
        Ok(value)
    }

    fn read_byte_array(&mut self) -> Result<Value> {
        let len = match self.read_header(TypeMarker::ByteArray)? {
            Header::Inline(len) => len as usize,
            Header::Reference(value) => return Ok(value),
        };
        self.need(len)?;
        let data = self.buf.copy_to_bytes(len);
        let value = Value::ByteArray(ByteArray::from(data.as_ref()));
        self.tables.add_object(value.clone());
        Ok(value)
    }

    fn read_array(&mut self) -> Result<Value> {
        let count = match self.read_header(TypeMarker::Array)? {
            Header::Inline(count) => count as usize,
            Header::Reference(value) => return Ok(value),
        };

        let handle = self.arena.insert_array(Array::new());
        self.tables.add_object(handle.clone());

        let mut array = Array::new();
        loop {
            let key = self.read_string()?;
            if key.is_empty() {
                break;
            }
            let value = self.read_value()?;
            array.associative.insert(key, value);
        }

        array.dense.reserve(count.min(1024)); // Cap initial allocation
        for _ in 0..count {
            array.dense.push(self.read_value()?);
        }

        self.finish(&handle, Node::Array(array))
    }

    fn read_object(&mut self) -> Result<Value> {
        let payload = match self.read_header(TypeMarker::Object)? {
            Header::Inline(payload) => payload,
            Header::Reference(value) => return Ok(value),
        };
        let t = self.read_trait(payload)?;

        let handle = self.arena.insert_object(Object::from_trait(&t));
        self.tables.add_object(handle.clone());

        let mut object = Object::from_trait(&t);
        for property in &t.properties {
            let value = self.read_value()?;
            object.sealed.insert(property.clone(), value);
        }

        if t.dynamic {
            loop {
                let key = self.read_string()?;
                if key.is_empty() {
                    break;
                }
                let value = self.read_value()?;
                object.dynamic_members.insert(key, value);
            }
        }

        if t.externalizable {
            let mut external = self
                .factories
                .create(&t.name)
                .ok_or_else(|| DataError::UnknownExternalizable(t.name.clone()))?;
            external.read_payload(&mut self.buf)?;
            object.external = Some(Arc::from(external));
        }

        self.finish(&handle, Node::Object(object))
    }

    fn read_trait(&mut self, payload: u32) -> Result<Trait> {
        match TraitHeader::parse(payload) {
            TraitHeader::Reference(index) => Ok(self.tables.trait_at(index)?.clone()),
            TraitHeader::Inline {
                externalizable,
                dynamic,
                sealed_count,
            } => {
                let name = self.read_string()?;
                let mut properties = Vec::with_capacity((sealed_count as usize).min(1024));
                for _ in 0..sealed_count {
                    properties.push(self.read_string()?);
                }
                let t = Trait {
                    name,
                    dynamic,
                    externalizable,
                    properties,
                };
                self.tables.add_trait(t.clone());
                Ok(t)
            }
        }
    }

    fn read_dictionary(&mut self) -> Result<Value> {
        let count = match self.read_header(TypeMarker::Dictionary)? {
            Header::Inline(count) => count,
            Header::Reference(value) => return Ok(value),
        };
        let weak_keys = self.read_flag()?;

        let handle = self.arena.insert_dictionary(Dictionary::new(weak_keys));
        self.tables.add_object(handle.clone());

        let mut dictionary = Dictionary::new(weak_keys);
        for _ in 0..count {
            let key = self.read_value()?;
            let value = self.read_value()?;
            dictionary.insert(key, value);
        }

        self.finish(&handle, Node::Dictionary(dictionary))
    }

    fn read_vector<T>(
        &mut self,
        marker: TypeMarker,
        read: impl Fn(&mut Bytes) -> T,
        wrap: impl FnOnce(Vector<T>) -> Value,
    ) -> Result<Value> {
        let count = match self.read_header(marker)? {
            Header::Inline(count) => count as usize,
            Header::Reference(value) => return Ok(value),
        };
        let fixed = self.read_flag()?;

        let width = std::mem::size_of::<T>();
        self.need(count.saturating_mul(width))?;
        let items: Vec<T> = (0..count).map(|_| read(&mut self.buf)).collect();

        let mut vector = Vector::from(items);
        vector.set_capacity(count)?;
        vector.set_fixed_length(fixed);

        let value = wrap(vector);
        self.tables.add_object(value.clone());
        Ok(value)
    }

    fn read_generic_vector(&mut self) -> Result<Value> {
        let count = match self.read_header(TypeMarker::VectorGeneric)? {
            Header::Inline(count) => count as usize,
            Header::Reference(value) => return Ok(value),
        };
        let fixed = self.read_flag()?;
        let type_name = self.read_string()?;

        let handle = self.arena.insert_vector(GenericVector::new(type_name.clone()));
        self.tables.add_object(handle.clone());

        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(self.read_value()?);
        }
        let mut vector = GenericVector::new(type_name);
        vector.items = Vector::from(items);
        vector.items.set_capacity(count)?;
        vector.items.set_fixed_length(fixed);

        self.finish(&handle, Node::Vector(vector))
    }

    /// Store the fully read node behind the handle registered for it
    fn finish(&mut self, handle: &Value, node: Node) -> Result<Value> {
        let id = handle.node_id().ok_or(DataError::DanglingHandle)?;
        self.arena.replace(id, node);
        Ok(handle.clone())
    }

    /// Entry trailer: one byte, normally zero
    fn read_trailer(&mut self, key: &str) -> Result<()> {
        self.need(1)?;
        let trailer = self.buf.get_u8();
        if trailer != 0 {
            tracing::warn!(key = %key, trailer = trailer, "Non-zero SOL entry trailer");
        }
        Ok(())
    }

    fn read_flag(&mut self) -> Result<bool> {
        self.need(1)?;
        Ok(self.buf.get_u8() != 0)
    }

    fn need(&self, len: usize) -> Result<()> {
        if self.buf.remaining() < len {
            return Err(Error::truncated());
        }
        Ok(())
    }
}

/// Convenience function to decode a single bare value
pub fn decode(data: &[u8]) -> Result<Document> {
    Amf3Decoder::new().decode(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf3::externalizable::tests::fixed_factory;

    fn decode_ok(data: &[u8]) -> Document {
        decode(data).unwrap()
    }

    #[test]
    fn test_immediates() {
        assert_eq!(decode_ok(&[0x00]).root, Value::Undefined);
        assert_eq!(decode_ok(&[0x01]).root, Value::Null);
        assert_eq!(decode_ok(&[0x02]).root, Value::Boolean(false));
        assert_eq!(decode_ok(&[0x03]).root, Value::Boolean(true));
    }

    #[test]
    fn test_integer_and_double() {
        assert_eq!(decode_ok(&[0x04, 0x7F]).root, Value::Integer(127));
        assert_eq!(
            decode_ok(&[0x04, 0xFF, 0xFF, 0xFF, 0xFF]).root,
            Value::Integer(-1)
        );
        let mut data = vec![0x05];
        data.extend_from_slice(&1.5f64.to_be_bytes());
        assert_eq!(decode_ok(&data).root, Value::Double(1.5));
    }

    #[test]
    fn test_string_reference() {
        // Array with two dense strings, the second a reference to the first
        let data = [0x09, 0x05, 0x01, 0x06, 0x05, b'h', b'i', 0x06, 0x00];
        let doc = decode_ok(&data);
        let array = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(array.dense(), &[Value::from("hi"), Value::from("hi")]);
    }

    #[test]
    fn test_empty_string_not_stored() {
        // "" then "a" then a reference to index 0, which must be "a"
        let data = [
            0x09, 0x07, 0x01, 0x06, 0x01, 0x06, 0x03, b'a', 0x06, 0x00,
        ];
        let doc = decode_ok(&data);
        let array = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(
            array.dense(),
            &[Value::from(""), Value::from("a"), Value::from("a")]
        );
    }

    #[test]
    fn test_array_associative_then_dense() {
        let data = [
            0x09, 0x03, // one dense element
            0x03, b'k', 0x04, 0x05, // k = 5
            0x01, // end of associative part
            0x03, // true
        ];
        let doc = decode_ok(&data);
        let array = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(array.get_key("k"), Some(&Value::Integer(5)));
        assert_eq!(array.dense(), &[Value::Boolean(true)]);
    }

    #[test]
    fn test_self_referencing_array() {
        // Array whose only dense element is object reference 0: itself
        let data = [0x09, 0x03, 0x01, 0x09, 0x00];
        let doc = decode_ok(&data);
        let array = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(array.dense(), &[doc.root.clone()]);
    }

    #[test]
    fn test_sealed_object() {
        let data = [
            0x0A, 0x23, // inline trait, not dynamic, two sealed members
            0x0B, b'P', b'o', b'i', b'n', b't', // class name
            0x03, b'x', 0x03, b'y', // member names
            0x04, 0x01, 0x04, 0x02, // x = 1, y = 2
        ];
        let doc = decode_ok(&data);
        let object = doc.arena.object(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(object.trait_name(), "Point");
        assert!(!object.is_dynamic());
        assert_eq!(object.get("x"), Some(&Value::Integer(1)));
        assert_eq!(object.get("y"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_trait_reference() {
        // Two anonymous dynamic objects, the second reusing trait 0
        let data = [
            0x09, 0x05, 0x01, // array of two
            0x0A, 0x0B, 0x01, 0x03, b'a', 0x04, 0x01, 0x01, // {a: 1}
            0x0A, 0x01, 0x00, 0x04, 0x02, 0x01, // trait ref 0, {a: 2}
        ];
        let doc = decode_ok(&data);
        let array = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        let second = doc.arena.object(array.dense()[1].node_id().unwrap()).unwrap();
        assert!(second.is_dynamic());
        assert_eq!(second.get("a"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_dictionary() {
        let data = [0x11, 0x03, 0x01, 0x04, 0x01, 0x06, 0x03, b'v'];
        let doc = decode_ok(&data);
        let dict = doc.arena.dictionary(doc.root.node_id().unwrap()).unwrap();
        assert!(dict.has_weak_keys());
        assert_eq!(dict.get(&Value::Integer(1)), Some(&Value::from("v")));
    }

    #[test]
    fn test_vectors() {
        let data = [0x0D, 0x05, 0x01, 0xFF, 0xFF, 0xFF, 0xFE, 0x00, 0x00, 0x00, 0x07];
        match decode_ok(&data).root {
            Value::VectorInt(v) => {
                assert!(v.is_fixed_length());
                assert_eq!(v.as_slice(), &[-2, 7]);
                assert_eq!(v.capacity(), Some(2));
            }
            other => panic!("Expected VectorInt, got {:?}", other),
        }

        let data = [0x0E, 0x03, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        match decode_ok(&data).root {
            Value::VectorUInt(v) => assert_eq!(v.as_slice(), &[u32::MAX]),
            other => panic!("Expected VectorUInt, got {:?}", other),
        }

        let data = [0x10, 0x03, 0x00, 0x01, 0x01];
        let doc = decode_ok(&data);
        let vector = doc.arena.vector(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(vector.type_name(), "");
        assert_eq!(vector.items().as_slice(), &[Value::Null]);
    }

    #[test]
    fn test_externalizable() {
        let data = [
            0x0A, 0x07, 0x07, b'a', b'.', b'X', // externalizable trait "a.X"
            0xAA, 0xBB, // payload
        ];
        let decoder = Amf3Decoder::new().with_factory(fixed_factory("a.X", 2));
        let doc = decoder.decode(&data).unwrap();
        let object = doc.arena.object(doc.root.node_id().unwrap()).unwrap();
        assert!(object.is_externalizable());
        let external = object.external().unwrap();
        assert!(format!("{:?}", external).contains("170"));

        let err = decode(&data).unwrap_err();
        assert!(matches!(
            err,
            Error::Data(DataError::UnknownExternalizable(ref name)) if name == "a.X"
        ));
    }

    #[test]
    fn test_unknown_marker() {
        let err = decode(&[0x12]).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::UnknownMarker(0x12))));
    }

    #[test]
    fn test_truncated_input() {
        assert!(decode(&[]).unwrap_err().is_io());
        assert!(decode(&[0x05, 0x00]).unwrap_err().is_io());
        assert!(decode(&[0x06, 0x07, b'a']).unwrap_err().is_io());
        assert!(decode(&[0x0D, 0x05, 0x00, 0x00]).unwrap_err().is_io());
    }

    #[test]
    fn test_bad_references() {
        let err = decode(&[0x06, 0x02]).unwrap_err();
        assert!(err.is_malformed());

        // Array whose element claims to be a Date but points at the array
        let err = decode(&[0x09, 0x03, 0x01, 0x08, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Data(DataError::ReferenceTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let err = decode(&[0x06, 0x03, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::InvalidUtf8)));
    }

    #[test]
    fn test_nesting_limit() {
        let mut data = Vec::new();
        for _ in 0..10 {
            data.extend_from_slice(&[0x09, 0x03, 0x01]);
        }
        data.push(0x01);

        let decoder = Amf3Decoder::with_config(CodecConfig::default().max_depth(5));
        let err = decoder.decode(&data).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::NestingTooDeep)));
        assert!(Amf3Decoder::new().decode(&data).is_ok());
    }

    #[test]
    fn test_read_from_reader() {
        let data: &[u8] = &[0x04, 0x05];
        let doc = Amf3Decoder::new().read(data).unwrap();
        assert_eq!(doc.root, Value::Integer(5));
    }
}
