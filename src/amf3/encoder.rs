//! AMF3 encoder
//!
//! Bare values are written without any reference lookup. SOL files share
//! one set of tables across all entries, so repeated strings, traits and
//! leaf objects collapse into back-references. Arrays and objects are
//! always written in full, except for a back-reference to an enclosing
//! value that is still being written (a cycle).

use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};

use super::arena::{Arena, Document, NodeId};
use super::tables::WriteTables;
use super::traits::{Trait, TraitHeader};
use super::value::{Value, Vector};
use super::varint::{check_flag_payload, write_s29, write_u29, write_u29_flag};
use crate::config::CodecConfig;
use crate::error::{DataError, Result, ValueError};
use crate::sol::{self, SolFile};

/// AMF3 encoder for bare values and SOL files
#[derive(Debug, Clone, Default)]
pub struct Amf3Encoder {
    config: CodecConfig,
}

impl Amf3Encoder {
    /// Create a new encoder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Encode a single bare value whose handles point into `arena`
    pub fn encode(&self, arena: &Arena, value: &Value) -> Result<Bytes> {
        let mut session = self.session(arena, false);
        session.write_value(value)?;
        Ok(session.buf.freeze())
    }

    pub fn encode_document(&self, doc: &Document) -> Result<Bytes> {
        self.encode(&doc.arena, &doc.root)
    }

    /// Encode a complete SOL file, size field included
    pub fn encode_file(&self, file: &SolFile) -> Result<Bytes> {
        let mut session = self.session(&file.arena, true);
        sol::write_header(&mut session.buf, &file.name, self.config.sol_version)?;

        for (key, value) in &file.entries {
            session.write_string(key)?;
            session.write_value(value)?;
            session.buf.put_u8(0);
            tracing::trace!(key = %key, marker = ?value.marker(), "Encoded SOL entry");
        }

        sol::patch_size(&mut session.buf)?;
        tracing::debug!(
            name = %file.name,
            entries = file.entries.len(),
            size = session.buf.len(),
            "Encoded SOL file"
        );
        Ok(session.buf.freeze())
    }

    /// Encode a bare value and write it to `writer` in one go
    pub fn write<W: Write>(&self, arena: &Arena, value: &Value, mut writer: W) -> Result<()> {
        let bytes = self.encode(arena, value)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Encode a SOL file and write it to `writer` once the size is patched
    pub fn write_file<W: Write>(&self, file: &SolFile, mut writer: W) -> Result<()> {
        let bytes = self.encode_file(file)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn session<'a>(&self, arena: &'a Arena, lookup: bool) -> EncodeSession<'a> {
        EncodeSession {
            buf: BytesMut::with_capacity(self.config.initial_capacity),
            tables: WriteTables::new(lookup),
            arena,
            depth: 0,
            max_depth: self.config.max_depth,
            active: Vec::new(),
        }
    }
}

/// State of one encode call
struct EncodeSession<'a> {
    buf: BytesMut,
    tables: WriteTables,
    arena: &'a Arena,
    depth: usize,
    max_depth: usize,
    /// Composite values currently being written, with their object slot
    active: Vec<(NodeId, usize)>,
}

impl EncodeSession<'_> {
    fn write_value(&mut self, value: &Value) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(DataError::NestingTooDeep.into());
        }
        self.buf.put_u8(value.marker().as_byte());
        let result = self.write_body(value);
        self.depth -= 1;
        result
    }

    fn write_body(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Undefined | Value::Null | Value::Boolean(_) => Ok(()),
            Value::Integer(i) => write_s29(&mut self.buf, *i),
            Value::Double(d) => {
                self.buf.put_f64(*d);
                Ok(())
            }
            Value::String(s) => self.write_string(s),
            Value::XmlDoc(text) | Value::Xml(text) => {
                if self.claim(value)? {
                    return Ok(());
                }
                self.write_bytes(text.as_bytes())
            }
            Value::Date(date) => {
                if self.claim(value)? {
                    return Ok(());
                }
                write_u29_flag(&mut self.buf, 0, true);
                self.buf.put_f64(date.millis());
                Ok(())
            }
            Value::ByteArray(bytes) => {
                if self.claim(value)? {
                    return Ok(());
                }
                self.write_bytes(bytes.as_slice())
            }
            Value::VectorInt(v) => self.write_vector(value, v, |buf, x| buf.put_i32(*x)),
            Value::VectorUInt(v) => self.write_vector(value, v, |buf, x| buf.put_u32(*x)),
            Value::VectorDouble(v) => self.write_vector(value, v, |buf, x| buf.put_f64(*x)),
            Value::Array(id) => self.write_array(value, *id),
            Value::Object(id) => self.write_object(value, *id),
            Value::Dictionary(id) => self.write_dictionary(value, *id),
            Value::VectorGeneric(id) => self.write_generic_vector(value, *id),
        }
    }

    /// Either write a back-reference and return true, or take a new object
    /// slot for `value` and return false
    fn claim(&mut self, value: &Value) -> Result<bool> {
        let enclosing = value
            .node_id()
            .and_then(|id| self.active.iter().find(|(active, _)| *active == id))
            .map(|&(_, slot)| slot);
        let index = match enclosing {
            Some(slot) => Some(slot),
            None => self.tables.find_object(self.arena, value),
        };
        if let Some(index) = index {
            write_u29_flag(&mut self.buf, check_flag_payload(index)?, false);
            return Ok(true);
        }

        let slot = self.tables.add_object(value);
        if let Some(id) = value.node_id() {
            self.active.push((id, slot));
        }
        Ok(false)
    }

    fn release(&mut self) {
        self.active.pop();
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        if s.is_empty() {
            write_u29_flag(&mut self.buf, 0, true);
            return Ok(());
        }
        if let Some(index) = self.tables.find_string(s) {
            write_u29_flag(&mut self.buf, check_flag_payload(index)?, false);
            return Ok(());
        }
        self.write_bytes(s.as_bytes())?;
        self.tables.add_string(s);
        Ok(())
    }

    /// Inline length header followed by the raw bytes
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let len = check_flag_payload(bytes.len())?;
        write_u29_flag(&mut self.buf, len, true);
        self.buf.put_slice(bytes);
        Ok(())
    }

    fn write_vector<T>(
        &mut self,
        value: &Value,
        vector: &Vector<T>,
        put: impl Fn(&mut BytesMut, &T),
    ) -> Result<()> {
        if self.claim(value)? {
            return Ok(());
        }
        write_u29_flag(&mut self.buf, check_flag_payload(vector.len())?, true);
        self.buf.put_u8(vector.is_fixed_length() as u8);
        for item in vector {
            put(&mut self.buf, item);
        }
        Ok(())
    }

    fn write_array(&mut self, value: &Value, id: NodeId) -> Result<()> {
        let arena = self.arena;
        let array = arena.array(id).ok_or(DataError::DanglingHandle)?;
        if self.claim(value)? {
            return Ok(());
        }

        write_u29_flag(&mut self.buf, check_flag_payload(array.dense().len())?, true);
        for (key, item) in array.associative() {
            if key.is_empty() {
                return Err(ValueError::EmptyKey.into());
            }
            self.write_string(key)?;
            self.write_value(item)?;
        }
        self.write_string("")?;
        for item in array.dense() {
            self.write_value(item)?;
        }

        self.release();
        Ok(())
    }

    fn write_object(&mut self, value: &Value, id: NodeId) -> Result<()> {
        let arena = self.arena;
        let object = arena.object(id).ok_or(DataError::DanglingHandle)?;
        if self.claim(value)? {
            return Ok(());
        }

        let t = object.trait_info();
        self.write_trait(&t)?;

        for item in object.sealed().values() {
            self.write_value(item)?;
        }

        if object.is_dynamic() {
            for (key, item) in object.dynamic_members() {
                if key.is_empty() {
                    return Err(ValueError::EmptyKey.into());
                }
                self.write_string(key)?;
                self.write_value(item)?;
            }
            self.write_string("")?;
        }

        if object.is_externalizable() {
            let external = object.external().ok_or_else(|| {
                DataError::ExternalizablePayload(format!("no payload for '{}'", t.name))
            })?;
            external.write_payload(&mut self.buf)?;
        }

        self.release();
        Ok(())
    }

    fn write_trait(&mut self, t: &Trait) -> Result<()> {
        if let Some(index) = self.tables.find_trait(t) {
            write_u29(&mut self.buf, TraitHeader::reference(index)?.encode());
            return Ok(());
        }

        write_u29(&mut self.buf, TraitHeader::inline(t)?.encode());
        self.write_string(&t.name)?;
        for property in &t.properties {
            self.write_string(property)?;
        }
        self.tables.add_trait(t.clone());
        Ok(())
    }

    fn write_dictionary(&mut self, value: &Value, id: NodeId) -> Result<()> {
        let arena = self.arena;
        let dictionary = arena.dictionary(id).ok_or(DataError::DanglingHandle)?;
        if self.claim(value)? {
            return Ok(());
        }

        write_u29_flag(&mut self.buf, check_flag_payload(dictionary.len())?, true);
        self.buf.put_u8(dictionary.has_weak_keys() as u8);
        for (key, item) in dictionary.iter() {
            self.write_value(key)?;
            self.write_value(item)?;
        }

        self.release();
        Ok(())
    }

    fn write_generic_vector(&mut self, value: &Value, id: NodeId) -> Result<()> {
        let arena = self.arena;
        let vector = arena.vector(id).ok_or(DataError::DanglingHandle)?;
        if self.claim(value)? {
            return Ok(());
        }

        let items = vector.items();
        write_u29_flag(&mut self.buf, check_flag_payload(items.len())?, true);
        self.buf.put_u8(items.is_fixed_length() as u8);
        self.write_string(vector.type_name())?;
        for item in items {
            self.write_value(item)?;
        }

        self.release();
        Ok(())
    }
}

/// Convenience function to encode a single bare value
pub fn encode(arena: &Arena, value: &Value) -> Result<Bytes> {
    Amf3Encoder::new().encode(arena, value)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::amf3::arena::{Array, Dictionary, GenericVector, Object};
    use crate::amf3::decoder::{decode, Amf3Decoder};
    use crate::amf3::externalizable::tests::{fixed_factory, FixedPayload};
    use crate::amf3::value::{ByteArray, Date};
    use crate::error::Error;

    fn encode_leaf(value: Value) -> Vec<u8> {
        encode(&Arena::new(), &value).unwrap().to_vec()
    }

    fn roundtrip(arena: &Arena, value: &Value) -> Document {
        let bytes = encode(arena, value).unwrap();
        let doc = decode(&bytes).unwrap();
        assert!(
            arena.structural_eq(value, &doc.arena, &doc.root),
            "round trip changed {}",
            arena.display(value)
        );
        doc
    }

    #[test]
    fn test_leaf_bytes() {
        assert_eq!(encode_leaf(Value::Undefined), vec![0x00]);
        assert_eq!(encode_leaf(Value::Boolean(true)), vec![0x03]);
        assert_eq!(encode_leaf(Value::Integer(-1)), vec![0x04, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encode_leaf(Value::from("hi")), vec![0x06, 0x05, b'h', b'i']);
        assert_eq!(encode_leaf(Value::from("")), vec![0x06, 0x01]);
        assert_eq!(
            encode_leaf(Value::from(vec![1u8, 2])),
            vec![0x0C, 0x05, 0x01, 0x02]
        );

        let mut expected = vec![0x08, 0x01];
        expected.extend_from_slice(&1000.0f64.to_be_bytes());
        assert_eq!(encode_leaf(Value::Date(Date::from_millis(1000.0))), expected);
    }

    #[test]
    fn test_integer_out_of_range() {
        let err = encode(&Arena::new(), &Value::Integer(1 << 28)).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::IntegerOutOfRange(_))));
    }

    #[test]
    fn test_leaf_roundtrips() {
        let arena = Arena::new();
        let mut fixed = Vector::from(vec![1, -2, 3]);
        fixed.set_fixed_length(true);
        let values = vec![
            Value::Null,
            Value::Integer(-(1 << 28)),
            Value::Double(f64::NAN),
            Value::from("unicode \u{263A}"),
            Value::Xml("<a/>".into()),
            Value::XmlDoc("<b/>".into()),
            Value::ByteArray(ByteArray::from(vec![0u8; 300])),
            Value::VectorInt(fixed),
            Value::VectorUInt(Vector::from(vec![0, u32::MAX])),
            Value::VectorDouble(Vector::from(vec![0.5, -1.0])),
        ];
        for value in &values {
            roundtrip(&arena, value);
        }
    }

    #[test]
    fn test_composite_roundtrip() {
        let mut arena = Arena::new();

        let mut point = Object::new("Point");
        point.set_sealed("x", Value::Integer(1));
        point.set_sealed("y", Value::Double(2.5));
        let point = arena.insert_object(point);

        let mut dynamic = Object::anonymous();
        dynamic.set_dynamic_member("name", Value::from("box")).unwrap();
        dynamic.set_dynamic_member("at", point.clone()).unwrap();
        let dynamic = arena.insert_object(dynamic);

        let mut dict = Dictionary::new(false);
        dict.insert(Value::Integer(1), Value::from("one"));
        dict.insert(point.clone(), Value::Boolean(true));
        let dict = arena.insert_dictionary(dict);

        let mut vector = GenericVector::new("Point");
        vector.items_mut().push(point.clone()).unwrap();
        let vector = arena.insert_vector(vector);

        let mut root = Array::new();
        root.insert("meta", dynamic).unwrap();
        root.push(dict);
        root.push(vector);
        root.push(Value::Undefined);
        let root = arena.insert_array(root);

        roundtrip(&arena, &root);
    }

    #[test]
    fn test_same_object_written_twice() {
        let mut arena = Arena::new();
        let mut point = Object::new("Point");
        point.set_sealed("x", Value::Integer(1));
        let point = arena.insert_object(point);

        let single = encode(&arena, &point).unwrap().len();
        let pair = arena.insert_array(Array::from_dense(vec![point.clone(), point]));
        let bytes = encode(&arena, &pair).unwrap();

        // marker + count + empty key, then two full copies
        assert_eq!(bytes.len(), 3 + 2 * single);
    }

    #[test]
    fn test_self_reference_roundtrip() {
        let mut arena = Arena::new();
        let array = arena.insert_array(Array::new());
        let id = array.node_id().unwrap();
        arena.array_mut(id).unwrap().push(Value::Integer(7));
        arena.array_mut(id).unwrap().push(array.clone());

        let bytes = encode(&arena, &array).unwrap();
        assert_eq!(bytes.as_ref(), &[0x09, 0x05, 0x01, 0x04, 0x07, 0x09, 0x00]);

        let doc = roundtrip(&arena, &array);
        let decoded = doc.arena.array(doc.root.node_id().unwrap()).unwrap();
        assert_eq!(decoded.get(1), Some(&doc.root));
    }

    #[test]
    fn test_bare_values_never_reference() {
        let mut arena = Arena::new();
        let date = Value::Date(Date::from_millis(1.0));
        let array = arena.insert_array(Array::from_dense(vec![
            Value::from("same"),
            Value::from("same"),
            date.clone(),
            date,
        ]));
        let bytes = encode(&arena, &array).unwrap();
        // 3 header + 2 * 6 string + 2 * 10 date
        assert_eq!(bytes.len(), 3 + 12 + 20);
        roundtrip(&arena, &array);
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut arena = Arena::new();
        let mut array = Array::new();
        array.associative.insert(String::new(), Value::Null);
        let array = arena.insert_array(array);
        let err = encode(&arena, &array).unwrap_err();
        assert!(err.is_invariant());
    }

    #[test]
    fn test_dangling_handle() {
        let mut other = Arena::new();
        let array = other.insert_array(Array::new());
        let err = encode(&Arena::new(), &array).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::DanglingHandle)));
    }

    #[test]
    fn test_externalizable_roundtrip() {
        let mut arena = Arena::new();
        let mut object = Object::new("a.X");
        object.set_externalizable(true);
        object.set_external(Some(Arc::new(FixedPayload {
            len: 2,
            data: vec![0xAA, 0xBB],
        })));
        let object = arena.insert_object(object);

        let bytes = encode(&arena, &object).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0x0A, 0x07, 0x07, b'a', b'.', b'X', 0xAA, 0xBB]
        );

        let decoder = Amf3Decoder::new().with_factory(fixed_factory("a.X", 2));
        let doc = decoder.decode(&bytes).unwrap();
        assert!(arena.structural_eq(&object, &doc.arena, &doc.root));
    }

    #[test]
    fn test_externalizable_without_payload() {
        let mut arena = Arena::new();
        let mut object = Object::new("a.X");
        object.set_externalizable(true);
        let object = arena.insert_object(object);
        let err = encode(&arena, &object).unwrap_err();
        assert!(matches!(err, Error::Data(DataError::ExternalizablePayload(_))));
    }

    #[test]
    fn test_nesting_limit() {
        let mut arena = Arena::new();
        let mut value = Value::Null;
        for _ in 0..10 {
            value = arena.insert_array(Array::from_dense(vec![value]));
        }
        let encoder = Amf3Encoder::with_config(CodecConfig::default().max_depth(5));
        assert!(encoder.encode(&arena, &value).unwrap_err().is_malformed());
        assert!(Amf3Encoder::new().encode(&arena, &value).is_ok());
    }

    #[test]
    fn test_write_to_sink() {
        let mut out = Vec::new();
        Amf3Encoder::new()
            .write(&Arena::new(), &Value::Integer(5), &mut out)
            .unwrap();
        assert_eq!(out, vec![0x04, 0x05]);
    }
}
