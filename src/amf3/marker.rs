//! AMF3 type markers
//!
//! ```text
//! 0x00 - Undefined          0x09 - Array
//! 0x01 - Null               0x0A - Object
//! 0x02 - False              0x0B - XML
//! 0x03 - True               0x0C - ByteArray
//! 0x04 - Integer (S29)      0x0D - Vector<int>
//! 0x05 - Double             0x0E - Vector<uint>
//! 0x06 - String             0x0F - Vector<Number>
//! 0x07 - XMLDocument        0x10 - Vector<Object>
//! 0x08 - Date               0x11 - Dictionary
//! ```

use crate::error::DataError;

/// One-byte type discriminant preceding every AMF3 value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeMarker {
    Undefined = 0x00,
    Null = 0x01,
    False = 0x02,
    True = 0x03,
    Integer = 0x04,
    Double = 0x05,
    String = 0x06,
    XmlDoc = 0x07,
    Date = 0x08,
    Array = 0x09,
    Object = 0x0A,
    Xml = 0x0B,
    ByteArray = 0x0C,
    VectorInt = 0x0D,
    VectorUInt = 0x0E,
    VectorDouble = 0x0F,
    VectorGeneric = 0x10,
    Dictionary = 0x11,
}

impl TypeMarker {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => TypeMarker::Undefined,
            0x01 => TypeMarker::Null,
            0x02 => TypeMarker::False,
            0x03 => TypeMarker::True,
            0x04 => TypeMarker::Integer,
            0x05 => TypeMarker::Double,
            0x06 => TypeMarker::String,
            0x07 => TypeMarker::XmlDoc,
            0x08 => TypeMarker::Date,
            0x09 => TypeMarker::Array,
            0x0A => TypeMarker::Object,
            0x0B => TypeMarker::Xml,
            0x0C => TypeMarker::ByteArray,
            0x0D => TypeMarker::VectorInt,
            0x0E => TypeMarker::VectorUInt,
            0x0F => TypeMarker::VectorDouble,
            0x10 => TypeMarker::VectorGeneric,
            0x11 => TypeMarker::Dictionary,
            _ => return None,
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether values of this type go through the object reference table
    pub fn is_object_referenced(self) -> bool {
        matches!(
            self,
            TypeMarker::XmlDoc
                | TypeMarker::Date
                | TypeMarker::Array
                | TypeMarker::Object
                | TypeMarker::Xml
                | TypeMarker::ByteArray
                | TypeMarker::VectorInt
                | TypeMarker::VectorUInt
                | TypeMarker::VectorDouble
                | TypeMarker::VectorGeneric
                | TypeMarker::Dictionary
        )
    }
}

impl TryFrom<u8> for TypeMarker {
    type Error = DataError;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        TypeMarker::from_byte(b).ok_or(DataError::UnknownMarker(b))
    }
}

impl From<TypeMarker> for u8 {
    fn from(marker: TypeMarker) -> u8 {
        marker.as_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_table_is_total() {
        for b in 0x00..=0x11u8 {
            let marker = TypeMarker::from_byte(b).unwrap();
            assert_eq!(marker.as_byte(), b);
        }
        for b in 0x12..=0xFFu8 {
            assert!(TypeMarker::from_byte(b).is_none());
        }
    }

    #[test]
    fn test_try_from_unknown() {
        let err = TypeMarker::try_from(0x12).unwrap_err();
        assert!(matches!(err, DataError::UnknownMarker(0x12)));
    }

    #[test]
    fn test_reference_classes() {
        assert!(!TypeMarker::String.is_object_referenced());
        assert!(!TypeMarker::Integer.is_object_referenced());
        assert!(TypeMarker::Dictionary.is_object_referenced());
        assert!(TypeMarker::Xml.is_object_referenced());
    }
}
