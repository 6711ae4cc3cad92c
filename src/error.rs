//! Unified error types for amf3-sol
//!
//! Three kinds of failure are kept apart so callers can tell them apart:
//! - [`Error::Io`]: the byte source or sink failed, or the input ended early
//! - [`Error::Data`]: the bytes are not valid AMF3 / SOL data
//! - [`Error::Value`]: a value-model invariant was violated by the caller

use std::fmt;
use std::io;

use crate::amf3::marker::TypeMarker;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all codec operations
#[derive(Debug)]
pub enum Error {
    /// I/O error on the underlying source or sink, including truncated input
    Io(io::Error),
    /// Malformed or unsupported wire data
    Data(DataError),
    /// Value model invariant violation
    Value(ValueError),
}

impl Error {
    /// Error raised when the input ends in the middle of a value
    pub(crate) fn truncated() -> Self {
        Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "unexpected end of AMF data",
        ))
    }

    /// True for source/sink failures and truncated input
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// True for malformed wire data
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::Data(_))
    }

    /// True for value model invariant violations
    pub fn is_invariant(&self) -> bool {
        matches!(self, Error::Value(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Data(e) => write!(f, "Malformed data: {}", e),
            Error::Value(e) => write!(f, "Invalid value: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Data(e) => Some(e),
            Error::Value(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<DataError> for Error {
    fn from(err: DataError) -> Self {
        Error::Data(err)
    }
}

impl From<ValueError> for Error {
    fn from(err: ValueError) -> Self {
        Error::Value(err)
    }
}

/// Which reference table an index pointed into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTable {
    String,
    Object,
    Trait,
}

impl fmt::Display for RefTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTable::String => write!(f, "string"),
            RefTable::Object => write!(f, "object"),
            RefTable::Trait => write!(f, "trait"),
        }
    }
}

/// Wire format errors
#[derive(Debug)]
pub enum DataError {
    UnknownMarker(u8),
    BadEndianness([u8; 2]),
    BadMagic([u8; 4]),
    UnsupportedVersion(u32),
    SizeMismatch { declared: u32, actual: usize },
    InvalidReference { table: RefTable, index: u32 },
    /// A reference resolved to a value of a different type
    ReferenceTypeMismatch { expected: TypeMarker, found: TypeMarker },
    /// No registered factory handles this externalizable trait
    UnknownExternalizable(String),
    /// An externalizable plug-in rejected its payload
    ExternalizablePayload(String),
    InvalidUtf8,
    InvalidName,
    NestingTooDeep,
    IntegerOutOfRange(i32),
    LengthOverflow(usize),
    /// A handle that does not belong to the arena being encoded
    DanglingHandle,
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::UnknownMarker(m) => write!(f, "Unknown AMF3 marker: 0x{:02x}", m),
            DataError::BadEndianness(b) => {
                write!(f, "Unknown endianness sentinel: {:02x} {:02x}", b[0], b[1])
            }
            DataError::BadMagic(m) => write!(f, "Wrong file tag: {:?}", String::from_utf8_lossy(m)),
            DataError::UnsupportedVersion(v) => write!(f, "Unsupported AMF version: {}", v),
            DataError::SizeMismatch { declared, actual } => {
                write!(f, "Declared size {} does not match body length {}", declared, actual)
            }
            DataError::InvalidReference { table, index } => {
                write!(f, "Invalid {} reference: {}", table, index)
            }
            DataError::ReferenceTypeMismatch { expected, found } => {
                write!(f, "Reference type mismatch: expected {:?}, found {:?}", expected, found)
            }
            DataError::UnknownExternalizable(name) => {
                write!(f, "No externalizable factory for trait '{}'", name)
            }
            DataError::ExternalizablePayload(msg) => {
                write!(f, "Externalizable payload rejected: {}", msg)
            }
            DataError::InvalidUtf8 => write!(f, "Invalid UTF-8 in AMF string"),
            DataError::InvalidName => write!(f, "Shared object name must be ASCII"),
            DataError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            DataError::IntegerOutOfRange(v) => {
                write!(f, "Integer {} does not fit in 29 bits", v)
            }
            DataError::LengthOverflow(len) => write!(f, "Length {} does not fit in U29", len),
            DataError::DanglingHandle => write!(f, "Value handle not found in arena"),
        }
    }
}

impl std::error::Error for DataError {}

/// Value model invariant violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A fixed-length vector is already at capacity
    CapacityExceeded { capacity: usize },
    /// More bytes popped than a byte array holds
    Underflow { requested: usize, available: usize },
    /// Empty keys terminate associative sections on the wire
    EmptyKey,
    TypeMismatch { expected: TypeMarker, found: TypeMarker },
    /// No value at the given dotted path
    MissingPath(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::CapacityExceeded { capacity } => write!(
                f,
                "Fixed length vector cannot contain more than {} entries",
                capacity
            ),
            ValueError::Underflow { requested, available } => write!(
                f,
                "Cannot pop {} bytes, only {} available",
                requested, available
            ),
            ValueError::EmptyKey => write!(f, "Empty string is not a valid key"),
            ValueError::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected {:?}, found {:?}", expected, found)
            }
            ValueError::MissingPath(path) => write!(f, "No value at path '{}'", path),
        }
    }
}

impl std::error::Error for ValueError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("pipe closed"));

        let err = Error::Data(DataError::UnknownMarker(0x42));
        assert!(err.to_string().contains("Malformed data"));

        let err = Error::Value(ValueError::EmptyKey);
        assert!(err.to_string().contains("Invalid value"));
    }

    #[test]
    fn test_error_kinds_are_distinct() {
        let truncated = Error::truncated();
        assert!(truncated.is_io());
        assert!(!truncated.is_malformed());
        match truncated {
            Error::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            _ => panic!("Expected Io error"),
        }

        let data: Error = DataError::BadMagic(*b"XXXX").into();
        assert!(data.is_malformed());
        assert!(!data.is_io());

        let value: Error = ValueError::CapacityExceeded { capacity: 2 }.into();
        assert!(value.is_invariant());
        assert!(!value.is_malformed());
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as StdError;

        let err = Error::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(err.source().is_some());

        let err = Error::Data(DataError::InvalidUtf8);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_data_error_display() {
        assert!(DataError::UnknownMarker(0xAB).to_string().contains("0xab"));
        assert!(DataError::BadEndianness([0x01, 0xBF])
            .to_string()
            .contains("01 bf"));
        assert!(DataError::BadMagic(*b"ABCD").to_string().contains("ABCD"));
        assert!(DataError::UnsupportedVersion(0).to_string().contains("0"));
        assert!(DataError::InvalidReference {
            table: RefTable::Trait,
            index: 7
        }
        .to_string()
        .contains("trait reference: 7"));
        assert!(DataError::UnknownExternalizable("flex.ArrayCollection".into())
            .to_string()
            .contains("flex.ArrayCollection"));
        assert!(DataError::InvalidUtf8.to_string().contains("UTF-8"));
        assert!(DataError::NestingTooDeep.to_string().contains("deep"));
        assert!(DataError::IntegerOutOfRange(1 << 28)
            .to_string()
            .contains("268435456"));
        let err = DataError::SizeMismatch {
            declared: 100,
            actual: 90,
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("90"));
    }

    #[test]
    fn test_value_error_display() {
        assert!(ValueError::CapacityExceeded { capacity: 2 }
            .to_string()
            .contains("2 entries"));
        let err = ValueError::Underflow {
            requested: 4,
            available: 1,
        };
        assert!(err.to_string().contains("4"));
        assert!(err.to_string().contains("1 available"));
        assert!(ValueError::EmptyKey.to_string().contains("Empty"));
        assert!(ValueError::TypeMismatch {
            expected: TypeMarker::Integer,
            found: TypeMarker::String,
        }
        .to_string()
        .contains("Integer"));
        assert!(ValueError::MissingPath("a.b".into())
            .to_string()
            .contains("'a.b'"));
    }
}
