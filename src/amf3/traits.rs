//! Object traits (class schemas)
//!
//! An object header is a U29 whose low bits describe the trait:
//!
//! ```text
//! xxxxxxx0 - object reference         (index = U29 >> 1)
//! xxxxxx01 - trait reference          (index = U29 >> 2)
//! xxxxx111 - externalizable trait     (class name follows)
//! xxxxd011 - inline trait             (d = dynamic, sealed count = U29 >> 4)
//! ```
//!
//! Inline traits are followed by the class name and one string per sealed
//! property, and are appended to the trait table.

use super::varint::{check_flag_payload, U29_MAX};
use crate::error::{DataError, Result};

/// Class schema shared by objects of the same shape
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trait {
    /// Class name; empty for anonymous objects
    pub name: String,
    pub dynamic: bool,
    pub externalizable: bool,
    /// Sealed property names in wire order
    pub properties: Vec<String>,
}

impl Trait {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Schema of a plain `{}` object: anonymous, dynamic, no sealed members
    pub fn anonymous() -> Self {
        Self {
            dynamic: true,
            ..Default::default()
        }
    }

    pub fn dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    pub fn externalizable(mut self, externalizable: bool) -> Self {
        self.externalizable = externalizable;
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }
}

/// Decoded trait portion of an object header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TraitHeader {
    /// Index into the trait table
    Reference(u32),
    Inline {
        externalizable: bool,
        dynamic: bool,
        sealed_count: u32,
    },
}

impl TraitHeader {
    /// Parse the header payload left after the object reference bit
    pub(crate) fn parse(payload: u32) -> Self {
        if payload & 1 == 0 {
            return TraitHeader::Reference(payload >> 1);
        }
        TraitHeader::Inline {
            externalizable: payload & 0b10 != 0,
            dynamic: payload & 0b100 != 0,
            sealed_count: payload >> 3,
        }
    }

    pub(crate) fn inline(t: &Trait) -> Result<Self> {
        let sealed_count = check_flag_payload(t.properties.len())?;
        if sealed_count > U29_MAX >> 4 {
            return Err(DataError::LengthOverflow(t.properties.len()).into());
        }
        Ok(TraitHeader::Inline {
            externalizable: t.externalizable,
            dynamic: t.dynamic,
            sealed_count,
        })
    }

    pub(crate) fn reference(index: usize) -> Result<Self> {
        if index > (U29_MAX >> 2) as usize {
            return Err(DataError::LengthOverflow(index).into());
        }
        Ok(TraitHeader::Reference(index as u32))
    }

    /// Full U29 written on the wire, object-inline bit included
    pub(crate) fn encode(&self) -> u32 {
        match *self {
            TraitHeader::Reference(index) => (index << 2) | 1,
            TraitHeader::Inline {
                externalizable,
                dynamic,
                sealed_count,
            } => {
                let mut bits = 3;
                if externalizable {
                    bits |= 4;
                }
                if dynamic {
                    bits |= 8;
                }
                bits | (sealed_count << 4)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_header_bits() {
        let t = Trait::new("Point").property("x").property("y");
        let header = TraitHeader::inline(&t).unwrap();
        assert_eq!(header.encode(), 0x23);

        let dynamic = Trait::anonymous();
        assert_eq!(TraitHeader::inline(&dynamic).unwrap().encode(), 0x0B);

        let ext = Trait::new("flex.messaging.io.ArrayCollection").externalizable(true);
        assert_eq!(TraitHeader::inline(&ext).unwrap().encode(), 0x07);
    }

    #[test]
    fn test_reference_header_bits() {
        assert_eq!(TraitHeader::reference(0).unwrap().encode(), 0x01);
        assert_eq!(TraitHeader::reference(3).unwrap().encode(), 0x0D);
        assert!(TraitHeader::reference(1 << 28).is_err());
    }

    #[test]
    fn test_parse_mirrors_encode() {
        let headers = [
            TraitHeader::Reference(0),
            TraitHeader::Reference(5),
            TraitHeader::Inline {
                externalizable: false,
                dynamic: true,
                sealed_count: 0,
            },
            TraitHeader::Inline {
                externalizable: true,
                dynamic: false,
                sealed_count: 0,
            },
            TraitHeader::Inline {
                externalizable: false,
                dynamic: false,
                sealed_count: 12,
            },
        ];
        for header in headers {
            // The decoder sees the header with the object bit shifted out
            assert_eq!(TraitHeader::parse(header.encode() >> 1), header);
        }
    }

    #[test]
    fn test_trait_equality_is_structural() {
        let a = Trait::new("A").dynamic(true).property("x");
        let b = Trait::new("A").dynamic(true).property("x");
        assert_eq!(a, b);
        assert_ne!(a, b.clone().property("y"));
        assert_ne!(a, Trait::new("A").property("x"));
    }
}
