//! Externalizable payload plug-ins
//!
//! Objects whose trait is flagged externalizable carry a payload whose
//! layout only the class itself knows. The codec hands the raw stream to a
//! caller-supplied [`Externalizable`] picked by trait name from a list of
//! [`ExternalizableFactory`]s, tried in registration order.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// Reader/writer for one externalizable payload
pub trait Externalizable: fmt::Debug + Send + Sync {
    /// Consume exactly this object's payload from `input`
    fn read_payload(&mut self, input: &mut Bytes) -> Result<()>;

    /// Append this object's payload to `output`
    fn write_payload(&self, output: &mut BytesMut) -> Result<()>;
}

/// Produces an [`Externalizable`] for the trait names it understands
pub trait ExternalizableFactory: Send + Sync {
    /// `None` if this factory does not handle `trait_name`
    fn create(&self, trait_name: &str) -> Option<Box<dyn Externalizable>>;
}

impl<F> ExternalizableFactory for F
where
    F: Fn(&str) -> Option<Box<dyn Externalizable>> + Send + Sync,
{
    fn create(&self, trait_name: &str) -> Option<Box<dyn Externalizable>> {
        self(trait_name)
    }
}

/// Ordered list of factories; the first non-`None` result wins
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: Vec<Arc<dyn ExternalizableFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, factory: F)
    where
        F: ExternalizableFactory + 'static,
    {
        self.factories.push(Arc::new(factory));
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn create(&self, trait_name: &str) -> Option<Box<dyn Externalizable>> {
        self.factories
            .iter()
            .find_map(|factory| factory.create(trait_name))
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("factories", &self.factories.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use bytes::{Buf, BufMut};

    /// Payload of a fixed number of raw bytes, used by codec tests
    #[derive(Debug, Default)]
    pub(crate) struct FixedPayload {
        pub(crate) len: usize,
        pub(crate) data: Vec<u8>,
    }

    impl Externalizable for FixedPayload {
        fn read_payload(&mut self, input: &mut Bytes) -> Result<()> {
            if input.remaining() < self.len {
                return Err(Error::truncated());
            }
            self.data = input.copy_to_bytes(self.len).to_vec();
            Ok(())
        }

        fn write_payload(&self, output: &mut BytesMut) -> Result<()> {
            output.put_slice(&self.data);
            Ok(())
        }
    }

    pub(crate) fn fixed_factory(name: &'static str, len: usize) -> impl ExternalizableFactory {
        move |trait_name: &str| -> Option<Box<dyn Externalizable>> {
            (trait_name == name).then(|| {
                Box::new(FixedPayload {
                    len,
                    data: Vec::new(),
                }) as Box<dyn Externalizable>
            })
        }
    }

    #[test]
    fn test_first_matching_factory_wins() {
        let mut registry = FactoryRegistry::new();
        registry.register(fixed_factory("a.Thing", 1));
        registry.register(fixed_factory("a.Thing", 2));
        registry.register(fixed_factory("b.Other", 3));
        assert_eq!(registry.len(), 3);

        let mut ext = registry.create("a.Thing").unwrap();
        let mut input = Bytes::from_static(&[9, 8, 7]);
        ext.read_payload(&mut input).unwrap();
        assert_eq!(input.len(), 2);

        let mut out = BytesMut::new();
        ext.write_payload(&mut out).unwrap();
        assert_eq!(out.as_ref(), &[9]);
    }

    #[test]
    fn test_no_matching_factory() {
        let mut registry = FactoryRegistry::new();
        assert!(registry.create("a.Thing").is_none());
        registry.register(fixed_factory("b.Other", 3));
        assert!(registry.create("a.Thing").is_none());
        assert!(format!("{:?}", registry).contains("1"));
    }
}
