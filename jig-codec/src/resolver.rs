//! Reference hooks between the codec and whoever owns creation identity.

use serde_json::Value as Json;

use crate::error::EncodeError;
use crate::value::CreationRef;

/// Maps creations to the opaque identifiers stored in `$jig` nodes and back.
///
/// Both directions decline by default, so a resolver used only for decoding
/// (or only for encoding) implements just one method.
pub trait ReferenceResolver {
    /// Name a live creation for the wire form.
    fn encode_reference(&self, creation: &CreationRef) -> Result<Json, EncodeError> {
        Err(EncodeError::Unresolvable(creation.to_string()))
    }

    /// Find the live creation for a `$jig` identifier.
    fn decode_reference(&self, _id: &Json) -> Option<CreationRef> {
        None
    }
}

impl<T: ReferenceResolver + ?Sized> ReferenceResolver for &T {
    fn encode_reference(&self, creation: &CreationRef) -> Result<Json, EncodeError> {
        (**self).encode_reference(creation)
    }

    fn decode_reference(&self, id: &Json) -> Option<CreationRef> {
        (**self).decode_reference(id)
    }
}

/// Resolver built from a pair of closures.
pub struct FnResolver<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnResolver<E, D>
where
    E: Fn(&CreationRef) -> Option<Json>,
    D: Fn(&Json) -> Option<CreationRef>,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<E, D> ReferenceResolver for FnResolver<E, D>
where
    E: Fn(&CreationRef) -> Option<Json>,
    D: Fn(&Json) -> Option<CreationRef>,
{
    fn encode_reference(&self, creation: &CreationRef) -> Result<Json, EncodeError> {
        (self.encode)(creation).ok_or_else(|| EncodeError::Unresolvable(creation.to_string()))
    }

    fn decode_reference(&self, id: &Json) -> Option<CreationRef> {
        (self.decode)(id)
    }
}
