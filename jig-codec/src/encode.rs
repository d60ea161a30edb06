//! Live value graph → canonical wire form.
//!
//! The walk is depth-first in canonical key order. Every container is
//! remembered by identity together with the path where it was first seen,
//! and any later visit emits a `$dup` node holding that path.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Number, Value as Json};
use std::collections::HashMap;

use crate::error::EncodeError;
use crate::resolver::ReferenceResolver;
use crate::tags;
use crate::value::{Container, ObjectRef, Props, Value};

/// Largest integer an f64 carries exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Configurable encoder.
///
/// A `$dup` body is the path where the object was first visited. The root
/// is visited at the empty path, so an object holding itself under `self`
/// encodes as `{"self": {"$dup": []}}`.
#[derive(Default)]
pub struct Encoder<'a> {
    resolver: Option<&'a dyn ReferenceResolver>,
    denied: Vec<ObjectRef>,
}

impl<'a> Encoder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: resolve creations through `resolver`.
    pub fn with_resolver(mut self, resolver: &'a dyn ReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Builder: refuse to encode `obj` (a global intrinsic).
    pub fn deny(mut self, obj: ObjectRef) -> Self {
        self.denied.push(obj);
        self
    }

    pub fn encode(&self, value: &Value) -> Result<Json, EncodeError> {
        let mut pass = EncodePass {
            encoder: self,
            seen: HashMap::new(),
            path: Vec::new(),
        };
        let encoded = pass.value(value)?;
        tracing::trace!(objects = pass.seen.len(), "Encoded value graph");
        Ok(encoded)
    }
}

/// Encode `value`, resolving creations through `resolver` when given.
pub fn encode(value: &Value, resolver: Option<&dyn ReferenceResolver>) -> Result<Json, EncodeError> {
    let mut encoder = Encoder::new();
    if let Some(resolver) = resolver {
        encoder = encoder.with_resolver(resolver);
    }
    encoder.encode(value)
}

struct EncodePass<'e, 'a> {
    encoder: &'e Encoder<'a>,
    /// Identity → (handle kept alive, first-visit path)
    seen: HashMap<usize, (ObjectRef, Vec<String>)>,
    path: Vec<String>,
}

impl EncodePass<'_, '_> {
    fn value(&mut self, value: &Value) -> Result<Json, EncodeError> {
        match value {
            Value::Undefined => Ok(flag(tags::UNDEFINED)),
            Value::Null => Ok(Json::Null),
            Value::Bool(b) => Ok(Json::Bool(*b)),
            Value::Number(n) => number(*n),
            Value::String(s) => Ok(Json::String(s.clone())),
            Value::Symbol(name) => Err(EncodeError::Symbol(name.clone())),
            Value::Intrinsic(name) => Err(EncodeError::Intrinsic(name.clone())),
            Value::Creation(creation) => {
                let resolver = self
                    .encoder
                    .resolver
                    .ok_or_else(|| EncodeError::NoResolver(creation.to_string()))?;
                let id = resolver.encode_reference(creation)?;
                Ok(tagged(tags::REFERENCE, id))
            }
            Value::Object(obj) => self.container(obj),
        }
    }

    fn container(&mut self, obj: &ObjectRef) -> Result<Json, EncodeError> {
        if let Some((_, path)) = self.seen.get(&obj.addr()) {
            return Ok(tagged(tags::DUPLICATE, json!(path)));
        }
        if self.encoder.denied.iter().any(|denied| denied.ptr_eq(obj)) {
            return Err(EncodeError::Intrinsic(format!("{obj:?}")));
        }
        self.seen.insert(obj.addr(), (obj.clone(), self.path.clone()));

        // Snapshot so no lock is held while descending
        let contents = obj.read().clone();
        match contents {
            Container::Object(props) => {
                if props.keys().any(|key| tags::is_tag(key)) {
                    let inner = self.child(tags::OBJECT, |pass| pass.props(&props))?;
                    Ok(tagged(tags::OBJECT, inner))
                } else {
                    self.props(&props)
                }
            }
            Container::Array(items) => {
                if items.iter().all(Option::is_some) {
                    let mut out = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().flatten().enumerate() {
                        out.push(self.child(i.to_string(), |pass| pass.value(item))?);
                    }
                    Ok(Json::Array(out))
                } else {
                    let sparse = self.child(tags::SPARSE_ARRAY, |pass| {
                        let mut out = Map::new();
                        for (i, item) in items.iter().enumerate() {
                            if let Some(item) = item {
                                let key = i.to_string();
                                let encoded = pass.child(key.clone(), |pass| pass.value(item))?;
                                out.insert(key, encoded);
                            }
                        }
                        Ok(Json::Object(out))
                    })?;
                    Ok(tagged(tags::SPARSE_ARRAY, sparse))
                }
            }
            Container::Set { items, props } => {
                let mut out = Map::new();
                let list = self.child(tags::SET, |pass| pass.list(&items))?;
                out.insert(tags::SET.to_string(), list);
                if !props.is_empty() {
                    let extra = self.child(tags::PROPS, |pass| pass.props(&props))?;
                    out.insert(tags::PROPS.to_string(), extra);
                }
                Ok(Json::Object(out))
            }
            Container::Map { entries, props } => {
                let mut out = Map::new();
                let list = self.child(tags::MAP, |pass| {
                    let mut list = Vec::with_capacity(entries.len());
                    for (i, (key, value)) in entries.iter().enumerate() {
                        list.push(pass.child(i.to_string(), |pass| {
                            let key = pass.child("0", |pass| pass.value(key))?;
                            let value = pass.child("1", |pass| pass.value(value))?;
                            Ok(Json::Array(vec![key, value]))
                        })?);
                    }
                    Ok(Json::Array(list))
                })?;
                out.insert(tags::MAP.to_string(), list);
                if !props.is_empty() {
                    let extra = self.child(tags::PROPS, |pass| pass.props(&props))?;
                    out.insert(tags::PROPS.to_string(), extra);
                }
                Ok(Json::Object(out))
            }
            Container::Bytes(bytes) => Ok(tagged(tags::BYTES, Json::String(STANDARD.encode(bytes)))),
            Container::Arbitrary { ty, props } => {
                let mut out = Map::new();
                let inner = self.child(tags::ARBITRARY, |pass| pass.props(&props))?;
                out.insert(tags::ARBITRARY.to_string(), inner);
                let ty = self.child(tags::TYPE, |pass| pass.value(&Value::Creation(ty)))?;
                out.insert(tags::TYPE.to_string(), ty);
                Ok(Json::Object(out))
            }
        }
    }

    fn props(&mut self, props: &Props) -> Result<Json, EncodeError> {
        let mut out = Map::new();
        for (key, value) in props {
            let encoded = self.child(key.clone(), |pass| pass.value(value))?;
            out.insert(key.clone(), encoded);
        }
        Ok(Json::Object(out))
    }

    fn list(&mut self, items: &[Value]) -> Result<Json, EncodeError> {
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            out.push(self.child(i.to_string(), |pass| pass.value(item))?);
        }
        Ok(Json::Array(out))
    }

    fn child<F>(&mut self, segment: impl Into<String>, f: F) -> Result<Json, EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<Json, EncodeError>,
    {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }
}

fn number(n: f64) -> Result<Json, EncodeError> {
    if n.is_nan() {
        return Ok(flag(tags::NAN));
    }
    if n == f64::INFINITY {
        return Ok(flag(tags::INFINITY));
    }
    if n == f64::NEG_INFINITY {
        return Ok(flag(tags::NEG_INFINITY));
    }
    if n == 0.0 && n.is_sign_negative() {
        return Ok(flag(tags::NEG_ZERO));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Json::from(n as i64));
    }
    Number::from_f64(n)
        .map(Json::Number)
        .ok_or(EncodeError::InvalidNumber(n))
}

fn flag(tag: &str) -> Json {
    tagged(tag, json!(1))
}

fn tagged(tag: &str, body: Json) -> Json {
    let mut out = Map::new();
    out.insert(tag.to_string(), body);
    Json::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::FnResolver;
    use crate::value::{CreationKind, CreationRef, SlotId};

    #[test]
    fn test_special_numbers_get_one_tag() {
        let cases = [
            (f64::NAN, "$nan"),
            (f64::INFINITY, "$inf"),
            (f64::NEG_INFINITY, "$ninf"),
            (-0.0, "$n0"),
        ];
        for (n, tag) in cases {
            let encoded = encode(&Value::Number(n), None).unwrap();
            let node = encoded.as_object().unwrap();
            assert_eq!(node.len(), 1);
            assert_eq!(node.get(tag), Some(&json!(1)));
        }
    }

    #[test]
    fn test_plain_numbers_pass_through() {
        assert_eq!(encode(&Value::Number(0.0), None).unwrap(), json!(0));
        assert_eq!(encode(&Value::Number(42.0), None).unwrap(), json!(42));
        assert_eq!(encode(&Value::Number(1.5), None).unwrap(), json!(1.5));
        assert_eq!(encode(&Value::Undefined, None).unwrap(), json!({"$und": 1}));
    }

    #[test]
    fn test_self_reference_emits_dup() {
        let a = ObjectRef::object();
        a.write().set("self", Value::Object(a.clone())).unwrap();

        let encoded = encode(&Value::Object(a), None).unwrap();
        assert_eq!(encoded, json!({"self": {"$dup": []}}));
    }

    #[test]
    fn test_shared_object_records_first_path() {
        let shared = Value::object([("n", Value::from(1))]);
        let root = Value::object([("a", shared.clone()), ("b", shared)]);

        let encoded = encode(&root, None).unwrap();
        assert_eq!(encoded, json!({"a": {"n": 1}, "b": {"$dup": ["a"]}}));
    }

    #[test]
    fn test_tag_like_keys_are_wrapped() {
        let value = Value::object([("$jig", Value::from("not a ref"))]);
        let encoded = encode(&value, None).unwrap();
        assert_eq!(encoded, json!({"$obj": {"$jig": "not a ref"}}));
    }

    #[test]
    fn test_sparse_arrays() {
        let arr = ObjectRef::array(vec![Value::from(1)]);
        arr.write().set("3", Value::from("x")).unwrap();
        let encoded = encode(&Value::Object(arr), None).unwrap();
        assert_eq!(encoded, json!({"$arr": {"0": 1, "3": "x"}}));
    }

    #[test]
    fn test_collections_and_bytes() {
        let set = ObjectRef::set();
        set.write().insert_item(Value::from(1)).unwrap();
        set.write().set("label", Value::from("s")).unwrap();
        let encoded = encode(&Value::Object(set), None).unwrap();
        assert_eq!(encoded, json!({"$set": [1], "props": {"label": "s"}}));

        let map = ObjectRef::map();
        map.write().insert_entry(Value::from("k"), Value::Null).unwrap();
        let encoded = encode(&Value::Object(map), None).unwrap();
        assert_eq!(encoded, json!({"$map": [["k", null]]}));

        let encoded = encode(&Value::bytes(vec![1, 2, 3]), None).unwrap();
        assert_eq!(encoded, json!({"$ui8a": "AQID"}));
    }

    #[test]
    fn test_creations_need_a_resolver() {
        let code = CreationRef::new(CreationKind::Code, SlotId(7));
        let err = encode(&Value::Creation(code), None).unwrap_err();
        assert!(matches!(err, EncodeError::NoResolver(_)));

        let resolver = FnResolver::new(|c: &CreationRef| Some(json!(format!("loc-{}", c.slot().0))), |_| None);
        let encoded = encode(&Value::Creation(code), Some(&resolver)).unwrap();
        assert_eq!(encoded, json!({"$jig": "loc-7"}));

        let instance = Value::Object(ObjectRef::arbitrary(code, Props::new()));
        let encoded = encode(&instance, Some(&resolver)).unwrap();
        assert_eq!(encoded, json!({"$arb": {}, "T": {"$jig": "loc-7"}}));
    }

    #[test]
    fn test_unsupported_values_fail() {
        let err = encode(&Value::Symbol("iterator".into()), None).unwrap_err();
        assert!(matches!(err, EncodeError::Symbol(_)));

        let err = encode(&Value::Intrinsic("Math".into()), None).unwrap_err();
        assert!(matches!(err, EncodeError::Intrinsic(_)));

        let global = ObjectRef::object();
        let value = Value::object([("g", Value::Object(global.clone()))]);
        let err = Encoder::new().deny(global).encode(&value).unwrap_err();
        assert!(matches!(err, EncodeError::Intrinsic(_)));
    }

    #[test]
    fn test_equivalent_graphs_encode_identically() {
        let first = ObjectRef::object();
        first.write().set("b", Value::from(2)).unwrap();
        first.write().set("a", Value::from(1)).unwrap();

        let second = ObjectRef::object();
        second.write().set("a", Value::from(1)).unwrap();
        second.write().set("b", Value::from(2)).unwrap();

        let one = serde_json::to_string(&encode(&Value::Object(first), None).unwrap()).unwrap();
        let two = serde_json::to_string(&encode(&Value::Object(second), None).unwrap()).unwrap();
        assert_eq!(one, two);
        assert_eq!(one, r#"{"a":1,"b":2}"#);
    }
}
