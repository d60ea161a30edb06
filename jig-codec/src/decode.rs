//! Wire form → live value graph.
//!
//! Mirrors the encoder's walk exactly: each container is registered under
//! its node path before its children are decoded, so `$dup` paths can point
//! at an ancestor that is still being filled in.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value as Json};
use std::collections::HashMap;

use crate::error::DecodeError;
use crate::resolver::ReferenceResolver;
use crate::tags;
use crate::value::{parse_index, Container, ObjectRef, Props, Value, MAX_ARRAY_HOLES};

/// Configurable decoder.
#[derive(Default)]
pub struct Decoder<'a> {
    resolver: Option<&'a dyn ReferenceResolver>,
}

impl<'a> Decoder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: resolve `$jig` identifiers through `resolver`.
    pub fn with_resolver(mut self, resolver: &'a dyn ReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn decode(&self, json: &Json) -> Result<Value, DecodeError> {
        let mut pass = DecodePass {
            decoder: self,
            seen: HashMap::new(),
            path: Vec::new(),
        };
        let value = pass.value(json)?;
        tracing::trace!(objects = pass.seen.len(), "Decoded value graph");
        Ok(value)
    }
}

/// Decode `json`, resolving references through `resolver` when given.
pub fn decode(json: &Json, resolver: Option<&dyn ReferenceResolver>) -> Result<Value, DecodeError> {
    let mut decoder = Decoder::new();
    if let Some(resolver) = resolver {
        decoder = decoder.with_resolver(resolver);
    }
    decoder.decode(json)
}

struct DecodePass<'d, 'a> {
    decoder: &'d Decoder<'a>,
    /// Node path → container decoded there
    seen: HashMap<Vec<String>, ObjectRef>,
    path: Vec<String>,
}

impl DecodePass<'_, '_> {
    fn value(&mut self, json: &Json) -> Result<Value, DecodeError> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => n
                .as_f64()
                .map(Value::Number)
                .ok_or_else(|| DecodeError::malformed("number", n.to_string())),
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(items) => {
                let obj = self.register(Container::Array(Vec::new()));
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(Some(self.child(i.to_string(), |pass| pass.value(item))?));
                }
                *obj.write() = Container::Array(out);
                Ok(Value::Object(obj))
            }
            Json::Object(node) => self.node(node),
        }
    }

    fn node(&mut self, node: &Map<String, Json>) -> Result<Value, DecodeError> {
        let tagged: Vec<(&String, &Json)> = node.iter().filter(|(key, _)| tags::is_tag(key)).collect();
        let (tag, body) = match tagged.as_slice() {
            [] => return self.plain(node, None),
            [(tag, body)] => (tag.as_str(), *body),
            _ => {
                let names = tagged.iter().map(|(tag, _)| tag.to_string()).collect();
                return Err(DecodeError::MultipleTags(names));
            }
        };

        match tag {
            tags::UNDEFINED | tags::NAN | tags::INFINITY | tags::NEG_INFINITY | tags::NEG_ZERO => {
                expect_keys(tag, node, &[])?;
                if body.as_u64() != Some(1) {
                    return Err(DecodeError::malformed(tag, "expected body 1"));
                }
                Ok(match tag {
                    tags::UNDEFINED => Value::Undefined,
                    tags::NAN => Value::Number(f64::NAN),
                    tags::INFINITY => Value::Number(f64::INFINITY),
                    tags::NEG_INFINITY => Value::Number(f64::NEG_INFINITY),
                    _ => Value::Number(-0.0),
                })
            }
            tags::OBJECT => {
                expect_keys(tag, node, &[])?;
                let inner = body
                    .as_object()
                    .ok_or_else(|| DecodeError::malformed(tag, "expected an object"))?;
                self.plain(inner, Some(tags::OBJECT))
            }
            tags::SPARSE_ARRAY => {
                expect_keys(tag, node, &[])?;
                self.sparse(body)
            }
            tags::SET => {
                expect_keys(tag, node, &[tags::PROPS])?;
                self.set(node, body)
            }
            tags::MAP => {
                expect_keys(tag, node, &[tags::PROPS])?;
                self.map(node, body)
            }
            tags::BYTES => {
                expect_keys(tag, node, &[])?;
                let text = body
                    .as_str()
                    .ok_or_else(|| DecodeError::malformed(tag, "expected a string"))?;
                let bytes = STANDARD
                    .decode(text)
                    .map_err(|e| DecodeError::malformed(tag, format!("invalid base64: {e}")))?;
                Ok(Value::Object(self.register(Container::Bytes(bytes))))
            }
            tags::REFERENCE => {
                expect_keys(tag, node, &[])?;
                self.reference(body)
            }
            tags::ARBITRARY => {
                expect_keys(tag, node, &[tags::TYPE])?;
                self.arbitrary(node, body)
            }
            tags::DUPLICATE => {
                expect_keys(tag, node, &[])?;
                let path = body
                    .as_array()
                    .and_then(|segments| {
                        segments
                            .iter()
                            .map(|s| s.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .ok_or_else(|| DecodeError::malformed(tag, "expected an array of strings"))?;
                self.seen
                    .get(&path)
                    .cloned()
                    .map(Value::Object)
                    .ok_or(DecodeError::UnresolvedDup(path))
            }
            other => Err(DecodeError::UnknownTag(other.to_string())),
        }
    }

    /// Plain keyed container, optionally wrapped in `$obj`.
    fn plain(&mut self, props: &Map<String, Json>, wrapper: Option<&'static str>) -> Result<Value, DecodeError> {
        let obj = self.register(Container::Object(Props::new()));
        let decoded = match wrapper {
            Some(segment) => self.child(segment, |pass| pass.props(props))?,
            None => self.props(props)?,
        };
        *obj.write() = Container::Object(decoded);
        Ok(Value::Object(obj))
    }

    fn sparse(&mut self, body: &Json) -> Result<Value, DecodeError> {
        let entries = body
            .as_object()
            .ok_or_else(|| DecodeError::malformed(tags::SPARSE_ARRAY, "expected an object"))?;
        let mut indexed = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let index = parse_index(key)
                .ok_or_else(|| DecodeError::malformed(tags::SPARSE_ARRAY, format!("`{key}` is not an index")))?;
            indexed.push((index, key, value));
        }
        // Numeric order, matching the encoder's walk
        indexed.sort_by_key(|(index, _, _)| *index);
        if let Some((last, _, _)) = indexed.last() {
            let holes = last + 1 - indexed.len();
            if holes > MAX_ARRAY_HOLES {
                return Err(DecodeError::malformed(
                    tags::SPARSE_ARRAY,
                    format!("length {} would hold {holes} holes", last + 1),
                ));
            }
        }

        let obj = self.register(Container::Array(Vec::new()));
        let mut items: Vec<Option<Value>> = Vec::new();
        self.child(tags::SPARSE_ARRAY, |pass| {
            for (index, key, value) in &indexed {
                let decoded = pass.child(key.to_string(), |pass| pass.value(value))?;
                if *index >= items.len() {
                    items.resize(index + 1, None);
                }
                items[*index] = Some(decoded);
            }
            Ok(())
        })?;
        *obj.write() = Container::Array(items);
        Ok(Value::Object(obj))
    }

    fn set(&mut self, node: &Map<String, Json>, body: &Json) -> Result<Value, DecodeError> {
        let list = body
            .as_array()
            .ok_or_else(|| DecodeError::malformed(tags::SET, "expected an array"))?;
        let obj = self.register(Container::Set {
            items: Vec::new(),
            props: Props::new(),
        });
        let items = self.child(tags::SET, |pass| {
            let mut items: Vec<Value> = Vec::with_capacity(list.len());
            for (i, item) in list.iter().enumerate() {
                let decoded = pass.child(i.to_string(), |pass| pass.value(item))?;
                if items.contains(&decoded) {
                    return Err(DecodeError::malformed(tags::SET, "duplicate element"));
                }
                items.push(decoded);
            }
            Ok(items)
        })?;
        let props = self.extra_props(tags::SET, node)?;
        *obj.write() = Container::Set { items, props };
        Ok(Value::Object(obj))
    }

    fn map(&mut self, node: &Map<String, Json>, body: &Json) -> Result<Value, DecodeError> {
        let list = body
            .as_array()
            .ok_or_else(|| DecodeError::malformed(tags::MAP, "expected an array"))?;
        let obj = self.register(Container::Map {
            entries: Vec::new(),
            props: Props::new(),
        });
        let entries = self.child(tags::MAP, |pass| {
            let mut entries: Vec<(Value, Value)> = Vec::with_capacity(list.len());
            for (i, entry) in list.iter().enumerate() {
                let pair = pass.child(i.to_string(), |pass| {
                    let pair = entry
                        .as_array()
                        .filter(|pair| pair.len() == 2)
                        .ok_or_else(|| DecodeError::malformed(tags::MAP, "entries must be [key, value] pairs"))?;
                    let key = pass.child("0", |pass| pass.value(&pair[0]))?;
                    let value = pass.child("1", |pass| pass.value(&pair[1]))?;
                    Ok((key, value))
                })?;
                if entries.iter().any(|(key, _)| key == &pair.0) {
                    return Err(DecodeError::malformed(tags::MAP, "duplicate key"));
                }
                entries.push(pair);
            }
            Ok(entries)
        })?;
        let props = self.extra_props(tags::MAP, node)?;
        *obj.write() = Container::Map { entries, props };
        Ok(Value::Object(obj))
    }

    fn reference(&mut self, body: &Json) -> Result<Value, DecodeError> {
        let resolver = self
            .decoder
            .resolver
            .ok_or_else(|| DecodeError::NoResolver(tags::REFERENCE.to_string()))?;
        resolver
            .decode_reference(body)
            .map(Value::Creation)
            .ok_or_else(|| DecodeError::UnresolvedReference(describe(body)))
    }

    fn arbitrary(&mut self, node: &Map<String, Json>, body: &Json) -> Result<Value, DecodeError> {
        if self.decoder.resolver.is_none() {
            return Err(DecodeError::NoResolver(tags::ARBITRARY.to_string()));
        }
        let props = body
            .as_object()
            .ok_or_else(|| DecodeError::malformed(tags::ARBITRARY, "expected an object"))?;
        let ty = node
            .get(tags::TYPE)
            .ok_or_else(|| DecodeError::malformed(tags::ARBITRARY, "missing type"))?;

        // Stand-in until the type is known; replaced below
        let obj = self.register(Container::Object(Props::new()));
        let props = self.child(tags::ARBITRARY, |pass| pass.props(props))?;
        let ty = self
            .child(tags::TYPE, |pass| pass.value(ty))?
            .as_creation()
            .ok_or_else(|| DecodeError::malformed(tags::ARBITRARY, "type is not a creation"))?;
        *obj.write() = Container::Arbitrary { ty, props };
        Ok(Value::Object(obj))
    }

    fn props(&mut self, props: &Map<String, Json>) -> Result<Props, DecodeError> {
        let mut out = Props::new();
        for (key, value) in props {
            let decoded = self.child(key.clone(), |pass| pass.value(value))?;
            out.insert(key.clone(), decoded);
        }
        Ok(out)
    }

    fn extra_props(&mut self, tag: &str, node: &Map<String, Json>) -> Result<Props, DecodeError> {
        match node.get(tags::PROPS) {
            None => Ok(Props::new()),
            Some(extra) => {
                let extra = extra
                    .as_object()
                    .ok_or_else(|| DecodeError::malformed(tag, "props must be an object"))?;
                self.child(tags::PROPS, |pass| pass.props(extra))
            }
        }
    }

    fn register(&mut self, container: Container) -> ObjectRef {
        let obj = ObjectRef::new(container);
        self.seen.insert(self.path.clone(), obj.clone());
        obj
    }

    fn child<T, F>(&mut self, segment: impl Into<String>, f: F) -> Result<T, DecodeError>
    where
        F: FnOnce(&mut Self) -> Result<T, DecodeError>,
    {
        self.path.push(segment.into());
        let result = f(self);
        self.path.pop();
        result
    }
}

fn expect_keys(tag: &str, node: &Map<String, Json>, allowed: &[&str]) -> Result<(), DecodeError> {
    for key in node.keys() {
        if key != tag && !allowed.contains(&key.as_str()) {
            return Err(DecodeError::malformed(tag, format!("unexpected key `{key}`")));
        }
    }
    Ok(())
}

fn describe(id: &Json) -> String {
    id.as_str().map(str::to_string).unwrap_or_else(|| id.to_string())
}
