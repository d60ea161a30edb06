//! Live value graph shared by the codec, the membrane and the kernel.
//!
//! Containers are identity-bearing: two [`ObjectRef`]s are the same object
//! only when they point at the same allocation. The codec relies on this to
//! reproduce shared and cyclic structure.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ValueError;

/// Own keyed properties of a container, kept in canonical key order.
pub type Props = BTreeMap<String, Value>;

// =============================================================================
// Creations
// =============================================================================

/// The closed set of creation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationKind {
    /// A deployed type definition
    Code,
    /// A mutable instance of deployed code
    Jig,
    /// An immutable object plucked from external data
    Berry,
}

impl CreationKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Jig => "jig",
            Self::Berry => "berry",
        }
    }

    /// Parse from the wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "jig" => Some(Self::Jig),
            "berry" => Some(Self::Berry),
            _ => None,
        }
    }
}

impl fmt::Display for CreationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a creation slot in the kernel arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

impl SlotId {
    /// Slot used by stand-in creations that never reach the arena.
    pub const PLACEHOLDER: SlotId = SlotId(0);
}

/// Handle to a creation. Identity is the slot; the kind travels with it so
/// category checks are plain matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CreationRef {
    kind: CreationKind,
    slot: SlotId,
}

impl CreationRef {
    pub fn new(kind: CreationKind, slot: SlotId) -> Self {
        Self { kind, slot }
    }

    /// A stand-in handle, used when only the shape of a graph matters.
    pub fn placeholder(kind: CreationKind) -> Self {
        Self::new(kind, SlotId::PLACEHOLDER)
    }

    pub fn kind(&self) -> CreationKind {
        self.kind
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn is_placeholder(&self) -> bool {
        self.slot == SlotId::PLACEHOLDER
    }
}

impl fmt::Display for CreationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.slot.0)
    }
}

// =============================================================================
// Values
// =============================================================================

/// A live value.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Unique symbol; never encodable
    Symbol(String),
    /// Host-provided intrinsic (global object, native function); never encodable
    Intrinsic(String),
    Object(ObjectRef),
    Creation(CreationRef),
}

impl Value {
    /// Build a plain keyed container.
    pub fn object<I, K>(entries: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let props = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Object(ObjectRef::from_props(props))
    }

    /// Build a dense sequence.
    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Object(ObjectRef::array(items.into_iter().collect()))
    }

    /// Build a binary buffer.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Value {
        Value::Object(ObjectRef::bytes(bytes.into()))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_creation(&self) -> Option<CreationRef> {
        match self {
            Value::Creation(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Containers are copied with [`ObjectRef::deep_clone`]; everything
    /// else is cloned as is.
    pub fn deep_clone(&self) -> Value {
        self.copy_into(&mut GraphCopy::default())
    }

    fn copy_into(&self, copies: &mut GraphCopy) -> Value {
        match self {
            Value::Object(obj) => Value::Object(obj.copy_into(copies)),
            other => other.clone(),
        }
    }

    /// Short name of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Intrinsic(_) => "intrinsic",
            Value::Object(_) => "object",
            Value::Creation(_) => "creation",
        }
    }
}

/// SameValueZero for primitives, identity for containers and creations.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Intrinsic(a), Value::Intrinsic(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Creation(a), Value::Creation(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<CreationRef> for Value {
    fn from(c: CreationRef) -> Self {
        Value::Creation(c)
    }
}

// =============================================================================
// Containers
// =============================================================================

/// Shared handle to a container.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Container>>);

impl ObjectRef {
    pub fn new(container: Container) -> Self {
        Self(Arc::new(RwLock::new(container)))
    }

    pub fn object() -> Self {
        Self::from_props(Props::new())
    }

    pub fn from_props(props: Props) -> Self {
        Self::new(Container::Object(props))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Self::new(Container::Array(items.into_iter().map(Some).collect()))
    }

    pub fn set() -> Self {
        Self::new(Container::Set {
            items: Vec::new(),
            props: Props::new(),
        })
    }

    pub fn map() -> Self {
        Self::new(Container::Map {
            entries: Vec::new(),
            props: Props::new(),
        })
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self::new(Container::Bytes(bytes))
    }

    pub fn arbitrary(ty: CreationRef, props: Props) -> Self {
        Self::new(Container::Arbitrary { ty, props })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Container> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Container> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether both handles name the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Identity key, stable while any handle is alive.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// A new object with a copy of this one's own contents. Nested
    /// containers stay shared.
    pub fn shallow_clone(&self) -> ObjectRef {
        let contents = self.read().clone();
        ObjectRef::new(contents)
    }

    /// A copy of the whole graph reachable from this object. Sharing and
    /// cycles inside the graph are reproduced; creations stay references.
    pub fn deep_clone(&self) -> ObjectRef {
        self.copy_into(&mut GraphCopy::default())
    }

    fn copy_into(&self, copies: &mut GraphCopy) -> ObjectRef {
        if let Some((_, copy)) = copies.get(&self.addr()) {
            return copy.clone();
        }
        let copy = ObjectRef::object();
        copies.insert(self.addr(), (self.clone(), copy.clone()));

        let contents = self.read().clone();
        let copied = contents.map_values(&mut |value: &Value| value.copy_into(copies));
        *copy.write() = copied;
        copy
    }
}

/// Identity → (original kept alive, its copy)
type GraphCopy = HashMap<usize, (ObjectRef, ObjectRef)>;

/// Deep-copy a list of values as one graph, so objects shared between them
/// stay shared in the copy.
pub fn deep_clone_all<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<Value> {
    let mut copies = GraphCopy::default();
    values.into_iter().map(|value| value.copy_into(&mut copies)).collect()
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.addr())
    }
}

/// The contents of an object.
#[derive(Debug, Clone)]
pub enum Container {
    /// Plain keyed container
    Object(Props),
    /// Ordered sequence; `None` marks a hole
    Array(Vec<Option<Value>>),
    /// Insertion-ordered unique elements plus extra own properties
    Set { items: Vec<Value>, props: Props },
    /// Insertion-ordered entries plus extra own properties
    Map {
        entries: Vec<(Value, Value)>,
        props: Props,
    },
    /// Binary buffer
    Bytes(Vec<u8>),
    /// Instance of a non-builtin type defined by a code creation
    Arbitrary { ty: CreationRef, props: Props },
}

impl Container {
    pub fn type_name(&self) -> &'static str {
        match self {
            Container::Object(_) => "Object",
            Container::Array(_) => "Array",
            Container::Set { .. } => "Set",
            Container::Map { .. } => "Map",
            Container::Bytes(_) => "Uint8Array",
            Container::Arbitrary { .. } => "Arbitrary",
        }
    }

    /// Own keyed properties, for the container types that have them.
    pub fn props(&self) -> Option<&Props> {
        match self {
            Container::Object(props)
            | Container::Set { props, .. }
            | Container::Map { props, .. }
            | Container::Arbitrary { props, .. } => Some(props),
            Container::Array(_) | Container::Bytes(_) => None,
        }
    }

    /// The same container with every held value passed through `f`.
    fn map_values(self, f: &mut impl FnMut(&Value) -> Value) -> Container {
        match self {
            Container::Object(props) => Container::Object(map_props(&props, f)),
            Container::Array(items) => {
                Container::Array(items.iter().map(|item| item.as_ref().map(&mut *f)).collect())
            }
            Container::Set { items, props } => Container::Set {
                items: items.iter().map(&mut *f).collect(),
                props: map_props(&props, f),
            },
            Container::Map { entries, props } => Container::Map {
                entries: entries.iter().map(|(k, v)| (f(k), f(v))).collect(),
                props: map_props(&props, f),
            },
            Container::Bytes(bytes) => Container::Bytes(bytes),
            Container::Arbitrary { ty, props } => Container::Arbitrary {
                ty,
                props: map_props(&props, f),
            },
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Container::Array(items) => parse_index(key).and_then(|i| items.get(i).cloned().flatten()),
            Container::Bytes(bytes) => parse_index(key)
                .and_then(|i| bytes.get(i))
                .map(|b| Value::Number(f64::from(*b))),
            _ => self.props().and_then(|props| props.get(key).cloned()),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Own keys in canonical order.
    pub fn keys(&self) -> Vec<String> {
        match self {
            Container::Array(items) => items
                .iter()
                .enumerate()
                .filter(|(_, item)| item.is_some())
                .map(|(i, _)| i.to_string())
                .collect(),
            Container::Bytes(bytes) => (0..bytes.len()).map(|i| i.to_string()).collect(),
            _ => self
                .props()
                .map(|props| props.keys().cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ValueError> {
        let container = self.type_name();
        match self {
            Container::Array(items) => {
                let index = parse_index(key).ok_or_else(|| ValueError::InvalidKey {
                    container,
                    key: key.to_string(),
                })?;
                if index >= items.len() {
                    let holes = items.iter().filter(|item| item.is_none()).count() + (index - items.len());
                    if holes > MAX_ARRAY_HOLES {
                        return Err(ValueError::TooSparse {
                            length: index + 1,
                            holes,
                        });
                    }
                    items.resize(index + 1, None);
                }
                items[index] = Some(value);
                Ok(())
            }
            Container::Bytes(bytes) => {
                let index = parse_index(key)
                    .filter(|i| *i < bytes.len())
                    .ok_or_else(|| ValueError::InvalidKey {
                        container,
                        key: key.to_string(),
                    })?;
                let byte = value
                    .as_f64()
                    .filter(|n| n.fract() == 0.0 && (0.0..=255.0).contains(n))
                    .ok_or_else(|| ValueError::InvalidValue {
                        container,
                        reason: "expected an integer between 0 and 255".to_string(),
                    })?;
                bytes[index] = byte as u8;
                Ok(())
            }
            Container::Object(props)
            | Container::Set { props, .. }
            | Container::Map { props, .. }
            | Container::Arbitrary { props, .. } => {
                props.insert(key.to_string(), value);
                Ok(())
            }
        }
    }

    /// Remove an own key. Array elements leave a hole behind.
    pub fn remove(&mut self, key: &str) -> Result<Option<Value>, ValueError> {
        let container = self.type_name();
        match self {
            Container::Array(items) => Ok(parse_index(key)
                .and_then(|i| items.get_mut(i))
                .and_then(Option::take)),
            Container::Bytes(_) => Err(ValueError::InvalidKey {
                container,
                key: key.to_string(),
            }),
            Container::Object(props)
            | Container::Set { props, .. }
            | Container::Map { props, .. }
            | Container::Arbitrary { props, .. } => Ok(props.remove(key)),
        }
    }

    /// Add an element to a set. Returns false if it was already present.
    pub fn insert_item(&mut self, value: Value) -> Result<bool, ValueError> {
        let found = self.type_name();
        match self {
            Container::Set { items, .. } => {
                if items.iter().any(|item| item == &value) {
                    Ok(false)
                } else {
                    items.push(value);
                    Ok(true)
                }
            }
            _ => Err(ValueError::WrongContainer {
                expected: "Set",
                found,
            }),
        }
    }

    /// Insert or replace a map entry, returning the previous value.
    pub fn insert_entry(&mut self, key: Value, value: Value) -> Result<Option<Value>, ValueError> {
        let found = self.type_name();
        match self {
            Container::Map { entries, .. } => {
                if let Some(entry) = entries.iter_mut().find(|(k, _)| k == &key) {
                    Ok(Some(std::mem::replace(&mut entry.1, value)))
                } else {
                    entries.push((key, value));
                    Ok(None)
                }
            }
            _ => Err(ValueError::WrongContainer {
                expected: "Map",
                found,
            }),
        }
    }

    /// Elements of a set, or present elements of an array.
    pub fn items(&self) -> Result<Vec<Value>, ValueError> {
        match self {
            Container::Set { items, .. } => Ok(items.clone()),
            Container::Array(items) => Ok(items.iter().flatten().cloned().collect()),
            other => Err(ValueError::WrongContainer {
                expected: "Set",
                found: other.type_name(),
            }),
        }
    }

    pub fn entries(&self) -> Result<Vec<(Value, Value)>, ValueError> {
        match self {
            Container::Map { entries, .. } => Ok(entries.clone()),
            other => Err(ValueError::WrongContainer {
                expected: "Map",
                found: other.type_name(),
            }),
        }
    }
}

fn map_props(props: &Props, f: &mut impl FnMut(&Value) -> Value) -> Props {
    props.iter().map(|(key, value)| (key.clone(), f(value))).collect()
}

/// Upper bound on sequence length; larger indices are rejected as keys.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

/// Most holes a sequence may carry. Holes are stored, so the length of a
/// sparse sequence is bounded by this plus its element count.
pub const MAX_ARRAY_HOLES: usize = 1 << 16;

/// Canonical array index: digits only, no leading zeros.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse().ok().filter(|index| *index < MAX_ARRAY_LENGTH)
}
