//! Policy-enforcing wrapper around a live container.
//!
//! Every structural operation goes through a [`Membrane`] together with the
//! [`Caller`] performing it. The membrane consults its [`Rules`] before it
//! touches the inner container, records mutations made inside methods, and
//! wraps any container it hands out in a narrower child membrane.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use jig_codec::{Container, CreationRef, ObjectRef, Value, ValueError};

use crate::error::{MembraneError, Result};
use crate::invocation::{Action, Admin, Caller, Invocation, MethodScope, Outcome};
use crate::rules::{MethodSet, Rules};
use crate::words::{is_binding, is_private, is_reserved};

/// Usability flag shared by a creation's membrane and every child membrane
/// derived from it.
#[derive(Debug, Clone, Default)]
pub struct Health(Arc<RwLock<Option<String>>>);

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark unusable. The first reason sticks.
    pub fn poison(&self, reason: impl Into<String>) {
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason.into());
        }
    }

    pub fn reason(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_poisoned(&self) -> bool {
        self.reason().is_some()
    }
}

/// A value read through a membrane.
#[derive(Debug, Clone)]
pub enum Property {
    /// Primitive or creation reference
    Value(Value),
    /// Container, wrapped under child rules
    Member(Membrane),
}

impl Property {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Property::Value(value) => Some(value),
            Property::Member(_) => None,
        }
    }

    pub fn member(&self) -> Option<&Membrane> {
        match self {
            Property::Member(membrane) => Some(membrane),
            Property::Value(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Property::Value(value) => Some(value),
            Property::Member(_) => None,
        }
    }
}

/// Where a copy-on-write child hangs off its parent.
struct Link {
    parent: Membrane,
    key: String,
}

/// Identity of a child container → (container kept alive, private copy)
type Relinked = HashMap<usize, (ObjectRef, ObjectRef)>;

/// Rules-enforcing handle to a container. Clones share the same target.
#[derive(Clone)]
pub struct Membrane {
    target: Arc<RwLock<ObjectRef>>,
    rules: Arc<Rules>,
    health: Health,
    copied: Arc<AtomicBool>,
    link: Option<Arc<Link>>,
    relinked: Arc<Mutex<Relinked>>,
}

impl Membrane {
    pub fn new(target: ObjectRef, rules: Rules) -> Self {
        Self::with_health(target, rules, Health::new())
    }

    pub fn with_health(target: ObjectRef, rules: Rules, health: Health) -> Self {
        Self {
            target: Arc::new(RwLock::new(target)),
            rules: Arc::new(rules),
            health,
            copied: Arc::new(AtomicBool::new(false)),
            link: None,
            relinked: Arc::default(),
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn health(&self) -> &Health {
        &self.health
    }

    pub fn poison(&self, reason: impl Into<String>) {
        self.health.poison(reason);
    }

    pub fn is_usable(&self) -> bool {
        !self.health.is_poisoned()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn get(&self, caller: Caller<'_>, key: &str) -> Result<Option<Property>> {
        self.check_usable(caller)?;
        let bypass = self.bypass(caller);
        if !bypass && self.rules.private() && is_private(key) && !self.authorized(caller) {
            return Err(MembraneError::Privacy(key.to_string()));
        }

        let value = self.object().read().get(key);
        if !bypass
            && self.rules.bindings()
            && is_binding(key)
            && value.as_ref().map_or(true, Value::is_undefined)
        {
            return Err(MembraneError::Bindings(format!("{key} is not bound yet")));
        }
        Ok(value.map(|value| match value {
            Value::Object(obj) if self.rules.cow_props() => Property::Member(self.linked_child(key, obj, caller)),
            other => self.wrap(other, caller, false),
        }))
    }

    /// Private keys read as absent from outside the owner's methods.
    pub fn has(&self, caller: Caller<'_>, key: &str) -> Result<bool> {
        self.check_usable(caller)?;
        if self.hides_private(caller) && is_private(key) {
            return Ok(false);
        }
        Ok(self.object().read().has(key))
    }

    pub fn keys(&self, caller: Caller<'_>) -> Result<Vec<String>> {
        self.check_usable(caller)?;
        let hide = self.hides_private(caller);
        let keys = self.object().read().keys();
        Ok(keys.into_iter().filter(|key| !(hide && is_private(key))).collect())
    }

    pub fn type_name(&self, caller: Caller<'_>) -> Result<&'static str> {
        self.check_usable(caller)?;
        Ok(self.object().read().type_name())
    }

    /// The code creation this container is an instance of, if any.
    pub fn class(&self, caller: Caller<'_>) -> Result<Option<CreationRef>> {
        self.check_usable(caller)?;
        match &*self.object().read() {
            Container::Arbitrary { ty, .. } => Ok(Some(*ty)),
            _ => Ok(None),
        }
    }

    /// Elements of a set (or present elements of a sequence).
    pub fn items(&self, caller: Caller<'_>) -> Result<Vec<Property>> {
        self.check_usable(caller)?;
        let items = self.object().read().items()?;
        Ok(items.into_iter().map(|item| self.wrap_element(item, caller)).collect())
    }

    pub fn entries(&self, caller: Caller<'_>) -> Result<Vec<(Property, Property)>> {
        self.check_usable(caller)?;
        let entries = self.object().read().entries()?;
        Ok(entries
            .into_iter()
            .map(|(key, value)| (self.wrap_element(key, caller), self.wrap_element(value, caller)))
            .collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub fn set(&self, caller: Caller<'_>, key: &str, value: Value) -> Result<()> {
        self.check_write(caller, Some(key), &format!("set {key}"))?;
        let value = self.adopt(caller, value);
        self.prepare_write();
        self.object().write().set(key, value.clone())?;
        self.record(caller, |target| Action::Set {
            target,
            key: key.to_string(),
            value: value.deep_clone(),
        });
        Ok(())
    }

    /// Like `set`, but the key must not exist yet.
    pub fn define(&self, caller: Caller<'_>, key: &str, value: Value) -> Result<()> {
        self.check_write(caller, Some(key), &format!("define {key}"))?;
        if self.object().read().has(key) {
            return Err(MembraneError::AlreadyDefined(key.to_string()));
        }
        let value = self.adopt(caller, value);
        self.prepare_write();
        self.object().write().set(key, value.clone())?;
        self.record(caller, |target| Action::Set {
            target,
            key: key.to_string(),
            value: value.deep_clone(),
        });
        Ok(())
    }

    /// Remove a key. Returns whether anything was removed.
    pub fn delete(&self, caller: Caller<'_>, key: &str) -> Result<bool> {
        self.check_write(caller, Some(key), &format!("delete {key}"))?;
        self.prepare_write();
        let removed = self.object().write().remove(key)?.is_some();
        if removed {
            self.record(caller, |target| Action::Delete {
                target,
                key: key.to_string(),
            });
        }
        Ok(removed)
    }

    /// Add an element to a set. Returns false if it was already present.
    pub fn insert_item(&self, caller: Caller<'_>, value: Value) -> Result<bool> {
        self.check_write(caller, None, "add to a set")?;
        let value = self.adopt(caller, value);
        self.prepare_write();
        let added = self.object().write().insert_item(value.clone())?;
        if added {
            self.record(caller, |target| Action::Insert {
                target,
                value: value.deep_clone(),
            });
        }
        Ok(added)
    }

    pub fn insert_entry(&self, caller: Caller<'_>, key: Value, value: Value) -> Result<()> {
        self.check_write(caller, None, "add to a map")?;
        let (key, value) = (self.adopt(caller, key), self.adopt(caller, value));
        self.prepare_write();
        self.object().write().insert_entry(key.clone(), value.clone())?;
        self.record(caller, |target| Action::InsertEntry {
            target,
            key: key.deep_clone(),
            value: value.deep_clone(),
        });
        Ok(())
    }

    /// Change the class of an instance. Only admin callers may do this.
    pub fn set_class(&self, caller: Caller<'_>, class: CreationRef) -> Result<()> {
        self.check_usable(caller)?;
        if !self.bypass(caller) {
            return Err(MembraneError::Immutable("change the class".to_string()));
        }
        let obj = self.object();
        let mut container = obj.write();
        let props = match &mut *container {
            Container::Object(props) | Container::Arbitrary { props, .. } => std::mem::take(props),
            other => {
                return Err(ValueError::WrongContainer {
                    expected: "Object",
                    found: other.type_name(),
                }
                .into())
            }
        };
        *container = Container::Arbitrary { ty: class, props };
        Ok(())
    }

    // =========================================================================
    // Admin
    // =========================================================================

    /// Swap the whole contents in one step.
    pub fn replace_contents(&self, _admin: &Admin, contents: Container) -> Result<()> {
        self.require_admin("replace contents")?;
        *self.object().write() = contents;
        Ok(())
    }

    /// Copy of the current contents. Nested containers stay shared.
    pub fn snapshot(&self, _admin: &Admin) -> Result<Container> {
        self.require_admin("snapshot")?;
        Ok(self.object().read().clone())
    }

    // =========================================================================
    // Methods
    // =========================================================================

    /// Run `body` as method `method` of the owning creation.
    ///
    /// Mutations performed through `scope.caller()` are authorized and
    /// recorded. When the creation has bindings and anything changed, its
    /// nonce goes up by one.
    pub fn invoke<F>(&self, caller: Caller<'_>, method: &str, body: F) -> Result<Outcome>
    where
        F: FnOnce(MethodScope<'_>) -> Result<Value>,
    {
        self.check_usable(caller)?;
        let target = match (self.rules.methods(), self.rules.owner()) {
            (MethodSet::None, _) | (_, None) => return Err(MembraneError::NotCallable(method.to_string())),
            (_, Some(owner)) => owner,
        };
        if is_reserved(method) {
            return Err(MembraneError::Reserved(method.to_string()));
        }
        if self.rules.is_disabled(method) {
            return Err(MembraneError::DisabledMethod(method.to_string()));
        }

        let invocation = Invocation::new(target, method);
        let value = body(MethodScope {
            this: self,
            invocation: &invocation,
            thisless: self.rules.thisless(),
        })?;
        let value = self.wrap(value, Caller::Method(&invocation), true);

        if self.rules.bindings() && invocation.has_updates() {
            self.bump_nonce()?;
        }
        let actions = invocation.into_actions();
        tracing::trace!(creation = %target, method, actions = actions.len(), "Method invoked");
        Ok(Outcome { value, actions })
    }

    // =========================================================================
    // Policy
    // =========================================================================

    fn object(&self) -> ObjectRef {
        self.target.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn bypass(&self, caller: Caller<'_>) -> bool {
        self.rules.admin() && matches!(caller, Caller::Admin(_))
    }

    /// Whether the caller is one of the owning creation's own methods.
    fn authorized(&self, caller: Caller<'_>) -> bool {
        match caller {
            Caller::Admin(_) => self.rules.admin(),
            Caller::Method(invocation) => self.rules.owner() == Some(invocation.target()),
            Caller::External => false,
        }
    }

    fn hides_private(&self, caller: Caller<'_>) -> bool {
        !self.bypass(caller) && self.rules.private() && !self.authorized(caller)
    }

    fn check_usable(&self, caller: Caller<'_>) -> Result<()> {
        if !self.rules.errors() || self.bypass(caller) {
            return Ok(());
        }
        match self.health.reason() {
            Some(reason) => Err(MembraneError::Unusable(reason)),
            None => Ok(()),
        }
    }

    fn check_write(&self, caller: Caller<'_>, key: Option<&str>, op: &str) -> Result<()> {
        self.check_usable(caller)?;
        if self.bypass(caller) {
            return Ok(());
        }
        if self.rules.immutable() {
            return Err(MembraneError::Immutable(op.to_string()));
        }
        let authorized = self.authorized(caller);
        if let Some(key) = key {
            if self.rules.bindings() && is_binding(key) && !authorized {
                return Err(MembraneError::Bindings(format!("cannot {op} outside of a method")));
            }
            if self.rules.reserved() && is_reserved(key) {
                return Err(MembraneError::Reserved(key.to_string()));
            }
            if self.rules.private() && is_private(key) && !authorized {
                return Err(MembraneError::Privacy(key.to_string()));
            }
        }
        if self.rules.recorded() && !authorized {
            return Err(MembraneError::OutsideMethod(op.to_string()));
        }
        Ok(())
    }

    fn require_admin(&self, op: &str) -> Result<()> {
        if self.rules.admin() {
            Ok(())
        } else {
            Err(MembraneError::Immutable(op.to_string()))
        }
    }

    /// Containers written from outside the owner's methods are copied, so
    /// the writer keeps no handle into this creation's state.
    fn adopt(&self, caller: Caller<'_>, value: Value) -> Value {
        match caller {
            Caller::Admin(_) => value,
            Caller::Method(invocation) if self.rules.owner() == Some(invocation.target()) => value,
            _ => value.deep_clone(),
        }
    }

    /// Copy-on-write: the first write swaps in a private copy. A linked
    /// child copies its parent first and is re-linked into the parent's copy.
    fn prepare_write(&self) {
        if !self.rules.is_cow() || self.copied.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut target = self.target.write().unwrap_or_else(PoisonError::into_inner);
        *target = match &self.link {
            Some(link) => link.parent.relink(&link.key, &target),
            None => target.shallow_clone(),
        };
    }

    /// Private copy of `original`, the container under `key`, stored into
    /// this membrane's own copy. Children reached twice share one copy.
    fn relink(&self, key: &str, original: &ObjectRef) -> ObjectRef {
        self.prepare_write();
        let copy = {
            let mut relinked = self.relinked.lock().unwrap_or_else(PoisonError::into_inner);
            match relinked.get(&original.addr()) {
                Some((_, copy)) => copy.clone(),
                None => {
                    let copy = original.shallow_clone();
                    relinked.insert(original.addr(), (original.clone(), copy.clone()));
                    relinked.insert(copy.addr(), (copy.clone(), copy.clone()));
                    copy
                }
            }
        };

        let obj = self.object();
        let mut contents = obj.write();
        // A key overwritten since the child was read keeps its new value
        let linked = matches!(
            contents.get(key),
            Some(Value::Object(current)) if current.ptr_eq(original) || current.ptr_eq(&copy)
        );
        if linked && contents.set(key, Value::Object(copy.clone())).is_err() {
            tracing::warn!(key, "Copy could not be linked into its parent");
        }
        copy
    }

    fn record(&self, caller: Caller<'_>, action: impl FnOnce(CreationRef) -> Action) {
        if !self.rules.recorded() {
            return;
        }
        if let (Caller::Method(invocation), Some(owner)) = (caller, self.rules.owner()) {
            invocation.record(action(owner));
        }
    }

    fn bump_nonce(&self) -> Result<()> {
        let obj = self.object();
        let mut container = obj.write();
        let nonce = container.get("nonce").and_then(|n| n.as_f64()).unwrap_or(0.0);
        container.set("nonce", Value::Number(nonce + 1.0))?;
        Ok(())
    }

    fn wrap(&self, value: Value, caller: Caller<'_>, method: bool) -> Property {
        match value {
            Value::Object(obj) => Property::Member(self.child(obj, caller, method)),
            other => Property::Value(other),
        }
    }

    fn child(&self, obj: ObjectRef, caller: Caller<'_>, method: bool) -> Membrane {
        // Ownerless membranes belong to whoever holds them
        let owned = self.authorized(caller) || self.rules.owner().is_none();
        let rules = Rules::child_property(&self.rules, self.rules.owner(), method, owned);
        Membrane::with_health(obj, rules, self.health.clone())
    }

    /// Child under `key` whose writes copy this container too.
    fn linked_child(&self, key: &str, obj: ObjectRef, caller: Caller<'_>) -> Membrane {
        let mut child = self.child(obj, caller, false);
        child.link = Some(Arc::new(Link {
            parent: self.clone(),
            key: key.to_string(),
        }));
        child
    }

    /// Set elements and map entries have no key to re-link under, so under
    /// copy-on-write they are handed out read-only.
    fn wrap_element(&self, value: Value, caller: Caller<'_>) -> Property {
        match value {
            Value::Object(obj) if self.rules.cow_props() => {
                let mut child = self.child(obj, caller, false);
                child.rules = Arc::new(Rules::clone(&child.rules).frozen());
                Property::Member(child)
            }
            other => self.wrap(other, caller, false),
        }
    }
}

impl fmt::Debug for Membrane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membrane")
            .field("target", &self.object())
            .field("rules", &self.rules)
            .field("health", &self.health.reason())
            .finish()
    }
}
