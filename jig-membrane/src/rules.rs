//! Policy records configuring a membrane.
//!
//! A `Rules` value is fixed once built. The named constructors cover every
//! combination the runtime needs; `child_property` narrows a parent's rules
//! for containers reached through it.

use jig_codec::CreationRef;

/// Which methods a membrane exposes through `invoke`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MethodSet {
    /// Not callable
    #[default]
    None,
    /// Static methods of a code creation
    Code,
    /// Instance methods of a jig
    Jig,
}

/// Immutable policy record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rules {
    admin: bool,
    errors: bool,
    bindings: bool,
    reserved: bool,
    methods: MethodSet,
    private: bool,
    immutable: bool,
    recordable: bool,
    replayable: bool,
    thisless: bool,
    cow: bool,
    cow_props: bool,
    disabled_methods: Vec<String>,
    owner: Option<CreationRef>,
}

impl Rules {
    /// Rules for a deployed code creation.
    pub fn code() -> Self {
        Self {
            admin: true,
            errors: true,
            bindings: true,
            reserved: true,
            methods: MethodSet::Code,
            private: true,
            recordable: true,
            replayable: true,
            ..Self::default()
        }
    }

    /// Rules for built-in code that never changes and has no instances to
    /// bind `this` to.
    pub fn static_code() -> Self {
        Self {
            admin: true,
            errors: true,
            bindings: true,
            methods: MethodSet::Code,
            immutable: true,
            thisless: true,
            ..Self::default()
        }
    }

    pub fn jig_instance() -> Self {
        Self {
            admin: true,
            errors: true,
            bindings: true,
            reserved: true,
            methods: MethodSet::Jig,
            private: true,
            recordable: true,
            replayable: true,
            ..Self::default()
        }
    }

    pub fn berry_instance() -> Self {
        Self {
            admin: true,
            errors: true,
            bindings: true,
            reserved: true,
            private: true,
            immutable: true,
            ..Self::default()
        }
    }

    /// Bare copy-on-write wrapper for inner containers handed across
    /// creations.
    pub fn cow() -> Self {
        Self {
            admin: true,
            cow: true,
            cow_props: true,
            ..Self::default()
        }
    }

    /// Rules for a container reached through a property of `parent`.
    ///
    /// `method` is set when the container came back from a method call and
    /// `owned` when the reader is one of the owner's own methods. Anything
    /// derived from an immutable parent stays immutable.
    pub fn child_property(parent: &Rules, owner: Option<CreationRef>, method: bool, owned: bool) -> Self {
        Self {
            admin: parent.admin,
            errors: parent.errors,
            bindings: false,
            reserved: false,
            methods: MethodSet::None,
            private: parent.private,
            immutable: parent.immutable || method || !owned,
            recordable: parent.recordable,
            replayable: parent.replayable,
            thisless: parent.thisless && method,
            cow: parent.cow_props,
            cow_props: parent.cow_props,
            disabled_methods: Vec::new(),
            owner: parent.owner.or(owner),
        }
    }

    /// Builder: refuse to run the named methods.
    pub fn with_disabled_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled_methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Builder: hide private keys from everyone but the owner.
    pub fn with_privacy(mut self) -> Self {
        self.private = true;
        self
    }

    /// Builder: refuse every write.
    pub fn frozen(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Builder: the creation whose methods count as authorized.
    pub fn with_owner(mut self, owner: CreationRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn admin(&self) -> bool {
        self.admin
    }

    pub fn errors(&self) -> bool {
        self.errors
    }

    pub fn bindings(&self) -> bool {
        self.bindings
    }

    pub fn reserved(&self) -> bool {
        self.reserved
    }

    pub fn methods(&self) -> MethodSet {
        self.methods
    }

    pub fn private(&self) -> bool {
        self.private
    }

    pub fn immutable(&self) -> bool {
        self.immutable
    }

    pub fn recordable(&self) -> bool {
        self.recordable
    }

    pub fn replayable(&self) -> bool {
        self.replayable
    }

    /// Whether mutations must happen inside an owner method.
    pub fn recorded(&self) -> bool {
        self.recordable || self.replayable
    }

    pub fn thisless(&self) -> bool {
        self.thisless
    }

    /// Whether the first write swaps in a private copy.
    pub fn is_cow(&self) -> bool {
        self.cow
    }

    pub fn cow_props(&self) -> bool {
        self.cow_props
    }

    pub fn disabled_methods(&self) -> &[String] {
        &self.disabled_methods
    }

    pub fn is_disabled(&self, method: &str) -> bool {
        self.disabled_methods.iter().any(|m| m == method)
    }

    pub fn owner(&self) -> Option<CreationRef> {
        self.owner
    }
}
