//! Method implementations behind deployed code.
//!
//! A code creation carries its type source; the host registers a [`Class`]
//! for that source so the kernel can run the methods the code declares.

use std::sync::Arc;

use dashmap::DashMap;
use jig_codec::Value;
use jig_membrane::{is_reserved, MembraneError, MethodScope};

use crate::error::{KernelError, Result};

/// Methods of one code source.
pub trait Class: Send + Sync {
    /// Declared method names.
    fn methods(&self) -> Vec<String>;

    /// Run `method`. Mutations go through `scope.this()` with
    /// `scope.caller()`.
    fn call(&self, scope: MethodScope<'_>, method: &str, args: &[Value]) -> std::result::Result<Value, MembraneError>;
}

/// Classes keyed by type source.
#[derive(Default)]
pub struct ClassRegistry {
    classes: DashMap<String, Arc<dyn Class>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the methods behind `src`. Reserved method names are
    /// rejected, as they would be at deploy time.
    pub fn register(&self, src: impl Into<String>, class: Arc<dyn Class>) -> Result<()> {
        if let Some(reserved) = class.methods().into_iter().find(|method| is_reserved(method)) {
            return Err(KernelError::Membrane(MembraneError::Reserved(reserved)));
        }
        self.classes.insert(src.into(), class);
        Ok(())
    }

    pub fn get(&self, src: &str) -> Option<Arc<dyn Class>> {
        self.classes.get(src).map(|class| class.value().clone())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(Vec<&'static str>);

    impl Class for Named {
        fn methods(&self) -> Vec<String> {
            self.0.iter().map(|m| m.to_string()).collect()
        }

        fn call(&self, _: MethodScope<'_>, _: &str, _: &[Value]) -> std::result::Result<Value, MembraneError> {
            Ok(Value::Undefined)
        }
    }

    #[test]
    fn test_reserved_method_names_rejected() {
        let registry = ClassRegistry::new();
        registry.register("class A {}", Arc::new(Named(vec!["send"]))).unwrap();
        assert!(registry.get("class A {}").is_some());

        let err = registry
            .register("class B {}", Arc::new(Named(vec!["send", "destroy"])))
            .unwrap_err();
        assert_eq!(err, KernelError::Membrane(MembraneError::Reserved("destroy".into())));
        assert!(registry.get("class B {}").is_none());
        assert_eq!(registry.len(), 1);
    }
}
