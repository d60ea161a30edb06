//! Cached state records, as stored by a state store.

use jig_codec::CreationKind;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{KernelError, Result};

/// Current state format version.
pub const STATE_VERSION: &str = "04";

/// Serialized state of one creation.
///
/// `kind` stays a string so an unrecognized kind surfaces as
/// [`KernelError::UnknownKind`] rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedState {
    pub kind: String,
    pub version: String,
    /// Type source, code only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// `{"$jig": <location>}` of the owning code, jigs and berries only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cls: Option<Json>,
    /// Codec-encoded property map
    pub props: Json,
}

impl CachedState {
    pub fn new(kind: CreationKind, props: Json) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            version: STATE_VERSION.to_string(),
            src: None,
            cls: None,
            props,
        }
    }

    /// Builder: type source.
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    /// Builder: owning code, given by location.
    pub fn with_cls(mut self, location: impl Into<String>) -> Self {
        self.cls = Some(serde_json::json!({ "$jig": location.into() }));
        self
    }

    pub fn creation_kind(&self) -> Result<CreationKind> {
        CreationKind::parse(&self.kind).ok_or_else(|| KernelError::UnknownKind(self.kind.clone()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_json_shape() {
        let state = CachedState::new(CreationKind::Jig, json!({"n": 1})).with_cls("aa_o1");
        let text = state.to_json().unwrap();
        let value: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"kind": "jig", "version": "04", "cls": {"$jig": "aa_o1"}, "props": {"n": 1}})
        );
        assert_eq!(CachedState::from_json(&text).unwrap(), state);
    }

    #[test]
    fn test_unknown_kind() {
        let state = CachedState::from_json(r#"{"kind":"gizmo","version":"04","props":{}}"#).unwrap();
        assert_eq!(state.creation_kind(), Err(KernelError::UnknownKind("gizmo".into())));
    }
}
