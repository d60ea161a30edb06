//! Property names with runtime meaning.

/// Names the runtime defines itself; creations cannot declare them.
pub const RESERVED_WORDS: [&str; 7] = ["auth", "deps", "destroy", "presets", "sync", "toString", "upgrade"];

/// Reserved words that code creations still carry as plain properties.
pub const CODE_PROPS: [&str; 2] = ["deps", "presets"];

/// Identity fields of code and jigs.
pub const BINDINGS: [&str; 5] = ["location", "origin", "nonce", "owner", "satoshis"];

/// Identity fields of berries.
pub const BERRY_BINDINGS: [&str; 2] = ["location", "origin"];

/// Leading character marking a property private to the creation's methods.
pub const PRIVATE_PREFIX: char = '_';

pub fn is_reserved(key: &str) -> bool {
    RESERVED_WORDS.contains(&key)
}

pub fn is_binding(key: &str) -> bool {
    BINDINGS.contains(&key)
}

pub fn is_private(key: &str) -> bool {
    key.starts_with(PRIVATE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_classes() {
        assert!(is_reserved("sync"));
        assert!(is_reserved("toString"));
        assert!(!is_reserved("tostring"));
        assert!(is_binding("nonce"));
        assert!(!is_binding("name"));
        assert!(is_private("_secret"));
        assert!(!is_private("secret_"));
        assert!(CODE_PROPS.iter().all(|word| is_reserved(word)));
    }
}
