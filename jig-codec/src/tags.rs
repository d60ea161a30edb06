//! Reserved keys of the wire form.

/// Prefix shared by every tag key.
pub const TAG_PREFIX: char = '$';

pub const UNDEFINED: &str = "$und";
pub const NAN: &str = "$nan";
pub const INFINITY: &str = "$inf";
pub const NEG_INFINITY: &str = "$ninf";
pub const NEG_ZERO: &str = "$n0";
pub const OBJECT: &str = "$obj";
pub const SPARSE_ARRAY: &str = "$arr";
pub const SET: &str = "$set";
pub const MAP: &str = "$map";
pub const BYTES: &str = "$ui8a";
pub const REFERENCE: &str = "$jig";
pub const ARBITRARY: &str = "$arb";
pub const DUPLICATE: &str = "$dup";

/// Companion key carrying extra own properties of sets and maps.
pub const PROPS: &str = "props";

/// Companion key carrying the type of an arbitrary instance.
pub const TYPE: &str = "T";

pub fn is_tag(key: &str) -> bool {
    key.starts_with(TAG_PREFIX)
}
