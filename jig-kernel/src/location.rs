//! Textual coordinates of creations.
//!
//! | Form | Meaning |
//! |---|---|
//! | `<txid>_o<n>` | output `n` of a transaction |
//! | `<txid>_d<n>` | deleted marker `n` of a transaction |
//! | `_o<n>` / `_d<n>` | relative to the owning transaction |
//! | `record://<uuid>_o<n>` | pending, before the transaction confirms |
//! | `native://<name>` | built-in code installed by the host |
//! | `<txid>_o<n>?berry=<path>[&hash=<hex>]` | berry plucked by the code at the base |

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{KernelError, Result};

const RECORD_SCHEME: &str = "record://";
const NATIVE_SCHEME: &str = "native://";
const BERRY_PARAM: &str = "berry";
const HASH_PARAM: &str = "hash";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Output { txid: String, vout: u32 },
    Deleted { txid: String, vdel: u32 },
    RelativeOutput { vout: u32 },
    RelativeDeleted { vdel: u32 },
    Pending { record: Uuid, vout: u32 },
    Native { name: String },
    Berry {
        txid: String,
        vout: u32,
        path: String,
        hash: Option<String>,
    },
}

impl Location {
    pub fn output(txid: impl Into<String>, vout: u32) -> Self {
        Location::Output {
            txid: txid.into(),
            vout,
        }
    }

    /// A fresh pending location for output `vout` of an unconfirmed record.
    pub fn pending(vout: u32) -> Self {
        Location::Pending {
            record: Uuid::new_v4(),
            vout,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || KernelError::InvalidLocation(s.to_string());

        if let Some(rest) = s.strip_prefix(RECORD_SCHEME) {
            let (record, vout) = rest.rsplit_once("_o").ok_or_else(invalid)?;
            let record = Uuid::parse_str(record).map_err(|_| invalid())?;
            let vout = parse_index(vout).ok_or_else(invalid)?;
            return Ok(Location::Pending { record, vout });
        }

        if let Some(name) = s.strip_prefix(NATIVE_SCHEME) {
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
                return Err(invalid());
            }
            return Ok(Location::Native { name: name.to_string() });
        }

        if let Some((base, query)) = s.split_once('?') {
            let (txid, vout) = match Location::parse(base)? {
                Location::Output { txid, vout } => (txid, vout),
                _ => return Err(invalid()),
            };
            let mut path = None;
            let mut hash = None;
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some((BERRY_PARAM, value)) if path.is_none() => path = Some(value.to_string()),
                    Some((HASH_PARAM, value)) if hash.is_none() && is_sha256_hex(value) => {
                        hash = Some(value.to_string())
                    }
                    _ => return Err(invalid()),
                }
            }
            let path = path.ok_or_else(invalid)?;
            return Ok(Location::Berry { txid, vout, path, hash });
        }

        let (txid, suffix) = s.rsplit_once('_').ok_or_else(invalid)?;
        if !txid.is_empty() && !txid.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let (deleted, index) = match (suffix.strip_prefix('o'), suffix.strip_prefix('d')) {
            (Some(index), _) => (false, index),
            (_, Some(index)) => (true, index),
            _ => return Err(invalid()),
        };
        let index = parse_index(index).ok_or_else(invalid)?;
        Ok(match (txid.is_empty(), deleted) {
            (false, false) => Location::Output {
                txid: txid.to_string(),
                vout: index,
            },
            (false, true) => Location::Deleted {
                txid: txid.to_string(),
                vdel: index,
            },
            (true, false) => Location::RelativeOutput { vout: index },
            (true, true) => Location::RelativeDeleted { vdel: index },
        })
    }

    /// Anchor a relative location to `txid`. Other forms are unchanged.
    pub fn resolve(&self, txid: &str) -> Location {
        match self {
            Location::RelativeOutput { vout } => Location::Output {
                txid: txid.to_string(),
                vout: *vout,
            },
            Location::RelativeDeleted { vdel } => Location::Deleted {
                txid: txid.to_string(),
                vdel: *vdel,
            },
            other => other.clone(),
        }
    }

    pub fn txid(&self) -> Option<&str> {
        match self {
            Location::Output { txid, .. } | Location::Deleted { txid, .. } | Location::Berry { txid, .. } => {
                Some(txid)
            }
            _ => None,
        }
    }

    pub fn is_relative(&self) -> bool {
        matches!(self, Location::RelativeOutput { .. } | Location::RelativeDeleted { .. })
    }

    pub fn is_berry(&self) -> bool {
        matches!(self, Location::Berry { .. })
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Location::Native { .. })
    }

    /// Whether a cached state can be recreated here.
    pub fn is_absolute(&self) -> bool {
        matches!(
            self,
            Location::Output { .. } | Location::Deleted { .. } | Location::Berry { .. }
        )
    }

    /// The content hash carried by a berry location.
    pub fn hash(&self) -> Option<&str> {
        match self {
            Location::Berry { hash, .. } => hash.as_deref(),
            _ => None,
        }
    }

    /// The same berry location, stamped with `hash`.
    pub fn with_hash(&self, hash: impl Into<String>) -> Location {
        match self {
            Location::Berry { txid, vout, path, .. } => Location::Berry {
                txid: txid.clone(),
                vout: *vout,
                path: path.clone(),
                hash: Some(hash.into()),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Output { txid, vout } => write!(f, "{txid}_o{vout}"),
            Location::Deleted { txid, vdel } => write!(f, "{txid}_d{vdel}"),
            Location::RelativeOutput { vout } => write!(f, "_o{vout}"),
            Location::RelativeDeleted { vdel } => write!(f, "_d{vdel}"),
            Location::Pending { record, vout } => write!(f, "{RECORD_SCHEME}{record}_o{vout}"),
            Location::Native { name } => write!(f, "{NATIVE_SCHEME}{name}"),
            Location::Berry {
                txid,
                vout,
                path,
                hash,
            } => {
                write!(f, "{txid}_o{vout}?{BERRY_PARAM}={path}")?;
                if let Some(hash) = hash {
                    write!(f, "&{HASH_PARAM}={hash}")?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Location {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        Location::parse(s)
    }
}

fn parse_index(s: &str) -> Option<u32> {
    if s.is_empty() || (s.len() > 1 && s.starts_with('0')) || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
