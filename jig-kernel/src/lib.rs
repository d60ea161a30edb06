//! Shell, hydrate and recreate pipeline for creation graphs
//!
//! The kernel turns cached states back into live creations. Every creation
//! first exists as an empty shell with its final identity; hydration later
//! fills it in one step. Because shells are registered by location before
//! they are hydrated, graphs with cycles load without deadlock.
//!
//! # Key Components
//!
//! - [`Kernel`]: shared handle over the arena, location index and registries
//! - [`Kernel::recreate`]: validate, verify and shell one cached state
//! - [`Partial`]: a shell plus the shared future that hydrates it
//! - [`Loader`] / [`CacheLoader`]: resolve references not yet in the kernel
//! - [`TrustList`] / [`Worldview`]: code trust and origin tracking
//!
//! # Example
//!
//! ```ignore
//! use jig_kernel::{CacheLoader, Kernel, KernelConfig, Location, MemoryStateStore};
//!
//! let kernel = Kernel::new(KernelConfig::default().trusting("*"));
//! let loader = CacheLoader::new(Arc::new(store));
//! let jig = kernel.load(&Location::parse("ab12_o1")?, loader).await?;
//! ```

pub mod arena;
pub mod class;
pub mod config;
pub mod error;
pub mod hash;
pub mod hydrate;
pub mod kernel;
pub mod loader;
pub mod location;
pub mod recreate;
pub mod shell;
pub mod state;
pub mod trust;
pub mod worldview;

pub use arena::{Slot, SlotStatus};
pub use class::{Class, ClassRegistry};
pub use config::{KernelConfig, VerifyPolicy};
pub use error::{KernelError, Result};
pub use hash::{compute_hash, hash_state};
pub use hydrate::{Bindings, Hydration};
pub use kernel::{Kernel, KernelEvent};
pub use loader::{state_key, CacheLoader, Loader, MemoryStateStore, StateStore};
pub use location::Location;
pub use recreate::Partial;
pub use state::{CachedState, STATE_VERSION};
pub use trust::{Trust, TrustList, TRUST_ALL};
pub use worldview::Worldview;
