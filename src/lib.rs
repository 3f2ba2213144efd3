//! # frame-registry - Frame-Descriptor Registry for Precise Stack Scanning
//!
//! A garbage collector that scans stacks precisely needs to answer one
//! question fast: given a return address observed on an execution unit's call
//! stack, which stack slots at that call site hold live heap references? The
//! code generator emits that metadata as *frame descriptor* records, packed
//! into per-compilation-unit *frametables*. This crate is the registry that
//! indexes those records and answers the question, concurrently with the
//! dynamic loading and unloading of compiled code.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Stack Walker                          │
//! │          find(pc) — lock-free, any number of units        │
//! └────────────────────────────┬──────────────────────────────┘
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  DescriptorTable: open-addressing, one atomic word/slot   │
//! │  empty / tombstone / live-record probing                  │
//! └────────────────────────────▲──────────────────────────────┘
//!                              │
//! ┌────────────────────────────┴──────────────────────────────┐
//! │  Mutation Coordinator (writer mutex)                      │
//! │   - register: insert in place, or stop-the-world rebuild  │
//! │   - unregister: tombstone + unlink + reader drain         │
//! └────────────────────────────▲──────────────────────────────┘
//!                              │
//! ┌────────────────────────────┴──────────────────────────────┐
//! │  Code loader: register_frametables / unregister_frametables│
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups never block and never take a lock; they announce themselves on an
//! in-flight counter so unregistration can wait out any lookup that might
//! still be touching a record about to lose its backing memory. Mutations
//! serialize on a mutex. Only capacity growth stops the world, through the
//! embedding runtime's [`WorldStopper`].
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use frame_registry::{
//!     FrameRegistry, FrametableBuilder, RegistryConfig, SingleUnitWorld,
//! };
//!
//! # fn main() -> frame_registry::Result<()> {
//! let mut builder = FrametableBuilder::new();
//! builder.push_frame(0x1000, &[8, 24]);
//! builder.push_frame(0x2000, &[16]);
//! let buf = builder.finish();
//!
//! let registry = unsafe {
//!     FrameRegistry::new(
//!         RegistryConfig::default(),
//!         Arc::new(SingleUnitWorld),
//!         &[buf.table()],
//!     )?
//! };
//!
//! let d = registry.find(0x1000).unwrap();
//! assert_eq!(d.live_offsets(), &[8, 24]);
//! assert!(registry.find(0x3000).is_none());
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! The registry reads externally owned binary blobs through raw pointers.
//! All obligations sit at the registration boundary, which is why it is
//! `unsafe`:
//!
//! 1. A registered frametable must be well-formed and must stay valid and
//!    unmodified until unregistered.
//! 2. Keys must be distinct across all registered frametables.
//! 3. Blob memory may be freed as soon as unregistration returns — the
//!    reader drain guarantees no lookup is still touching it.
//!
//! `find` itself is safe; the references it returns stay valid while the
//! containing frametable stays registered.
//!
//! ## Modules
//!
//! - [`config`]: registry tuning parameters
//! - [`error`]: error types
//! - [`pause`]: stop-the-world coordination
//! - [`record`]: frame descriptor records and the record decoder
//! - [`registry`]: the mutation coordinator and lookup API
//! - [`segment`]: frametable handles and the blob builder
//! - [`table`]: the open-addressing descriptor table
//! - [`util`]: alignment helpers

pub mod config;
pub mod error;
pub mod pause;
pub mod record;
pub mod registry;
pub mod segment;
pub mod table;
pub mod util;

pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use pause::{SafepointWorld, SingleUnitWorld, WorldStopper};
pub use record::{
    FrameDescriptor, FLAG_HAS_ALLOCS, FLAG_HAS_DEBUG, FLAG_MASK, FLAG_RETURN_TO_NATIVE,
};
pub use registry::{
    find, get_table_handle, init, register_frametable, register_frametables,
    unregister_frametable, unregister_frametables, FrameRegistry,
};
pub use segment::{Frametable, FrametableBuf, FrametableBuilder};

/// Crate version string from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
