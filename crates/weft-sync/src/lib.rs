//! Synchronization primitives for lock-step simulation stepping.
//!
//! The only primitive today is [`RendezvousBarrier`], a reusable,
//! generation-counted barrier with explicit cancellation.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod barrier;

pub use barrier::{BarrierWait, RendezvousBarrier};
