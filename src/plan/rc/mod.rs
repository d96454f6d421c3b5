//! Reference-counting immix: deferred, coalesced counts maintained by an object-remembering
//! write barrier, with synchronous trial deletion as the backstop for cycles and opportunistic
//! evacuation of sparse blocks.

pub mod barrier;
pub mod counting;
pub mod cycle;
pub mod global;

pub use self::global::{CollectionMode, CollectionPhase, RCImmixPlan};
