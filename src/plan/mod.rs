//! Collection plans. A plan owns the collector state that outlives a single collection and
//! drives the phases of each one.

pub mod rc;
pub mod roots;

pub use self::rc::{CollectionMode, CollectionPhase, RCImmixPlan};
pub use self::roots::RootSet;
