//! The immix heap: 32 KiB blocks of 256 byte lines. Every line carries the number of live
//! objects overlapping it, so a line is free exactly when its count is zero.

pub mod block;
pub mod defrag;
pub mod gc_work;
pub mod immixspace;
pub mod line;
pub mod vo_bit;

pub use immixspace::*;
