//! Memory policies. There is one: the reference-counted immix space.

pub mod immix;
