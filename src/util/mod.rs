pub mod address;
pub mod alloc;
pub mod constants;
pub mod conversions;
pub mod error;
pub mod linear_scan;
pub mod logger;
pub mod memory;
pub mod options;
pub mod statistics;
#[cfg(test)]
pub mod test_util;

pub use self::address::Address;
