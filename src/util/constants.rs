/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// log2 of the number of bits in a word
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

/// log2 of the number of bytes in a page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in a page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the minimal object alignment in bytes.
pub const LOG_MIN_OBJECT_ALIGNMENT: u8 = 3;
/// The minimal object alignment in bytes. Every object starts at a granule of this size.
pub const MIN_OBJECT_ALIGNMENT: usize = 1 << LOG_MIN_OBJECT_ALIGNMENT;

/// The size in bytes of a reference slot in an object. A slot holds the raw bits of an
/// `ObjectReference` (zero for null).
pub const BYTES_IN_REFERENCE_SLOT: usize = 8;

/// The default heap reservation in bytes.
pub const DEFAULT_HEAP_SIZE: usize = 64 << LOG_BYTES_IN_MBYTE;

#[cfg(target_pointer_width = "64")]
/// The largest heap reservation in bytes.
pub const MAX_HEAP_SIZE: usize = 1 << 45;
#[cfg(target_pointer_width = "32")]
/// The largest heap reservation in bytes.
pub const MAX_HEAP_SIZE: usize = 1 << 30;
