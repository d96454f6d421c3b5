//! Valid-object (VO) bits: one bit per minimum-alignment granule of a block, set at the start of
//! every live object. The sweep does not need them. Evacuation uses them to enumerate the
//! objects of a candidate block, and debug builds use them to check that references resolve to
//! object starts.

use super::block::Block;
use crate::util::constants::{BITS_IN_WORD, LOG_MIN_OBJECT_ALIGNMENT};
use crate::util::linear_scan::Region;
use crate::util::Address;
use std::sync::atomic::{AtomicU64, Ordering};

const GRANULES: usize = Block::BYTES >> LOG_MIN_OBJECT_ALIGNMENT;
const WORDS: usize = GRANULES / BITS_IN_WORD;

pub struct VOBitmap {
    words: [AtomicU64; WORDS],
}

fn bit_index(addr: Address) -> (usize, u64) {
    let granule = (addr - Block::align(addr)) >> LOG_MIN_OBJECT_ALIGNMENT;
    (granule / BITS_IN_WORD, 1u64 << (granule % BITS_IN_WORD))
}

impl VOBitmap {
    pub fn set(&self, addr: Address) {
        let (word, mask) = bit_index(addr);
        let old = self.words[word].fetch_or(mask, Ordering::Relaxed);
        debug_assert!(old & mask == 0, "{} already has its VO bit set", addr);
    }

    pub fn clear(&self, addr: Address) {
        let (word, mask) = bit_index(addr);
        let old = self.words[word].fetch_and(!mask, Ordering::Relaxed);
        debug_assert!(old & mask != 0, "{} has no VO bit to clear", addr);
    }

    pub fn is_set(&self, addr: Address) -> bool {
        let (word, mask) = bit_index(addr);
        self.words[word].load(Ordering::Relaxed) & mask != 0
    }

    pub fn clear_all(&self) {
        for word in &self.words {
            word.store(0, Ordering::Relaxed);
        }
    }

    /// Start addresses of all objects in `block`, in address order.
    pub fn objects(&self, block: Block) -> impl Iterator<Item = Address> + '_ {
        let start = block.start();
        self.words.iter().enumerate().flat_map(move |(i, word)| {
            let mut bits = word.load(Ordering::Relaxed);
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(start + ((i * BITS_IN_WORD + bit) << LOG_MIN_OBJECT_ALIGNMENT))
            })
        })
    }
}
