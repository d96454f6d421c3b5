use crate::util::conversions;
use crate::util::Address;
use std::io::{Error, ErrorKind, Result};

/// Set `len` bytes starting at `start` to zero.
pub fn zero(start: Address, len: usize) {
    unsafe { std::ptr::write_bytes(start.to_mut_ptr::<u8>(), 0, len) }
}

/// Demand-zero anonymous mmap anywhere in the address space:
/// This function guarantees to zero all mapped memory. The mapping does not reserve swap
/// space, so physical memory is only committed when pages are touched.
pub fn dzmmap_anywhere(size: usize) -> Result<Address> {
    let prot = libc::PROT_READ | libc::PROT_WRITE;
    let flags = libc::MAP_ANON | libc::MAP_PRIVATE | libc::MAP_NORESERVE;
    let ret = unsafe { libc::mmap(std::ptr::null_mut(), size, prot, flags, -1, 0) };
    if ret == libc::MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(Address::from_mut_ptr(ret))
    }
}

/// Reserve `size` bytes of memory whose start is aligned to `align`. The unaligned head and
/// tail of the underlying mapping are unmapped again.
pub fn dzmmap_aligned(size: usize, align: usize) -> Result<Address> {
    debug_assert!(align.is_power_of_two());
    let padded = size.checked_add(align).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidInput,
            format!("cannot reserve {} bytes aligned to {}", size, align),
        )
    })?;
    let raw = dzmmap_anywhere(padded)?;
    let start = raw.align_up(align);
    let head = start - raw;
    let tail = align - head;
    if head > 0 {
        try_munmap(raw, head)?;
    }
    if tail > 0 {
        try_munmap(start + size, tail)?;
    }
    Ok(start)
}

/// Hint the OS that the physical pages backing the range can be dropped. The range stays mapped
/// and reads back as zero.
pub fn release_pages(start: Address, size: usize) -> Result<()> {
    debug_assert!(conversions::is_page_aligned(start));
    wrap_libc_call(
        &|| unsafe { libc::madvise(start.to_mut_ptr(), size, libc::MADV_DONTNEED) },
        0,
    )
}

pub fn try_munmap(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
