//! Anonymous shared mappings.
//!
//! A [`SharedRegion`] maps one value into `MAP_SHARED | MAP_ANONYMOUS`
//! memory. Create it before `fork` and every child sees the same bytes, so
//! the locks, condition variables, queues and the [`ContextTable`] inside it
//! coordinate across processes exactly as they do across threads.

use core::fmt;
use core::ops::Deref;
use core::ptr::NonNull;

use crate::ContextTable;
use crate::sync::{BoundedQueue, Condvar, SpinLock};

/// Types that stay valid when the same bytes are mapped into several
/// processes.
///
/// # Safety
///
/// The type must contain no pointers or references (those would be
/// meaningless in another address space) and no handles to per-process
/// resources. It must be `Sync` and must not rely on `Drop`: a region never
/// drops its value, since every process holding a copy of the mapping would
/// otherwise drop it again.
pub unsafe trait ProcessShared: Sync {}

macro_rules! impl_process_shared {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: Plain data.
            unsafe impl ProcessShared for $ty {}
        )*
    };
}

impl_process_shared!(
    (),
    bool,
    u8,
    u16,
    u32,
    u64,
    usize,
    i8,
    i16,
    i32,
    i64,
    isize,
);

// SAFETY: Arrays of position-independent values are position independent.
unsafe impl<T: ProcessShared, const N: usize> ProcessShared for [T; N] {}

// SAFETY: Slots hold only atomics.
unsafe impl ProcessShared for ContextTable {}

// SAFETY: An atomic flag, an atomic owner word and the inline value.
unsafe impl<T: ProcessShared + Send> ProcessShared for SpinLock<T> {}

// SAFETY: A spin lock around a ring of `ContextId`s, which are plain
// integers naming slots in a table in the same region.
unsafe impl ProcessShared for Condvar {}

// SAFETY: A spin lock around an inline ring of `T`, plus two condvars.
unsafe impl<T: ProcessShared + Copy + Send, const N: usize> ProcessShared for BoundedQueue<T, N> {}

/// Failure to create a [`SharedRegion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmError {
    /// `mmap` failed with the given errno.
    Map(i32),
}

impl ShmError {
    /// The OS error code behind this failure.
    pub fn raw_os_error(self) -> i32 {
        match self {
            Self::Map(errno) => errno,
        }
    }
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(errno) => write!(f, "mmap of shared region failed (errno {errno})"),
        }
    }
}

impl core::error::Error for ShmError {}

/// One value in process-shared anonymous memory.
///
/// Dropping the region unmaps it in the current process only; other
/// processes keep their mapping. The value itself is never dropped.
pub struct SharedRegion<T: ProcessShared> {
    ptr: NonNull<T>,
}

// SAFETY: The region only hands out `&T`, and `T: Sync`.
unsafe impl<T: ProcessShared> Send for SharedRegion<T> {}
unsafe impl<T: ProcessShared> Sync for SharedRegion<T> {}

impl<T: ProcessShared> SharedRegion<T> {
    /// Mappings are page aligned; nothing here needs more.
    const ALIGN_FITS_PAGE: () = assert!(core::mem::align_of::<T>() <= 4096);

    /// Maps a fresh region and moves `value` into it.
    ///
    /// # Errors
    ///
    /// [`ShmError::Map`] if the kernel refuses the mapping.
    pub fn new(value: T) -> Result<Self, ShmError> {
        let () = Self::ALIGN_FITS_PAGE;
        let len = Self::len();
        // SAFETY: Anonymous mapping with no address hint; the arguments are
        // valid for any `len > 0`.
        let addr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            // SAFETY: errno is thread-local and valid right after the failed call.
            let errno = unsafe { *libc::__errno_location() };
            crate::sync_error!("shared region of {len} bytes: mmap errno {errno}");
            return Err(ShmError::Map(errno));
        }
        let ptr = NonNull::new(addr.cast::<T>()).ok_or(ShmError::Map(libc::EINVAL))?;
        // SAFETY: Fresh, page-aligned, writable mapping of at least
        // `size_of::<T>()` bytes.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self { ptr })
    }

    fn len() -> usize {
        core::mem::size_of::<T>().max(1)
    }
}

impl<T: ProcessShared> Deref for SharedRegion<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: Initialized in `new` and mapped until `drop`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ProcessShared> Drop for SharedRegion<T> {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from `mmap` with this length and no reference
        // derived from it outlives `self`.
        let ret = unsafe { libc::munmap(self.ptr.as_ptr().cast(), Self::len()) };
        if ret != 0 {
            crate::sync_warn!("munmap of shared region failed");
        }
    }
}
