//! COM task-allocator memory management.
//!
//! Out-parameters of many COM calls arrive in `CoTaskMemAlloc`-owned
//! buffers that the caller must hand back to `CoTaskMemFree` exactly once.
//! [`TaskMem`] and [`TaskMemArray`] tie that obligation to Drop.

use windows::{
    Win32::System::Com::{CoTaskMemAlloc, CoTaskMemFree},
    core::PWSTR,
};

/// RAII owner of a single COM-allocated pointer.
///
/// Freed with `CoTaskMemFree` when dropped; a null inner pointer is a
/// valid empty state.
#[repr(transparent)]
#[derive(Debug)]
pub struct TaskMem<T: Sized> {
    inner: *mut T,
}

impl<T: Sized> TaskMem<T> {
    /// Creates a `TaskMem` holding null.
    #[inline]
    pub fn null() -> Self {
        Self {
            inner: std::ptr::null_mut(),
        }
    }

    /// Takes ownership of `pointer`, which must have come from the COM
    /// task allocator (or be null).
    #[inline]
    pub fn from_raw(pointer: *mut T) -> Self {
        Self { inner: pointer }
    }

    /// Copies `value` into a fresh task allocation, for in-parameters the
    /// callee is documented to free.
    ///
    /// An empty slice (or allocation failure) yields the null state.
    pub fn copy_slice(value: &[T]) -> Self {
        if value.is_empty() {
            return Self::null();
        }
        // SAFETY: allocation of the slice's byte size.
        let pointer = unsafe { CoTaskMemAlloc(std::mem::size_of_val(value)) };
        if pointer.is_null() {
            return Self::null();
        }
        // SAFETY: source and destination are non-null and do not overlap;
        // the destination was just allocated with room for `value.len()`
        // elements.
        unsafe {
            std::ptr::copy_nonoverlapping(value.as_ptr(), pointer.cast(), value.len());
        }
        Self {
            inner: pointer.cast(),
        }
    }

    /// Out-parameter hook: pointer to the inner pointer, for
    /// `**T`-shaped COM outputs.
    #[inline]
    pub fn as_out_ptr(&mut self) -> *mut *mut T {
        &mut self.inner
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.inner.is_null()
    }

    /// Borrows the pointee, if present.
    #[inline]
    pub fn as_ref(&self) -> Option<&T> {
        // SAFETY: the pointer either is null (handled by `as_ref`) or came
        // from a COM out-parameter and stays valid until Drop.
        unsafe { self.inner.as_ref() }
    }

    /// Borrows the pointee or fails with `E_POINTER`.
    pub fn ok(&self) -> windows::core::Result<&T> {
        self.as_ref().ok_or_else(|| {
            windows::core::Error::new(windows::Win32::Foundation::E_POINTER, "Pointer is null")
        })
    }
}

impl<T: Sized> Default for TaskMem<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T: Sized> Drop for TaskMem<T> {
    #[inline]
    fn drop(&mut self) {
        if !self.inner.is_null() {
            // SAFETY: the pointer was produced by the COM task allocator
            // and ownership was transferred to this wrapper exactly once.
            unsafe {
                CoTaskMemFree(Some(self.inner.cast()));
            }
        }
    }
}

impl From<PWSTR> for TaskMem<u16> {
    #[inline]
    fn from(value: PWSTR) -> Self {
        Self::from_raw(value.as_ptr())
    }
}

impl TaskMem<u16> {
    /// Out-parameter hook typed as `*mut PWSTR`.
    #[inline]
    pub fn as_out_pwstr_ptr(&mut self) -> *mut PWSTR {
        (&raw mut self.inner).cast()
    }
}

impl TryFrom<TaskMem<u16>> for String {
    type Error = windows::core::Error;

    /// Reads a COM-allocated wide string into an owned `String`.
    fn try_from(value: TaskMem<u16>) -> Result<Self, Self::Error> {
        if value.inner.is_null() {
            return Err(windows::Win32::Foundation::E_POINTER.into());
        }
        // SAFETY: non-null and null-terminated per the COM string contract.
        Ok(unsafe { PWSTR(value.inner).to_string() }?)
    }
}

/// RAII owner of a COM-allocated array plus its element count.
#[derive(Debug, Default)]
pub struct TaskMemArray<T: Sized> {
    pointer: TaskMem<T>,
    len: u32,
}

impl<T: Sized> TaskMemArray<T> {
    /// Creates an empty array ready to receive COM output.
    #[inline]
    pub fn empty() -> Self {
        Self {
            pointer: TaskMem::null(),
            len: 0,
        }
    }

    /// Out-parameter hook for the data pointer.
    #[inline]
    pub fn as_out_ptr(&mut self) -> *mut *mut T {
        self.pointer.as_out_ptr()
    }

    /// Out-parameter hook for the element count.
    #[inline]
    pub fn as_mut_len_ptr(&mut self) -> *mut u32 {
        &mut self.len
    }

    #[inline]
    pub fn len(&self) -> u32 {
        if self.pointer.is_null() { 0 } else { self.len }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Views the filled portion as a slice.
    pub fn as_slice(&self) -> &[T] {
        if self.pointer.is_null() || self.len == 0 {
            return &[];
        }
        let len = usize::try_from(self.len).unwrap_or(0);
        // SAFETY: the callee wrote `len` elements starting at `pointer`;
        // both stay valid until Drop.
        unsafe { std::slice::from_raw_parts(self.pointer.inner, len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_taskmem_is_empty_and_droppable() {
        let mem: TaskMem<u32> = TaskMem::null();
        assert!(mem.is_null());
        assert!(mem.as_ref().is_none());
        assert!(mem.ok().is_err());
    }

    #[test]
    fn copy_slice_round_trip() {
        let mem = TaskMem::copy_slice(&[1u32, 2, 3]);
        assert!(!mem.is_null());
        assert_eq!(mem.as_ref(), Some(&1u32));
    }

    #[test]
    fn copy_slice_of_nothing_is_null() {
        let mem: TaskMem<u32> = TaskMem::copy_slice(&[]);
        assert!(mem.is_null());
        assert!(mem.as_ref().is_none());
    }

    #[test]
    fn wide_string_round_trip() {
        let wide: Vec<u16> = "sysport".encode_utf16().chain(Some(0)).collect();
        let mem = TaskMem::copy_slice(&wide);
        let text: String = String::try_from(mem).unwrap();
        assert_eq!(text, "sysport");
    }

    #[test]
    fn empty_array_slices_safely() {
        let arr: TaskMemArray<u32> = TaskMemArray::empty();
        assert!(arr.is_empty());
        assert_eq!(arr.as_slice(), &[]);
    }
}
