//! Raw vtable-slot dispatch.
//!
//! The one primitive everything else reduces to: a COM object pointer is a
//! pointer to a vtable, and a vtable is an array of `extern "system"`
//! function pointers in vendor-defined order. Given an object pointer and
//! a slot index, read the function pointer and call it with the object as
//! the implicit `this` argument.
//!
//! The typed wrappers in the sibling modules use `windows`-crate interface
//! projections; this layer exists for interfaces with no projection, where
//! the slot index comes straight from the vendor's IDL.

use std::ffi::c_void;

use windows_core::{GUID, HRESULT};

use super::errors::{ComError, ComResult};

/// Reads the function pointer at `slot` of `obj`'s vtable.
///
/// # Safety
///
/// `obj` must be a live COM interface pointer whose vtable has at least
/// `slot + 1` entries.
#[must_use]
pub unsafe fn slot_fn(obj: *mut c_void, slot: usize) -> *mut c_void {
    // SAFETY: per the COM ABI, `obj` points to a vtable pointer and the
    // vtable is an array of function pointers; the caller guarantees the
    // slot index is within the interface's method count.
    unsafe {
        let vtable = *obj.cast::<*const *mut c_void>();
        *vtable.add(slot)
    }
}

/// Calls the function at a vtable slot with the native calling convention.
///
/// The object pointer is always passed as the implicit first (`this`)
/// argument, and the function is assumed to return an [`HRESULT`] — the
/// Automation-compatible shape every interface wrapped by this crate uses.
///
/// ```ignore
/// // slot 3 of IDispatch: GetTypeInfoCount(this, *mut u32)
/// let hr = unsafe { com_call!(ptr, 3, (*mut u32), &mut count) };
/// ```
///
/// # Safety
///
/// The slot index and argument types must match the vendor's interface
/// definition exactly; there is no runtime check.
#[macro_export]
macro_rules! com_call {
    ($obj:expr, $slot:expr, ($($arg_ty:ty),*) $(, $arg:expr)*) => {{
        let func = $crate::com::vtable::slot_fn($obj, $slot);
        let func: unsafe extern "system" fn(
            *mut ::std::ffi::c_void $(, $arg_ty)*
        ) -> ::windows_core::HRESULT = ::std::mem::transmute(func);
        func($obj $(, $arg)*)
    }};
}

/// Fixed IUnknown slot order, per the COM ABI.
const SLOT_QUERY_INTERFACE: usize = 0;
const SLOT_ADD_REF: usize = 1;
const SLOT_RELEASE: usize = 2;

/// Owning handle over a raw `IUnknown` pointer.
///
/// Balances the COM reference-counting contract without a `windows`-crate
/// projection: `Clone` calls `AddRef`, `Drop` calls `Release`, exactly
/// once each.
#[derive(Debug)]
pub struct RawUnknown {
    ptr: *mut c_void,
}

impl RawUnknown {
    /// Takes ownership of one reference to `ptr`.
    ///
    /// # Errors
    ///
    /// Fails with [`ComError::InvalidState`] when `ptr` is null.
    ///
    /// # Safety contract
    ///
    /// `ptr` must be a live COM interface pointer; the caller's reference
    /// is consumed (this wrapper will `Release` it).
    pub fn from_raw(ptr: *mut c_void) -> ComResult<Self> {
        if ptr.is_null() {
            return Err(ComError::InvalidState(
                "null interface pointer".to_string(),
            ));
        }
        Ok(Self { ptr })
    }

    /// Borrows an interface owned elsewhere, taking a reference of its
    /// own via `AddRef`.
    pub fn from_borrowed(ptr: *mut c_void) -> ComResult<Self> {
        let unknown = Self::from_raw(ptr)?;
        // SAFETY: slot 1 is AddRef per the COM ABI; `ptr` is live per the
        // caller contract.
        unsafe {
            let func: unsafe extern "system" fn(*mut c_void) -> u32 =
                std::mem::transmute(slot_fn(unknown.ptr, SLOT_ADD_REF));
            func(unknown.ptr);
        }
        Ok(unknown)
    }

    /// The underlying interface pointer, still owned by this wrapper.
    #[must_use]
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// `QueryInterface` for `iid`, returning a new owning handle.
    ///
    /// # Errors
    ///
    /// `E_NOINTERFACE` (as [`ComError::Com`]) when the object does not
    /// implement the requested interface.
    pub fn query_interface(&self, iid: &GUID) -> ComResult<Self> {
        let mut out: *mut c_void = std::ptr::null_mut();
        // SAFETY: slot 0 is QueryInterface per the COM ABI; the signature
        // (this, riid, ppv) -> HRESULT is fixed by the vendor.
        let hr: HRESULT = unsafe {
            com_call!(
                self.ptr,
                SLOT_QUERY_INTERFACE,
                (*const GUID, *mut *mut c_void),
                iid,
                &mut out
            )
        };
        hr.ok().map_err(ComError::from)?;
        // QueryInterface already took the reference we now own.
        Self::from_raw(out)
    }

    /// Calls `AddRef` and returns the new count (advisory only, per the
    /// COM documentation).
    pub fn add_ref(&self) -> u32 {
        // SAFETY: slot 1 is AddRef; (this) -> ULONG is fixed by the ABI.
        unsafe {
            let func: unsafe extern "system" fn(*mut c_void) -> u32 =
                std::mem::transmute(slot_fn(self.ptr, SLOT_ADD_REF));
            func(self.ptr)
        }
    }

    /// Releases the wrapped reference and forgets the wrapper, returning
    /// the advisory count. Equivalent to dropping, but with the count.
    pub fn release(self) -> u32 {
        let count = unsafe { self.release_inner() };
        std::mem::forget(self);
        count
    }

    /// # Safety
    ///
    /// Must be called at most once; afterwards `self.ptr` is dangling.
    unsafe fn release_inner(&self) -> u32 {
        // SAFETY: slot 2 is Release; (this) -> ULONG is fixed by the ABI.
        unsafe {
            let func: unsafe extern "system" fn(*mut c_void) -> u32 =
                std::mem::transmute(slot_fn(self.ptr, SLOT_RELEASE));
            func(self.ptr)
        }
    }
}

impl Clone for RawUnknown {
    fn clone(&self) -> Self {
        self.add_ref();
        Self { ptr: self.ptr }
    }
}

impl Drop for RawUnknown {
    fn drop(&mut self) {
        // SAFETY: one wrapped reference, released exactly once.
        unsafe {
            self.release_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::core::{IUnknown, Interface, implement};

    // A minimal in-process COM object; #[implement] supplies the real
    // IUnknown vtable, so the raw layer is exercised against the genuine
    // ABI rather than a hand-rolled fake.
    #[implement(IUnknown)]
    struct Probe;

    fn probe() -> IUnknown {
        Probe.into()
    }

    #[test]
    fn from_raw_rejects_null() {
        assert!(RawUnknown::from_raw(std::ptr::null_mut()).is_err());
    }

    #[test]
    fn release_balances_acquisition() {
        let unk = probe();
        // into_raw transfers the reference to the raw wrapper.
        let raw = RawUnknown::from_raw(unk.into_raw()).unwrap();
        drop(raw); // no leak, no double release — object frees itself
    }

    #[test]
    fn clone_add_refs() {
        let unk = probe();
        let raw = RawUnknown::from_borrowed(unk.as_raw()).unwrap();
        let cloned = raw.clone();
        assert_eq!(raw.as_ptr(), cloned.as_ptr());
        drop(cloned);
        drop(raw);
        // `unk` still owns its reference and drops cleanly here.
    }

    #[test]
    fn query_interface_for_iunknown_succeeds() {
        let unk = probe();
        let raw = RawUnknown::from_borrowed(unk.as_raw()).unwrap();
        let other = raw.query_interface(&IUnknown::IID).unwrap();
        assert!(!other.as_ptr().is_null());
    }

    #[test]
    fn query_interface_for_unknown_iid_fails() {
        let unk = probe();
        let raw = RawUnknown::from_borrowed(unk.as_raw()).unwrap();
        let bogus = GUID::from_u128(0xDEADBEEF_0000_0000_0000_000000000001);
        let err = raw.query_interface(&bogus).unwrap_err();
        assert_eq!(
            err.hresult().map(|hr| hr.0 as u32),
            Some(0x80004002) // E_NOINTERFACE
        );
    }
}
