//! DiskArbitration sessions and disks.
//!
//! DA objects are CF types, so lifetime management rides on the
//! [`crate::cf`] layer. Sessions only deliver callbacks while scheduled
//! on a run loop; synchronous description snapshots work without one.

use std::ffi::{CStr, c_char, c_void};

use crate::cf::sys::{
    CFAllocatorRef, CFDictionaryRef, CFRunLoopRef, CFStringRef, kCFAllocatorDefault,
};
use crate::cf::{CfDictionary, CfType, sys};
use crate::errors::AppleResult;

pub type DASessionRef = *const c_void;
pub type DADiskRef = *const c_void;

// SAFETY: signatures transcribed from the DiskArbitration headers.
#[link(name = "DiskArbitration", kind = "framework")]
unsafe extern "C" {
    fn DASessionCreate(allocator: CFAllocatorRef) -> DASessionRef;
    fn DASessionScheduleWithRunLoop(
        session: DASessionRef,
        run_loop: CFRunLoopRef,
        run_loop_mode: CFStringRef,
    );
    fn DASessionUnscheduleFromRunLoop(
        session: DASessionRef,
        run_loop: CFRunLoopRef,
        run_loop_mode: CFStringRef,
    );
    fn DADiskCreateFromBSDName(
        allocator: CFAllocatorRef,
        session: DASessionRef,
        name: *const c_char,
    ) -> DADiskRef;
    fn DADiskGetBSDName(disk: DADiskRef) -> *const c_char;
    fn DADiskCopyDescription(disk: DADiskRef) -> CFDictionaryRef;
}

/// A DiskArbitration session.
#[derive(Debug, Clone)]
pub struct DiskSession {
    inner: CfType,
}

impl DiskSession {
    pub fn new() -> AppleResult<Self> {
        // SAFETY: standard session creation; the reference is ours.
        let ptr = unsafe { DASessionCreate(kCFAllocatorDefault) };
        // SAFETY: fresh owned reference (or null) from the create call.
        let inner = unsafe { CfType::from_create(ptr, "DASessionCreate") }?;
        tracing::debug!("DiskArbitration session created");
        Ok(Self { inner })
    }

    /// Schedules the session on the current thread's run loop in the
    /// default mode, enabling callback delivery.
    pub fn schedule_on_current_run_loop(&self) {
        // SAFETY: the session is live; run loop and mode come straight
        // from CoreFoundation.
        unsafe {
            DASessionScheduleWithRunLoop(
                self.inner.as_ptr(),
                sys::CFRunLoopGetCurrent(),
                sys::kCFRunLoopDefaultMode,
            );
        }
    }

    /// Reverses [`Self::schedule_on_current_run_loop`]. Must run on the
    /// same thread that scheduled the session.
    pub fn unschedule_from_current_run_loop(&self) {
        // SAFETY: the session is live; same run loop and mode as the
        // scheduling call.
        unsafe {
            DASessionUnscheduleFromRunLoop(
                self.inner.as_ptr(),
                sys::CFRunLoopGetCurrent(),
                sys::kCFRunLoopDefaultMode,
            );
        }
    }

    /// Opens a disk object for a BSD device name such as `disk0s1`.
    pub fn disk_from_bsd_name(&self, name: &str) -> AppleResult<Disk> {
        let c_name = std::ffi::CString::new(name)
            .map_err(|e| crate::errors::AppleError::Conversion(format!("BSD name: {e}")))?;
        // SAFETY: the session is live and the name outlives the call.
        let ptr =
            unsafe { DADiskCreateFromBSDName(kCFAllocatorDefault, self.inner.as_ptr(), c_name.as_ptr()) };
        // SAFETY: fresh owned reference (or null) from the create call.
        let inner = unsafe { CfType::from_create(ptr, "DADiskCreateFromBSDName") }?;
        Ok(Disk { inner })
    }
}

/// One disk or partition known to DiskArbitration.
#[derive(Debug, Clone)]
pub struct Disk {
    inner: CfType,
}

impl Disk {
    /// The BSD device name, read back from the disk object.
    pub fn bsd_name(&self) -> Option<String> {
        // SAFETY: the disk is live; the returned pointer (possibly null)
        // borrows from it and is copied out before this scope ends.
        let ptr = unsafe { DADiskGetBSDName(self.inner.as_ptr()) };
        if ptr.is_null() {
            return None;
        }
        // SAFETY: non-null pointers are null-terminated C strings.
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }

    /// Snapshot of the disk's description dictionary (`DAVolumeName`,
    /// `DAMediaSize`, `DAMediaRemovable`, ...).
    ///
    /// Returns `None` when DiskArbitration has no description, which is
    /// the case for BSD names that do not correspond to a mounted or
    /// known device.
    pub fn description(&self) -> AppleResult<Option<CfDictionary>> {
        // SAFETY: the disk is live; the copy rule applies to the result.
        let ptr = unsafe { DADiskCopyDescription(self.inner.as_ptr()) };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null owned reference from the copy call.
        let dict = unsafe { CfType::from_create(ptr, "DADiskCopyDescription") }?;
        Ok(Some(CfDictionary::from_type(dict)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_creates_and_schedules() {
        let session = DiskSession::new().unwrap();
        session.schedule_on_current_run_loop();
        session.unschedule_from_current_run_loop();
    }

    #[test]
    fn disk_round_trips_bsd_name() {
        let session = DiskSession::new().unwrap();
        // disk0 exists on every Mac (the boot device).
        let disk = session.disk_from_bsd_name("disk0").unwrap();
        assert_eq!(disk.bsd_name().as_deref(), Some("disk0"));
    }

    #[test]
    fn boot_disk_has_description() {
        let session = DiskSession::new().unwrap();
        let disk = session.disk_from_bsd_name("disk0").unwrap();
        let description = disk.description().unwrap().expect("disk0 is known");
        assert!(description.get("DAMediaSize").unwrap().is_some());
        assert_eq!(
            description.get_bool("DAMediaWhole").unwrap(),
            Some(true)
        );
    }

    #[test]
    fn unknown_bsd_name_has_no_description() {
        let session = DiskSession::new().unwrap();
        let disk = session.disk_from_bsd_name("disk987654").unwrap();
        assert!(disk.description().unwrap().is_none());
    }
}
