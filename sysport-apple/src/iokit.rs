//! IOKit registry access over Mach ports.
//!
//! Registry handles are Mach port names; every handle returned by the
//! framework carries one reference that [`RegistryEntry`] and
//! [`ServiceIterator`] release on drop. Matching dictionaries are CF
//! dictionaries, but `IOServiceGetMatchingService(s)` consumes the
//! caller's reference, so the raw pointer is handed over unwrapped.

use std::ffi::{CString, c_char};

use mach2::kern_return::kern_return_t;
use mach2::port::mach_port_t;

use crate::cf::sys::{CFAllocatorRef, CFMutableDictionaryRef, CFTypeRef, kCFAllocatorDefault};
use crate::cf::{CfDictionary, CfString, CfType, PlistValue};
use crate::errors::{AppleError, AppleResult};

/// Registry handles are Mach port names.
#[allow(non_camel_case_types)]
pub type io_object_t = mach_port_t;
#[allow(non_camel_case_types)]
pub type io_iterator_t = mach_port_t;

const IO_OBJECT_NULL: io_object_t = 0;

/// Registry names are fixed 128-byte C buffers.
const IO_NAME_SIZE: usize = 128;

/// The service plane, used for parent traversal.
const IOSERVICE_PLANE: &[u8] = b"IOService\0";

// SAFETY: signatures transcribed from the IOKit headers.
#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    #[allow(non_upper_case_globals)]
    pub static kIOMasterPortDefault: mach_port_t;

    fn IOServiceMatching(name: *const c_char) -> CFMutableDictionaryRef;
    fn IOServiceGetMatchingService(
        master_port: mach_port_t,
        matching: CFMutableDictionaryRef,
    ) -> io_object_t;
    fn IOServiceGetMatchingServices(
        master_port: mach_port_t,
        matching: CFMutableDictionaryRef,
        existing: *mut io_iterator_t,
    ) -> kern_return_t;

    fn IOIteratorNext(iterator: io_iterator_t) -> io_object_t;
    fn IOIteratorReset(iterator: io_iterator_t);
    fn IOIteratorIsValid(iterator: io_iterator_t) -> u8;

    fn IOObjectRetain(object: io_object_t) -> kern_return_t;
    fn IOObjectRelease(object: io_object_t) -> kern_return_t;

    fn IORegistryEntryGetName(entry: io_object_t, name: *mut c_char) -> kern_return_t;
    fn IORegistryEntryCreateCFProperty(
        entry: io_object_t,
        key: CFTypeRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> CFTypeRef;
    fn IORegistryEntryCreateCFProperties(
        entry: io_object_t,
        properties: *mut CFMutableDictionaryRef,
        allocator: CFAllocatorRef,
        options: u32,
    ) -> kern_return_t;
    fn IORegistryEntryGetParentEntry(
        entry: io_object_t,
        plane: *const c_char,
        parent: *mut io_object_t,
    ) -> kern_return_t;
}

/// Builds a class-matching dictionary, still owned by the caller.
fn matching_dictionary(class_name: &str) -> AppleResult<CFMutableDictionaryRef> {
    let name = CString::new(class_name)
        .map_err(|e| AppleError::Conversion(format!("class name: {e}")))?;
    // SAFETY: the C string outlives the call.
    let dict = unsafe { IOServiceMatching(name.as_ptr()) };
    if dict.is_null() {
        return Err(AppleError::NullReturn(format!(
            "IOServiceMatching({class_name})"
        )));
    }
    Ok(dict)
}

/// Finds the first service whose class matches `class_name`.
pub fn first_matching_service(class_name: &str) -> AppleResult<Option<RegistryEntry>> {
    let matching = matching_dictionary(class_name)?;
    // SAFETY: the call consumes the matching dictionary reference; the
    // returned handle (if any) carries a reference we now own.
    let handle = unsafe { IOServiceGetMatchingService(kIOMasterPortDefault, matching) };
    if handle == IO_OBJECT_NULL {
        return Ok(None);
    }
    Ok(Some(RegistryEntry { handle }))
}

/// Finds all services whose class matches `class_name`.
pub fn matching_services(class_name: &str) -> AppleResult<ServiceIterator> {
    let matching = matching_dictionary(class_name)?;
    let mut iterator: io_iterator_t = IO_OBJECT_NULL;
    // SAFETY: the call consumes the matching dictionary reference and
    // fills the iterator handle on success.
    let code =
        unsafe { IOServiceGetMatchingServices(kIOMasterPortDefault, matching, &mut iterator) };
    AppleError::check(code)?;
    tracing::debug!(class_name, "registry iterator opened");
    Ok(ServiceIterator { handle: iterator })
}

/// One entry in the IOKit registry.
#[derive(Debug)]
pub struct RegistryEntry {
    handle: io_object_t,
}

impl RegistryEntry {
    /// The entry's registry name (its class or node name).
    pub fn name(&self) -> AppleResult<String> {
        let mut buffer = [0 as c_char; IO_NAME_SIZE];
        // SAFETY: the buffer is the fixed io_name_t size the API writes.
        let code = unsafe { IORegistryEntryGetName(self.handle, buffer.as_mut_ptr()) };
        AppleError::check(code)?;
        let bytes: Vec<u8> = buffer
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// One registry property by key, converted to a plist value.
    pub fn property(&self, key: &str) -> AppleResult<Option<PlistValue>> {
        let key = CfString::new(key)?;
        // SAFETY: the key reference is valid; the returned object (or
        // null) follows the create rule and `from_create` owns it.
        let ptr = unsafe {
            IORegistryEntryCreateCFProperty(
                self.handle,
                key.as_type().as_ptr(),
                kCFAllocatorDefault,
                0,
            )
        };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null owned reference from the create call.
        let value = unsafe { CfType::from_create(ptr, "IORegistryEntryCreateCFProperty") }?;
        Ok(Some(PlistValue::from_cf(&value)))
    }

    /// Every property of the entry, as one plist dictionary.
    pub fn properties(&self) -> AppleResult<PlistValue> {
        let mut dict: CFMutableDictionaryRef = std::ptr::null_mut();
        // SAFETY: the out pointer receives an owned dictionary reference
        // on success.
        let code = unsafe {
            IORegistryEntryCreateCFProperties(self.handle, &mut dict, kCFAllocatorDefault, 0)
        };
        AppleError::check(code)?;
        // SAFETY: owned reference from the create call above.
        let dict = unsafe {
            CfType::from_create(dict.cast_const(), "IORegistryEntryCreateCFProperties")
        }?;
        let dict = CfDictionary::from_type(dict)?;
        Ok(PlistValue::from_cf(dict.as_type()))
    }

    /// The entry's parent in the service plane, if it has one.
    pub fn parent(&self) -> AppleResult<Option<RegistryEntry>> {
        let mut parent: io_object_t = IO_OBJECT_NULL;
        // SAFETY: the plane name is a null-terminated literal; the out
        // handle carries a reference we own on success.
        let code = unsafe {
            IORegistryEntryGetParentEntry(
                self.handle,
                IOSERVICE_PLANE.as_ptr().cast::<c_char>(),
                &mut parent,
            )
        };
        // The root of the plane has no parent.
        if code != 0 {
            return Ok(None);
        }
        if parent == IO_OBJECT_NULL {
            return Ok(None);
        }
        Ok(Some(RegistryEntry { handle: parent }))
    }
}

impl Clone for RegistryEntry {
    fn clone(&self) -> Self {
        // SAFETY: the handle is live; the retain pays for the new owner.
        let code = unsafe { IOObjectRetain(self.handle) };
        if code != 0 {
            tracing::error!(code, "IOObjectRetain failed");
        }
        Self {
            handle: self.handle,
        }
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        // SAFETY: releases the one reference this wrapper owns.
        let code = unsafe { IOObjectRelease(self.handle) };
        if code != 0 {
            tracing::error!(code, "IOObjectRelease failed");
        }
    }
}

/// Walks the services produced by a matching query.
#[derive(Debug)]
pub struct ServiceIterator {
    handle: io_iterator_t,
}

impl ServiceIterator {
    /// Rewinds the iterator. Also the recovery step when the registry
    /// changed mid-walk and [`Self::is_valid`] went false.
    pub fn reset(&mut self) {
        // SAFETY: the iterator handle is live.
        unsafe { IOIteratorReset(self.handle) };
    }

    /// False when the registry mutated underneath the iterator.
    pub fn is_valid(&self) -> bool {
        // SAFETY: the iterator handle is live.
        unsafe { IOIteratorIsValid(self.handle) != 0 }
    }
}

impl Iterator for ServiceIterator {
    type Item = RegistryEntry;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: the iterator handle is live; a returned handle carries
        // a reference the entry now owns.
        let handle = unsafe { IOIteratorNext(self.handle) };
        if handle == IO_OBJECT_NULL {
            return None;
        }
        Some(RegistryEntry { handle })
    }
}

impl Drop for ServiceIterator {
    fn drop(&mut self) {
        // SAFETY: releases the iterator's own handle.
        let code = unsafe { IOObjectRelease(self.handle) };
        if code != 0 {
            tracing::error!(code, "IOObjectRelease failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These walk the live registry; the classes used exist on every Mac.

    #[test]
    fn platform_expert_device_exists() {
        let entry = first_matching_service("IOPlatformExpertDevice")
            .unwrap()
            .expect("every Mac has a platform expert");
        assert!(!entry.name().unwrap().is_empty());
    }

    #[test]
    fn platform_serial_number_property() {
        let entry = first_matching_service("IOPlatformExpertDevice")
            .unwrap()
            .unwrap();
        let serial = entry.property("IOPlatformSerialNumber").unwrap();
        assert!(matches!(serial, Some(PlistValue::String(_))));
        assert!(entry.property("NoSuchProperty_7f3a").unwrap().is_none());
    }

    #[test]
    fn properties_returns_dictionary() {
        let entry = first_matching_service("IOPlatformExpertDevice")
            .unwrap()
            .unwrap();
        let PlistValue::Dictionary(entries) = entry.properties().unwrap() else {
            panic!("expected a dictionary");
        };
        assert!(!entries.is_empty());
    }

    #[test]
    fn iterator_walks_and_resets() {
        let mut services = matching_services("IOService").unwrap();
        assert!(services.next().is_some());
        services.reset();
        assert!(services.next().is_some());
        assert!(services.is_valid());
    }

    #[test]
    fn parent_traversal_reaches_root() {
        let entry = first_matching_service("IOPlatformExpertDevice")
            .unwrap()
            .unwrap();
        // The platform expert sits near the top; walking up terminates.
        let mut current = entry;
        for _ in 0..16 {
            match current.parent().unwrap() {
                Some(parent) => current = parent,
                None => return,
            }
        }
        panic!("parent chain did not terminate");
    }

    #[test]
    fn unknown_class_matches_nothing() {
        assert!(
            first_matching_service("DefinitelyNotARealIOKitClass")
                .unwrap()
                .is_none()
        );
    }
}
