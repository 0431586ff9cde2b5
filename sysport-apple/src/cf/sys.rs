//! Hand-declared FFI bindings to the CoreFoundation framework.
//!
//! Only the surface the safe wrappers need. Opaque types are modeled as
//! `*const c_void`; `Boolean` is the Carbon-era `unsigned char`, read
//! through `u8` and compared against zero.

#![allow(non_upper_case_globals)]

use std::ffi::{c_char, c_void};

/// A type-free reference to an opaque CoreFoundation object.
pub type CFTypeRef = *const c_void;
/// Unique identifier of a CoreFoundation opaque type.
pub type CFTypeID = usize;
/// Signed index/length type used throughout CoreFoundation.
pub type CFIndex = isize;
/// `unsigned char` boolean.
pub type Boolean = u8;

pub type CFAllocatorRef = *const c_void;
pub type CFStringRef = *const c_void;
pub type CFNumberRef = *const c_void;
pub type CFBooleanRef = *const c_void;
pub type CFDataRef = *const c_void;
pub type CFArrayRef = *const c_void;
pub type CFDictionaryRef = *const c_void;
pub type CFMutableDictionaryRef = *mut c_void;
pub type CFRunLoopRef = *const c_void;

/// String encoding selector; only UTF-8 is used here.
pub type CFStringEncoding = u32;
pub const kCFStringEncodingUTF8: CFStringEncoding = 0x0800_0100;

/// CFNumber storage-type selector.
pub type CFNumberType = CFIndex;
pub const kCFNumberSInt64Type: CFNumberType = 4;
pub const kCFNumberFloat64Type: CFNumberType = 6;

/// Null means "use the default allocator" wherever a `CFAllocatorRef`
/// is taken.
pub const kCFAllocatorDefault: CFAllocatorRef = std::ptr::null();

// SAFETY: signatures transcribed from the CoreFoundation headers.
#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    pub static kCFTypeDictionaryKeyCallBacks: c_void;
    pub static kCFTypeDictionaryValueCallBacks: c_void;
    pub static kCFTypeArrayCallBacks: c_void;
    pub static kCFRunLoopDefaultMode: CFStringRef;

    pub fn CFRetain(cf: CFTypeRef) -> CFTypeRef;
    pub fn CFRelease(cf: CFTypeRef);
    pub fn CFGetTypeID(cf: CFTypeRef) -> CFTypeID;
    pub fn CFCopyDescription(cf: CFTypeRef) -> CFStringRef;

    pub fn CFStringGetTypeID() -> CFTypeID;
    pub fn CFStringCreateWithBytes(
        allocator: CFAllocatorRef,
        bytes: *const u8,
        num_bytes: CFIndex,
        encoding: CFStringEncoding,
        is_external_representation: Boolean,
    ) -> CFStringRef;
    pub fn CFStringGetLength(string: CFStringRef) -> CFIndex;
    pub fn CFStringGetCStringPtr(string: CFStringRef, encoding: CFStringEncoding)
    -> *const c_char;
    pub fn CFStringGetCString(
        string: CFStringRef,
        buffer: *mut c_char,
        buffer_size: CFIndex,
        encoding: CFStringEncoding,
    ) -> Boolean;
    pub fn CFStringGetMaximumSizeForEncoding(
        length: CFIndex,
        encoding: CFStringEncoding,
    ) -> CFIndex;

    pub fn CFNumberGetTypeID() -> CFTypeID;
    pub fn CFNumberCreate(
        allocator: CFAllocatorRef,
        the_type: CFNumberType,
        value_ptr: *const c_void,
    ) -> CFNumberRef;
    pub fn CFNumberGetValue(
        number: CFNumberRef,
        the_type: CFNumberType,
        value_ptr: *mut c_void,
    ) -> Boolean;
    pub fn CFNumberIsFloatType(number: CFNumberRef) -> Boolean;

    pub fn CFBooleanGetTypeID() -> CFTypeID;
    pub fn CFBooleanGetValue(boolean: CFBooleanRef) -> Boolean;

    pub fn CFDataGetTypeID() -> CFTypeID;
    pub fn CFDataCreate(
        allocator: CFAllocatorRef,
        bytes: *const u8,
        length: CFIndex,
    ) -> CFDataRef;
    pub fn CFDataGetLength(data: CFDataRef) -> CFIndex;
    pub fn CFDataGetBytePtr(data: CFDataRef) -> *const u8;

    pub fn CFArrayGetTypeID() -> CFTypeID;
    pub fn CFArrayCreate(
        allocator: CFAllocatorRef,
        values: *const *const c_void,
        num_values: CFIndex,
        callbacks: *const c_void,
    ) -> CFArrayRef;
    pub fn CFArrayGetCount(array: CFArrayRef) -> CFIndex;
    pub fn CFArrayGetValueAtIndex(array: CFArrayRef, idx: CFIndex) -> *const c_void;

    pub fn CFDictionaryGetTypeID() -> CFTypeID;
    pub fn CFDictionaryCreate(
        allocator: CFAllocatorRef,
        keys: *const *const c_void,
        values: *const *const c_void,
        num_values: CFIndex,
        key_callbacks: *const c_void,
        value_callbacks: *const c_void,
    ) -> CFDictionaryRef;
    pub fn CFDictionaryGetCount(dict: CFDictionaryRef) -> CFIndex;
    pub fn CFDictionaryGetValue(dict: CFDictionaryRef, key: *const c_void) -> *const c_void;
    pub fn CFDictionaryGetKeysAndValues(
        dict: CFDictionaryRef,
        keys: *mut *const c_void,
        values: *mut *const c_void,
    );

    pub fn CFRunLoopGetCurrent() -> CFRunLoopRef;
}
