//! Safe wrappers over CoreFoundation objects.
//!
//! Ownership follows the frameworks' create/copy rule: constructors named
//! after `Create`/`Copy` calls own the reference they receive, everything
//! obtained under the get rule is retained before it is wrapped. Dropping
//! a wrapper releases exactly the reference it owns.

pub mod plist;
pub mod sys;

pub use plist::PlistValue;

use std::ffi::{CStr, c_char, c_void};

use crate::errors::{AppleError, AppleResult};
use sys::{CFIndex, CFTypeID, CFTypeRef, kCFAllocatorDefault, kCFStringEncodingUTF8};

/// An owned reference to any CoreFoundation object.
#[derive(Debug)]
pub struct CfType {
    ptr: CFTypeRef,
}

impl CfType {
    /// Wraps a reference returned by a `Create`/`Copy`-rule call, taking
    /// ownership of it.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a valid CF object reference the caller owns.
    pub unsafe fn from_create(ptr: CFTypeRef, what: &str) -> AppleResult<Self> {
        if ptr.is_null() {
            return Err(AppleError::NullReturn(what.to_string()));
        }
        Ok(Self { ptr })
    }

    /// Wraps a reference obtained under the get rule, retaining it first.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a valid CF object reference that stays valid
    /// for the duration of this call.
    pub unsafe fn from_get(ptr: CFTypeRef) -> Option<Self> {
        if ptr.is_null() {
            return None;
        }
        // SAFETY: caller guarantees `ptr` is valid; the retain makes the
        // wrapped reference ours.
        unsafe { sys::CFRetain(ptr) };
        Some(Self { ptr })
    }

    /// The raw reference, still owned by `self`.
    pub const fn as_ptr(&self) -> CFTypeRef {
        self.ptr
    }

    /// Runtime type of the wrapped object.
    pub fn type_id(&self) -> CFTypeID {
        // SAFETY: `self.ptr` is a valid owned reference.
        unsafe { sys::CFGetTypeID(self.ptr) }
    }

    /// The object's `CFCopyDescription`, mostly useful in logs.
    pub fn description(&self) -> String {
        // SAFETY: `self.ptr` is valid; the copy rule applies to the
        // returned string, which `CfString` then owns.
        let desc = unsafe { sys::CFCopyDescription(self.ptr) };
        // SAFETY: a fresh owned reference (or null) from the line above.
        match unsafe { Self::from_create(desc, "CFCopyDescription") } {
            Ok(inner) => CfString { inner }.to_string_lossy(),
            Err(_) => String::new(),
        }
    }
}

impl Clone for CfType {
    fn clone(&self) -> Self {
        // SAFETY: `self.ptr` is a valid owned reference; the retain pays
        // for the new owner.
        unsafe { sys::CFRetain(self.ptr) };
        Self { ptr: self.ptr }
    }
}

impl Drop for CfType {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` is the one reference this wrapper owns.
        unsafe { sys::CFRelease(self.ptr) };
    }
}

/// Checks the runtime type before wrapping, so typed accessors can rely
/// on the discriminant.
fn downcast(inner: CfType, expected: CFTypeID, what: &str) -> AppleResult<CfType> {
    if inner.type_id() == expected {
        Ok(inner)
    } else {
        Err(AppleError::Conversion(format!(
            "object is not a {what} (type id {})",
            inner.type_id()
        )))
    }
}

/// An owned `CFString`.
#[derive(Debug, Clone)]
pub struct CfString {
    inner: CfType,
}

impl CfString {
    /// Creates a `CFString` from UTF-8 text.
    pub fn new(text: &str) -> AppleResult<Self> {
        // SAFETY: the byte slice is valid for the call; the encoding flag
        // matches its contents.
        let ptr = unsafe {
            sys::CFStringCreateWithBytes(
                kCFAllocatorDefault,
                text.as_ptr(),
                CFIndex::try_from(text.len())
                    .map_err(|e| AppleError::Conversion(e.to_string()))?,
                kCFStringEncodingUTF8,
                0,
            )
        };
        // SAFETY: fresh owned reference (or null) from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFStringCreateWithBytes") }?;
        Ok(Self { inner })
    }

    /// Wraps an untyped object after verifying it is a string.
    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFStringGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFString")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    /// Reads the string back as UTF-8, taking the zero-copy
    /// `CFStringGetCStringPtr` fast path when the framework offers it.
    pub fn to_string_lossy(&self) -> String {
        // SAFETY: the reference is valid; the returned pointer (possibly
        // null) borrows from the string, which outlives this scope.
        let fast = unsafe { sys::CFStringGetCStringPtr(self.inner.as_ptr(), kCFStringEncodingUTF8) };
        if !fast.is_null() {
            // SAFETY: non-null fast-path pointers are null-terminated
            // UTF-8 per the encoding we requested.
            return unsafe { CStr::from_ptr(fast) }.to_string_lossy().into_owned();
        }

        // SAFETY: length query on a valid reference.
        let length = unsafe { sys::CFStringGetLength(self.inner.as_ptr()) };
        // SAFETY: pure arithmetic helper.
        let max = unsafe { sys::CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8) };
        #[allow(clippy::cast_sign_loss)]
        let mut buffer = vec![0u8; max as usize + 1];
        // SAFETY: the buffer is sized for the worst-case UTF-8 expansion
        // plus the terminator.
        let ok = unsafe {
            sys::CFStringGetCString(
                self.inner.as_ptr(),
                buffer.as_mut_ptr().cast::<c_char>(),
                buffer.len() as CFIndex,
                kCFStringEncodingUTF8,
            )
        };
        if ok == 0 {
            return String::new();
        }
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
        buffer.truncate(end);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl std::fmt::Display for CfString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

/// An owned `CFNumber`.
#[derive(Debug, Clone)]
pub struct CfNumber {
    inner: CfType,
}

impl CfNumber {
    pub fn from_i64(value: i64) -> AppleResult<Self> {
        // SAFETY: the value pointer matches kCFNumberSInt64Type and
        // outlives the call.
        let ptr = unsafe {
            sys::CFNumberCreate(
                kCFAllocatorDefault,
                sys::kCFNumberSInt64Type,
                (&raw const value).cast::<c_void>(),
            )
        };
        // SAFETY: fresh owned reference from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFNumberCreate") }?;
        Ok(Self { inner })
    }

    pub fn from_f64(value: f64) -> AppleResult<Self> {
        // SAFETY: the value pointer matches kCFNumberFloat64Type and
        // outlives the call.
        let ptr = unsafe {
            sys::CFNumberCreate(
                kCFAllocatorDefault,
                sys::kCFNumberFloat64Type,
                (&raw const value).cast::<c_void>(),
            )
        };
        // SAFETY: fresh owned reference from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFNumberCreate") }?;
        Ok(Self { inner })
    }

    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFNumberGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFNumber")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    /// Whether the stored value is floating point.
    pub fn is_float(&self) -> bool {
        // SAFETY: valid reference, pure query.
        unsafe { sys::CFNumberIsFloatType(self.inner.as_ptr()) != 0 }
    }

    /// Reads the value as `i64`; lossy conversions are reported as
    /// errors by the framework.
    pub fn to_i64(&self) -> AppleResult<i64> {
        let mut value = 0i64;
        // SAFETY: the out pointer matches kCFNumberSInt64Type.
        let ok = unsafe {
            sys::CFNumberGetValue(
                self.inner.as_ptr(),
                sys::kCFNumberSInt64Type,
                (&raw mut value).cast::<c_void>(),
            )
        };
        if ok == 0 {
            return Err(AppleError::Conversion(
                "CFNumber does not fit in i64".to_string(),
            ));
        }
        Ok(value)
    }

    pub fn to_f64(&self) -> AppleResult<f64> {
        let mut value = 0f64;
        // SAFETY: the out pointer matches kCFNumberFloat64Type.
        let ok = unsafe {
            sys::CFNumberGetValue(
                self.inner.as_ptr(),
                sys::kCFNumberFloat64Type,
                (&raw mut value).cast::<c_void>(),
            )
        };
        if ok == 0 {
            return Err(AppleError::Conversion(
                "CFNumber not representable as f64".to_string(),
            ));
        }
        Ok(value)
    }
}

/// An owned `CFBoolean`.
#[derive(Debug, Clone)]
pub struct CfBoolean {
    inner: CfType,
}

impl CfBoolean {
    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFBooleanGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFBoolean")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    pub fn value(&self) -> bool {
        // SAFETY: valid reference, pure query.
        unsafe { sys::CFBooleanGetValue(self.inner.as_ptr()) != 0 }
    }
}

/// An owned `CFData`.
#[derive(Debug, Clone)]
pub struct CfData {
    inner: CfType,
}

impl CfData {
    pub fn from_bytes(bytes: &[u8]) -> AppleResult<Self> {
        // SAFETY: the slice is valid for the call; CFData copies it.
        let ptr = unsafe {
            sys::CFDataCreate(
                kCFAllocatorDefault,
                bytes.as_ptr(),
                CFIndex::try_from(bytes.len())
                    .map_err(|e| AppleError::Conversion(e.to_string()))?,
            )
        };
        // SAFETY: fresh owned reference from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFDataCreate") }?;
        Ok(Self { inner })
    }

    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFDataGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFData")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn len(&self) -> usize {
        // SAFETY: valid reference, pure query.
        unsafe { sys::CFDataGetLength(self.inner.as_ptr()) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        let len = self.len();
        if len == 0 {
            return Vec::new();
        }
        // SAFETY: the byte pointer borrows from the data object, which
        // outlives this scope; `len` bytes are readable.
        unsafe {
            let ptr = sys::CFDataGetBytePtr(self.inner.as_ptr());
            std::slice::from_raw_parts(ptr, len).to_vec()
        }
    }
}

/// An owned `CFArray`.
#[derive(Debug, Clone)]
pub struct CfArray {
    inner: CfType,
}

impl CfArray {
    /// Builds an array retaining every element.
    pub fn from_values(values: &[&CfType]) -> AppleResult<Self> {
        let raw: Vec<*const c_void> = values.iter().map(|v| v.as_ptr()).collect();
        // SAFETY: the pointer slice is valid for the call; the type
        // callbacks retain each element.
        let ptr = unsafe {
            sys::CFArrayCreate(
                kCFAllocatorDefault,
                raw.as_ptr(),
                raw.len() as CFIndex,
                &raw const sys::kCFTypeArrayCallBacks,
            )
        };
        // SAFETY: fresh owned reference from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFArrayCreate") }?;
        Ok(Self { inner })
    }

    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFArrayGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFArray")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn len(&self) -> usize {
        // SAFETY: valid reference, pure query.
        unsafe { sys::CFArrayGetCount(self.inner.as_ptr()) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index`, retained under the get rule.
    pub fn get(&self, index: usize) -> Option<CfType> {
        if index >= self.len() {
            return None;
        }
        // SAFETY: the index is in bounds; the returned reference follows
        // the get rule and `from_get` retains it.
        unsafe {
            let ptr = sys::CFArrayGetValueAtIndex(self.inner.as_ptr(), index as CFIndex);
            CfType::from_get(ptr)
        }
    }
}

/// An owned `CFDictionary` with CF-object keys and values.
#[derive(Debug, Clone)]
pub struct CfDictionary {
    inner: CfType,
}

impl CfDictionary {
    /// Builds a dictionary retaining every key and value.
    pub fn from_pairs(pairs: &[(&CfString, &CfType)]) -> AppleResult<Self> {
        let keys: Vec<*const c_void> = pairs.iter().map(|(k, _)| k.as_type().as_ptr()).collect();
        let values: Vec<*const c_void> = pairs.iter().map(|(_, v)| v.as_ptr()).collect();
        // SAFETY: key/value slices are parallel and valid for the call;
        // the type callbacks retain every entry.
        let ptr = unsafe {
            sys::CFDictionaryCreate(
                kCFAllocatorDefault,
                keys.as_ptr(),
                values.as_ptr(),
                pairs.len() as CFIndex,
                &raw const sys::kCFTypeDictionaryKeyCallBacks,
                &raw const sys::kCFTypeDictionaryValueCallBacks,
            )
        };
        // SAFETY: fresh owned reference from the create call.
        let inner = unsafe { CfType::from_create(ptr, "CFDictionaryCreate") }?;
        Ok(Self { inner })
    }

    pub fn from_type(inner: CfType) -> AppleResult<Self> {
        // SAFETY: pure type-ID query.
        let expected = unsafe { sys::CFDictionaryGetTypeID() };
        Ok(Self {
            inner: downcast(inner, expected, "CFDictionary")?,
        })
    }

    pub const fn as_type(&self) -> &CfType {
        &self.inner
    }

    #[allow(clippy::cast_sign_loss)]
    pub fn len(&self) -> usize {
        // SAFETY: valid reference, pure query.
        unsafe { sys::CFDictionaryGetCount(self.inner.as_ptr()) as usize }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a value by string key, retained under the get rule.
    pub fn get(&self, key: &str) -> AppleResult<Option<CfType>> {
        let key = CfString::new(key)?;
        // SAFETY: both references are valid; the returned value follows
        // the get rule and `from_get` retains it.
        Ok(unsafe {
            let ptr = sys::CFDictionaryGetValue(self.inner.as_ptr(), key.as_type().as_ptr());
            CfType::from_get(ptr)
        })
    }

    /// Typed lookup: the value must be a `CFString`.
    pub fn get_string(&self, key: &str) -> AppleResult<Option<String>> {
        match self.get(key)? {
            Some(value) => Ok(Some(CfString::from_type(value)?.to_string_lossy())),
            None => Ok(None),
        }
    }

    /// Typed lookup: the value must be a `CFNumber`.
    pub fn get_i64(&self, key: &str) -> AppleResult<Option<i64>> {
        match self.get(key)? {
            Some(value) => Ok(Some(CfNumber::from_type(value)?.to_i64()?)),
            None => Ok(None),
        }
    }

    /// Typed lookup: the value must be a `CFBoolean`.
    pub fn get_bool(&self, key: &str) -> AppleResult<Option<bool>> {
        match self.get(key)? {
            Some(value) => Ok(Some(CfBoolean::from_type(value)?.value())),
            None => Ok(None),
        }
    }

    /// All entries, keys and values retained.
    pub fn entries(&self) -> Vec<(CfType, CfType)> {
        let count = self.len();
        let mut keys: Vec<*const c_void> = vec![std::ptr::null(); count];
        let mut values: Vec<*const c_void> = vec![std::ptr::null(); count];
        // SAFETY: both buffers hold `count` pointer slots, the size the
        // API requires; returned references follow the get rule.
        unsafe {
            sys::CFDictionaryGetKeysAndValues(
                self.inner.as_ptr(),
                keys.as_mut_ptr(),
                values.as_mut_ptr(),
            );
        }
        keys.into_iter()
            .zip(values)
            .filter_map(|(k, v)| {
                // SAFETY: pointers written by the call above are valid
                // while the dictionary is alive; retained here.
                let pair = unsafe { (CfType::from_get(k), CfType::from_get(v)) };
                match pair {
                    (Some(k), Some(v)) => Some((k, v)),
                    _ => None,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_round_trip_ascii() {
        let s = CfString::new("IOMedia").unwrap();
        assert_eq!(s.to_string_lossy(), "IOMedia");
    }

    #[test]
    fn string_round_trip_needs_buffer_path() {
        // Non-ASCII text defeats the CFStringGetCStringPtr fast path.
        let s = CfString::new("disque dur — überprüfung").unwrap();
        assert_eq!(s.to_string_lossy(), "disque dur — überprüfung");
    }

    #[test]
    fn clone_and_drop_balance_refcounts() {
        let s = CfString::new("retained").unwrap();
        let copy = s.clone();
        drop(s);
        assert_eq!(copy.to_string_lossy(), "retained");
    }

    #[test]
    fn number_int_and_float() {
        let n = CfNumber::from_i64(8_589_934_592).unwrap();
        assert!(!n.is_float());
        assert_eq!(n.to_i64().unwrap(), 8_589_934_592);

        let f = CfNumber::from_f64(2.5).unwrap();
        assert!(f.is_float());
        assert!((f.to_f64().unwrap() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn data_round_trip() {
        let d = CfData::from_bytes(&[1, 2, 3]).unwrap();
        assert_eq!(d.len(), 3);
        assert_eq!(d.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn array_indexing() {
        let a = CfString::new("a").unwrap();
        let b = CfString::new("b").unwrap();
        let array = CfArray::from_values(&[a.as_type(), b.as_type()]).unwrap();
        assert_eq!(array.len(), 2);
        let first = CfString::from_type(array.get(0).unwrap()).unwrap();
        assert_eq!(first.to_string_lossy(), "a");
        assert!(array.get(2).is_none());
    }

    #[test]
    fn dictionary_typed_getters() {
        let name_key = CfString::new("Name").unwrap();
        let size_key = CfString::new("Size").unwrap();
        let name = CfString::new("disk0").unwrap();
        let size = CfNumber::from_i64(500_000_000_000).unwrap();
        let dict = CfDictionary::from_pairs(&[
            (&name_key, name.as_type()),
            (&size_key, size.as_type()),
        ])
        .unwrap();

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get_string("Name").unwrap().unwrap(), "disk0");
        assert_eq!(dict.get_i64("Size").unwrap().unwrap(), 500_000_000_000);
        assert!(dict.get("Missing").unwrap().is_none());
        // Wrong-type lookup is an error, not a silent None.
        assert!(dict.get_i64("Name").is_err());
    }

    #[test]
    fn type_id_discriminates() {
        let s = CfString::new("x").unwrap();
        let n = CfNumber::from_i64(1).unwrap();
        assert_ne!(s.as_type().type_id(), n.as_type().type_id());
        assert!(CfNumber::from_type(s.as_type().clone()).is_err());
    }
}
