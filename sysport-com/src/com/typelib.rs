//! Type-library introspection over `ITypeLib` / `ITypeInfo`.
//!
//! The descriptor calls come in vendor-mandated Get/Release pairs
//! (`GetTypeAttr`/`ReleaseTypeAttr`, `GetFuncDesc`/`ReleaseFuncDesc`).
//! Every accessor here copies the descriptor into an owned snapshot and
//! releases the native block before returning, so no raw descriptor
//! pointer ever escapes.

use windows::Win32::System::Com::{ITypeInfo, ITypeLib, TYPEKIND};
use windows::Win32::System::Ole::LoadTypeLib;
use windows::core::{BSTR, GUID, PCWSTR};

use super::errors::{ComError, ComResult};

/// Kind of a type described by a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Enum,
    Record,
    Module,
    Interface,
    Dispatch,
    CoClass,
    Alias,
    Union,
    /// A TYPEKIND this library does not interpret.
    Other(i32),
}

impl From<TYPEKIND> for TypeKind {
    fn from(kind: TYPEKIND) -> Self {
        match kind.0 {
            0 => Self::Enum,
            1 => Self::Record,
            2 => Self::Module,
            3 => Self::Interface,
            4 => Self::Dispatch,
            5 => Self::CoClass,
            6 => Self::Alias,
            7 => Self::Union,
            other => Self::Other(other),
        }
    }
}

/// How a member is invoked, from `INVOKEKIND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Method,
    PropertyGet,
    PropertyPut,
    PropertyPutRef,
    Other(i32),
}

impl InvokeKind {
    fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Method,
            2 => Self::PropertyGet,
            4 => Self::PropertyPut,
            8 => Self::PropertyPutRef,
            other => Self::Other(other),
        }
    }
}

/// Owned snapshot of a `TYPEATTR` block.
#[derive(Debug, Clone)]
pub struct TypeAttributes {
    pub guid: GUID,
    pub locale_id: u32,
    pub kind: TypeKind,
    pub func_count: u16,
    pub var_count: u16,
    pub impl_count: u16,
    pub major_version: u16,
    pub minor_version: u16,
}

/// Owned snapshot of a `FUNCDESC` block, with the member's name resolved.
#[derive(Debug, Clone)]
pub struct FunctionDescription {
    pub member_id: i32,
    pub name: String,
    pub invoke_kind: InvokeKind,
    pub param_count: i16,
    pub optional_param_count: i16,
    /// Byte offset of the member's vtable slot, as the vendor declares it.
    pub vtable_offset: i16,
}

/// Name and doc string for a library or one of its members.
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    pub name: String,
    pub doc_string: String,
    pub help_context: u32,
}

/// Member id addressing a type or library itself in documentation calls.
const MEMBERID_NIL: i32 = -1;

/// A loaded type library.
#[derive(Debug, Clone)]
pub struct TypeLibrary {
    inner: ITypeLib,
}

impl TypeLibrary {
    /// Loads a registered library by file name or registry-resolvable
    /// name (e.g. `"stdole2.tlb"`).
    pub fn load(path: &str) -> ComResult<Self> {
        let wide: Vec<u16> = path.encode_utf16().chain(std::iter::once(0)).collect();
        // SAFETY: `wide` is null-terminated and outlives the call.
        let inner = unsafe { LoadTypeLib(PCWSTR(wide.as_ptr())) }?;
        Ok(Self { inner })
    }

    /// Wraps an already-acquired `ITypeLib`.
    #[must_use]
    pub fn from_interface(inner: ITypeLib) -> Self {
        Self { inner }
    }

    /// Number of type descriptions in the library.
    pub fn count(&self) -> u32 {
        // SAFETY: no preconditions.
        unsafe { self.inner.GetTypeInfoCount() }
    }

    /// Type description at `index`.
    pub fn type_info(&self, index: u32) -> ComResult<TypeInformation> {
        // SAFETY: an out-of-range index yields TYPE_E_ELEMENTNOTFOUND.
        let info = unsafe { self.inner.GetTypeInfo(index) }?;
        Ok(TypeInformation::new(info))
    }

    /// Type description for the type with the given GUID.
    pub fn type_info_of_guid(&self, guid: &GUID) -> ComResult<TypeInformation> {
        // SAFETY: a missing GUID yields TYPE_E_ELEMENTNOTFOUND.
        let info = unsafe { self.inner.GetTypeInfoOfGuid(guid) }?;
        Ok(TypeInformation::new(info))
    }

    /// Documentation for the library (`index == None`) or a contained
    /// type.
    #[allow(clippy::cast_possible_wrap)]
    pub fn documentation(&self, index: Option<u32>) -> ComResult<Documentation> {
        let mut name = BSTR::default();
        let mut doc_string = BSTR::default();
        let mut help_context = 0u32;
        // SAFETY: all out-pointers reference locals that outlive the call.
        unsafe {
            self.inner.GetDocumentation(
                index.map_or(MEMBERID_NIL, |i| i as i32),
                Some(&raw mut name),
                Some(&raw mut doc_string),
                &raw mut help_context,
                None,
            )?;
        }
        Ok(Documentation {
            name: name.to_string(),
            doc_string: doc_string.to_string(),
            help_context,
        })
    }

    /// All type descriptions, skipping entries the library fails to
    /// materialize.
    pub fn iter(&self) -> impl Iterator<Item = ComResult<TypeInformation>> + '_ {
        (0..self.count()).map(|i| self.type_info(i))
    }
}

/// A single type description.
#[derive(Debug, Clone)]
pub struct TypeInformation {
    inner: ITypeInfo,
}

impl TypeInformation {
    #[must_use]
    pub fn new(inner: ITypeInfo) -> Self {
        Self { inner }
    }

    /// The wrapped interface.
    #[must_use]
    pub fn interface(&self) -> &ITypeInfo {
        &self.inner
    }

    /// Copies the `TYPEATTR` block into an owned snapshot.
    pub fn attributes(&self) -> ComResult<TypeAttributes> {
        // SAFETY: GetTypeAttr hands out a block that must go back through
        // ReleaseTypeAttr on the same interface; it does, below, on every
        // path.
        let attr_ptr = unsafe { self.inner.GetTypeAttr() }?;
        if attr_ptr.is_null() {
            return Err(ComError::InvalidState("null TYPEATTR".to_string()));
        }
        // SAFETY: non-null and valid until released.
        let attr = unsafe { &*attr_ptr };
        let snapshot = TypeAttributes {
            guid: attr.guid,
            locale_id: attr.lcid,
            kind: TypeKind::from(attr.typekind),
            func_count: attr.cFuncs,
            var_count: attr.cVars,
            impl_count: attr.cImplTypes,
            major_version: attr.wMajorVerNum,
            minor_version: attr.wMinorVerNum,
        };
        // SAFETY: balances the GetTypeAttr above, exactly once.
        unsafe { self.inner.ReleaseTypeAttr(attr_ptr) };
        Ok(snapshot)
    }

    /// Copies the `FUNCDESC` at `index` into an owned snapshot, resolving
    /// the member name.
    pub fn function(&self, index: u32) -> ComResult<FunctionDescription> {
        // SAFETY: paired with ReleaseFuncDesc below on every path.
        let desc_ptr = unsafe { self.inner.GetFuncDesc(index) }?;
        if desc_ptr.is_null() {
            return Err(ComError::InvalidState("null FUNCDESC".to_string()));
        }
        // SAFETY: non-null and valid until released.
        let desc = unsafe { &*desc_ptr };
        let snapshot = FunctionDescription {
            member_id: desc.memid,
            name: String::new(),
            invoke_kind: InvokeKind::from_raw(desc.invkind.0),
            param_count: desc.cParams,
            optional_param_count: desc.cParamsOpt,
            vtable_offset: desc.oVft,
        };
        let member_id = desc.memid;
        // SAFETY: balances the GetFuncDesc above, exactly once.
        unsafe { self.inner.ReleaseFuncDesc(desc_ptr) };

        let name = self
            .names(member_id, 1)?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(FunctionDescription { name, ..snapshot })
    }

    /// All function descriptions of this type.
    pub fn functions(&self) -> ComResult<Vec<FunctionDescription>> {
        let count = u32::from(self.attributes()?.func_count);
        (0..count).map(|i| self.function(i)).collect()
    }

    /// Member and parameter names for `member_id`, the member name first.
    pub fn names(&self, member_id: i32, max: usize) -> ComResult<Vec<String>> {
        let mut names = vec![BSTR::default(); max.max(1)];
        let mut fetched = 0u32;
        // SAFETY: `names` has room for the requested count; `fetched`
        // outlives the call.
        unsafe {
            self.inner
                .GetNames(member_id, names.as_mut_slice(), &raw mut fetched)?;
        }
        names.truncate(fetched as usize);
        Ok(names.into_iter().map(|b| b.to_string()).collect())
    }

    /// Documentation for one member, or the type itself with
    /// `member_id == MEMBERID_NIL`.
    pub fn documentation(&self, member_id: i32) -> ComResult<Documentation> {
        let mut name = BSTR::default();
        let mut doc_string = BSTR::default();
        let mut help_context = 0u32;
        // SAFETY: all out-pointers reference locals that outlive the call.
        unsafe {
            self.inner.GetDocumentation(
                member_id,
                Some(&raw mut name),
                Some(&raw mut doc_string),
                &raw mut help_context,
                None,
            )?;
        }
        Ok(Documentation {
            name: name.to_string(),
            doc_string: doc_string.to_string(),
            help_context,
        })
    }

    /// The library this type lives in, plus the type's index there.
    pub fn containing_library(&self) -> ComResult<(TypeLibrary, u32)> {
        let mut lib: Option<ITypeLib> = None;
        let mut index = 0u32;
        // SAFETY: both out-pointers reference locals that outlive the
        // call.
        unsafe {
            self.inner
                .GetContainingTypeLib(&raw mut lib, &raw mut index)?;
        }
        let lib = lib.ok_or_else(|| {
            ComError::InvalidState("GetContainingTypeLib returned null".to_string())
        })?;
        Ok((TypeLibrary::from_interface(lib), index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use windows::Win32::System::Com::TYPEKIND;

    #[test]
    fn type_kind_mapping_matches_vendor_order() {
        assert_eq!(TypeKind::from(TYPEKIND(4)), TypeKind::Dispatch);
        assert_eq!(TypeKind::from(TYPEKIND(5)), TypeKind::CoClass);
        assert_eq!(TypeKind::from(TYPEKIND(42)), TypeKind::Other(42));
    }

    #[test]
    fn invoke_kind_bits() {
        assert_eq!(InvokeKind::from_raw(1), InvokeKind::Method);
        assert_eq!(InvokeKind::from_raw(4), InvokeKind::PropertyPut);
        assert_eq!(InvokeKind::from_raw(16), InvokeKind::Other(16));
    }

    // stdole2.tlb ships with every Windows install and registers itself,
    // which makes it a stable introspection target.
    #[test]
    fn stdole_introspection() {
        let _guard = crate::com::guard::ComGuard::new().unwrap();
        let lib = TypeLibrary::load("stdole2.tlb").unwrap();
        assert!(lib.count() > 0);

        let doc = lib.documentation(None).unwrap();
        assert_eq!(doc.name, "stdole");

        let mut saw_dispatch = false;
        for info in lib.iter() {
            let info = info.unwrap();
            let attrs = info.attributes().unwrap();
            if attrs.kind == TypeKind::Dispatch {
                saw_dispatch = true;
                // Every dispatch type carries the IDispatch base methods.
                assert!(attrs.func_count > 0 || attrs.impl_count > 0);
            }
        }
        assert!(saw_dispatch, "stdole2 should contain dispatch types");
    }

    #[test]
    fn containing_library_round_trip() {
        let _guard = crate::com::guard::ComGuard::new().unwrap();
        let lib = TypeLibrary::load("stdole2.tlb").unwrap();
        let info = lib.type_info(0).unwrap();
        let (parent, index) = info.containing_library().unwrap();
        assert_eq!(index, 0);
        assert_eq!(
            parent.documentation(None).unwrap().name,
            lib.documentation(None).unwrap().name
        );
    }
}
