//! # sysport-com
//!
//! Safe Rust bindings for the Windows COM/OLE Automation surface:
//! IUnknown reference counting, IDispatch late binding, VARIANT marshaling,
//! type-library introspection, connection points, the Running Object Table,
//! MSAA accessibility and WMI/WBEM queries.
//!
//! Every wrapper stores a native interface pointer and forwards calls
//! through the vendor-defined vtable layout; nothing here re-invents COM
//! semantics. On non-Windows targets only the platform-neutral helpers
//! ([`hresult`], [`ole_time`]) are compiled.

pub mod hresult;
pub mod ole_time;

#[cfg(windows)]
pub mod com;

// Stable public API
#[cfg(windows)]
pub use com::{
    accessibility::Accessible,
    dispatch::Dispatch,
    enums::VariantIterator,
    errors::{ComError, ComResult},
    events::{AdviseCookie, ConnectionPoints},
    guard::ComGuard,
    memory::{TaskMem, TaskMemArray},
    running::RunningObjectTable,
    typelib::{TypeInformation, TypeLibrary},
    variant::Value,
    vtable::RawUnknown,
    wmi::{WbemConnection, WbemObject},
};
