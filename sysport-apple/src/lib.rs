//! Safe Rust bindings for macOS system frameworks.
//!
//! Three layers, mirroring how the frameworks themselves stack:
//!
//! - [`cf`] — CoreFoundation object wrappers (`CfString`, `CfDictionary`,
//!   ...) with create/copy-rule ownership enforced by RAII;
//! - [`iokit`] — the device registry, reached through Mach ports;
//! - [`diskarb`] — DiskArbitration sessions and disks (DA types are CF
//!   types, so they reuse the [`cf`] layer).
//!
//! The [`kern`] and [`errors`] modules are platform-neutral so the error
//! contract compiles and tests on any host.

pub mod errors;
pub mod kern;

#[cfg(target_os = "macos")]
pub mod cf;
#[cfg(target_os = "macos")]
pub mod diskarb;
#[cfg(target_os = "macos")]
pub mod iokit;

pub use errors::{AppleError, AppleResult};

#[cfg(target_os = "macos")]
pub use cf::{CfArray, CfBoolean, CfData, CfDictionary, CfNumber, CfString, CfType, PlistValue};
#[cfg(target_os = "macos")]
pub use diskarb::{Disk, DiskSession};
#[cfg(target_os = "macos")]
pub use iokit::{RegistryEntry, ServiceIterator, first_matching_service, matching_services};
