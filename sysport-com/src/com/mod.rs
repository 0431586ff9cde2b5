//! Windows COM/OLE Automation bindings.
//!
//! Thin proxies over vendor-defined interfaces: each wrapper owns a native
//! interface pointer, forwards calls through the fixed vtable layout, and
//! converts HRESULT failures into [`errors::ComError`].

#![allow(
    clippy::undocumented_unsafe_blocks,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::unreadable_literal
)]

pub mod accessibility;
pub mod dispatch;
pub mod enums;
pub mod errors;
pub mod events;
pub mod guard;
pub mod memory;
pub mod running;
pub mod typelib;
pub mod variant;
pub mod vtable;
pub mod wmi;
