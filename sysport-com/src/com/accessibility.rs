//! Microsoft Active Accessibility (MSAA) over `IAccessible`.
//!
//! An accessible element is addressed as an interface pointer plus a
//! child id: `CHILDID_SELF` (0) for the element itself, positive ids for
//! simple children. Children enumerate as a mixed list of full
//! `IDispatch` elements and simple ids — both shapes travel in VARIANTs,
//! as the vendor defines.

use windows::Win32::Foundation::HWND;
use windows::Win32::System::Com::IDispatch;
use windows::Win32::System::Variant::VARIANT;
use windows::Win32::UI::Accessibility::{
    AccessibleChildren, AccessibleObjectFromWindow, GetRoleTextW, IAccessible,
};
use windows::Win32::UI::WindowsAndMessaging::OBJID_CLIENT;
use windows::core::Interface;

use super::errors::{ComError, ComResult};
use super::variant::Value;

/// Child id addressing the element itself.
pub const CHILDID_SELF: i32 = 0;

/// One child slot of an accessible element.
#[derive(Debug)]
pub enum AccessibleChild {
    /// A full accessible object of its own.
    Element(Accessible),
    /// A simple child, addressed through the parent with this id.
    Id(i32),
}

/// Screen rectangle of an element, in physical screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// Wrapper over an `IAccessible` element.
#[derive(Debug, Clone)]
pub struct Accessible {
    inner: IAccessible,
}

impl Accessible {
    /// Retrieves the accessible object for a window's client area.
    ///
    /// MSAA is apartment-bound: call from the thread that owns the
    /// window's message queue, inside an STA
    /// ([`ComGuard::new_sta`](super::guard::ComGuard::new_sta)).
    pub fn from_window(hwnd: HWND) -> ComResult<Self> {
        let mut raw: *mut std::ffi::c_void = std::ptr::null_mut();
        // SAFETY: `raw` outlives the call; the returned interface is
        // owned by the wrapper via from_raw.
        unsafe {
            #[allow(clippy::cast_sign_loss)]
            AccessibleObjectFromWindow(
                hwnd,
                OBJID_CLIENT.0 as u32,
                &IAccessible::IID,
                &raw mut raw,
            )?;
        }
        if raw.is_null() {
            return Err(ComError::NotFound(
                "window has no accessible object".to_string(),
            ));
        }
        // SAFETY: non-null interface pointer with one reference, which
        // `from_raw` takes over.
        Ok(Self {
            inner: unsafe { IAccessible::from_raw(raw) },
        })
    }

    /// Wraps an already-acquired `IAccessible`.
    #[must_use]
    pub fn from_interface(inner: IAccessible) -> Self {
        Self { inner }
    }

    fn child_variant(child_id: i32) -> VARIANT {
        // Child addressing VARIANTs are VT_I4 by definition; I4 always
        // has a VARIANT write path, so this cannot fail.
        Value::I4(child_id)
            .to_variant()
            .unwrap_or_default()
    }

    /// `accName` of the element or one of its simple children.
    pub fn name(&self, child_id: i32) -> ComResult<String> {
        // SAFETY: the child VARIANT outlives the call.
        let name = unsafe { self.inner.get_accName(&Self::child_variant(child_id)) }?;
        Ok(name.to_string())
    }

    /// `accValue`, empty for elements without one.
    pub fn value(&self, child_id: i32) -> ComResult<String> {
        // SAFETY: as in `name`.
        let value = unsafe { self.inner.get_accValue(&Self::child_variant(child_id)) }?;
        Ok(value.to_string())
    }

    /// `accDescription`, empty for elements without one.
    pub fn description(&self, child_id: i32) -> ComResult<String> {
        // SAFETY: as in `name`.
        let text = unsafe {
            self.inner
                .get_accDescription(&Self::child_variant(child_id))
        }?;
        Ok(text.to_string())
    }

    /// `accRole` as the raw MSAA role number.
    pub fn role(&self, child_id: i32) -> ComResult<i32> {
        // SAFETY: as in `name`.
        let role = unsafe { self.inner.get_accRole(&Self::child_variant(child_id)) }?;
        Value::from_variant(&role)
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| ComError::Conversion("accRole returned a non-integer".to_string()))
    }

    /// `accState` as the raw MSAA state bit mask.
    pub fn state(&self, child_id: i32) -> ComResult<u32> {
        // SAFETY: as in `name`.
        let state = unsafe { self.inner.get_accState(&Self::child_variant(child_id)) }?;
        Value::from_variant(&state)
            .as_i64()
            .map(|v| v as u32)
            .ok_or_else(|| ComError::Conversion("accState returned a non-integer".to_string()))
    }

    /// Number of children (simple and full).
    pub fn child_count(&self) -> ComResult<i32> {
        // SAFETY: no preconditions.
        Ok(unsafe { self.inner.get_accChildCount() }?)
    }

    /// All children, each either a nested element or a simple child id.
    pub fn children(&self) -> ComResult<Vec<AccessibleChild>> {
        let count = self.child_count()?;
        if count <= 0 {
            return Ok(Vec::new());
        }
        let mut slots = vec![VARIANT::default(); count as usize];
        let mut obtained = 0i32;
        // SAFETY: `slots` holds `count` writable VARIANTs; `obtained`
        // outlives the call.
        unsafe {
            AccessibleChildren(&self.inner, 0, &mut slots, &raw mut obtained)?;
        }
        slots.truncate(usize::try_from(obtained).unwrap_or(0));

        let mut children = Vec::with_capacity(slots.len());
        for slot in &slots {
            match Value::from_variant(slot) {
                Value::Dispatch(dispatch) => {
                    children.push(AccessibleChild::Element(Self::from_dispatch(&dispatch)?));
                }
                Value::I4(id) => children.push(AccessibleChild::Id(id)),
                other => {
                    tracing::debug!(value = %other, "unexpected child VARIANT shape");
                }
            }
        }
        Ok(children)
    }

    /// Casts a child `IDispatch` back to a full accessible element.
    pub fn from_dispatch(dispatch: &IDispatch) -> ComResult<Self> {
        Ok(Self {
            inner: dispatch.cast()?,
        })
    }

    /// Screen rectangle of the element or a simple child.
    pub fn location(&self, child_id: i32) -> ComResult<Location> {
        let mut loc = Location::default();
        // SAFETY: the four out-pointers and the child VARIANT outlive
        // the call.
        unsafe {
            self.inner.accLocation(
                &raw mut loc.left,
                &raw mut loc.top,
                &raw mut loc.width,
                &raw mut loc.height,
                &Self::child_variant(child_id),
            )?;
        }
        Ok(loc)
    }

    /// Hit test in screen coordinates; `None` when the point is outside
    /// this element.
    pub fn hit_test(&self, x: i32, y: i32) -> ComResult<Option<AccessibleChild>> {
        // SAFETY: no preconditions beyond a live interface.
        let hit = unsafe { self.inner.accHitTest(x, y) }?;
        Ok(match Value::from_variant(&hit) {
            Value::Dispatch(dispatch) => {
                Some(AccessibleChild::Element(Self::from_dispatch(&dispatch)?))
            }
            Value::I4(id) => Some(AccessibleChild::Id(id)),
            _ => None,
        })
    }

    /// The child (or self) holding keyboard focus, if any.
    pub fn focus(&self) -> ComResult<Option<AccessibleChild>> {
        // SAFETY: no preconditions beyond a live interface.
        let focus = unsafe { self.inner.get_accFocus() }?;
        Ok(match Value::from_variant(&focus) {
            Value::Dispatch(dispatch) => {
                Some(AccessibleChild::Element(Self::from_dispatch(&dispatch)?))
            }
            Value::I4(id) => Some(AccessibleChild::Id(id)),
            _ => None,
        })
    }
}

/// Localized display text for an MSAA role number.
#[must_use]
pub fn role_text(role: u32) -> String {
    let mut buffer = [0u16; 128];
    // SAFETY: the buffer outlives the call; the API truncates to fit.
    let len = unsafe { GetRoleTextW(role, Some(&mut buffer)) };
    String::from_utf16_lossy(&buffer[..len as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::com::guard::ComGuard;
    use windows::Win32::UI::WindowsAndMessaging::GetDesktopWindow;

    const ROLE_SYSTEM_WINDOW: u32 = 9;

    #[test]
    fn role_text_is_localized_but_nonempty() {
        assert!(!role_text(ROLE_SYSTEM_WINDOW).is_empty());
    }

    #[test]
    fn role_text_for_unknown_role_is_empty_or_generic() {
        // Role numbers above the MSAA range have no text.
        let text = role_text(0xFFFF_0000);
        assert!(text.len() < 64);
    }

    #[test]
    fn desktop_window_is_accessible() {
        let _guard = ComGuard::new_sta().unwrap();
        // SAFETY: GetDesktopWindow has no preconditions.
        let desktop = unsafe { GetDesktopWindow() };
        let acc = Accessible::from_window(desktop).unwrap();
        // The desktop reports itself as a window/client with children.
        assert!(acc.child_count().unwrap() >= 0);
        let state = acc.state(CHILDID_SELF).unwrap();
        // Focusable bit may vary; the call shape is what is under test.
        let _ = state;
    }
}
