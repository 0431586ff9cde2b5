//! RAII guard for COM initialization/teardown.
//!
//! Ensures `CoUninitialize` is called exactly once per successful
//! `CoInitializeEx`, even on early returns or panics.

use std::marker::PhantomData;
use windows::Win32::System::Com::{
    COINIT, COINIT_APARTMENTTHREADED, COINIT_MULTITHREADED, CoInitializeEx, CoUninitialize,
};

use super::errors::{ComError, ComResult};

/// HRESULT returned when the thread already joined the other apartment
/// kind. COM stays usable, but the balancing `CoUninitialize` belongs to
/// whoever initialized first.
const RPC_E_CHANGED_MODE: u32 = 0x8001_0106;

/// Drop guard for COM thread initialization.
///
/// [`ComGuard::new`] joins the Multi-Threaded Apartment;
/// [`ComGuard::new_sta`] creates a Single-Threaded Apartment, which most
/// Automation servers and all MSAA work require. When the guard is
/// dropped, `CoUninitialize` is called automatically — unless the thread
/// answered `RPC_E_CHANGED_MODE`, in which case the earlier initializer
/// owns the teardown.
///
/// # Thread Safety
///
/// `ComGuard` is intentionally `!Send` and `!Sync`. COM initialization
/// is per-thread — the guard **must** be created and dropped on the same
/// OS thread. This is enforced at compile time.
///
/// # Examples
///
/// ```no_run
/// # use sysport_com::ComGuard;
/// # fn main() -> sysport_com::ComResult<()> {
/// let _guard = ComGuard::new()?;
/// // ... COM operations ...
/// // CoUninitialize called automatically on drop
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ComGuard {
    /// False when the thread was already in the other apartment mode.
    should_uninit: bool,
    /// Prevents `Send + Sync` auto-derivation. COM init is per-thread.
    _not_send: PhantomData<*mut ()>,
}

impl ComGuard {
    /// Initialize COM in Multi-Threaded Apartment (MTA) mode.
    pub fn new() -> ComResult<Self> {
        Self::init(COINIT_MULTITHREADED)
    }

    /// Initialize COM in Single-Threaded Apartment (STA) mode.
    pub fn new_sta() -> ComResult<Self> {
        Self::init(COINIT_APARTMENTTHREADED)
    }

    /// Initialize (or join) the thread's COM apartment.
    ///
    /// Returns `Ok` for `S_OK`, `S_FALSE` (already initialized) and
    /// `RPC_E_CHANGED_MODE` (thread is in the other mode; usable, but no
    /// balancing `CoUninitialize` is owed by this guard).
    ///
    /// # Errors
    ///
    /// Returns `Err` if `CoInitializeEx` fails with a fatal HRESULT.
    #[allow(clippy::cast_sign_loss)]
    fn init(apartment: COINIT) -> ComResult<Self> {
        // SAFETY: `CoInitializeEx` is a standard Win32 FFI call. The result
        // is checked below, and `CoUninitialize` is balanced via Drop.
        let hr = unsafe { CoInitializeEx(None, apartment) };

        if hr.0 as u32 == RPC_E_CHANGED_MODE {
            tracing::debug!(?apartment, "thread already in the other apartment mode");
            return Ok(Self {
                should_uninit: false,
                _not_send: PhantomData,
            });
        }

        if let Err(e) = hr.ok() {
            tracing::error!(error = ?e, ?apartment, "COM initialization failed");
            return Err(ComError::Com { source: e });
        }

        tracing::debug!(?apartment, "COM apartment initialized");

        Ok(Self {
            should_uninit: true,
            _not_send: PhantomData,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        if self.should_uninit {
            tracing::debug!("COM apartment teardown");
            // SAFETY: Paired with the successful `CoInitializeEx` in
            // `init()`. Only runs on the creating thread (!Send).
            unsafe {
                CoUninitialize();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn com_guard_constructs_and_drops() {
        let guard = ComGuard::new();
        assert!(guard.is_ok(), "ComGuard::new() should succeed: {guard:?}");
        // Guard drops here — CoUninitialize runs.
    }

    #[test]
    fn changed_mode_is_not_fatal() {
        // First guard fixes the thread to MTA; the STA guard must still
        // construct, but without owning a CoUninitialize.
        let _mta = ComGuard::new().unwrap();
        let sta = ComGuard::new_sta().unwrap();
        assert!(!sta.should_uninit);
    }
}
