//! `kern_return_t` helpers and known-code hints.
//!
//! Operates on raw `i32` codes so it compiles (and tests) on every host;
//! the macOS-only modules hand their return codes over at the boundary.

/// The success code shared by Mach and IOKit calls.
pub const KERN_SUCCESS: i32 = 0;

/// Returns `true` if `code` indicates success.
pub const fn is_success(code: i32) -> bool {
    code == KERN_SUCCESS
}

/// Formats a `kern_return_t` as `0xXXXXXXXX`, appending a hint when one
/// is known.
pub fn format_kern_return(code: i32) -> String {
    #[allow(clippy::cast_sign_loss)]
    let hex = format!("0x{:08X}", code as u32);
    match friendly_kern_hint(code) {
        Some(hint) => format!("{hex}: {hint}"),
        None => hex,
    }
}

/// Maps known Mach and IOKit return codes to actionable hints.
///
/// IOKit codes live in the `0xE00002xx` range (`err_system(0x38)`).
#[allow(clippy::cast_sign_loss)]
pub fn friendly_kern_hint(code: i32) -> Option<&'static str> {
    match code as u32 {
        0x0000_0001 => Some("Invalid address (KERN_INVALID_ADDRESS)"),
        0x0000_0002 => Some("Protection failure (KERN_PROTECTION_FAILURE)"),
        0x0000_0004 => Some("Invalid argument (KERN_INVALID_ARGUMENT)"),
        0x0000_000F => Some("Invalid Mach port name (KERN_INVALID_NAME)"),
        0xE000_02BC => Some("General IOKit failure (kIOReturnError)"),
        0xE000_02BD => Some("Kernel memory allocation failed (kIOReturnNoMemory)"),
        0xE000_02C0 => {
            Some("No such device — the matching dictionary found nothing (kIOReturnNoDevice)")
        }
        0xE000_02C1 => Some("Caller lacks the required privilege (kIOReturnNotPrivileged)"),
        0xE000_02C2 => Some("Invalid argument to an IOKit call (kIOReturnBadArgument)"),
        0xE000_02C5 => Some("Device already open for exclusive access (kIOReturnExclusiveAccess)"),
        0xE000_02C7 => Some("Operation unsupported by this service (kIOReturnUnsupported)"),
        0xE000_02D6 => Some("IOKit operation timed out (kIOReturnTimeout)"),
        0xE000_02E2 => Some("Operation not permitted (kIOReturnNotPermitted)"),
        0xE000_02F0 => Some("Registry entry or property not found (kIOReturnNotFound)"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert!(is_success(0));
        assert!(!is_success(4));
        assert!(!is_success(0xE000_02C2_u32 as i32));
    }

    #[test]
    fn hint_for_known_codes() {
        assert_eq!(
            friendly_kern_hint(0xE000_02C2_u32 as i32),
            Some("Invalid argument to an IOKit call (kIOReturnBadArgument)")
        );
        assert_eq!(
            friendly_kern_hint(4),
            Some("Invalid argument (KERN_INVALID_ARGUMENT)")
        );
        assert_eq!(friendly_kern_hint(0x1234_5678), None);
    }

    #[test]
    fn format_with_and_without_hint() {
        assert_eq!(
            format_kern_return(0xE000_02C0_u32 as i32),
            "0xE00002C0: No such device — the matching dictionary found nothing (kIOReturnNoDevice)"
        );
        assert_eq!(format_kern_return(0x0101_0101), "0x01010101");
    }
}
