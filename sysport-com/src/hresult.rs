//! HRESULT structure helpers and known-code hints.
//!
//! Operates on raw `u32` codes so it compiles (and tests) on every host;
//! the Windows-only modules convert from `windows::core::HRESULT` at the
//! boundary.

/// Returns `true` if the severity bit of `code` indicates failure.
pub const fn is_failure(code: u32) -> bool {
    code & 0x8000_0000 != 0
}

/// Extracts the facility field (bits 16..27) of an HRESULT.
pub const fn facility(code: u32) -> u16 {
    ((code >> 16) & 0x07FF) as u16
}

/// Extracts the code field (low 16 bits) of an HRESULT.
pub const fn code(code: u32) -> u16 {
    (code & 0xFFFF) as u16
}

/// Formats an HRESULT as `0xXXXXXXXX`, appending a hint when one is known.
pub fn format_hresult(hr: u32) -> String {
    let hex = format!("0x{hr:08X}");
    match friendly_hresult_hint(hr) {
        Some(hint) => format!("{hex}: {hint}"),
        None => hex,
    }
}

/// Maps known COM/DCOM/Automation/WBEM error codes to actionable hints.
pub fn friendly_hresult_hint(hr: u32) -> Option<&'static str> {
    match hr {
        0x8000_4001 => Some("Method not implemented by this object (E_NOTIMPL)"),
        0x8000_4002 => Some("Interface not supported — QueryInterface refused the IID (E_NOINTERFACE)"),
        0x8000_4003 => Some("Invalid pointer (E_POINTER)"),
        0x8000_4005 => Some("Unspecified failure (E_FAIL)"),
        0x8007_0005 => {
            Some("Access denied — DCOM launch/activation permissions not configured for this user")
        }
        0x8007_06BA => {
            Some("RPC server unavailable — the target host may be offline or blocking RPC")
        }
        0x8004_0154 => Some("Class not registered on this machine (REGDB_E_CLASSNOTREG)"),
        0x800A_01AD => Some("ActiveX component can't create object — check the ProgID"),
        0x8001_0106 => {
            Some("Apartment mode already set for this thread (RPC_E_CHANGED_MODE)")
        }
        0x8002_0003 => Some("Member not found — no DISPID for that name (DISP_E_MEMBERNOTFOUND)"),
        0x8002_0005 => Some("Argument type mismatch in IDispatch::Invoke (DISP_E_TYPEMISMATCH)"),
        0x8002_0004 => Some("Named argument unknown to the callee (DISP_E_PARAMNOTFOUND)"),
        0x8002_000E => Some("Wrong number of arguments for the member (DISP_E_BADPARAMCOUNT)"),
        0x8002_0009 => Some("Callee raised an Automation exception — see EXCEPINFO (DISP_E_EXCEPTION)"),
        0x8002_801D => Some("Type library not registered (TYPE_E_LIBNOTREGISTERED)"),
        0x8002_802B => Some("Element not found in type library (TYPE_E_ELEMENTNOTFOUND)"),
        0x8004_100E => Some("WMI namespace path is invalid (WBEM_E_INVALID_NAMESPACE)"),
        0x8004_1010 => Some("WMI class does not exist in this namespace (WBEM_E_INVALID_CLASS)"),
        0x8004_1017 => Some("WQL query syntax is invalid (WBEM_E_INVALID_QUERY)"),
        0x8004_1003 => Some("WMI access denied for the current credentials (WBEM_E_ACCESS_DENIED)"),
        0x8004_1002 => Some("WMI object not found (WBEM_E_NOT_FOUND)"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_bit() {
        assert!(is_failure(0x8000_4005));
        assert!(!is_failure(0)); // S_OK
        assert!(!is_failure(1)); // S_FALSE
    }

    #[test]
    fn facility_and_code_fields() {
        // E_ACCESSDENIED = FACILITY_WIN32 (7), code 5
        assert_eq!(facility(0x8007_0005), 7);
        assert_eq!(code(0x8007_0005), 5);
        // DISP_E_TYPEMISMATCH = FACILITY_DISPATCH (2), code 5
        assert_eq!(facility(0x8002_0005), 2);
    }

    #[test]
    fn hint_for_known_codes() {
        assert_eq!(
            friendly_hresult_hint(0x8004_0154),
            Some("Class not registered on this machine (REGDB_E_CLASSNOTREG)")
        );
        assert_eq!(
            friendly_hresult_hint(0x8004_1017),
            Some("WQL query syntax is invalid (WBEM_E_INVALID_QUERY)")
        );
        assert_eq!(friendly_hresult_hint(0x1234_5678), None);
    }

    #[test]
    fn format_with_and_without_hint() {
        assert_eq!(
            format_hresult(0x8000_4003),
            "0x80004003: Invalid pointer (E_POINTER)"
        );
        assert_eq!(format_hresult(0x0000_0001), "0x00000001");
    }
}
