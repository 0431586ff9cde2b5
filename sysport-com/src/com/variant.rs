//! VARIANT marshaling between Automation values and Rust.
//!
//! A VARIANT is COM's tagged union for Automation-compatible data; the
//! `vt` discriminant selects the active arm. [`Value`] is the owned Rust
//! side of that union: lossless for the Automation-compatible subset,
//! summarizing for arrays and exotic tags.

use windows::Win32::Foundation::VARIANT_BOOL;
use windows::Win32::System::Ole::{SafeArrayGetDim, SafeArrayGetLBound, SafeArrayGetUBound};
use windows::Win32::System::Variant::{
    VARENUM, VARIANT, VT_BOOL, VT_BSTR, VT_DISPATCH, VT_I4, VT_R8, VT_UNKNOWN,
};
use windows::core::BSTR;

use crate::ole_time::ole_date_to_string;

use super::errors::{ComError, ComResult};

/// Bit flags folded into `vt` on top of the base type.
const VT_ARRAY_BIT: u16 = 0x2000;
const VT_BYREF_BIT: u16 = 0x4000;

/// Owned Rust representation of an Automation VARIANT.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// VT_EMPTY — no value was supplied.
    #[default]
    Empty,
    /// VT_NULL — SQL-style null.
    Null,
    /// VT_BOOL.
    Bool(bool),
    /// VT_I1/VT_I2/VT_I4/VT_UI1/VT_UI2/VT_INT, widened.
    I4(i32),
    /// VT_UI4/VT_I8/VT_UI8, widened (u64 values above `i64::MAX` wrap).
    I8(i64),
    /// VT_R4/VT_R8, widened.
    R8(f64),
    /// VT_CY — 64-bit fixed point scaled by 10,000.
    Currency(i64),
    /// VT_DATE — OLE Automation date, days since 1899-12-30.
    Date(f64),
    /// VT_BSTR.
    String(String),
    /// VT_ERROR — an HRESULT travelling as data.
    ErrorCode(i32),
    /// VT_DISPATCH — a nested Automation object.
    Dispatch(windows::Win32::System::Com::IDispatch),
    /// VT_UNKNOWN — a nested COM object without Automation support.
    Unknown(windows::core::IUnknown),
    /// Any VT with the ARRAY bit: element type, dimensions, first-axis
    /// element count (SAFEARRAY payloads are summarized, not walked).
    Array {
        element_vt: u16,
        dims: u32,
        count: i32,
    },
    /// A tag this library does not interpret.
    Other(u16),
}

impl Value {
    /// Reads a COM-produced VARIANT into an owned [`Value`].
    ///
    /// The VARIANT is borrowed; BSTR and interface arms are cloned out,
    /// so the caller's `VariantClear`/Drop obligations are unchanged.
    #[allow(clippy::too_many_lines, clippy::cast_possible_wrap)]
    pub fn from_variant(variant: &VARIANT) -> Self {
        // SAFETY: the `vt` discriminant written by the COM callee
        // identifies which union arm is active; each match arm reads only
        // that arm.
        unsafe {
            let vt = variant.Anonymous.Anonymous.vt;
            if vt.0 & VT_BYREF_BIT != 0 {
                // By-reference VARIANTs only occur in out-parameter
                // positions this library never produces.
                return Self::Other(vt.0);
            }
            if vt.0 & VT_ARRAY_BIT != 0 {
                return Self::from_array_variant(variant, vt);
            }

            let data = &variant.Anonymous.Anonymous.Anonymous;
            match vt.0 {
                0 => Self::Empty,
                1 => Self::Null,
                2 => Self::I4(i32::from(data.iVal)),
                3 | 22 => Self::I4(data.lVal),
                4 => Self::R8(f64::from(data.fltVal)),
                5 => Self::R8(data.dblVal),
                6 => Self::Currency(data.cyVal.int64),
                7 => Self::Date(data.date),
                8 => Self::String(data.bstrVal.to_string()),
                9 => (*data.pdispVal)
                    .clone()
                    .map_or(Self::Empty, Self::Dispatch),
                10 => Self::ErrorCode(data.scode),
                11 => Self::Bool(data.boolVal.0 != 0),
                13 => (*data.punkVal)
                    .clone()
                    .map_or(Self::Empty, Self::Unknown),
                16 => Self::I4(i32::from(data.bVal as i8)),
                17 => Self::I4(i32::from(data.bVal)),
                18 => Self::I4(i32::from(data.uiVal)),
                19 | 23 => Self::I8(i64::from(data.ulVal)),
                20 => Self::I8(data.llVal),
                21 => Self::I8(data.ullVal as i64),
                other => Self::Other(other),
            }
        }
    }

    /// Summarizes a SAFEARRAY-carrying VARIANT without touching elements.
    unsafe fn from_array_variant(variant: &VARIANT, vt: VARENUM) -> Self {
        let element_vt = vt.0 & 0x0FFF;
        // SAFETY: the ARRAY bit guarantees `parray` is the active arm.
        let parray = unsafe { variant.Anonymous.Anonymous.Anonymous.parray };
        if parray.is_null() {
            return Self::Array {
                element_vt,
                dims: 0,
                count: 0,
            };
        }
        // SAFETY: `parray` is a live SAFEARRAY owned by the VARIANT.
        let dims = unsafe { SafeArrayGetDim(parray) };
        let count = if dims == 1 {
            // SAFETY: dimension index 1 exists when dims == 1.
            let lb = unsafe { SafeArrayGetLBound(parray, 1) }.unwrap_or(0);
            // SAFETY: as above.
            let ub = unsafe { SafeArrayGetUBound(parray, 1) }.unwrap_or(-1);
            (ub - lb + 1).max(0)
        } else {
            0
        };
        Self::Array {
            element_vt,
            dims,
            count,
        }
    }

    /// Builds a VARIANT for passing to `IDispatch::Invoke` or a property
    /// put. Ownership of BSTR/interface payloads transfers to the VARIANT
    /// (its Drop runs `VariantClear`).
    ///
    /// # Errors
    ///
    /// [`ComError::Conversion`] for variants with no Automation write
    /// path ([`Value::Array`], [`Value::Other`]).
    pub fn to_variant(&self) -> ComResult<VARIANT> {
        let mut variant = VARIANT::default();
        // SAFETY: `vt` and the matching union arm are written together;
        // the VARIANT is returned by value, so no aliasing. `ManuallyDrop`
        // hands payload ownership to the VARIANT's own Drop.
        unsafe {
            let inner = &mut *variant.Anonymous.Anonymous;
            match self {
                Self::Empty => {}
                Self::Null => inner.vt = VARENUM(1),
                Self::Bool(b) => {
                    inner.vt = VT_BOOL;
                    inner.Anonymous.boolVal = VARIANT_BOOL(if *b { -1 } else { 0 });
                }
                Self::I4(i) => {
                    inner.vt = VT_I4;
                    inner.Anonymous.lVal = *i;
                }
                Self::I8(i) => {
                    inner.vt = VARENUM(20);
                    inner.Anonymous.llVal = *i;
                }
                Self::R8(f) => {
                    inner.vt = VT_R8;
                    inner.Anonymous.dblVal = *f;
                }
                Self::Currency(c) => {
                    inner.vt = VARENUM(6);
                    inner.Anonymous.cyVal = windows::Win32::System::Com::CY { int64: *c };
                }
                Self::Date(d) => {
                    inner.vt = VARENUM(7);
                    inner.Anonymous.date = *d;
                }
                Self::String(s) => {
                    inner.vt = VT_BSTR;
                    inner.Anonymous.bstrVal = std::mem::ManuallyDrop::new(BSTR::from(s));
                }
                Self::ErrorCode(code) => {
                    inner.vt = VARENUM(10);
                    inner.Anonymous.scode = *code;
                }
                Self::Dispatch(dispatch) => {
                    inner.vt = VT_DISPATCH;
                    inner.Anonymous.pdispVal = std::mem::ManuallyDrop::new(Some(dispatch.clone()));
                }
                Self::Unknown(unknown) => {
                    inner.vt = VT_UNKNOWN;
                    inner.Anonymous.punkVal = std::mem::ManuallyDrop::new(Some(unknown.clone()));
                }
                Self::Array { .. } | Self::Other(_) => {
                    return Err(ComError::Conversion(format!(
                        "no VARIANT write path for {self:?}"
                    )));
                }
            }
        }
        Ok(variant)
    }

    /// Convenience accessor: the value as a string, when it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convenience accessor: the value as an i64, widening integers.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I4(i) => Some(i64::from(*i)),
            Self::I8(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "Empty"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I4(i) => write!(f, "{i}"),
            Self::I8(i) => write!(f, "{i}"),
            Self::R8(v) => write!(f, "{v:.2}"),
            Self::Currency(raw) => {
                let whole = raw / 10_000;
                let frac = (raw % 10_000).unsigned_abs();
                write!(f, "{whole}.{frac:04}")
            }
            Self::Date(d) => write!(f, "{}", ole_date_to_string(*d)),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::ErrorCode(code) => {
                write!(f, "{}", crate::hresult::format_hresult(*code as u32))
            }
            Self::Dispatch(_) => write!(f, "(IDispatch)"),
            Self::Unknown(_) => write!(f, "(IUnknown)"),
            Self::Array {
                element_vt,
                dims,
                count,
            } => {
                if *dims == 1 {
                    write!(f, "Array[{count}] ({:?})", VARENUM(*element_vt))
                } else {
                    write!(f, "Array[{dims}D]")
                }
            }
            Self::Other(vt) => write!(f, "(VT {vt})"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::I4(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::R8(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) -> Value {
        let native = value.to_variant().unwrap();
        Value::from_variant(&native)
    }

    #[test]
    fn bool_round_trip_uses_variant_true() {
        let native = Value::Bool(true).to_variant().unwrap();
        unsafe {
            assert_eq!(native.Anonymous.Anonymous.vt, VT_BOOL);
            assert_eq!(native.Anonymous.Anonymous.Anonymous.boolVal.0, -1);
        }
        assert_eq!(round_trip(Value::Bool(false)).as_bool(), Some(false));
    }

    #[test]
    fn integer_widening() {
        assert_eq!(round_trip(Value::I4(42)).as_i64(), Some(42));
        assert_eq!(round_trip(Value::I8(1 << 40)).as_i64(), Some(1 << 40));
    }

    #[test]
    fn string_round_trip() {
        let out = round_trip(Value::from("hello"));
        assert_eq!(out.as_str(), Some("hello"));
        assert_eq!(out.to_string(), "\"hello\"");
    }

    #[test]
    fn currency_formats_fixed_point() {
        assert_eq!(Value::Currency(123_456_789).to_string(), "12345.6789");
        assert_eq!(Value::Currency(-500_001).to_string(), "-50.0001");
        let out = round_trip(Value::Currency(10_000));
        assert_eq!(out.to_string(), "1.0000");
    }

    #[test]
    fn empty_and_null() {
        assert!(matches!(round_trip(Value::Empty), Value::Empty));
        assert!(matches!(round_trip(Value::Null), Value::Null));
        assert_eq!(Value::from_variant(&VARIANT::default()).to_string(), "Empty");
    }

    #[test]
    fn float_display_two_decimals() {
        assert_eq!(round_trip(Value::R8(3.5)).to_string(), "3.50");
    }

    #[test]
    fn array_value_has_no_write_path() {
        let value = Value::Array {
            element_vt: 8,
            dims: 1,
            count: 3,
        };
        assert!(value.to_variant().is_err());
        assert!(value.to_string().starts_with("Array[3]"));
    }

    #[test]
    fn unknown_vt_is_preserved() {
        assert_eq!(Value::Other(999).to_string(), "(VT 999)");
    }
}
