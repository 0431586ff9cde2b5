//! OLE Automation late binding over `IDispatch`.
//!
//! The `IDispatch::Invoke` protocol is fixed by the vendor: arguments
//! travel in a [`DISPPARAMS`] block in reverse order, property puts name
//! their single argument `DISPID_PROPERTYPUT`, and failures may carry an
//! [`EXCEPINFO`] record or the index of the offending argument.

use anyhow::Context as _;
use windows::Win32::System::Com::{
    CLSCTX_ALL, CLSIDFromProgID, CoCreateInstance, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPATCH_PROPERTYPUTREF, DISPPARAMS, EXCEPINFO,
    IDispatch,
};
use windows::core::{GUID, PCWSTR};

use super::errors::{ComError, ComResult, friendly_com_hint};
use super::typelib::TypeInformation;
use super::variant::Value;

/// Automation DISPID naming the argument of a property put.
const DISPID_PROPERTYPUT: i32 = -3;

/// Neutral locale for name lookup and invocation.
const LOCALE_USER_DEFAULT: u32 = 0x0400;

const DISP_E_EXCEPTION: u32 = 0x8002_0009;
const DISP_E_TYPEMISMATCH: u32 = 0x8002_0005;
const DISP_E_PARAMNOTFOUND: u32 = 0x8002_0004;

/// A late-bound Automation object.
///
/// Wraps an [`IDispatch`] pointer; method and property access goes through
/// `GetIDsOfNames` + `Invoke`, so no compile-time interface projection is
/// needed.
#[derive(Debug, Clone)]
pub struct Dispatch {
    inner: IDispatch,
}

impl Dispatch {
    /// Activates a registered Automation class by ProgID
    /// (e.g. `"WScript.Shell"`).
    ///
    /// # Errors
    ///
    /// `REGDB_E_CLASSNOTREG` when the ProgID is unknown, or any
    /// activation failure from `CoCreateInstance`.
    pub fn from_progid(progid: &str) -> ComResult<Self> {
        // SAFETY: `wide` is null-terminated and outlives the call.
        let clsid = unsafe {
            let wide: Vec<u16> = progid.encode_utf16().chain(std::iter::once(0)).collect();
            CLSIDFromProgID(PCWSTR(wide.as_ptr()))?
        };
        Self::from_clsid(&clsid)
    }

    /// Activates a registered Automation class by CLSID.
    pub fn from_clsid(clsid: &GUID) -> ComResult<Self> {
        // SAFETY: standard activation call; the returned interface is
        // owned by the wrapper.
        let inner: IDispatch = unsafe { CoCreateInstance(clsid, None, CLSCTX_ALL) }?;
        Ok(Self { inner })
    }

    /// Wraps an already-acquired `IDispatch`.
    #[must_use]
    pub fn from_interface(inner: IDispatch) -> Self {
        Self { inner }
    }

    /// The wrapped interface.
    #[must_use]
    pub fn interface(&self) -> &IDispatch {
        &self.inner
    }

    /// Resolves member names to DISPIDs in one round trip.
    pub fn ids_of_names(&self, names: &[&str]) -> ComResult<Vec<i32>> {
        let wide: Vec<Vec<u16>> = names
            .iter()
            .map(|n| n.encode_utf16().chain(std::iter::once(0)).collect())
            .collect();
        let pcwstrs: Vec<PCWSTR> = wide.iter().map(|w| PCWSTR(w.as_ptr())).collect();
        let mut dispids = vec![0i32; names.len()];
        // SAFETY: `pcwstrs` and `dispids` both hold `names.len()` entries
        // and outlive the call.
        unsafe {
            self.inner.GetIDsOfNames(
                &GUID::zeroed(),
                pcwstrs.as_ptr(),
                u32::try_from(names.len())?,
                LOCALE_USER_DEFAULT,
                dispids.as_mut_ptr(),
            )?;
        }
        Ok(dispids)
    }

    /// Resolves a single member name to its DISPID.
    pub fn id_of(&self, name: &str) -> ComResult<i32> {
        Ok(self.ids_of_names(&[name])?[0])
    }

    /// Invokes a member by DISPID with explicit dispatch flags.
    ///
    /// Arguments are given in natural (left-to-right) order; the reversal
    /// required by the Automation ABI happens here. Property puts receive
    /// the mandatory `DISPID_PROPERTYPUT` named argument.
    #[allow(clippy::cast_sign_loss)]
    pub fn invoke(&self, dispid: i32, flags: DISPATCH_FLAGS, args: &[Value]) -> ComResult<Value> {
        // Invoke consumes rgvarg right-to-left.
        let mut native_args = args
            .iter()
            .rev()
            .map(Value::to_variant)
            .collect::<ComResult<Vec<_>>>()?;

        let mut named_arg = DISPID_PROPERTYPUT;
        let is_put = flags.0 & (DISPATCH_PROPERTYPUT.0 | DISPATCH_PROPERTYPUTREF.0) != 0;
        let mut params = DISPPARAMS {
            rgvarg: native_args.as_mut_ptr(),
            rgdispidNamedArgs: if is_put {
                &mut named_arg
            } else {
                std::ptr::null_mut()
            },
            cArgs: u32::try_from(native_args.len())?,
            cNamedArgs: u32::from(is_put),
        };

        let mut result = windows::Win32::System::Variant::VARIANT::default();
        let mut excep = EXCEPINFO::default();
        let mut arg_err = 0u32;
        // SAFETY: all out-pointers reference locals that outlive the
        // call; `params` borrows `native_args`, which is kept alive until
        // after the call returns.
        let invoked = unsafe {
            self.inner.Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &raw mut params,
                Some(&raw mut result),
                Some(&raw mut excep),
                Some(&raw mut arg_err),
            )
        };

        if let Err(source) = invoked {
            return Err(match source.code().0 as u32 {
                DISP_E_EXCEPTION => exception_error(&excep),
                DISP_E_TYPEMISMATCH | DISP_E_PARAMNOTFOUND => {
                    // puArgErr counts within the reversed rgvarg block.
                    let position = u32::try_from(args.len())
                        .ok()
                        .and_then(|len| len.checked_sub(arg_err + 1))
                        .unwrap_or(arg_err);
                    tracing::debug!(dispid, position, "Invoke rejected an argument");
                    ComError::BadArgument { position, source }
                }
                _ => ComError::Com { source },
            });
        }

        Ok(Value::from_variant(&result))
    }

    /// Calls a method by name: `dispatch.call("Run", &["notepad".into()])`.
    pub fn call(&self, name: &str, args: &[Value]) -> ComResult<Value> {
        self.invoke(self.id_of(name)?, DISPATCH_METHOD, args)
    }

    /// Reads a property by name.
    pub fn get(&self, name: &str) -> ComResult<Value> {
        self.invoke(self.id_of(name)?, DISPATCH_PROPERTYGET, &[])
    }

    /// Reads an indexed property (a property get with arguments).
    pub fn get_indexed(&self, name: &str, index: &[Value]) -> ComResult<Value> {
        self.invoke(self.id_of(name)?, DISPATCH_PROPERTYGET, index)
    }

    /// Writes a property by name.
    pub fn put(&self, name: &str, value: Value) -> ComResult<()> {
        self.invoke(self.id_of(name)?, DISPATCH_PROPERTYPUT, &[value])?;
        Ok(())
    }

    /// Writes an object-valued property by reference.
    pub fn put_ref(&self, name: &str, value: Value) -> ComResult<()> {
        self.invoke(self.id_of(name)?, DISPATCH_PROPERTYPUTREF, &[value])?;
        Ok(())
    }

    /// Fetches the object's type description, when it provides one.
    pub fn type_information(&self) -> ComResult<TypeInformation> {
        // SAFETY: index 0 with the neutral locale is the documented way
        // to reach the coclass's own ITypeInfo.
        let info = unsafe { self.inner.GetTypeInfo(0, LOCALE_USER_DEFAULT) }?;
        Ok(TypeInformation::new(info))
    }

    /// Whether the object exposes type information at all.
    pub fn has_type_information(&self) -> ComResult<bool> {
        // SAFETY: no preconditions; the count is returned by value.
        let count = unsafe { self.inner.GetTypeInfoCount() }?;
        Ok(count > 0)
    }
}

/// Converts a filled [`EXCEPINFO`] into [`ComError::AutomationException`].
fn exception_error(excep: &EXCEPINFO) -> ComError {
    let code = if excep.wCode != 0 {
        i32::from(excep.wCode)
    } else {
        excep.scode.0
    };
    ComError::AutomationException {
        source_name: excep.bstrSource.to_string(),
        description: excep.bstrDescription.to_string(),
        code,
    }
}

/// Activates a ProgID and logs an actionable hint on failure.
///
/// High-level convenience for callers that just want the object or a
/// readable reason why not.
pub fn open(progid: &str) -> anyhow::Result<Dispatch> {
    Dispatch::from_progid(progid).map_err(|e| {
        let hint =
            friendly_com_hint(&e).unwrap_or("Check the ProgID and the class registration");
        tracing::error!(error = %e, progid, hint, "Automation activation failed");
        anyhow::anyhow!(e).context(format!("Failed to activate '{progid}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use windows::Win32::System::Com::{IDispatch_Impl, ITypeInfo};
    use windows::Win32::System::Variant::VARIANT;
    use windows::core::{BSTR, implement};

    const DISPID_VALUE_PROP: i32 = 7;
    const DISPID_ECHO: i32 = 8;
    const DISPID_SUM: i32 = 9;

    // Scriptable test double: a readable/writable property ("Value"),
    // a method returning its single argument ("Echo"), and a two-i32
    // method ("Sum") that reports a mistyped argument through puArgErr.
    #[implement(IDispatch)]
    struct Scriptable {
        value: RefCell<i32>,
    }

    impl IDispatch_Impl for Scriptable_Impl {
        fn GetTypeInfoCount(&self) -> windows::core::Result<u32> {
            Ok(0)
        }

        fn GetTypeInfo(&self, _itinfo: u32, _lcid: u32) -> windows::core::Result<ITypeInfo> {
            Err(windows::Win32::Foundation::E_NOTIMPL.into())
        }

        fn GetIDsOfNames(
            &self,
            _riid: *const GUID,
            rgsznames: *const PCWSTR,
            cnames: u32,
            _lcid: u32,
            rgdispid: *mut i32,
        ) -> windows::core::Result<()> {
            let names = unsafe { std::slice::from_raw_parts(rgsznames, cnames as usize) };
            let out = unsafe { std::slice::from_raw_parts_mut(rgdispid, cnames as usize) };
            for (name, dispid) in names.iter().zip(out.iter_mut()) {
                *dispid = match unsafe { name.to_string() }.unwrap_or_default().as_str() {
                    "Value" => DISPID_VALUE_PROP,
                    "Echo" => DISPID_ECHO,
                    "Sum" => DISPID_SUM,
                    _ => return Err(windows::core::HRESULT(0x80020003u32 as i32).into()),
                };
            }
            Ok(())
        }

        #[allow(clippy::too_many_arguments)]
        fn Invoke(
            &self,
            dispidmember: i32,
            _riid: *const GUID,
            _lcid: u32,
            wflags: DISPATCH_FLAGS,
            pdispparams: *const DISPPARAMS,
            pvarresult: *mut VARIANT,
            _pexcepinfo: *mut EXCEPINFO,
            puargerr: *mut u32,
        ) -> windows::core::Result<()> {
            let params = unsafe { &*pdispparams };
            let args =
                unsafe { std::slice::from_raw_parts(params.rgvarg, params.cArgs as usize) };
            match (dispidmember, wflags) {
                (DISPID_VALUE_PROP, DISPATCH_PROPERTYGET) => {
                    let out = Value::I4(*self.value.borrow()).to_variant().unwrap();
                    unsafe { pvarresult.write(out) };
                    Ok(())
                }
                (DISPID_VALUE_PROP, DISPATCH_PROPERTYPUT) => {
                    // The put argument must be named DISPID_PROPERTYPUT.
                    assert_eq!(params.cNamedArgs, 1);
                    assert_eq!(unsafe { *params.rgdispidNamedArgs }, DISPID_PROPERTYPUT);
                    match Value::from_variant(&args[0]) {
                        Value::I4(i) => {
                            *self.value.borrow_mut() = i;
                            Ok(())
                        }
                        _ => Err(windows::core::HRESULT(DISP_E_TYPEMISMATCH as i32).into()),
                    }
                }
                (DISPID_ECHO, DISPATCH_METHOD) => {
                    let out = Value::from_variant(&args[0]).to_variant().unwrap();
                    unsafe { pvarresult.write(out) };
                    Ok(())
                }
                (DISPID_SUM, DISPATCH_METHOD) => {
                    let mut total = 0i32;
                    // rgvarg arrives in reverse order; puArgErr counts
                    // within that reversed block, per the protocol.
                    for (reversed_index, arg) in args.iter().enumerate() {
                        match Value::from_variant(arg) {
                            Value::I4(i) => total += i,
                            _ => {
                                if !puargerr.is_null() {
                                    unsafe { *puargerr = reversed_index as u32 };
                                }
                                return Err(windows::core::HRESULT(
                                    DISP_E_TYPEMISMATCH as i32,
                                )
                                .into());
                            }
                        }
                    }
                    unsafe { pvarresult.write(Value::I4(total).to_variant().unwrap()) };
                    Ok(())
                }
                _ => Err(windows::core::HRESULT(0x80020003u32 as i32).into()),
            }
        }
    }

    fn scriptable() -> Dispatch {
        Dispatch::from_interface(
            Scriptable {
                value: RefCell::new(11),
            }
            .into(),
        )
    }

    #[test]
    fn name_resolution() {
        let disp = scriptable();
        assert_eq!(disp.id_of("Value").unwrap(), DISPID_VALUE_PROP);
        assert_eq!(
            disp.ids_of_names(&["Echo", "Value"]).unwrap(),
            vec![DISPID_ECHO, DISPID_VALUE_PROP]
        );
        assert!(disp.id_of("Missing").is_err());
    }

    #[test]
    fn property_get_and_put() {
        let disp = scriptable();
        assert_eq!(disp.get("Value").unwrap().as_i64(), Some(11));
        disp.put("Value", Value::I4(23)).unwrap();
        assert_eq!(disp.get("Value").unwrap().as_i64(), Some(23));
    }

    #[test]
    fn method_call_round_trips_argument() {
        let disp = scriptable();
        let out = disp.call("Echo", &[Value::from("ping")]).unwrap();
        assert_eq!(out.as_str(), Some("ping"));
    }

    #[test]
    fn put_with_wrong_type_is_an_error() {
        let disp = scriptable();
        assert!(disp.put("Value", Value::from("not a number")).is_err());
    }

    #[test]
    fn bad_argument_position_is_reported_in_natural_order() {
        let disp = scriptable();
        let sum = disp
            .call("Sum", &[Value::I4(2), Value::I4(40)])
            .unwrap();
        assert_eq!(sum.as_i64(), Some(42));

        // The second natural-order argument is mistyped; the callee
        // reports its reversed rgvarg index (0) and invoke maps it back.
        let err = disp
            .call("Sum", &[Value::I4(1), Value::from("two")])
            .unwrap_err();
        match err {
            ComError::BadArgument { position, .. } => assert_eq!(position, 1),
            other => panic!("unexpected error: {other:?}"),
        }

        // And the first natural-order argument maps to position 0.
        let err = disp
            .call("Sum", &[Value::from("one"), Value::I4(2)])
            .unwrap_err();
        match err {
            ComError::BadArgument { position, .. } => assert_eq!(position, 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn no_type_information_reported() {
        let disp = scriptable();
        assert!(!disp.has_type_information().unwrap());
    }

    #[test]
    fn exception_error_prefers_wcode() {
        let excep = EXCEPINFO {
            wCode: 1004,
            bstrSource: BSTR::from("Test.Source"),
            bstrDescription: BSTR::from("boom"),
            ..Default::default()
        };
        match exception_error(&excep) {
            ComError::AutomationException { code, description, .. } => {
                assert_eq!(code, 1004);
                assert_eq!(description, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
