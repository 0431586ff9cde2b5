//! WMI/WBEM access over `IWbemLocator` / `IWbemServices`.
//!
//! The connection sequence is fixed by the vendor: create the locator,
//! `ConnectServer` to a namespace, then lower the proxy security blanket
//! so the service proxy can impersonate the caller. Queries are WQL,
//! executed forward-only and consumed through `IEnumWbemClassObject`.

use windows::Win32::System::Com::{
    CLSCTX_INPROC_SERVER, CoCreateInstance, CoSetProxyBlanket, EOAC_NONE, RPC_C_AUTHN_LEVEL_CALL,
    RPC_C_IMP_LEVEL_IMPERSONATE,
};
use windows::Win32::System::Ole::{SafeArrayAccessData, SafeArrayDestroy, SafeArrayUnaccessData};
use windows::Win32::System::Rpc::{RPC_C_AUTHN_WINNT, RPC_C_AUTHZ_NONE};
use windows::Win32::System::Variant::VARIANT;
use windows::Win32::System::Wmi::{
    IEnumWbemClassObject, IWbemClassObject, IWbemLocator, IWbemServices, WBEM_FLAG_FORWARD_ONLY,
    WBEM_FLAG_RETURN_IMMEDIATELY, WBEM_GENERIC_FLAG_TYPE, WBEM_INFINITE, WbemLocator,
};
use windows::core::{BSTR, PCWSTR};

use super::errors::{ComError, ComResult, friendly_com_hint};
use super::variant::Value;

/// A connected WMI namespace (e.g. `root\cimv2`).
#[derive(Debug, Clone)]
pub struct WbemConnection {
    services: IWbemServices,
}

impl WbemConnection {
    /// Connects to a namespace on the local machine.
    ///
    /// # Errors
    ///
    /// `WBEM_E_INVALID_NAMESPACE` for unknown namespace paths, or any
    /// activation/security failure along the documented sequence.
    pub fn connect(namespace: &str) -> ComResult<Self> {
        // SAFETY: standard activation of the WbemLocator coclass.
        let locator: IWbemLocator =
            unsafe { CoCreateInstance(&WbemLocator, None, CLSCTX_INPROC_SERVER) }?;

        // SAFETY: all BSTR arguments outlive the call; empty strings
        // select the current security context and locale.
        let services = unsafe {
            locator.ConnectServer(
                &BSTR::from(namespace),
                &BSTR::new(),
                &BSTR::new(),
                &BSTR::new(),
                0,
                &BSTR::new(),
                None,
            )
        }?;

        // SAFETY: the proxy blanket call is part of the vendor's
        // documented connection sequence; the services proxy is live.
        unsafe {
            CoSetProxyBlanket(
                &services,
                RPC_C_AUTHN_WINNT,
                RPC_C_AUTHZ_NONE,
                None,
                RPC_C_AUTHN_LEVEL_CALL,
                RPC_C_IMP_LEVEL_IMPERSONATE,
                None,
                EOAC_NONE,
            )?;
        }

        tracing::debug!(namespace, "WMI namespace connected");
        Ok(Self { services })
    }

    /// Executes a WQL query, returning a forward-only object stream.
    pub fn exec_query(&self, wql: &str) -> ComResult<WbemObjectIterator> {
        // SAFETY: BSTR arguments outlive the call; forward-only +
        // return-immediately is the semisynchronous streaming mode.
        let enumerator = unsafe {
            self.services.ExecQuery(
                &BSTR::from("WQL"),
                &BSTR::from(wql),
                WBEM_GENERIC_FLAG_TYPE(
                    WBEM_FLAG_FORWARD_ONLY.0 | WBEM_FLAG_RETURN_IMMEDIATELY.0,
                ),
                None,
            )
        }
        .map_err(|source| {
            tracing::error!(error = %source, wql, "ExecQuery failed");
            ComError::Com { source }
        })?;
        Ok(WbemObjectIterator {
            inner: enumerator,
            done: false,
        })
    }
}

/// Streams [`WbemObject`]s out of a query result.
pub struct WbemObjectIterator {
    inner: IEnumWbemClassObject,
    done: bool,
}

impl Iterator for WbemObjectIterator {
    type Item = ComResult<WbemObject>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut batch: [Option<IWbemClassObject>; 1] = [None];
        let mut returned = 0u32;
        // SAFETY: the batch slice and count outlive the call; an
        // infinite timeout matches the semisynchronous query mode.
        let code = unsafe { self.inner.Next(WBEM_INFINITE, &mut batch, &mut returned) };

        if code.is_err() {
            self.done = true;
            return Some(Err(ComError::Com {
                source: windows::core::Error::new(code, "IEnumWbemClassObject::Next failed"),
            }));
        }
        if returned == 0 {
            self.done = true;
            return None;
        }
        match batch[0].take() {
            Some(inner) => Some(Ok(WbemObject { inner })),
            None => {
                self.done = true;
                Some(Err(ComError::InvalidState(
                    "enumerator reported an object but returned null".to_string(),
                )))
            }
        }
    }
}

/// One WMI class object (a query result row).
#[derive(Debug, Clone)]
pub struct WbemObject {
    inner: IWbemClassObject,
}

impl WbemObject {
    /// Reads one property by name.
    pub fn get(&self, name: &str) -> ComResult<Value> {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        let mut variant = VARIANT::default();
        // SAFETY: the name is null-terminated and, with the out VARIANT,
        // outlives the call.
        unsafe {
            self.inner
                .Get(PCWSTR(wide.as_ptr()), 0, &mut variant, None, None)?;
        }
        Ok(Value::from_variant(&variant))
    }

    /// The object's class name (the `__CLASS` system property).
    pub fn class_name(&self) -> ComResult<String> {
        match self.get("__CLASS")? {
            Value::String(s) => Ok(s),
            other => Err(ComError::Conversion(format!(
                "__CLASS was not a string: {other}"
            ))),
        }
    }

    /// Names of all non-system properties, via the BSTR SAFEARRAY that
    /// `GetNames` hands back.
    pub fn property_names(&self) -> ComResult<Vec<String>> {
        // SAFETY: null qualifier arguments select all property names;
        // the SAFEARRAY is destroyed below on every path.
        let array = unsafe { self.inner.GetNames(PCWSTR::null(), 0, std::ptr::null()) }?;
        if array.is_null() {
            return Ok(Vec::new());
        }

        let names = (|| -> ComResult<Vec<String>> {
            // SAFETY: paired with SafeArrayUnaccessData below; the array
            // holds `rgsabound[0].cElements` BSTRs per the API contract.
            let data = unsafe { SafeArrayAccessData(array) }?;
            // SAFETY: one-dimensional BSTR array as documented for
            // GetNames.
            let count = unsafe { (*array).rgsabound[0].cElements } as usize;
            // SAFETY: `data` points at `count` BSTRs while access is
            // held.
            let bstrs = unsafe { std::slice::from_raw_parts(data.cast::<BSTR>(), count) };
            let names = bstrs.iter().map(|b| b.to_string()).collect();
            // SAFETY: balances the access above.
            unsafe { SafeArrayUnaccessData(array) }?;
            Ok(names)
        })();

        // SAFETY: GetNames transfers array ownership to the caller.
        unsafe { SafeArrayDestroy(array) }?;
        names
    }
}

/// Connects to a namespace and logs an actionable hint on failure.
pub fn open(namespace: &str) -> anyhow::Result<WbemConnection> {
    WbemConnection::connect(namespace).map_err(|e| {
        let hint = friendly_com_hint(&e)
            .unwrap_or("Check the namespace path and that the Winmgmt service is running");
        tracing::error!(error = %e, namespace, hint, "WMI connection failed");
        anyhow::anyhow!(e).context(format!("Failed to connect to WMI namespace '{namespace}'"))
    })
}
