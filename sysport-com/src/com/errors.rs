use thiserror::Error;

use crate::hresult::friendly_hresult_hint;

/// Result type alias for COM operations.
pub type ComResult<T> = Result<T, ComError>;

/// Centralized error enum for the COM bindings.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComError {
    /// Standard Windows COM/DCOM error.
    ///
    /// Wraps a [`windows::core::Error`] and appends an actionable hint for
    /// common HRESULT codes.
    #[error("COM error: {source} ({})", friendly_hresult_hint(.source.code().0 as u32).unwrap_or("No hint available"))]
    Com {
        #[from]
        source: windows::core::Error,
    },

    /// An Automation callee raised an exception through EXCEPINFO.
    #[error("Automation exception from {source_name}: {description} (code {code})")]
    AutomationException {
        /// `EXCEPINFO.bstrSource`, usually the ProgID of the callee.
        source_name: String,
        /// `EXCEPINFO.bstrDescription`.
        description: String,
        /// `wCode` or `scode`, whichever the callee filled in.
        code: i32,
    },

    /// `Invoke` rejected an argument; holds the zero-based position
    /// reported through `puArgErr`.
    #[error("Argument {position} rejected by Invoke: {source}")]
    BadArgument {
        position: u32,
        source: windows::core::Error,
    },

    /// Errors during VARIANT or string conversion.
    #[error("Data conversion failed: {0}")]
    Conversion(String),

    /// A required object or member was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation attempted in an invalid state (e.g. released pointer).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Catch-all for unexpected internal failures.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ComError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::num::TryFromIntError> for ComError {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::Conversion(format!("Integer conversion error: {err}"))
    }
}

impl ComError {
    /// HRESULT carried by this error, if any.
    pub fn hresult(&self) -> Option<windows::core::HRESULT> {
        match self {
            Self::Com { source } | Self::BadArgument { source, .. } => Some(source.code()),
            _ => None,
        }
    }
}

/// Maps a [`ComError`] to a friendly hint if it wraps a known HRESULT.
#[allow(clippy::cast_sign_loss)]
pub fn friendly_com_hint(error: &ComError) -> Option<&'static str> {
    error.hresult().and_then(|hr| friendly_hresult_hint(hr.0 as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn com_variant_carries_hint() {
        let err: ComError = windows::core::Error::from_hresult(windows::core::HRESULT(
            0x80040154u32 as i32,
        ))
        .into();
        assert_eq!(
            friendly_com_hint(&err),
            Some("Class not registered on this machine (REGDB_E_CLASSNOTREG)")
        );
        assert!(err.to_string().contains("REGDB_E_CLASSNOTREG"));
    }

    #[test]
    fn non_com_variant_has_no_hint() {
        let err = ComError::Conversion("bad vt".into());
        assert_eq!(friendly_com_hint(&err), None);
        assert!(err.hresult().is_none());
    }

    #[test]
    fn automation_exception_display() {
        let err = ComError::AutomationException {
            source_name: "Excel.Application".into(),
            description: "Range not found".into(),
            code: 1004,
        };
        let text = err.to_string();
        assert!(text.contains("Excel.Application"));
        assert!(text.contains("1004"));
    }
}
