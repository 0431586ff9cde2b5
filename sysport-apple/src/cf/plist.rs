//! Property-list values as plain Rust data.
//!
//! IOKit registry properties and DiskArbitration descriptions arrive as
//! CF container graphs; [`PlistValue::from_cf`] converts them into an
//! owned tree that outlives the CF references.

use super::{CfArray, CfBoolean, CfData, CfDictionary, CfNumber, CfString, CfType, sys};

/// One property-list value.
#[derive(Debug, Clone, PartialEq)]
pub enum PlistValue {
    Bool(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Data(Vec<u8>),
    Array(Vec<PlistValue>),
    Dictionary(Vec<(String, PlistValue)>),
    /// A CF type with no plist mapping (dates, URLs, ...); carries the
    /// runtime type ID for diagnostics.
    Other(usize),
}

impl PlistValue {
    /// Converts any CF object into a plist value, recursing through
    /// containers. Unknown types collapse to [`PlistValue::Other`].
    pub fn from_cf(value: &CfType) -> Self {
        let type_id = value.type_id();
        // SAFETY: pure type-ID queries.
        let (string_id, number_id, boolean_id, data_id, array_id, dict_id) = unsafe {
            (
                sys::CFStringGetTypeID(),
                sys::CFNumberGetTypeID(),
                sys::CFBooleanGetTypeID(),
                sys::CFDataGetTypeID(),
                sys::CFArrayGetTypeID(),
                sys::CFDictionaryGetTypeID(),
            )
        };

        if type_id == string_id {
            return CfString::from_type(value.clone())
                .map_or(Self::Other(type_id), |s| Self::String(s.to_string_lossy()));
        }
        if type_id == boolean_id {
            return CfBoolean::from_type(value.clone())
                .map_or(Self::Other(type_id), |b| Self::Bool(b.value()));
        }
        if type_id == number_id {
            return CfNumber::from_type(value.clone()).map_or(Self::Other(type_id), |n| {
                if n.is_float() {
                    n.to_f64().map_or(Self::Other(type_id), Self::Real)
                } else {
                    n.to_i64().map_or(Self::Other(type_id), Self::Integer)
                }
            });
        }
        if type_id == data_id {
            return CfData::from_type(value.clone())
                .map_or(Self::Other(type_id), |d| Self::Data(d.to_vec()));
        }
        if type_id == array_id {
            return CfArray::from_type(value.clone()).map_or(Self::Other(type_id), |a| {
                let items = (0..a.len())
                    .filter_map(|i| a.get(i))
                    .map(|item| Self::from_cf(&item))
                    .collect();
                Self::Array(items)
            });
        }
        if type_id == dict_id {
            return CfDictionary::from_type(value.clone()).map_or(Self::Other(type_id), |d| {
                let entries = d
                    .entries()
                    .into_iter()
                    .map(|(key, val)| {
                        let key = CfString::from_type(key)
                            .map_or_else(|_| String::new(), |s| s.to_string_lossy());
                        (key, Self::from_cf(&val))
                    })
                    .collect();
                Self::Dictionary(entries)
            });
        }
        Self::Other(type_id)
    }

    /// String payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer.
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean payload, if this is a boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlistValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v:.2}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Data(bytes) => write!(f, "Data[{}]", bytes.len()),
            Self::Array(items) => write!(f, "Array[{}]", items.len()),
            Self::Dictionary(entries) => write!(f, "Dictionary[{}]", entries.len()),
            Self::Other(type_id) => write!(f, "<CF type {type_id}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions() {
        let s = CfString::new("IOUSBHostDevice").unwrap();
        assert_eq!(
            PlistValue::from_cf(s.as_type()),
            PlistValue::String("IOUSBHostDevice".to_string())
        );

        let n = CfNumber::from_i64(42).unwrap();
        assert_eq!(PlistValue::from_cf(n.as_type()), PlistValue::Integer(42));

        let r = CfNumber::from_f64(1.5).unwrap();
        assert_eq!(PlistValue::from_cf(r.as_type()), PlistValue::Real(1.5));
    }

    #[test]
    fn container_recursion() {
        let key = CfString::new("Removable").unwrap();
        let name_key = CfString::new("BSD Name").unwrap();
        let name = CfString::new("disk2").unwrap();
        let size = CfNumber::from_i64(1024).unwrap();
        let inner =
            CfArray::from_values(&[name.as_type(), size.as_type()]).unwrap();
        let dict = CfDictionary::from_pairs(&[
            (&name_key, name.as_type()),
            (&key, inner.as_type()),
        ])
        .unwrap();

        let PlistValue::Dictionary(entries) = PlistValue::from_cf(dict.as_type()) else {
            panic!("expected a dictionary");
        };
        assert_eq!(entries.len(), 2);
        let array = entries
            .iter()
            .find(|(k, _)| k == "Removable")
            .map(|(_, v)| v)
            .unwrap();
        assert_eq!(
            *array,
            PlistValue::Array(vec![
                PlistValue::String("disk2".to_string()),
                PlistValue::Integer(1024),
            ])
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(PlistValue::Integer(7).to_string(), "7");
        assert_eq!(
            PlistValue::String("disk0".to_string()).to_string(),
            "\"disk0\""
        );
        assert_eq!(PlistValue::Data(vec![0; 16]).to_string(), "Data[16]");
    }
}
