//! Connection points: the COM outgoing-interface (event sink) protocol.
//!
//! An event source implements `IConnectionPointContainer`; each outgoing
//! interface has an `IConnectionPoint` that hands out advise cookies.
//! [`AdviseCookie`] ties the mandatory `Unadvise` to Drop.

use windows::Win32::System::Com::{
    IConnectionPoint, IConnectionPointContainer, IEnumConnectionPoints,
};
use windows::core::{GUID, IUnknown, Interface};

use super::errors::ComResult;

/// Wrapper over an event source's `IConnectionPointContainer`.
#[derive(Debug, Clone)]
pub struct ConnectionPoints {
    inner: IConnectionPointContainer,
}

impl ConnectionPoints {
    /// Queries `source` for connection-point support.
    ///
    /// # Errors
    ///
    /// `E_NOINTERFACE` when the object is not an event source.
    pub fn from_source<I: Interface>(source: &I) -> ComResult<Self> {
        Ok(Self {
            inner: source.cast()?,
        })
    }

    /// Finds the connection point for the outgoing interface `iid`.
    pub fn find(&self, iid: &GUID) -> ComResult<ConnectionPoint> {
        // SAFETY: a missing point yields CONNECT_E_NOCONNECTION.
        let point = unsafe { self.inner.FindConnectionPoint(iid) }?;
        Ok(ConnectionPoint { inner: point })
    }

    /// Enumerates every connection point the source offers.
    pub fn iter(&self) -> ComResult<ConnectionPointIterator> {
        // SAFETY: no preconditions.
        let inner = unsafe { self.inner.EnumConnectionPoints() }?;
        Ok(ConnectionPointIterator {
            inner,
            cache: Box::new([const { None }; 8]),
            index: 8,
            count: 0,
            done: false,
        })
    }
}

/// One outgoing interface of an event source.
#[derive(Debug, Clone)]
pub struct ConnectionPoint {
    inner: IConnectionPoint,
}

impl ConnectionPoint {
    /// IID of the outgoing interface this point manages.
    pub fn interface_iid(&self) -> ComResult<GUID> {
        // SAFETY: no preconditions.
        Ok(unsafe { self.inner.GetConnectionInterface() }?)
    }

    /// Connects `sink` and returns the RAII cookie.
    ///
    /// The sink must implement the outgoing interface this point manages;
    /// the source enforces that and answers `CONNECT_E_CANNOTCONNECT`
    /// otherwise.
    pub fn advise(&self, sink: &IUnknown) -> ComResult<AdviseCookie> {
        // SAFETY: `sink` is a live interface; the source AddRefs it.
        let cookie = unsafe { self.inner.Advise(sink) }?;
        tracing::debug!(cookie, "event sink connected");
        Ok(AdviseCookie {
            point: self.inner.clone(),
            cookie: Some(cookie),
        })
    }
}

/// Active event connection; disconnects on drop.
#[derive(Debug)]
pub struct AdviseCookie {
    point: IConnectionPoint,
    cookie: Option<u32>,
}

impl AdviseCookie {
    /// The raw cookie value the source issued.
    #[must_use]
    pub fn value(&self) -> Option<u32> {
        self.cookie
    }

    /// Disconnects eagerly, surfacing the `Unadvise` result.
    pub fn unadvise(mut self) -> ComResult<()> {
        if let Some(cookie) = self.cookie.take() {
            // SAFETY: the cookie came from Advise on this same point and
            // is consumed here.
            unsafe { self.point.Unadvise(cookie) }?;
            tracing::debug!(cookie, "event sink disconnected");
        }
        Ok(())
    }
}

impl Drop for AdviseCookie {
    fn drop(&mut self) {
        if let Some(cookie) = self.cookie.take() {
            // SAFETY: as in `unadvise`; a failure here has no recovery
            // path, so it is only logged.
            if let Err(e) = unsafe { self.point.Unadvise(cookie) } {
                tracing::error!(error = ?e, cookie, "Unadvise failed during drop");
            }
        }
    }
}

/// Iterator over a source's connection points.
pub struct ConnectionPointIterator {
    inner: IEnumConnectionPoints,
    cache: Box<[Option<IConnectionPoint>; 8]>,
    index: u32,
    count: u32,
    done: bool,
}

impl Iterator for ConnectionPointIterator {
    type Item = windows::core::Result<ConnectionPoint>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.index >= self.count {
            // SAFETY: the cache slice and fetch count outlive the call.
            let code = unsafe {
                self.inner
                    .Next(self.cache.as_mut_slice(), Some(&mut self.count))
            };

            if code.is_ok() {
                if self.count == 0 {
                    self.done = true;
                    return None;
                }
                self.index = 0;
            } else {
                self.done = true;
                return Some(Err(windows::core::Error::new(
                    code,
                    "Failed to get next connection point",
                )));
            }
        }

        let current = self.cache[self.index as usize].take();
        self.index += 1;
        Some(match current {
            Some(inner) => Ok(ConnectionPoint { inner }),
            None => Err(windows::core::Error::new(
                windows::Win32::Foundation::E_POINTER,
                "Enumerator returned a null connection point",
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use windows::Win32::System::Com::{
        IConnectionPointContainer_Impl, IConnectionPoint_Impl, IEnumConnections,
    };
    use windows::core::implement;

    const EVENTS_IID: GUID = GUID::from_u128(0x2f3a0b10_9d7c_4f7e_8a61_0123456789ab);

    #[implement(IConnectionPoint)]
    struct MockPoint {
        next_cookie: AtomicU32,
        active: Mutex<Vec<u32>>,
    }

    impl IConnectionPoint_Impl for MockPoint_Impl {
        fn GetConnectionInterface(&self) -> windows::core::Result<GUID> {
            Ok(EVENTS_IID)
        }

        fn GetConnectionPointContainer(
            &self,
        ) -> windows::core::Result<IConnectionPointContainer> {
            Err(windows::Win32::Foundation::E_NOTIMPL.into())
        }

        fn Advise(&self, _punksink: windows::core::Ref<'_, IUnknown>) -> windows::core::Result<u32> {
            let cookie = self.next_cookie.fetch_add(1, Ordering::Relaxed);
            self.active.lock().unwrap().push(cookie);
            Ok(cookie)
        }

        fn Unadvise(&self, dwcookie: u32) -> windows::core::Result<()> {
            let mut active = self.active.lock().unwrap();
            let before = active.len();
            active.retain(|&c| c != dwcookie);
            if active.len() == before {
                return Err(windows::Win32::Foundation::E_INVALIDARG.into());
            }
            Ok(())
        }

        fn EnumConnections(&self) -> windows::core::Result<IEnumConnections> {
            Err(windows::Win32::Foundation::E_NOTIMPL.into())
        }
    }

    #[implement(IUnknown)]
    struct NullSink;

    #[test]
    fn advise_cookie_unadvises_on_drop() {
        let point_impl = MockPoint {
            next_cookie: AtomicU32::new(1),
            active: Mutex::new(Vec::new()),
        };
        let point_iface: IConnectionPoint = point_impl.into();
        let point = ConnectionPoint {
            inner: point_iface.clone(),
        };

        let sink: IUnknown = NullSink.into();
        let cookie = point.advise(&sink).unwrap();
        assert_eq!(cookie.value(), Some(1));
        drop(cookie);

        // A second Unadvise for the same cookie must now fail: Drop
        // already balanced the Advise.
        assert!(unsafe { point_iface.Unadvise(1) }.is_err());
    }

    #[test]
    fn explicit_unadvise_consumes_the_cookie() {
        let point_iface: IConnectionPoint = MockPoint {
            next_cookie: AtomicU32::new(7),
            active: Mutex::new(Vec::new()),
        }
        .into();
        let point = ConnectionPoint {
            inner: point_iface,
        };
        let sink: IUnknown = NullSink.into();
        let cookie = point.advise(&sink).unwrap();
        cookie.unadvise().unwrap();
    }

    #[test]
    fn interface_iid_is_reported() {
        let point_iface: IConnectionPoint = MockPoint {
            next_cookie: AtomicU32::new(1),
            active: Mutex::new(Vec::new()),
        }
        .into();
        let point = ConnectionPoint { inner: point_iface };
        assert_eq!(point.interface_iid().unwrap(), EVENTS_IID);
    }
}
