//! Running Object Table access: find and enumerate live, registered
//! objects by moniker.

use windows::Win32::System::Com::{
    CreateBindCtx, GetRunningObjectTable, IBindCtx, IEnumMoniker, IMoniker, IRunningObjectTable,
};
use windows::Win32::System::Ole::GetActiveObject;
use windows::core::{GUID, IUnknown, Interface, PWSTR};

use super::errors::{ComError, ComResult};
use super::memory::TaskMem;

/// One entry of the Running Object Table.
#[derive(Debug)]
pub struct RunningObject {
    moniker: IMoniker,
    display_name: String,
}

impl RunningObject {
    /// Human-readable moniker display name
    /// (e.g. `!{clsid}` or a document path).
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The moniker itself, for binding or comparison.
    #[must_use]
    pub fn moniker(&self) -> &IMoniker {
        &self.moniker
    }
}

/// Wrapper over the session's Running Object Table.
#[derive(Debug, Clone)]
pub struct RunningObjectTable {
    inner: IRunningObjectTable,
    bind_ctx: IBindCtx,
}

impl RunningObjectTable {
    /// Opens the table for the current session.
    pub fn open() -> ComResult<Self> {
        // SAFETY: reserved arguments must be zero per the API contract.
        let inner = unsafe { GetRunningObjectTable(0) }?;
        // SAFETY: as above.
        let bind_ctx = unsafe { CreateBindCtx(0) }?;
        Ok(Self { inner, bind_ctx })
    }

    /// Enumerates the currently registered objects with their display
    /// names. Entries whose display name cannot be produced are skipped
    /// with a debug log rather than aborting the walk.
    pub fn running_objects(&self) -> ComResult<Vec<RunningObject>> {
        // SAFETY: no preconditions.
        let enumerator: IEnumMoniker = unsafe { self.inner.EnumRunning() }?;
        let mut objects = Vec::new();
        loop {
            let mut batch: [Option<IMoniker>; 8] = std::array::from_fn(|_| None);
            let mut fetched = 0u32;
            // SAFETY: the batch slice and fetch count outlive the call.
            let code = unsafe { enumerator.Next(&mut batch, Some(&mut fetched)) };
            if code.is_err() {
                return Err(ComError::Com {
                    source: windows::core::Error::new(code, "EnumRunning::Next failed"),
                });
            }
            if fetched == 0 {
                break;
            }
            for moniker in batch.into_iter().take(fetched as usize).flatten() {
                match self.display_name_of(&moniker) {
                    Ok(display_name) => objects.push(RunningObject {
                        moniker,
                        display_name,
                    }),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping moniker without display name");
                    }
                }
            }
        }
        Ok(objects)
    }

    /// Display name of a moniker, via the table's bind context.
    pub fn display_name_of(&self, moniker: &IMoniker) -> ComResult<String> {
        // SAFETY: the bind context is live; the returned PWSTR is
        // COM-allocated and owned by the TaskMem below.
        let raw: PWSTR = unsafe { moniker.GetDisplayName(&self.bind_ctx, None) }?;
        Ok(String::try_from(TaskMem::from(raw))?)
    }

    /// Retrieves the object a moniker names, if it is still running.
    pub fn get_object(&self, moniker: &IMoniker) -> ComResult<IUnknown> {
        // SAFETY: the moniker is live.
        Ok(unsafe { self.inner.GetObject(moniker) }?)
    }

    /// Finds a running object whose display name contains `needle`
    /// (case-insensitive).
    pub fn find_by_name(&self, needle: &str) -> ComResult<Option<RunningObject>> {
        let needle = needle.to_lowercase();
        Ok(self
            .running_objects()?
            .into_iter()
            .find(|o| o.display_name.to_lowercase().contains(&needle)))
    }
}

/// Fetches the running instance of a registered class, the
/// `GetActiveObject` path (e.g. an already-open `Excel.Application`).
///
/// # Errors
///
/// `MK_E_UNAVAILABLE` (as [`ComError::Com`]) when no instance of the
/// class is currently registered as running.
pub fn active_object<I: Interface>(clsid: &GUID) -> ComResult<I> {
    let mut unknown: Option<IUnknown> = None;
    // SAFETY: the reserved pointer must be null; `unknown` outlives the
    // call.
    unsafe { GetActiveObject(clsid, None, &raw mut unknown) }?;
    let unknown = unknown.ok_or_else(|| {
        ComError::NotFound("GetActiveObject returned no object".to_string())
    })?;
    Ok(unknown.cast()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::com::guard::ComGuard;

    #[test]
    fn open_and_enumerate() {
        let _guard = ComGuard::new().unwrap();
        let rot = RunningObjectTable::open().unwrap();
        // The table exists on every session; contents vary, so only the
        // walk itself is asserted.
        let objects = rot.running_objects().unwrap();
        for object in &objects {
            assert!(!object.display_name().is_empty());
        }
    }

    #[test]
    fn find_by_name_misses_cleanly() {
        let _guard = ComGuard::new().unwrap();
        let rot = RunningObjectTable::open().unwrap();
        let hit = rot
            .find_by_name("sysport-no-such-object-7f3a")
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn active_object_for_unregistered_class_fails() {
        let _guard = ComGuard::new().unwrap();
        let bogus = GUID::from_u128(0x0e8d1f00_1111_2222_3333_444455556666);
        let result: ComResult<IUnknown> = active_object(&bogus);
        assert!(result.is_err());
    }
}
