//! Iteration over Automation collections via `IEnumVARIANT`.

use windows::Win32::System::Ole::IEnumVARIANT;
use windows::Win32::System::Variant::VARIANT;

use super::variant::Value;

const FETCH_BATCH: usize = 16;

/// Iterator over the VARIANTs of an Automation collection.
///
/// Fetches in fixed-size batches and yields each element as an owned
/// [`Value`]. The enumerator protocol (`S_FALSE` on a short final batch)
/// is handled here so callers see a plain Rust iterator.
pub struct VariantIterator {
    inner: IEnumVARIANT,
    cache: Box<[VARIANT; FETCH_BATCH]>,
    index: u32,
    count: u32,
    done: bool,
}

impl VariantIterator {
    /// Creates an iterator from a COM enumerator.
    pub fn new(inner: IEnumVARIANT) -> Self {
        Self {
            inner,
            cache: Box::new(std::array::from_fn(|_| VARIANT::default())),
            index: FETCH_BATCH as u32,
            count: 0,
            done: false,
        }
    }

    /// Rewinds the underlying enumerator and clears the local cache.
    pub fn reset(&mut self) -> windows::core::Result<()> {
        // SAFETY: Reset has no preconditions.
        unsafe { self.inner.Reset() }?;
        self.discard_cached();
        self.done = false;
        Ok(())
    }

    /// Skips `count` elements without materializing them.
    pub fn skip_elements(&mut self, count: u32) -> windows::core::Result<()> {
        // Cached positions no longer line up after a skip.
        self.discard_cached();
        // SAFETY: Skip has no preconditions.
        unsafe { self.inner.Skip(count) }.ok()
    }

    /// Drops cached elements that were fetched but never yielded, so a
    /// refill never overwrites a live VARIANT.
    fn discard_cached(&mut self) {
        for i in self.index..self.count {
            drop(std::mem::take(&mut self.cache[i as usize]));
        }
        self.index = FETCH_BATCH as u32;
        self.count = 0;
    }

    /// Clones the underlying enumerator at its current position.
    pub fn try_clone(&self) -> windows::core::Result<Self> {
        // SAFETY: Clone has no preconditions.
        let cloned = unsafe { self.inner.Clone() }?;
        Ok(Self::new(cloned))
    }
}

impl Iterator for VariantIterator {
    type Item = windows::core::Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.index >= self.count {
            // Every yielded slot was taken out below, so the callee
            // writes over VT_EMPTY slots only.
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
                    "Failed to get next collection element",
                )));
            }
        }

        // Take ownership out of the slot; the VARIANT (and any BSTR or
        // interface payload) is cleared when `current` drops here.
        let current = std::mem::take(&mut self.cache[self.index as usize]);
        self.index += 1;
        Some(Ok(Value::from_variant(&current)))
    }
}
