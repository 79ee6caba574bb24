use std::mem::size_of;

use bytemuck::Pod;

use crate::foundation::error::{ScanError, ScanResult};

/// Smallest number of elements added by an exponential grow.
pub const MIN_CAPACITY_GROWTH: usize = 4;
/// Largest number of elements added by an exponential grow (unless more were requested).
pub const MAX_CAPACITY_GROWTH: usize = 1 << 16;

/// Options for [`DynArray`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DynArrayOpts {
    /// Zero the initial allocation's unused tail on construction and hand out zeroed elements
    /// from [`DynArray::add_multiple`].
    pub zero_fill: bool,
}

/// Growable buffer of plain-data elements.
///
/// The array may start on a caller-supplied *initial allocation* (typically stack storage) that
/// it borrows but never owns. The first growth past that allocation moves the elements into an
/// owned heap buffer; the array stays there until [`DynArray::shrink_to_size`] moves them back.
///
/// Every fallible operation is all-or-nothing: on error the array is exactly as it was before
/// the call.
pub struct DynArray<'a, T: Pod> {
    initial: Option<&'a mut [T]>,
    // Active buffer when present. Its length is the capacity; elements past `count` are unused.
    owned: Option<Vec<T>>,
    count: usize,
    opts: DynArrayOpts,
}

impl<T: Pod> DynArray<'static, T> {
    /// Empty array with no initial allocation.
    pub fn new(opts: DynArrayOpts) -> Self {
        Self {
            initial: None,
            owned: None,
            count: 0,
            opts,
        }
    }
}

impl<T: Pod> Default for DynArray<'static, T> {
    fn default() -> Self {
        Self::new(DynArrayOpts::default())
    }
}

impl<'a, T: Pod> DynArray<'a, T> {
    /// Array backed by `initial`, whose first `count` elements are already valid.
    ///
    /// In zero-fill mode the unused tail `initial[count..]` is zeroed immediately.
    pub fn with_initial(initial: &'a mut [T], count: usize, opts: DynArrayOpts) -> ScanResult<Self> {
        if count > initial.len() {
            return Err(ScanError::validation(format!(
                "initial count {count} exceeds initial capacity {}",
                initial.len()
            )));
        }
        if opts.zero_fill {
            initial[count..].fill(T::zeroed());
        }
        Ok(Self {
            initial: Some(initial),
            owned: None,
            count,
            opts,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.buffer().len()
    }

    pub fn element_size(&self) -> usize {
        size_of::<T>()
    }

    /// Byte length of the valid elements.
    pub fn byte_len(&self) -> usize {
        self.count * size_of::<T>()
    }

    pub fn opts(&self) -> DynArrayOpts {
        self.opts
    }

    /// True while the elements still live in the caller-supplied initial allocation.
    pub fn is_using_initial_allocation(&self) -> bool {
        self.owned.is_none() && self.initial.is_some()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.buffer()[..self.count]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let count = self.count;
        &mut self.buffer_mut()[..count]
    }

    /// Ensure room for `additional` more elements.
    ///
    /// Unless `exact` is set, capacity grows by
    /// `max(needed, clamp(capacity, MIN_CAPACITY_GROWTH, MAX_CAPACITY_GROWTH))`.
    pub fn grow(&mut self, additional: usize, exact: bool) -> ScanResult<()> {
        let required = self.count.checked_add(additional).ok_or_else(|| {
            ScanError::allocation_size(format!(
                "element count overflow: {} + {additional}",
                self.count
            ))
        })?;
        let capacity = self.capacity();
        if required <= capacity {
            return Ok(());
        }

        let new_capacity = if exact {
            required
        } else {
            let needed = required - capacity;
            let step = needed.max(capacity.clamp(MIN_CAPACITY_GROWTH, MAX_CAPACITY_GROWTH));
            capacity.checked_add(step).ok_or_else(|| {
                ScanError::allocation_size(format!("capacity overflow: {capacity} + {step}"))
            })?
        };

        let mut grown = alloc_zeroed::<T>(new_capacity)?;
        grown[..self.count].copy_from_slice(self.as_slice());

        if self.owned.is_none() && self.initial.is_some() {
            tracing::trace!(
                from = capacity,
                to = new_capacity,
                "dynarray leaving initial allocation"
            );
        }
        self.owned = Some(grown);
        Ok(())
    }

    /// Append one element.
    pub fn add(&mut self, value: T) -> ScanResult<()> {
        self.grow(1, false)?;
        let idx = self.count;
        self.buffer_mut()[idx] = value;
        self.count += 1;
        Ok(())
    }

    /// Reserve `n` elements at the end and return them.
    ///
    /// The returned elements are zeroed in zero-fill mode; otherwise they hold whatever the
    /// buffer contained (zero for freshly grown capacity).
    pub fn add_multiple(&mut self, n: usize) -> ScanResult<&mut [T]> {
        self.grow(n, false)?;
        let start = self.count;
        self.count += n;
        let zero_fill = self.opts.zero_fill;
        let end = self.count;
        let out = &mut self.buffer_mut()[start..end];
        if zero_fill {
            out.fill(T::zeroed());
        }
        Ok(out)
    }

    /// Append a copy of `values`.
    pub fn add_multiple_and_set(&mut self, values: &[T]) -> ScanResult<()> {
        self.grow(values.len(), false)?;
        let start = self.count;
        let end = start + values.len();
        self.buffer_mut()[start..end].copy_from_slice(values);
        self.count = end;
        Ok(())
    }

    /// Set the element count without touching the buffer. `n` must not exceed the capacity.
    pub fn set_count(&mut self, n: usize) -> ScanResult<()> {
        if n > self.capacity() {
            return Err(ScanError::validation(format!(
                "count {n} exceeds capacity {}",
                self.capacity()
            )));
        }
        self.count = n;
        Ok(())
    }

    /// Drop all elements, keeping the current buffer.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    /// Fit the buffer to the element count.
    ///
    /// Moves back into the initial allocation when the elements fit there. Failure to allocate
    /// the tighter buffer is not an error; the larger buffer is kept.
    pub fn shrink_to_size(&mut self) {
        let Some(owned) = self.owned.as_ref() else {
            return;
        };
        let count = self.count;

        if let Some(initial) = self.initial.as_deref_mut()
            && count <= initial.len()
        {
            initial[..count].copy_from_slice(&owned[..count]);
            self.owned = None;
            return;
        }

        if count == owned.len() {
            return;
        }
        if count == 0 {
            self.owned = None;
            return;
        }
        match alloc_zeroed::<T>(count) {
            Ok(mut exact) => {
                exact.copy_from_slice(&owned[..count]);
                self.owned = Some(exact);
            }
            Err(err) => {
                tracing::debug!(%err, count, "dynarray shrink skipped");
            }
        }
    }

    /// Hand the elements to the caller and reset the array to empty.
    ///
    /// If the elements still live in the initial allocation they are copied into a new heap
    /// buffer first.
    pub fn detach_data(&mut self) -> ScanResult<Vec<T>> {
        let count = self.count;
        let data = match self.owned.take() {
            Some(mut owned) => {
                owned.truncate(count);
                owned
            }
            None => {
                let mut copy = alloc_zeroed::<T>(count)?;
                copy.copy_from_slice(self.as_slice());
                copy
            }
        };
        self.count = 0;
        Ok(data)
    }

    fn buffer(&self) -> &[T] {
        match (&self.owned, &self.initial) {
            (Some(owned), _) => owned,
            (None, Some(initial)) => initial,
            (None, None) => &[],
        }
    }

    fn buffer_mut(&mut self) -> &mut [T] {
        if let Some(owned) = self.owned.as_mut() {
            owned.as_mut_slice()
        } else if let Some(initial) = self.initial.as_deref_mut() {
            initial
        } else {
            &mut []
        }
    }
}

impl<T: Pod + std::fmt::Debug> std::fmt::Debug for DynArray<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynArray")
            .field("count", &self.count)
            .field("capacity", &self.capacity())
            .field("initial", &self.is_using_initial_allocation())
            .field("zero_fill", &self.opts.zero_fill)
            .finish()
    }
}

fn alloc_zeroed<T: Pod>(len: usize) -> ScanResult<Vec<T>> {
    let bytes = len
        .checked_mul(size_of::<T>())
        .filter(|&b| b <= isize::MAX as usize)
        .ok_or_else(|| {
            ScanError::allocation_size(format!(
                "{len} elements of {} bytes overflow",
                size_of::<T>()
            ))
        })?;
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| ScanError::OutOfMemory(bytes))?;
    v.resize(len, T::zeroed());
    Ok(v)
}

#[cfg(test)]
#[path = "../../tests/unit/memory/dynarray.rs"]
mod tests;
