//! Fixed-capacity container used on the per-report hot path.
//!
//! Decoded reports are produced at input rate (often 1 kHz per device), so the
//! field lists inside them never touch the heap: [`FixedVec`] is a plain array
//! plus a length counter. Pushing past capacity silently drops the item, which
//! is exactly the truncation behavior the capability bounds rely on.

/// Array-backed vector with a compile-time capacity.
#[derive(Clone, Copy, Debug)]
pub struct FixedVec<T, const N: usize> {
    items: [T; N],
    len: usize,
}

impl<T: Copy + Default, const N: usize> FixedVec<T, N> {
    pub fn new() -> Self {
        Self {
            items: [T::default(); N],
            len: 0,
        }
    }

    /// Appends `item` if there is room; returns `false` (and drops it) otherwise.
    pub fn push(&mut self, item: T) -> bool {
        if self.len < N {
            self.items[self.len] = item;
            self.len += 1;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<T: Copy + Default, const N: usize> Default for FixedVec<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> std::ops::Deref for FixedVec<T, N> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items[..self.len]
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a FixedVec<T, N> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items[..self.len].iter()
    }
}
