//! Fixed-capacity insert-only ring buffer.

/// Slots kept per stream for extrapolation.
pub const CAPACITY: usize = 3;

/// Overwrites the oldest entry once full. Never allocates.
#[derive(Debug, Clone, Copy)]
pub struct RingBuffer<T: Copy + Default, const N: usize = CAPACITY> {
    slots: [T; N],
    next: usize,
    len: usize,
}

impl<T: Copy + Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default, const N: usize> RingBuffer<T, N> {
    pub fn new() -> Self {
        Self {
            slots: [T::default(); N],
            next: 0,
            len: 0,
        }
    }

    pub fn insert(&mut self, x: T) {
        self.slots[self.next] = x;
        self.next = (self.next + 1) % N;
        self.len = (self.len + 1).min(N);
    }

    /// Copies the contents into `out` oldest first and returns the count.
    pub fn unroll(&self, out: &mut [T; N]) -> usize {
        if self.len == N {
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = self.slots[(self.next + i) % N];
            }
        } else {
            out[..self.len].copy_from_slice(&self.slots[..self.len]);
        }
        self.len
    }

    /// Most recently inserted entry.
    pub fn last(&self) -> Option<T> {
        if self.len == 0 {
            None
        } else {
            Some(self.slots[(self.next + N - 1) % N])
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
