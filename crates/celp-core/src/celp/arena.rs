//! Scratch arena for per-subframe temporaries
//!
//! The searches need a handful of short-lived vectors per subframe
//! (impulse responses, filtered codebook entries, correlation matrices).
//! [`ScratchArena`] owns one preallocated buffer; [`Scratch`] is a bump
//! allocator over its free tail. Calling [`Scratch::scope`] opens a child
//! scope whose allocations are released when the child is dropped, and the
//! borrow checker prevents the parent from allocating while a child is
//! alive, so release order is always LIFO.

use crate::error::{CodecError, Result};

/// Preallocated backing store for [`Scratch`] scopes
#[derive(Debug, Clone)]
pub struct ScratchArena {
    buffer: Vec<f32>,
}

impl ScratchArena {
    /// Create an arena with room for `capacity` values
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
        }
    }

    /// Total capacity in values
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Open the outermost scope
    pub fn scope(&mut self) -> Scratch<'_> {
        Scratch {
            free: &mut self.buffer[..],
        }
    }
}

/// Bump allocator over the free part of a [`ScratchArena`]
#[derive(Debug)]
pub struct Scratch<'a> {
    free: &'a mut [f32],
}

impl<'a> Scratch<'a> {
    /// Allocate `len` zeroed values
    pub fn alloc(&mut self, len: usize) -> Result<&'a mut [f32]> {
        if len > self.free.len() {
            return Err(CodecError::ArenaExhausted {
                requested: len,
                available: self.free.len(),
            });
        }
        let free = std::mem::take(&mut self.free);
        let (head, tail) = free.split_at_mut(len);
        self.free = tail;
        head.fill(0.0);
        Ok(head)
    }

    /// Allocate a copy of `values`
    pub fn alloc_copy(&mut self, values: &[f32]) -> Result<&'a mut [f32]> {
        let out = self.alloc(values.len())?;
        out.copy_from_slice(values);
        Ok(out)
    }

    /// Open a child scope; everything it allocates is released on drop
    pub fn scope(&mut self) -> Scratch<'_> {
        Scratch {
            free: &mut *self.free,
        }
    }

    /// Values still available in this scope
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope_releases_on_drop() {
        let mut arena = ScratchArena::with_capacity(64);
        let mut outer = arena.scope();
        let a = outer.alloc(16).unwrap();
        a.fill(1.0);
        {
            let mut inner = outer.scope();
            let b = inner.alloc(40).unwrap();
            b.fill(2.0);
            assert_eq!(inner.available(), 8);
        }
        assert_eq!(outer.available(), 48);
        let c = outer.alloc(48).unwrap();
        // Reused memory comes back zeroed
        assert!(c.iter().all(|&v| v == 0.0));
        assert!(a.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut arena = ScratchArena::with_capacity(10);
        let mut scratch = arena.scope();
        assert!(scratch.alloc(8).is_ok());
        assert_eq!(
            scratch.alloc(3).unwrap_err(),
            CodecError::ArenaExhausted {
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_alloc_copy() {
        let mut arena = ScratchArena::with_capacity(4);
        let mut scratch = arena.scope();
        let copy = scratch.alloc_copy(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(copy, &[1.0, 2.0, 3.0]);
    }
}
