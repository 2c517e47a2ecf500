//! # UintArray — Growable Typed Unsigned Vectors
//!
//! Dynamic arrays of 16/32/64-bit unsigned values used wherever the engine
//! hands lists across a boundary: root-prime tables, sieve output, gap
//! streams. Capacity doubles on full (initial capacity at least 1), an
//! `ordered` hint records whether the contents are known ascending, and a
//! 32-byte SHA-256 payload checksum backs the binary stream format
//! `[count: i32 LE][payload: count * W/8 bytes][checksum: 32 bytes]`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use tracing::error;

use crate::bitmap::CHECKSUM_LEN;
use crate::EngineError;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
    impl Sealed for u64 {}
}

/// Element widths the array supports. Sealed: exactly u16, u32, u64.
pub trait Width: sealed::Sealed + Copy + Ord + Default {
    const BYTES: usize;
    fn write_elem<W: Write>(self, w: &mut W) -> std::io::Result<()>;
    fn read_elem<R: Read>(r: &mut R) -> std::io::Result<Self>;
    fn hash_elem(self, hasher: &mut Sha256);
}

impl Width for u16 {
    const BYTES: usize = 2;
    fn write_elem<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_u16::<LittleEndian>(self)
    }
    fn read_elem<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_u16::<LittleEndian>()
    }
    fn hash_elem(self, hasher: &mut Sha256) {
        hasher.update(self.to_le_bytes());
    }
}

impl Width for u32 {
    const BYTES: usize = 4;
    fn write_elem<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self)
    }
    fn read_elem<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_u32::<LittleEndian>()
    }
    fn hash_elem(self, hasher: &mut Sha256) {
        hasher.update(self.to_le_bytes());
    }
}

impl Width for u64 {
    const BYTES: usize = 8;
    fn write_elem<W: Write>(self, w: &mut W) -> std::io::Result<()> {
        w.write_u64::<LittleEndian>(self)
    }
    fn read_elem<R: Read>(r: &mut R) -> std::io::Result<Self> {
        r.read_u64::<LittleEndian>()
    }
    fn hash_elem(self, hasher: &mut Sha256) {
        hasher.update(self.to_le_bytes());
    }
}

/// Growable array of unsigned `T` with an ordering hint and payload checksum.
#[derive(Clone, PartialEq, Eq)]
pub struct UintArray<T: Width> {
    items: Vec<T>,
    ordered: bool,
    checksum: [u8; CHECKSUM_LEN],
}

impl<T: Width> UintArray<T> {
    /// Allocate with room for `cap` elements. `None` on allocation failure.
    pub fn with_capacity(cap: usize) -> Option<Self> {
        let mut items = Vec::new();
        if items.try_reserve_exact(cap).is_err() {
            error!(cap, "uint array allocation failed");
            return None;
        }
        Some(UintArray {
            items,
            ordered: false,
            checksum: [0u8; CHECKSUM_LEN],
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Whether the contents are known to be strictly ascending (hint only).
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Record an ordering guarantee established by the producer.
    #[inline]
    pub fn set_ordered(&mut self, ordered: bool) {
        self.ordered = ordered;
    }

    /// Append, doubling capacity when full (initial capacity 1).
    pub fn push(&mut self, v: T) {
        if self.items.len() == self.items.capacity() {
            let add = self.items.capacity().max(1);
            self.items.reserve_exact(add);
        }
        self.items.push(v);
        self.ordered = false;
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    #[inline]
    pub fn last(&self) -> Option<T> {
        self.items.last().copied()
    }

    /// Sort ascending and set the `ordered` hint.
    pub fn sort(&mut self) {
        self.items.sort_unstable();
        self.ordered = true;
    }

    /// Change capacity to `new_cap`, which must hold the current contents.
    pub fn resize_to(&mut self, new_cap: usize) {
        assert!(new_cap >= self.items.len(), "resize_to below current count");
        if new_cap < self.items.capacity() {
            self.items.shrink_to(new_cap);
        } else {
            self.items.reserve_exact(new_cap - self.items.len());
        }
    }

    /// Drop spare capacity so `capacity == len`. Idempotent.
    pub fn resize_to_fit(&mut self) {
        self.items.shrink_to_fit();
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    fn digest(&self) -> [u8; CHECKSUM_LEN] {
        let mut hasher = Sha256::new();
        for &v in &self.items {
            v.hash_elem(&mut hasher);
        }
        hasher.finalize().into()
    }

    /// Refresh the stored checksum from the current payload.
    pub fn compute_checksum(&mut self) {
        self.checksum = self.digest();
    }

    /// True iff the stored checksum matches a fresh digest.
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.digest()
    }

    /// Serialize as `[count: i32 LE][payload][checksum]`.
    pub fn write_stream<W: Write>(&self, w: &mut W) -> Result<(), EngineError> {
        let count = i32::try_from(self.items.len())
            .map_err(|_| EngineError::InvalidInput("array too large for stream header".into()))?;
        w.write_i32::<LittleEndian>(count)?;
        for &v in &self.items {
            v.write_elem(w)?;
        }
        w.write_all(&self.checksum)?;
        Ok(())
    }

    /// Deserialize an array written by [`UintArray::write_stream`], verifying
    /// the payload checksum. The `ordered` hint is not persisted and comes
    /// back false.
    pub fn read_stream<R: Read>(r: &mut R) -> Result<Self, EngineError> {
        let count = r.read_i32::<LittleEndian>()?;
        let count = usize::try_from(count)
            .map_err(|_| EngineError::InvalidInput("negative element count in stream".into()))?;
        let mut arr = Self::with_capacity(count).ok_or(EngineError::Alloc)?;
        for _ in 0..count {
            arr.items.push(T::read_elem(r)?);
        }
        r.read_exact(&mut arr.checksum)?;
        if arr.checksum != [0u8; CHECKSUM_LEN] && !arr.verify_checksum() {
            error!(count, "uint array stream failed checksum verification");
            return Err(EngineError::ChecksumMismatch);
        }
        Ok(arr)
    }

    /// Consume into the raw vector.
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: Width> std::ops::Index<usize> for UintArray<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.items[i]
    }
}

impl<T: Width> FromIterator<T> for UintArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        UintArray {
            items: Vec::from_iter(iter),
            ordered: false,
            checksum: [0u8; CHECKSUM_LEN],
        }
    }
}
