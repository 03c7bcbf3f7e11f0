//! Accelerator-visible backing arrays and the bounded region registry.
//!
//! A [`Region`] is an ordinary array living in normal memory that indirect
//! and streaming operations read and write. Storage is word-level atomic:
//! plain loads and stores are relaxed atomics, so concurrent access from many
//! workers' operations is well-defined element-wise, and the store-with-dump
//! and read-modify-write primitives get genuine per-element atomicity
//! (exchange and compare-exchange) on top of the same cells.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{MaaError, MaaResult};
use crate::types::{ElemType, TileElem};

/// Shared backing array of 32-bit elements, visible to the engine.
///
/// Cloning is shallow; all clones address the same cells. `Region` is
/// `Send + Sync`, so a fork-join kernel can hand the same array to every
/// worker while each worker keeps its private tiles.
pub struct Region<T> {
    inner: Arc<RegionInner>,
    _elem: PhantomData<fn() -> T>,
}

impl<T> Clone for Region<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _elem: PhantomData,
        }
    }
}

pub(crate) struct RegionInner {
    words: Box<[AtomicU32]>,
    elem: ElemType,
}

impl<T: TileElem> Region<T> {
    /// Allocate a region of `len` default-initialized elements.
    pub fn new(len: usize) -> Self {
        Self::from_elem(T::default(), len)
    }

    /// Allocate a region of `len` copies of `value`.
    pub fn from_elem(value: T, len: usize) -> Self {
        let bits = value.to_bits();
        let words = (0..len).map(|_| AtomicU32::new(bits)).collect();
        Self {
            inner: Arc::new(RegionInner {
                words,
                elem: T::ELEM,
            }),
            _elem: PhantomData,
        }
    }

    /// Allocate a region holding a copy of `data`.
    pub fn from_slice(data: &[T]) -> Self {
        let words = data.iter().map(|v| AtomicU32::new(v.to_bits())).collect();
        Self {
            inner: Arc::new(RegionInner {
                words,
                elem: T::ELEM,
            }),
            _elem: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    /// CPU-side scalar read, for setup and fallback loops.
    #[inline(always)]
    pub fn get(&self, index: usize) -> T {
        T::from_bits(self.inner.load(index))
    }

    /// CPU-side scalar write, for setup and fallback loops.
    #[inline(always)]
    pub fn set(&self, index: usize, value: T) {
        self.inner.store(index, value.to_bits());
    }

    /// Snapshot the region contents into an owned vector.
    pub fn to_vec(&self) -> Vec<T> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    pub(crate) fn inner(&self) -> &RegionInner {
        &self.inner
    }

    pub(crate) fn inner_arc(&self) -> Arc<RegionInner> {
        Arc::clone(&self.inner)
    }
}

impl<T: TileElem> From<Vec<T>> for Region<T> {
    fn from(data: Vec<T>) -> Self {
        Region::from_slice(&data)
    }
}

impl RegionInner {
    pub(crate) fn len(&self) -> usize {
        self.words.len()
    }

    pub(crate) fn elem(&self) -> ElemType {
        self.elem
    }

    #[inline(always)]
    pub(crate) fn load(&self, index: usize) -> u32 {
        self.words[index].load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub(crate) fn store(&self, index: usize, bits: u32) {
        self.words[index].store(bits, Ordering::Relaxed);
    }

    /// Atomic exchange; returns the previous cell value. Backs the
    /// store-with-dump claim/snapshot primitive.
    #[inline(always)]
    pub(crate) fn swap(&self, index: usize, bits: u32) -> u32 {
        self.words[index].swap(bits, Ordering::AcqRel)
    }

    /// Atomic read-modify-write via a compare-exchange loop; returns the
    /// previous cell value. `f` may run more than once under contention.
    #[inline(always)]
    pub(crate) fn rmw(&self, index: usize, f: impl Fn(u32) -> u32) -> u32 {
        let cell = &self.words[index];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            match cell.compare_exchange_weak(
                current,
                f(current),
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return prev,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Identifier assigned to a registered region, used as the array operand in
/// the magic instruction encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(pub(crate) u8);

/// Bounded list of arrays declared visible to the accelerator.
///
/// The simulator backends address array operands by `RegionId`, so a kernel
/// phase must register its arrays before issuing through them. The
/// functional engine resolves arrays directly and treats registration as
/// advisory.
pub(crate) struct RegionRegistry {
    slots: Mutex<Vec<Option<Arc<RegionInner>>>>,
}

impl RegionRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(vec![None; capacity]),
        }
    }

    pub(crate) fn register(&self, region: Arc<RegionInner>) -> MaaResult<RegionId> {
        let mut slots = self.slots.lock().unwrap();
        for (i, slot) in slots.iter_mut().enumerate() {
            match slot {
                Some(existing) if Arc::ptr_eq(existing, &region) => {
                    return Ok(RegionId(i as u8));
                }
                None => {
                    *slot = Some(region);
                    return Ok(RegionId(i as u8));
                }
                Some(_) => {}
            }
        }
        Err(MaaError::RegionTableFull {
            capacity: slots.len(),
        })
    }

    pub(crate) fn clear(&self) {
        let mut slots = self.slots.lock().unwrap();
        for slot in slots.iter_mut() {
            *slot = None;
        }
    }

    pub(crate) fn lookup(&self, id: RegionId) -> Option<Arc<RegionInner>> {
        let slots = self.slots.lock().unwrap();
        slots.get(id.0 as usize).and_then(|s| s.clone())
    }

    pub(crate) fn find(&self, region: &RegionInner) -> Option<RegionId> {
        let slots = self.slots.lock().unwrap();
        slots.iter().position(|s| {
            s.as_ref()
                .is_some_and(|r| std::ptr::eq(Arc::as_ptr(r), region))
        })
        .map(|i| RegionId(i as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_scalar_access_roundtrips() {
        let r = Region::<f32>::from_elem(-1.0, 4);
        assert_eq!(r.to_vec(), vec![-1.0; 4]);
        r.set(2, 3.5);
        assert_eq!(r.get(2), 3.5);
        assert_eq!(r.get(1), -1.0);
    }

    #[test]
    fn rmw_returns_previous_value() {
        let r = Region::<i32>::from_slice(&[10, 20]);
        let prev = r.inner().rmw(1, |old| (i32::from_bits(old) + 5).to_bits());
        assert_eq!(i32::from_bits(prev), 20);
        assert_eq!(r.get(1), 25);
    }

    #[test]
    fn registry_is_bounded_and_idempotent() {
        let reg = RegionRegistry::new(2);
        let a = Region::<i32>::new(1);
        let b = Region::<i32>::new(1);
        let c = Region::<i32>::new(1);
        let ida = reg.register(a.inner_arc()).unwrap();
        assert_eq!(reg.register(a.inner_arc()).unwrap(), ida);
        reg.register(b.inner_arc()).unwrap();
        assert!(matches!(
            reg.register(c.inner_arc()),
            Err(MaaError::RegionTableFull { .. })
        ));
        reg.clear();
        reg.register(c.inner_arc()).unwrap();
    }
}
