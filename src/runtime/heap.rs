use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::value::StructValue;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, process-unique address of a heap cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HeapAddress(u64);

impl fmt::Display for HeapAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

struct HeapEntry {
    payload: StructValue,
    refs: i64,
}

/// Reference-counted store for class instances, shared by every
/// evaluator in the process. All operations are safe under concurrent
/// use; the zero-crossing in [`Heap::release`] is observed by exactly
/// one caller, which performs the recursive release of the payload.
///
/// The retain/release totals are kept so tests can check that every
/// retain is matched by a release or by a still-live object.
pub struct Heap {
    entries: Mutex<HashMap<HeapAddress, HeapEntry>>,
    next_address: AtomicU64,
    retains: AtomicU64,
    releases: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub retains: u64,
    pub releases: u64,
    pub live: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_address: AtomicU64::new(1),
            retains: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Inserts a payload at refcount zero. The first retain happens
    /// when the returned address, wrapped in a class reference, is
    /// stored into a binding.
    pub fn allocate(&self, payload: StructValue) -> HeapAddress {
        let address = HeapAddress(self.next_address.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .unwrap()
            .insert(address, HeapEntry { payload, refs: 0 });
        address
    }

    /// Returns a handle to the payload at `address`. The handle shares
    /// the stored field map, so field writes are visible through every
    /// live reference.
    pub fn dereference(&self, address: HeapAddress) -> RuntimeResult<StructValue> {
        self.entries
            .lock()
            .unwrap()
            .get(&address)
            .map(|entry| entry.payload.clone())
            .ok_or_else(|| RuntimeError::SegmentationFault {
                address: address.to_string(),
            })
    }

    pub fn retain(&self, address: HeapAddress) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&address) {
            entry.refs += 1;
            self.retains.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn release(&self, address: HeapAddress) -> RuntimeResult<()> {
        let freed = {
            let mut entries = self.entries.lock().unwrap();
            let refs = {
                let Some(entry) = entries.get_mut(&address) else {
                    return Ok(());
                };
                entry.refs -= 1;
                entry.refs
            };
            self.releases.fetch_add(1, Ordering::Relaxed);
            if refs == 0 {
                entries.remove(&address).map(|entry| entry.payload)
            } else if refs < 0 {
                return Err(RuntimeError::RefCountUnderflow {
                    address: address.to_string(),
                });
            } else {
                None
            }
        };

        // The freed payload's fields are released outside the lock so
        // nested class references can re-enter the heap.
        if let Some(payload) = freed {
            payload.release_fields(self)?;
        }
        Ok(())
    }

    pub fn contains(&self, address: HeapAddress) -> bool {
        self.entries.lock().unwrap().contains_key(&address)
    }

    pub fn live_objects(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            retains: self.retains.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            live: self.live_objects(),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::value::Value;
    use std::sync::Arc;

    fn payload(type_name: &str) -> StructValue {
        let instance = StructValue::new(type_name);
        instance.set("v", Value::Int(1));
        instance
    }

    #[test]
    fn allocate_starts_at_refcount_zero_and_stays_resident() {
        let heap = Heap::new();
        let address = heap.allocate(payload("Box"));
        assert!(heap.contains(address));
        assert!(heap.dereference(address).is_ok());
    }

    #[test]
    fn release_at_zero_frees_the_payload() {
        let heap = Heap::new();
        let address = heap.allocate(payload("Box"));
        heap.retain(address);
        heap.release(address).expect("release");
        assert!(!heap.contains(address));
        let err = heap.dereference(address).expect_err("dangling");
        assert!(err.to_string().contains("Segmentation Fault"));
    }

    #[test]
    fn release_below_zero_underflows() {
        let heap = Heap::new();
        let address = heap.allocate(payload("Box"));
        heap.retain(address);
        heap.retain(address);
        heap.release(address).expect("first release");
        // Entry was freed at zero on the second release...
        heap.release(address).expect("second release");
        // ...so further releases are no-ops on an absent address.
        assert!(heap.release(address).is_ok());

        // A genuine underflow needs a live entry driven below zero.
        let address = heap.allocate(payload("Box"));
        let err = heap.release(address).expect_err("underflow");
        assert!(err.to_string().contains("underflow"));
    }

    #[test]
    fn freeing_recursively_releases_class_fields() {
        let heap = Heap::new();
        let inner = heap.allocate(payload("Box"));
        heap.retain(inner);

        let outer_payload = StructValue::new("Pair");
        outer_payload.set(
            "first",
            Value::ClassRef(crate::runtime::value::ClassRef {
                address: inner,
                type_name: "Box".to_string(),
            }),
        );
        let outer = heap.allocate(outer_payload);
        heap.retain(outer);

        heap.release(outer).expect("release outer");
        assert!(!heap.contains(outer));
        assert!(!heap.contains(inner), "inner must be released by the free");
    }

    #[test]
    fn retain_totals_match_release_totals_plus_live() {
        let heap = Heap::new();
        let a = heap.allocate(payload("Box"));
        let b = heap.allocate(payload("Box"));
        heap.retain(a);
        heap.retain(b);
        heap.release(a).expect("release");

        let stats = heap.stats();
        assert_eq!(stats.retains, 2);
        assert_eq!(stats.releases, 1);
        assert_eq!(stats.live, 1);
        assert_eq!(stats.retains, stats.releases + stats.live as u64);
    }

    #[test]
    fn concurrent_retains_and_releases_balance() {
        let heap = Arc::new(Heap::new());
        let address = heap.allocate(payload("Box"));
        heap.retain(address);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let heap = heap.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    heap.retain(address);
                    heap.release(address).expect("balanced release");
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker");
        }

        assert!(heap.contains(address));
        heap.release(address).expect("final release");
        assert!(!heap.contains(address));
    }
}
