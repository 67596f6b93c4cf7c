//! Root registry (GC sentinel)
//!
//! The single source of truth for "is this foreign value pinned". Entries are
//! keyed by logical identity, never by address, and carry one token per live
//! registration; an entry exists exactly while it has at least one token.
//!
//! ## Locking
//!
//! All mutation happens under the table mutex. The table is never held across
//! a call into the foreign runtime, so a collection triggered from inside a
//! registry operation on the same thread can re-enter the GC callbacks. Callers
//! serialize against collections through the runtime's world lock; the
//! collector itself runs the callbacks while holding that lock.

use crate::error::ProxyError;
use crate::heap_ref::{HeapReference, RootHandle};
use crate::runtime::{GcHooks, ObjectId, RawValue};
use parking_lot::Mutex;
use std::collections::{hash_map::Entry, HashMap, HashSet};
use std::fmt;
use tether_metrics::Counter;

struct RootEntry {
    reference: HeapReference,
    holders: HashSet<u64>,
}

impl RootEntry {
    fn count(&self) -> usize {
        self.holders.len()
    }
}

#[derive(Default)]
struct RootTable {
    entries: HashMap<ObjectId, RootEntry>,
    by_location: HashMap<RawValue, ObjectId>,
    next_token: u64,
    collecting: bool,
    counters: Counter,
}

impl RootTable {
    fn issue(&mut self, id: ObjectId) -> RootHandle {
        self.next_token += 1;
        RootHandle::new(id, self.next_token)
    }
}

/// Snapshot of registry occupancy and event counters.
///
/// Event counters read zero when `tether_metrics` is built without `metrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub entries: usize,
    pub holders: usize,
    pub registered: usize,
    pub released: usize,
    pub double_release: usize,
    pub relocated: usize,
    pub gc_cycles: usize,
}

/// Process-scoped table of host-pinned foreign values.
#[derive(Default)]
pub struct RootRegistry {
    table: Mutex<RootTable>,
}

impl RootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin `raw` (whose logical identity is `id`) and return a new handle.
    ///
    /// Registering a value that is already pinned adds a holder to the
    /// existing entry instead of creating a second one.
    pub fn register(&self, raw: RawValue, id: ObjectId) -> Result<RootHandle, ProxyError> {
        let reference = HeapReference::acquire(raw, id)?;
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let handle = table.issue(id);

        let stale = match table.entries.entry(id) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.holders.insert(handle.token());
                let current = entry.reference.current_location();
                (current != raw).then_some(current)
            }
            Entry::Vacant(vacant) => {
                let mut holders = HashSet::new();
                holders.insert(handle.token());
                vacant.insert(RootEntry { reference, holders });
                table.by_location.insert(raw, id);
                None
            }
        };
        if let Some(current) = stale {
            gc_desync(format_args!(
                "{id} registered at {raw} but the registry tracks it at {current}"
            ));
        }

        table.counters.increment("registered", 1);
        tracing::trace!(%id, %raw, token = handle.token(), "pinned foreign value");
        Ok(handle)
    }

    /// Add a holder to the entry behind `handle` (copying a pin).
    ///
    /// Returns `None` if that handle has already been released.
    pub fn retain(&self, handle: &RootHandle) -> Option<RootHandle> {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let live = table
            .entries
            .get(&handle.id())
            .is_some_and(|entry| entry.holders.contains(&handle.token()));
        if !live {
            return None;
        }
        let copy = table.issue(handle.id());
        if let Some(entry) = table.entries.get_mut(&handle.id()) {
            entry.holders.insert(copy.token());
        }
        table.counters.increment("registered", 1);
        Some(copy)
    }

    /// Release one registration. Releasing the last holder removes the entry
    /// and unpins the value. Releasing an unknown handle is a no-op.
    ///
    /// Returns whether `handle` was live.
    pub fn unregister(&self, handle: &RootHandle) -> bool {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let Some(entry) = table.entries.get_mut(&handle.id()) else {
            table.counters.increment("double_release", 1);
            tracing::warn!(id = %handle.id(), token = handle.token(), "release of an unpinned value ignored");
            return false;
        };
        if !entry.holders.remove(&handle.token()) {
            table.counters.increment("double_release", 1);
            tracing::warn!(id = %handle.id(), token = handle.token(), "double release ignored");
            return false;
        }

        if entry.count() == 0 {
            let location = entry.reference.current_location();
            table.entries.remove(&handle.id());
            table.by_location.remove(&location);
            tracing::trace!(id = %handle.id(), %location, "unpinned foreign value");
        }
        table.counters.increment("released", 1);
        true
    }

    /// Current location of the value behind a live handle.
    pub fn current_location(&self, handle: &RootHandle) -> Result<RawValue, ProxyError> {
        let table = self.table.lock();
        table
            .entries
            .get(&handle.id())
            .filter(|entry| entry.holders.contains(&handle.token()))
            .map(|entry| entry.reference.current_location())
            .ok_or(ProxyError::Released { id: handle.id() })
    }

    /// Number of live registrations of `id` (0 when unpinned).
    pub fn count(&self, id: ObjectId) -> usize {
        self.table
            .lock()
            .entries
            .get(&id)
            .map_or(0, RootEntry::count)
    }

    pub fn is_pinned(&self, id: ObjectId) -> bool {
        self.table.lock().entries.contains_key(&id)
    }

    /// Number of distinct pinned values.
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True between `on_gc_begin` and `on_gc_end`.
    pub fn is_collecting(&self) -> bool {
        self.table.lock().collecting
    }

    /// Every pinned location, in no particular order.
    pub fn pinned_locations(&self) -> Vec<RawValue> {
        self.table
            .lock()
            .entries
            .values()
            .map(|entry| entry.reference.current_location())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let table = self.table.lock();
        RegistryStats {
            entries: table.entries.len(),
            holders: table.entries.values().map(RootEntry::count).sum(),
            registered: table.counters.get("registered"),
            released: table.counters.get("released"),
            double_release: table.counters.get("double_release"),
            relocated: table.counters.get("relocated"),
            gc_cycles: table.counters.get("gc_cycles"),
        }
    }

    /// Move the entry at `old` to `new`. Returns the location that could not
    /// be matched on failure.
    pub(crate) fn try_relocate(&self, old: RawValue, new: RawValue) -> Result<ObjectId, RawValue> {
        let mut guard = self.table.lock();
        let table = &mut *guard;
        let id = table.by_location.remove(&old).ok_or(old)?;
        let Some(entry) = table.entries.get_mut(&id) else {
            return Err(old);
        };
        entry.reference.relocate(new);
        table.by_location.insert(new, id);
        table.counters.increment("relocated", 1);
        Ok(id)
    }
}

impl GcHooks for RootRegistry {
    fn on_gc_begin(&self) {
        let mut table = self.table.lock();
        table.collecting = true;
        table.counters.increment("gc_cycles", 1);
        tracing::debug!(pinned = table.entries.len(), "foreign collection started");
    }

    fn on_gc_root_enumeration(&self, visit: &mut dyn FnMut(RawValue)) {
        // Snapshot first: `visit` belongs to the collector and must not run
        // under the table lock.
        for location in self.pinned_locations() {
            visit(location);
        }
    }

    fn on_gc_relocate(&self, old: RawValue, new: RawValue) {
        match self.try_relocate(old, new) {
            Ok(id) => tracing::trace!(%id, %old, %new, "pinned value relocated"),
            Err(missing) => gc_desync(format_args!(
                "collector relocated {missing} -> {new}, but nothing is pinned there"
            )),
        }
    }

    fn on_gc_end(&self) {
        let mut table = self.table.lock();
        table.collecting = false;
        tracing::debug!(pinned = table.entries.len(), "foreign collection finished");
    }
}

impl fmt::Debug for RootRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        f.debug_struct("RootRegistry")
            .field("entries", &stats.entries)
            .field("holders", &stats.holders)
            .finish()
    }
}

/// The registry and the collector disagree about what is pinned. Continuing
/// could corrupt the foreign heap, so the process stops here.
pub(crate) fn gc_desync(message: fmt::Arguments<'_>) -> ! {
    tracing::error!("root registry out of sync with the foreign collector: {message}");
    eprintln!("tether: fatal: root registry out of sync with the foreign collector: {message}");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bits: u64) -> RawValue {
        RawValue::from_bits(bits)
    }

    fn id(n: u64) -> ObjectId {
        ObjectId::from_raw(n)
    }

    #[test]
    fn register_is_idempotent_by_identity() {
        let registry = RootRegistry::new();
        let a = registry.register(raw(0x10), id(1)).unwrap();
        let b = registry.register(raw(0x10), id(1)).unwrap();

        assert_ne!(a, b);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.count(id(1)), 2);
    }

    #[test]
    fn balanced_register_unregister_restores_count() {
        let registry = RootRegistry::new();
        let keep = registry.register(raw(0x10), id(1)).unwrap();
        let before = registry.count(id(1));

        let handles: Vec<_> = (0..16)
            .map(|_| registry.register(raw(0x10), id(1)).unwrap())
            .collect();
        assert_eq!(registry.count(id(1)), before + 16);

        for handle in &handles {
            assert!(registry.unregister(handle));
        }
        assert_eq!(registry.count(id(1)), before);

        assert!(registry.unregister(&keep));
        assert!(!registry.is_pinned(id(1)));
        assert!(registry.is_empty());
    }

    #[test]
    fn double_release_is_a_noop() {
        let registry = RootRegistry::new();
        let first = registry.register(raw(0x10), id(1)).unwrap();
        let second = registry.register(raw(0x10), id(1)).unwrap();

        assert!(registry.unregister(&first));
        assert!(!registry.unregister(&first.duplicate()));
        // The other holder is untouched.
        assert_eq!(registry.count(id(1)), 1);
        assert_eq!(registry.current_location(&second), Ok(raw(0x10)));

        assert!(registry.unregister(&second));
        assert!(!registry.unregister(&second));
        assert!(registry.is_empty());
    }

    #[test]
    fn null_is_never_pinned() {
        let registry = RootRegistry::new();
        assert_eq!(
            registry.register(RawValue::NULL, id(1)),
            Err(ProxyError::InvalidForeignValue)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn released_handles_have_no_location() {
        let registry = RootRegistry::new();
        let handle = registry.register(raw(0x10), id(3)).unwrap();
        registry.unregister(&handle);

        assert_eq!(
            registry.current_location(&handle),
            Err(ProxyError::Released { id: id(3) })
        );
        assert!(registry.retain(&handle).is_none());
    }

    #[test]
    fn retain_adds_an_independent_holder() {
        let registry = RootRegistry::new();
        let original = registry.register(raw(0x10), id(1)).unwrap();
        let copy = registry.retain(&original).unwrap();

        assert_eq!(registry.count(id(1)), 2);
        registry.unregister(&original);
        assert_eq!(registry.current_location(&copy), Ok(raw(0x10)));
        registry.unregister(&copy);
        assert!(registry.is_empty());
    }

    #[test]
    fn gc_cycle_enumerates_and_relocates_by_identity() {
        let registry = RootRegistry::new();
        let a = registry.register(raw(0x10), id(1)).unwrap();
        let b = registry.register(raw(0x20), id(2)).unwrap();

        registry.on_gc_begin();
        assert!(registry.is_collecting());

        let mut seen = Vec::new();
        registry.on_gc_root_enumeration(&mut |location| seen.push(location));
        seen.sort();
        assert_eq!(seen, vec![raw(0x10), raw(0x20)]);

        registry.on_gc_relocate(raw(0x10), raw(0x20_10));
        registry.on_gc_relocate(raw(0x20), raw(0x20_20));
        registry.on_gc_end();

        assert!(!registry.is_collecting());
        assert_eq!(registry.current_location(&a), Ok(raw(0x20_10)));
        assert_eq!(registry.current_location(&b), Ok(raw(0x20_20)));

        // Unpinning after relocation clears the new address, not the old one.
        registry.unregister(&a);
        assert_eq!(registry.try_relocate(raw(0x20_10), raw(0x30)), Err(raw(0x20_10)));
    }

    #[test]
    fn relocation_miss_is_reported() {
        let registry = RootRegistry::new();
        assert_eq!(registry.try_relocate(raw(0x99), raw(0x100)), Err(raw(0x99)));
    }

    /// Set in the child process spawned by `relocation_miss_aborts_the_process`.
    const DESYNC_CHILD: &str = "TETHER_DESYNC_CHILD";

    #[test]
    fn relocating_an_unpinned_location() {
        if std::env::var_os(DESYNC_CHILD).is_none() {
            return;
        }
        let registry = RootRegistry::new();
        registry.on_gc_begin();
        registry.on_gc_relocate(raw(0x10), raw(0x20));
    }

    #[test]
    fn relocation_miss_aborts_the_process() {
        let output = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "registry::tests::relocating_an_unpinned_location",
                "--nocapture",
                "--test-threads=1",
            ])
            .env(DESYNC_CHILD, "1")
            .output()
            .unwrap();

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("out of sync"), "stderr: {stderr}");
    }

    #[test]
    fn relocation_is_seen_by_every_alias() {
        let registry = RootRegistry::new();
        let aliases: Vec<_> = (0..1000)
            .map(|_| registry.register(raw(0x10), id(1)).unwrap())
            .collect();

        registry.on_gc_begin();
        registry.on_gc_relocate(raw(0x10), raw(0x4000));
        registry.on_gc_end();

        assert_eq!(registry.len(), 1);
        for alias in &aliases {
            assert_eq!(registry.current_location(alias), Ok(raw(0x4000)));
        }
    }

    #[test]
    #[cfg(feature = "metrics")]
    fn stats_track_traffic() {
        let registry = RootRegistry::new();
        let handle = registry.register(raw(0x10), id(1)).unwrap();
        registry.on_gc_begin();
        registry.on_gc_relocate(raw(0x10), raw(0x20));
        registry.on_gc_end();
        registry.unregister(&handle);
        registry.unregister(&handle);

        let stats = registry.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.registered, 1);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.double_release, 1);
        assert_eq!(stats.relocated, 1);
        assert_eq!(stats.gc_cycles, 1);
    }
}
