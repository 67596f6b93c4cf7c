//! [`ForeignRuntime`] implementation over [`Heap`]

use crate::heap::{GcStats, Heap};
use crate::settings::HeapSettings;
use parking_lot::{Mutex, ReentrantMutex};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::{
    Boxing, ForeignError, ForeignRuntime, GcHooks, ObjectId, PathSegment, RawValue, Value,
    WorldGuard,
};

/// A managed heap with a relocating collector, guarded by a re-entrant
/// world lock.
///
/// Every primitive takes the world lock for its own duration; callers that
/// need several primitives to see one consistent heap hold
/// [`ForeignRuntime::enter`] around them.
pub struct ManagedRuntime {
    world: ReentrantMutex<RefCell<Heap>>,
    hooks: Mutex<Option<Arc<dyn GcHooks>>>,
    initialized: AtomicBool,
}

impl ManagedRuntime {
    pub fn new(settings: HeapSettings) -> Self {
        Self {
            world: ReentrantMutex::new(RefCell::new(Heap::new(settings))),
            hooks: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Create and initialize in one step.
    pub fn started(settings: HeapSettings) -> Arc<Self> {
        let runtime = Arc::new(Self::new(settings));
        runtime.initialize();
        runtime
    }

    /// Finish startup: allocate `Main` and start accepting calls.
    pub fn initialize(&self) {
        let world = self.world.lock();
        let main = world.borrow_mut().ensure_main();
        self.initialized.store(true, Ordering::Release);
        tracing::info!(%main, "managed runtime initialized");
    }

    /// Stop accepting calls. Objects stay where they are; every primitive
    /// reports [`ForeignError::NotInitialized`] from now on.
    pub fn shutdown(&self) {
        let _world = self.world.lock();
        if self.initialized.swap(false, Ordering::AcqRel) {
            tracing::info!("managed runtime shut down");
        }
    }

    pub fn stats(&self) -> GcStats {
        let world = self.world.lock();
        let stats = world.borrow().stats();
        stats
    }

    pub fn live_objects(&self) -> usize {
        let world = self.world.lock();
        let live = world.borrow().live_objects();
        live
    }

    /// Whether `raw` currently names an object.
    pub fn is_live(&self, raw: RawValue) -> bool {
        let world = self.world.lock();
        let live = world.borrow().is_live(raw);
        live
    }

    fn installed_hooks(&self) -> Option<Arc<dyn GcHooks>> {
        self.hooks.lock().clone()
    }

    fn read<R>(&self, f: impl FnOnce(&Heap) -> Result<R, ForeignError>) -> Result<R, ForeignError> {
        if !self.is_initialized() {
            return Err(ForeignError::NotInitialized);
        }
        let world = self.world.lock();
        let heap = world.borrow();
        f(&heap)
    }

    /// Run a mutating primitive, first honoring a collection that is due.
    fn write<R>(
        &self,
        f: impl FnOnce(&mut Heap) -> Result<R, ForeignError>,
    ) -> Result<R, ForeignError> {
        if !self.is_initialized() {
            return Err(ForeignError::NotInitialized);
        }
        let world = self.world.lock();
        let mut heap = world.borrow_mut();
        if heap.collection_due() {
            heap.collect(self.installed_hooks().as_ref());
        }
        f(&mut heap)
    }
}

impl Boxing for ManagedRuntime {
    fn to_foreign(&self, value: &Value) -> Result<RawValue, ForeignError> {
        self.write(|heap| heap.box_value(value))
    }

    fn from_foreign(&self, raw: RawValue) -> Result<Value, ForeignError> {
        self.read(|heap| heap.unbox(raw))
    }
}

impl ForeignRuntime for ManagedRuntime {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn enter(&self) -> WorldGuard<'_> {
        WorldGuard::new(self.world.lock())
    }

    fn install_gc_hooks(&self, hooks: Arc<dyn GcHooks>) -> Result<(), ForeignError> {
        let _world = self.world.lock();
        let mut installed = self.hooks.lock();
        if installed.is_some() {
            return Err(ForeignError::HooksInstalled);
        }
        *installed = Some(hooks);
        Ok(())
    }

    fn remove_gc_hooks(&self, hooks: &Arc<dyn GcHooks>) {
        let _world = self.world.lock();
        let mut installed = self.hooks.lock();
        // Compare data pointers only; vtable pointers may differ per codegen unit.
        let same = installed
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(hooks)));
        if same {
            *installed = None;
        }
    }

    fn gc_enabled(&self) -> bool {
        let world = self.world.lock();
        let enabled = world.borrow().gc_enabled();
        enabled
    }

    fn set_gc_enabled(&self, enabled: bool) -> bool {
        let world = self.world.lock();
        let mut heap = world.borrow_mut();
        let previous = heap.set_gc_enabled(enabled);
        if heap.collection_due() && self.is_initialized() {
            heap.collect(self.installed_hooks().as_ref());
        }
        previous
    }

    fn collect_garbage(&self) {
        let world = self.world.lock();
        let mut heap = world.borrow_mut();
        if heap.gc_enabled() && self.is_initialized() {
            heap.collect(self.installed_hooks().as_ref());
        } else {
            tracing::trace!("collection deferred");
            heap.request_collection();
        }
    }

    fn identity(&self, raw: RawValue) -> Result<ObjectId, ForeignError> {
        self.read(|heap| Ok(heap.object(raw)?.id))
    }

    fn type_name(&self, raw: RawValue) -> Result<String, ForeignError> {
        self.read(|heap| Ok(heap.object(raw)?.body.type_name().to_string()))
    }

    fn is_mutable(&self, raw: RawValue) -> Result<bool, ForeignError> {
        self.read(|heap| Ok(heap.object(raw)?.body.is_mutable()))
    }

    fn field_names(&self, raw: RawValue) -> Result<Vec<String>, ForeignError> {
        self.read(|heap| heap.field_names(raw))
    }

    fn lookup(&self, raw: RawValue, segment: &PathSegment) -> Result<RawValue, ForeignError> {
        self.read(|heap| heap.lookup(raw, segment))
    }

    fn assign(
        &self,
        parent: RawValue,
        segment: &PathSegment,
        value: RawValue,
    ) -> Result<(), ForeignError> {
        self.write(|heap| heap.assign(parent, segment, value))
    }

    fn replace_contents(&self, target: RawValue, source: RawValue) -> Result<(), ForeignError> {
        self.write(|heap| heap.replace_contents(target, source))
    }

    fn equals(&self, a: RawValue, b: RawValue) -> Result<bool, ForeignError> {
        self.read(|heap| heap.equals(a, b))
    }

    fn main_module(&self) -> Result<RawValue, ForeignError> {
        self.read(|heap| Ok(heap.main()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> Arc<ManagedRuntime> {
        ManagedRuntime::started(HeapSettings {
            collect_threshold: 0,
            ..HeapSettings::default()
        })
    }

    #[test]
    fn calls_fail_before_initialize_and_after_shutdown() {
        let runtime = ManagedRuntime::new(HeapSettings::default());
        assert_eq!(runtime.main_module(), Err(ForeignError::NotInitialized));

        runtime.initialize();
        assert!(runtime.main_module().is_ok());

        runtime.shutdown();
        assert_eq!(
            runtime.to_foreign(&Value::Int(1)),
            Err(ForeignError::NotInitialized)
        );
    }

    #[test]
    fn collection_is_deferred_while_disabled() {
        let runtime = runtime();
        let garbage = runtime.to_foreign(&Value::Int(3)).unwrap();

        assert!(runtime.set_gc_enabled(false));
        runtime.collect_garbage();
        assert!(runtime.is_live(garbage));
        assert_eq!(runtime.stats().collections, 0);

        assert!(!runtime.set_gc_enabled(true));
        assert!(!runtime.is_live(garbage));
        assert_eq!(runtime.stats().collections, 1);
    }

    struct NoHooks;

    impl GcHooks for NoHooks {
        fn on_gc_begin(&self) {}
        fn on_gc_root_enumeration(&self, _visit: &mut dyn FnMut(RawValue)) {}
        fn on_gc_relocate(&self, _old: RawValue, _new: RawValue) {}
        fn on_gc_end(&self) {}
    }

    #[test]
    fn one_hook_set_at_a_time() {
        let runtime = runtime();
        let first: Arc<dyn GcHooks> = Arc::new(NoHooks);
        let second: Arc<dyn GcHooks> = Arc::new(NoHooks);

        runtime.install_gc_hooks(Arc::clone(&first)).unwrap();
        assert_eq!(
            runtime.install_gc_hooks(Arc::clone(&second)),
            Err(ForeignError::HooksInstalled)
        );

        // Removing a set that is not installed changes nothing.
        runtime.remove_gc_hooks(&second);
        assert!(runtime.install_gc_hooks(Arc::clone(&second)).is_err());

        runtime.remove_gc_hooks(&first);
        runtime.install_gc_hooks(second).unwrap();
    }

    #[test]
    fn world_lock_is_reentrant() {
        let runtime = runtime();
        let _outer = runtime.enter();
        let _inner = runtime.enter();
        let raw = runtime.to_foreign(&Value::Str("nested".into())).unwrap();
        assert_eq!(runtime.type_name(raw).unwrap(), "String");
    }

    #[test]
    fn threshold_collects_on_the_next_allocation() {
        let runtime = ManagedRuntime::started(HeapSettings {
            collect_threshold: 4,
            ..HeapSettings::default()
        });
        let first = runtime.to_foreign(&Value::Int(0)).unwrap();
        for i in 1..3 {
            runtime.to_foreign(&Value::Int(i)).unwrap();
        }
        // Main plus three ints reached the threshold; nothing ran yet.
        assert_eq!(runtime.stats().collections, 0);

        runtime.to_foreign(&Value::Int(9)).unwrap();
        assert_eq!(runtime.stats().collections, 1);
        assert!(!runtime.is_live(first));
    }
}
