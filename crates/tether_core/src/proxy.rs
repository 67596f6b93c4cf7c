//! Host-side handles to foreign values and to locations inside them
//!
//! A root proxy owns a pin on a foreign value. A derived proxy shares its
//! root's pin (the anchor) and stores the access path from it; the parent
//! relation is that path prefix, so a child never keeps a parent *proxy*
//! alive but does keep the anchor pinned until the last descendant is gone.
//!
//! Derived values are never cached: every read walks the path again against
//! the anchor's current location, so foreign-side mutation and relocation are
//! always observed and a path that no longer fits its parent's shape fails
//! with [`ProxyError::PathResolution`] instead of returning stale data.
//!
//! # Example
//! ```ignore
//! let main = sentinel.main()?;
//! main.field("xs").clone().set(&vec![1i64, 2, 3])?;
//! let second = main.field("xs").index(1);
//! assert_eq!(second.unbox_as::<i64>()?, 2);
//! ```

use crate::error::ProxyError;
use crate::foreign_value::ForeignValue;
use crate::path::{AccessPath, PathSegment};
use crate::runtime::RawValue;
use crate::sentinel::{self, Sentinel, UNNAMED};
use crate::value::{FromForeign, ToForeign};
use std::fmt;
use std::sync::Arc;

/// Handle to a foreign value or to a named location inside one.
///
/// Cloning is cheap and takes a registry count for every pin it copies.
#[derive(Clone)]
pub struct Proxy {
    anchor: ForeignValue,
    label: Arc<str>,
    path: AccessPath,
    written: Option<ForeignValue>,
}

impl Proxy {
    /// Root proxy over `raw`, pinned through the installed sentinel.
    pub fn from_foreign(raw: RawValue) -> Result<Self, ProxyError> {
        sentinel::current()?.proxy(raw)
    }

    pub(crate) fn rooted(anchor: ForeignValue, label: impl Into<Arc<str>>) -> Self {
        Self {
            anchor,
            label: label.into(),
            path: AccessPath::root(),
            written: None,
        }
    }

    /// Derive a child at `segment`. Nothing is resolved until it is read.
    pub fn get(&self, segment: impl Into<PathSegment>) -> Proxy {
        Proxy {
            anchor: self.anchor.clone(),
            label: Arc::clone(&self.label),
            path: self.path.child(segment.into()),
            written: None,
        }
    }

    /// Record field or module binding.
    pub fn field(&self, name: &str) -> Proxy {
        self.get(name)
    }

    /// Array or tuple element (zero-based).
    pub fn index(&self, index: usize) -> Proxy {
        self.get(index)
    }

    /// The proxy one segment up, or `None` for a root.
    pub fn parent(&self) -> Option<Proxy> {
        let path = self.path.parent()?;
        Some(Proxy {
            anchor: self.anchor.clone(),
            label: Arc::clone(&self.label),
            path,
            written: None,
        })
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    pub fn path(&self) -> &AccessPath {
        &self.path
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Full display name, e.g. `Main.config.values[1]`.
    pub fn name(&self) -> String {
        self.path.display_with(&self.label).to_string()
    }

    /// The pinned value this proxy's path starts from.
    pub fn anchor(&self) -> &ForeignValue {
        &self.anchor
    }

    /// Value re-registered by the last `set` through this (derived) proxy.
    pub fn pinned(&self) -> Option<&ForeignValue> {
        self.written.as_ref()
    }

    fn sentinel(&self) -> &Arc<Sentinel> {
        self.anchor.sentinel()
    }

    fn name_of(&self, depth: usize) -> String {
        let mut name = self.label.to_string();
        for segment in &self.path.segments()[..depth] {
            name.push_str(&segment.to_string());
        }
        name
    }

    /// Apply the first `depth` segments to the anchor's current location.
    /// The caller must hold a safepoint.
    fn walk(&self, depth: usize) -> Result<RawValue, ProxyError> {
        let runtime = self.sentinel().runtime();
        let mut current = self.anchor.raw()?;
        for (step, segment) in self.path.segments()[..depth].iter().enumerate() {
            current = runtime
                .lookup(current, segment)
                .map_err(|err| ProxyError::at_path(self.name_of(step + 1), err))?;
        }
        Ok(current)
    }

    fn resolve_raw(&self) -> Result<RawValue, ProxyError> {
        self.walk(self.path.len())
    }

    /// Resolve the path now and pin whatever it currently names.
    pub fn resolve_value(&self) -> Result<ForeignValue, ProxyError> {
        let sentinel = self.sentinel();
        let _safepoint = sentinel.enter()?;
        let raw = self.resolve_raw()?;
        sentinel.pin(raw)
    }

    /// Resolve and convert through the boxing collaborator.
    pub fn unbox_as<T: FromForeign>(&self) -> Result<T, ProxyError> {
        let sentinel = self.sentinel();
        let _safepoint = sentinel.enter()?;
        let raw = self.resolve_raw()?;
        let value = sentinel
            .runtime()
            .from_foreign(raw)
            .map_err(ProxyError::from_foreign)?;
        Ok(T::from_value(value)?)
    }

    /// Write a host value through this proxy.
    ///
    /// A root proxy replaces the content of its pinned value in place (and
    /// fails with [`ProxyError::ImmutableValue`] if that value is immutable).
    /// A derived proxy writes into its resolved parent at its last segment,
    /// then re-derives and re-pins its own value.
    pub fn set<T: ToForeign + ?Sized>(&mut self, value: &T) -> Result<(), ProxyError> {
        let sentinel = Arc::clone(self.sentinel());
        let _safepoint = sentinel.enter()?;
        let raw = sentinel
            .runtime()
            .to_foreign(&value.to_value())
            .map_err(ProxyError::from_foreign)?;
        self.write(&sentinel, raw)
    }

    /// Write an already-foreign value through this proxy (see [`Proxy::set`]).
    /// `value` must come from the same sentinel.
    pub fn assign(&mut self, value: &ForeignValue) -> Result<(), ProxyError> {
        let sentinel = Arc::clone(self.sentinel());
        if !Arc::ptr_eq(&sentinel, value.sentinel()) {
            return Err(ProxyError::DifferentRuntime);
        }
        let _safepoint = sentinel.enter()?;
        let raw = value.raw()?;
        self.write(&sentinel, raw)
    }

    fn write(&mut self, sentinel: &Arc<Sentinel>, raw: RawValue) -> Result<(), ProxyError> {
        let runtime = sentinel.runtime();
        let Some(segment) = self.path.last() else {
            let target = self.anchor.raw()?;
            return runtime
                .replace_contents(target, raw)
                .map_err(|err| ProxyError::at_path(self.name(), err));
        };

        let parent = self.walk(self.path.len() - 1)?;
        runtime
            .assign(parent, segment, raw)
            .map_err(|err| ProxyError::at_path(self.name(), err))?;

        let derived = self.resolve_raw()?;
        self.written = Some(sentinel.pin(derived)?);
        Ok(())
    }

    pub fn type_name(&self) -> Result<String, ProxyError> {
        let sentinel = self.sentinel();
        let _safepoint = sentinel.enter()?;
        let raw = self.resolve_raw()?;
        sentinel.runtime().type_name(raw).map_err(ProxyError::from_foreign)
    }

    /// Whether the resolved value's type is `type_name`.
    pub fn isa(&self, type_name: &str) -> Result<bool, ProxyError> {
        Ok(self.type_name()? == type_name)
    }

    pub fn is_mutable(&self) -> Result<bool, ProxyError> {
        let sentinel = self.sentinel();
        let _safepoint = sentinel.enter()?;
        let raw = self.resolve_raw()?;
        sentinel.runtime().is_mutable(raw).map_err(ProxyError::from_foreign)
    }

    /// Field names of a record, binding names of a module.
    pub fn field_names(&self) -> Result<Vec<String>, ProxyError> {
        let sentinel = self.sentinel();
        let _safepoint = sentinel.enter()?;
        let raw = self.resolve_raw()?;
        sentinel.runtime().field_names(raw).map_err(ProxyError::from_foreign)
    }

    /// Compare the resolved values with the foreign equality primitive. Both
    /// proxies must come from the same sentinel.
    pub fn equals(&self, other: &Proxy) -> Result<bool, ProxyError> {
        let sentinel = self.sentinel();
        if !Arc::ptr_eq(sentinel, other.sentinel()) {
            return Err(ProxyError::DifferentRuntime);
        }
        let _safepoint = sentinel.enter()?;
        let lhs = self.resolve_raw()?;
        let rhs = other.resolve_raw()?;
        sentinel.runtime().equals(lhs, rhs).map_err(ProxyError::from_foreign)
    }

    /// Root proxy over the value this proxy names right now.
    ///
    /// The snapshot is detached from the path: rebinding the original
    /// location later does not change what the snapshot sees.
    pub fn snapshot(&self) -> Result<Proxy, ProxyError> {
        let label = if self.is_root() {
            self.label.to_string()
        } else {
            UNNAMED.to_string()
        };
        Ok(Proxy::rooted(self.resolve_value()?, label))
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name())
            .field("anchor", &self.anchor.id())
            .finish()
    }
}
