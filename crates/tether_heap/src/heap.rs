//! Semi-space copying collector over a handle-free object space.
//!
//! Every object lives at a raw location in the active space. A collection
//! evacuates everything reachable from the roots (the main module plus the
//! locations the installed hooks enumerate) into a fresh space, Cheney style:
//! roots are copied first, then the copied objects are scanned breadth-first
//! and their children copied and forwarded. Each survivor gets a new location
//! and locations are never reused, so a stale raw value can only ever miss.
//!
//! Pinned roots that moved are reported back through the hooks after the
//! copy completes; objects left behind in the old space are freed.

use crate::object::{Body, HeapObject};
use crate::settings::HeapSettings;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tether_core::{ForeignError, GcHooks, ObjectId, PathSegment, RawValue, Record, Value};
use tether_metrics::PauseTimer;

const FIRST_ADDRESS: u64 = 0x1000;
const CELL_SIZE: u64 = 0x10;

/// Collector counters, copied out of the heap on request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GcStats {
    pub collections: usize,
    pub allocated: usize,
    pub objects_copied: usize,
    pub objects_freed: usize,
    pub relocations_reported: usize,
    pub live_objects: usize,
    pub average_pause_ms: f64,
    pub max_pause_ms: f64,
}

struct Evacuation {
    from_space: HashMap<u64, HeapObject>,
    forwarding: HashMap<u64, RawValue>,
    scan: VecDeque<RawValue>,
}

pub struct Heap {
    space: HashMap<u64, HeapObject>,
    next_address: u64,
    next_id: u64,
    main: RawValue,
    gc_enabled: bool,
    pending: bool,
    since_collect: usize,
    settings: HeapSettings,
    stats: GcStats,
    pauses: PauseTimer,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        Self {
            space: HashMap::with_capacity(settings.initial_capacity),
            next_address: FIRST_ADDRESS,
            next_id: 1,
            main: RawValue::NULL,
            gc_enabled: true,
            pending: false,
            since_collect: 0,
            settings,
            stats: GcStats::default(),
            pauses: PauseTimer::default(),
        }
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn main(&self) -> RawValue {
        self.main
    }

    /// Allocate the root module. Idempotent.
    pub fn ensure_main(&mut self) -> RawValue {
        if self.main.is_null() {
            self.main = self.allocate(Body::Module {
                name: "Main".to_string(),
                bindings: BTreeMap::new(),
            });
        }
        self.main
    }

    pub fn gc_enabled(&self) -> bool {
        self.gc_enabled
    }

    /// Returns the previous state. Whether a deferred collection is now due
    /// is reported by [`Heap::collection_due`].
    pub fn set_gc_enabled(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.gc_enabled, enabled)
    }

    pub fn request_collection(&mut self) {
        self.pending = true;
    }

    pub fn collection_due(&self) -> bool {
        self.pending && self.gc_enabled
    }

    pub fn is_live(&self, raw: RawValue) -> bool {
        self.space.contains_key(&raw.to_bits())
    }

    pub fn live_objects(&self) -> usize {
        self.space.len()
    }

    pub fn stats(&self) -> GcStats {
        let (_, max_pause_ms) = self.pauses.range_ms();
        GcStats {
            live_objects: self.space.len(),
            average_pause_ms: self.pauses.average_ms(),
            max_pause_ms,
            ..self.stats.clone()
        }
    }

    fn allocate(&mut self, body: Body) -> RawValue {
        let raw = RawValue::from_bits(self.next_address);
        self.next_address += CELL_SIZE;
        let id = ObjectId::from_raw(self.next_id);
        self.next_id += 1;
        self.space.insert(raw.to_bits(), HeapObject { id, body });

        self.stats.allocated += 1;
        self.since_collect += 1;
        let threshold = self.settings.collect_threshold;
        if threshold > 0 && self.since_collect >= threshold {
            self.pending = true;
        }
        raw
    }

    pub fn object(&self, raw: RawValue) -> Result<&HeapObject, ForeignError> {
        self.space
            .get(&raw.to_bits())
            .ok_or(ForeignError::DanglingHandle(raw))
    }

    fn body_mut(&mut self, raw: RawValue) -> Result<&mut Body, ForeignError> {
        self.space
            .get_mut(&raw.to_bits())
            .map(|object| &mut object.body)
            .ok_or(ForeignError::DanglingHandle(raw))
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Run a full collection now, regardless of the enabled flag.
    pub fn collect(&mut self, hooks: Option<&Arc<dyn GcHooks>>) {
        self.pauses.begin();
        if let Some(hooks) = hooks {
            hooks.on_gc_begin();
        }

        let mut pinned = Vec::new();
        if let Some(hooks) = hooks {
            hooks.on_gc_root_enumeration(&mut |raw| pinned.push(raw));
        }

        let mut evacuation = Evacuation {
            from_space: std::mem::take(&mut self.space),
            forwarding: HashMap::new(),
            scan: VecDeque::new(),
        };
        self.space = HashMap::with_capacity(
            evacuation
                .from_space
                .len()
                .max(self.settings.initial_capacity),
        );

        if !self.main.is_null() {
            let main = self.main;
            self.main = self.evacuate(&mut evacuation, main).unwrap_or(RawValue::NULL);
        }

        let mut relocations = Vec::with_capacity(pinned.len());
        for old in pinned {
            match self.evacuate(&mut evacuation, old) {
                Some(new) => relocations.push((old, new)),
                None => tracing::warn!(%old, "enumerated root is not a live object"),
            }
        }

        while let Some(current) = evacuation.scan.pop_front() {
            let children = match self.space.get(&current.to_bits()) {
                Some(object) => object.body.children(),
                None => continue,
            };
            let mut forwarded = HashMap::with_capacity(children.len());
            for child in children {
                if let Some(new) = self.evacuate(&mut evacuation, child) {
                    forwarded.insert(child.to_bits(), new);
                }
            }
            if let Some(object) = self.space.get_mut(&current.to_bits()) {
                object
                    .body
                    .forward_children(|raw| forwarded.get(&raw.to_bits()).copied().unwrap_or(raw));
            }
        }

        let copied = self.space.len();
        let freed = evacuation.from_space.len();

        if let Some(hooks) = hooks {
            for (old, new) in &relocations {
                if old != new {
                    hooks.on_gc_relocate(*old, *new);
                }
            }
            hooks.on_gc_end();
        }

        self.pending = false;
        self.since_collect = 0;
        self.stats.collections += 1;
        self.stats.objects_copied += copied;
        self.stats.objects_freed += freed;
        self.stats.relocations_reported += relocations.len();
        let pause = self.pauses.end();

        tracing::debug!(
            copied,
            freed,
            relocated = relocations.len(),
            pause_us = pause.as_micros() as u64,
            "collection finished"
        );
    }

    /// Copy `old` into the new space once; later calls return the forward.
    fn evacuate(&mut self, evacuation: &mut Evacuation, old: RawValue) -> Option<RawValue> {
        if let Some(new) = evacuation.forwarding.get(&old.to_bits()) {
            return Some(*new);
        }
        let object = evacuation.from_space.remove(&old.to_bits())?;
        let new = RawValue::from_bits(self.next_address);
        self.next_address += CELL_SIZE;
        self.space.insert(new.to_bits(), object);
        evacuation.forwarding.insert(old.to_bits(), new);
        evacuation.scan.push_back(new);
        Some(new)
    }

    // ------------------------------------------------------------------
    // Boxing
    // ------------------------------------------------------------------

    pub fn box_value(&mut self, value: &Value) -> Result<RawValue, ForeignError> {
        self.box_at_depth(value, 0)
    }

    fn box_at_depth(&mut self, value: &Value, depth: usize) -> Result<RawValue, ForeignError> {
        let limit = self.settings.max_unbox_depth;
        if depth > limit {
            return Err(ForeignError::RecursionLimit { limit });
        }

        let body = match value {
            Value::Nothing => Body::Nothing,
            Value::Bool(b) => Body::Bool(*b),
            Value::Int(i) => Body::Int(*i),
            Value::Float(f) => Body::Float(*f),
            Value::Str(s) => Body::Str(s.clone()),
            Value::Array(items) => Body::Array(self.box_all(items, depth)?),
            Value::Tuple(items) => Body::Tuple(self.box_all(items, depth)?),
            Value::Record(record) => {
                let mut fields = Vec::with_capacity(record.fields.len());
                for (name, field) in &record.fields {
                    fields.push((name.clone(), self.box_at_depth(field, depth + 1)?));
                }
                Body::Record {
                    type_name: record.type_name.clone(),
                    mutable: record.mutable,
                    fields,
                }
            }
            Value::Opaque(type_name) => {
                return Err(ForeignError::TypeMismatch {
                    expected: "boxable value".to_string(),
                    found: type_name.clone(),
                })
            }
        };
        Ok(self.allocate(body))
    }

    fn box_all(&mut self, items: &[Value], depth: usize) -> Result<Vec<RawValue>, ForeignError> {
        items
            .iter()
            .map(|item| self.box_at_depth(item, depth + 1))
            .collect()
    }

    pub fn unbox(&self, raw: RawValue) -> Result<Value, ForeignError> {
        self.unbox_at_depth(raw, 0)
    }

    fn unbox_at_depth(&self, raw: RawValue, depth: usize) -> Result<Value, ForeignError> {
        let limit = self.settings.max_unbox_depth;
        if depth > limit {
            return Err(ForeignError::RecursionLimit { limit });
        }

        let value = match &self.object(raw)?.body {
            Body::Nothing => Value::Nothing,
            Body::Bool(b) => Value::Bool(*b),
            Body::Int(i) => Value::Int(*i),
            Body::Float(f) => Value::Float(*f),
            Body::Str(s) => Value::Str(s.clone()),
            Body::Array(items) => Value::Array(self.unbox_all(items, depth)?),
            Body::Tuple(items) => Value::Tuple(self.unbox_all(items, depth)?),
            Body::Record {
                type_name,
                mutable,
                fields,
            } => {
                let mut record = if *mutable {
                    Record::mutable(type_name.clone())
                } else {
                    Record::immutable(type_name.clone())
                };
                for (name, field) in fields {
                    record
                        .fields
                        .push((name.clone(), self.unbox_at_depth(*field, depth + 1)?));
                }
                Value::Record(record)
            }
            Body::Module { .. } => Value::Opaque("Module".to_string()),
        };
        Ok(value)
    }

    fn unbox_all(&self, items: &[RawValue], depth: usize) -> Result<Vec<Value>, ForeignError> {
        items
            .iter()
            .map(|item| self.unbox_at_depth(*item, depth + 1))
            .collect()
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn field_names(&self, raw: RawValue) -> Result<Vec<String>, ForeignError> {
        Ok(match &self.object(raw)?.body {
            Body::Record { fields, .. } => fields.iter().map(|(name, _)| name.clone()).collect(),
            Body::Module { bindings, .. } => bindings.keys().cloned().collect(),
            _ => Vec::new(),
        })
    }

    pub fn lookup(&self, raw: RawValue, segment: &PathSegment) -> Result<RawValue, ForeignError> {
        let body = &self.object(raw)?.body;
        match (body, segment) {
            (Body::Record { type_name, fields, .. }, PathSegment::Field(name)) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, raw)| *raw)
                .ok_or_else(|| ForeignError::NoSuchField {
                    type_name: type_name.clone(),
                    field: name.clone(),
                }),
            (Body::Module { name: module, bindings }, PathSegment::Field(name)) => bindings
                .get(name)
                .copied()
                .ok_or_else(|| ForeignError::UndefinedBinding {
                    module: module.clone(),
                    name: name.clone(),
                }),
            (Body::Array(items) | Body::Tuple(items), PathSegment::Index(index)) => items
                .get(*index)
                .copied()
                .ok_or(ForeignError::IndexOutOfBounds {
                    index: *index,
                    len: items.len(),
                }),
            (body, segment) => Err(ForeignError::NotAddressable {
                type_name: body.type_name().to_string(),
                segment: segment.to_string(),
            }),
        }
    }

    pub fn assign(
        &mut self,
        parent: RawValue,
        segment: &PathSegment,
        value: RawValue,
    ) -> Result<(), ForeignError> {
        self.object(value)?;
        match (self.body_mut(parent)?, segment) {
            (Body::Module { bindings, .. }, PathSegment::Field(name)) => {
                bindings.insert(name.clone(), value);
                Ok(())
            }
            (
                Body::Record {
                    type_name,
                    mutable,
                    fields,
                },
                PathSegment::Field(name),
            ) => {
                if !*mutable {
                    return Err(ForeignError::Immutable {
                        type_name: type_name.clone(),
                    });
                }
                match fields.iter_mut().find(|(field, _)| field == name) {
                    Some((_, slot)) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(ForeignError::NoSuchField {
                        type_name: type_name.clone(),
                        field: name.clone(),
                    }),
                }
            }
            (Body::Array(items), PathSegment::Index(index)) => {
                let len = items.len();
                match items.get_mut(*index) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(ForeignError::IndexOutOfBounds { index: *index, len }),
                }
            }
            (Body::Tuple(_), PathSegment::Index(_)) => Err(ForeignError::Immutable {
                type_name: "Tuple".to_string(),
            }),
            (body, segment) => Err(ForeignError::NotAddressable {
                type_name: body.type_name().to_string(),
                segment: segment.to_string(),
            }),
        }
    }

    pub fn replace_contents(&mut self, target: RawValue, source: RawValue) -> Result<(), ForeignError> {
        let replacement = self.object(source)?.body.clone();
        let target_body = self.body_mut(target)?;
        if !target_body.is_mutable() {
            return Err(ForeignError::Immutable {
                type_name: target_body.type_name().to_string(),
            });
        }

        match (target_body, replacement) {
            (Body::Array(items), Body::Array(replacement)) => {
                *items = replacement;
                Ok(())
            }
            (
                Body::Record {
                    type_name, fields, ..
                },
                Body::Record {
                    type_name: source_type,
                    fields: replacement,
                    ..
                },
            ) if *type_name == source_type => {
                *fields = replacement;
                Ok(())
            }
            (target_body, replacement) => Err(ForeignError::TypeMismatch {
                expected: target_body.type_name().to_string(),
                found: replacement.type_name().to_string(),
            }),
        }
    }

    pub fn equals(&self, a: RawValue, b: RawValue) -> Result<bool, ForeignError> {
        self.equals_at_depth(a, b, 0)
    }

    fn equals_at_depth(&self, a: RawValue, b: RawValue, depth: usize) -> Result<bool, ForeignError> {
        if a == b {
            return Ok(true);
        }
        let limit = self.settings.max_unbox_depth;
        if depth > limit {
            return Err(ForeignError::RecursionLimit { limit });
        }

        let lhs = &self.object(a)?.body;
        let rhs = &self.object(b)?.body;
        let equal = match (lhs, rhs) {
            (Body::Nothing, Body::Nothing) => true,
            (Body::Bool(x), Body::Bool(y)) => x == y,
            (Body::Int(x), Body::Int(y)) => x == y,
            (Body::Float(x), Body::Float(y)) => x == y,
            (Body::Int(x), Body::Float(y)) | (Body::Float(y), Body::Int(x)) => (*x as f64) == *y,
            (Body::Str(x), Body::Str(y)) => x == y,
            (Body::Array(xs), Body::Array(ys)) | (Body::Tuple(xs), Body::Tuple(ys)) => {
                self.all_equal(xs.iter().copied(), ys.iter().copied(), xs.len() == ys.len(), depth)?
            }
            (
                Body::Record {
                    type_name: tx,
                    fields: fx,
                    ..
                },
                Body::Record {
                    type_name: ty,
                    fields: fy,
                    ..
                },
            ) => {
                let same_shape = tx == ty
                    && fx.len() == fy.len()
                    && fx.iter().zip(fy).all(|((x, _), (y, _))| x == y);
                self.all_equal(
                    fx.iter().map(|(_, raw)| *raw),
                    fy.iter().map(|(_, raw)| *raw),
                    same_shape,
                    depth,
                )?
            }
            // Modules compare by identity, handled above.
            _ => false,
        };
        Ok(equal)
    }

    fn all_equal(
        &self,
        xs: impl Iterator<Item = RawValue>,
        ys: impl Iterator<Item = RawValue>,
        same_shape: bool,
        depth: usize,
    ) -> Result<bool, ForeignError> {
        if !same_shape {
            return Ok(false);
        }
        for (x, y) in xs.zip(ys) {
            if !self.equals_at_depth(x, y, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
