//! Object layout of the managed heap

use std::collections::BTreeMap;
use tether_core::{ObjectId, RawValue};

/// One heap cell: a stable identity plus its payload.
#[derive(Debug, Clone)]
pub struct HeapObject {
    pub id: ObjectId,
    pub body: Body,
}

/// Payload of a heap cell. Children are referenced by raw location.
#[derive(Debug, Clone)]
pub enum Body {
    Nothing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<RawValue>),
    Tuple(Vec<RawValue>),
    Record {
        type_name: String,
        mutable: bool,
        fields: Vec<(String, RawValue)>,
    },
    Module {
        name: String,
        bindings: BTreeMap<String, RawValue>,
    },
}

impl Body {
    pub fn type_name(&self) -> &str {
        match self {
            Body::Nothing => "Nothing",
            Body::Bool(_) => "Bool",
            Body::Int(_) => "Int64",
            Body::Float(_) => "Float64",
            Body::Str(_) => "String",
            Body::Array(_) => "Vector",
            Body::Tuple(_) => "Tuple",
            Body::Record { type_name, .. } => type_name,
            Body::Module { .. } => "Module",
        }
    }

    /// Whether the content can be replaced in place.
    pub fn is_mutable(&self) -> bool {
        match self {
            Body::Array(_) => true,
            Body::Record { mutable, .. } => *mutable,
            _ => false,
        }
    }

    pub fn children(&self) -> Vec<RawValue> {
        match self {
            Body::Array(items) | Body::Tuple(items) => items.clone(),
            Body::Record { fields, .. } => fields.iter().map(|(_, raw)| *raw).collect(),
            Body::Module { bindings, .. } => bindings.values().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Rewrite every child location through `forward`.
    pub fn forward_children(&mut self, mut forward: impl FnMut(RawValue) -> RawValue) {
        match self {
            Body::Array(items) | Body::Tuple(items) => {
                for item in items.iter_mut() {
                    *item = forward(*item);
                }
            }
            Body::Record { fields, .. } => {
                for (_, raw) in fields.iter_mut() {
                    *raw = forward(*raw);
                }
            }
            Body::Module { bindings, .. } => {
                for raw in bindings.values_mut() {
                    *raw = forward(*raw);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modules_are_not_content_mutable() {
        let module = Body::Module {
            name: "Main".into(),
            bindings: BTreeMap::new(),
        };
        assert!(!module.is_mutable());
        assert!(Body::Array(Vec::new()).is_mutable());
        assert!(!Body::Tuple(Vec::new()).is_mutable());
    }

    #[test]
    fn forwarding_rewrites_children_in_place() {
        let mut body = Body::Record {
            type_name: "Point".into(),
            mutable: true,
            fields: vec![
                ("x".into(), RawValue::from_bits(8)),
                ("y".into(), RawValue::from_bits(16)),
            ],
        };
        body.forward_children(|raw| RawValue::from_bits(raw.to_bits() + 1));
        assert_eq!(
            body.children(),
            vec![RawValue::from_bits(9), RawValue::from_bits(17)]
        );
    }
}
