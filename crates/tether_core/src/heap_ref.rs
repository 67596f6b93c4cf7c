//! Heap references and the handles that own registrations of them

use crate::error::ProxyError;
use crate::runtime::{ObjectId, RawValue};

/// GC-visible reference to one foreign value.
///
/// The logical id never changes; the location is updated in place by the
/// registry when the collector relocates the value. Only the registry owns
/// these, callers hold [`RootHandle`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapReference {
    id: ObjectId,
    location: RawValue,
}

impl HeapReference {
    /// Wrap a raw foreign value. Fails on the runtime's null sentinel.
    pub fn acquire(raw: RawValue, id: ObjectId) -> Result<Self, ProxyError> {
        if raw.is_null() {
            return Err(ProxyError::InvalidForeignValue);
        }
        Ok(Self { id, location: raw })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The up-to-date location. Valid only while registered.
    pub fn current_location(&self) -> RawValue {
        self.location
    }

    /// Called by the registry's relocation callback only.
    pub(crate) fn relocate(&mut self, new_location: RawValue) {
        self.location = new_location;
    }
}

/// One registration of a pinned value.
///
/// Every `register` or `retain` produces a handle with a fresh token, so a
/// handle can be released at most once no matter how many aliases exist.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct RootHandle {
    id: ObjectId,
    token: u64,
}

impl RootHandle {
    pub(crate) const fn new(id: ObjectId, token: u64) -> Self {
        Self { id, token }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    /// A second handle naming the same registration, for double-release
    /// checks in tests.
    #[cfg(test)]
    pub(crate) fn duplicate(&self) -> Self {
        Self::new(self.id, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_rejected() {
        assert_eq!(
            HeapReference::acquire(RawValue::NULL, ObjectId::from_raw(1)),
            Err(ProxyError::InvalidForeignValue)
        );
    }

    #[test]
    fn relocation_keeps_identity() {
        let mut reference =
            HeapReference::acquire(RawValue::from_bits(0x100), ObjectId::from_raw(7)).unwrap();
        reference.relocate(RawValue::from_bits(0x9000));

        assert_eq!(reference.id(), ObjectId::from_raw(7));
        assert_eq!(reference.current_location(), RawValue::from_bits(0x9000));
    }
}
