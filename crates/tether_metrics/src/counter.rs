//! Named event counters (pins taken, pins released, relocations, ...)

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct Counter {
    counters: BTreeMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, name: &str, value: usize) {
        match self.counters.get_mut(name) {
            Some(slot) => *slot += value,
            None => {
                self.counters.insert(name.to_string(), value);
            }
        }
    }

    pub fn set(&mut self, name: &str, value: usize) {
        self.counters.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    /// Counters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> {
        self.counters.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_accumulate_per_name() {
        let mut counter = Counter::new();
        counter.increment("registered", 1);
        counter.increment("registered", 2);
        counter.increment("released", 1);

        assert_eq!(counter.get("registered"), 3);
        assert_eq!(counter.get("released"), 1);
        assert_eq!(counter.get("relocated"), 0);

        let names: Vec<_> = counter.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["registered", "released"]);

        counter.reset_all();
        assert_eq!(counter.get("registered"), 0);
    }
}
