//! Tether Metrics - instrumentation for the root registry and the collector
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tether_metrics::{Counter, PauseTimer};
//!
//! let mut pauses = PauseTimer::new(32); // Track last 32 collections
//! pauses.begin();
//! // ... copy survivors ...
//! pauses.end();
//! println!("avg pause: {:.3}ms", pauses.average_ms());
//! ```
//!
//! Without the `metrics` feature every type below is a stub whose methods
//! do nothing and report zero.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod pause_timer;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use pause_timer::PauseTimer;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

/// Whether instrumentation is compiled in.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct PauseTimer;

#[cfg(not(feature = "metrics"))]
impl PauseTimer {
    pub fn new(_capacity: usize) -> Self { Self }
    pub fn begin(&mut self) {}
    pub fn end(&mut self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn samples(&self) -> usize { 0 }
    pub fn average_ms(&self) -> f64 { 0.0 }
    pub fn range_ms(&self) -> (f64, f64) { (0.0, 0.0) }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug)]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &str, _value: usize) {}
    pub fn set(&mut self, _name: &str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn reset_all(&mut self) {}
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_compiles_with_or_without_metrics() {
        let mut counter = super::Counter::new();
        counter.increment("registered", 2);
        let mut timer = super::PauseTimer::new(8);
        timer.begin();
        timer.end();

        if super::ENABLED {
            assert_eq!(counter.get("registered"), 2);
            assert_eq!(timer.samples(), 1);
        } else {
            assert_eq!(counter.get("registered"), 0);
            assert_eq!(timer.samples(), 0);
        }
    }
}
