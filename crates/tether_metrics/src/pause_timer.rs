//! Collector pause timing

use super::ring_buffer::RingBuffer;
use std::time::{Duration, Instant};

/// Rolling window over the most recent stop-the-world pauses.
#[derive(Debug)]
pub struct PauseTimer {
    pause_start: Instant,
    pauses: RingBuffer<Duration>,
}

impl PauseTimer {
    pub fn new(capacity: usize) -> Self {
        Self {
            pause_start: Instant::now(),
            pauses: RingBuffer::new(capacity.max(1)),
        }
    }

    pub fn begin(&mut self) {
        self.pause_start = Instant::now();
    }

    /// Close the current pause and return its length.
    pub fn end(&mut self) -> Duration {
        let elapsed = self.pause_start.elapsed();
        self.pauses.push(elapsed);
        elapsed
    }

    pub fn samples(&self) -> usize {
        self.pauses.len()
    }

    pub fn average_ms(&self) -> f64 {
        self.pauses.average().as_secs_f64() * 1000.0
    }

    pub fn range_ms(&self) -> (f64, f64) {
        let (min, max) = self.pauses.min_max();
        (min.as_secs_f64() * 1000.0, max.as_secs_f64() * 1000.0)
    }
}

impl Default for PauseTimer {
    fn default() -> Self {
        Self::new(32)
    }
}
