//! Lossy peak-meter queue between the audio thread and a display
//!
//! The audio thread publishes per-part peak snapshots; a UI thread drains
//! them at its own pace. The queue is bounded and deliberately lossy in both
//! directions: a full queue drops the oldest snapshot, and a producer that
//! would have to wait for the lock drops the new one instead. Meter data is
//! decorative, so losing a snapshot is always better than stalling audio.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::synth::NUM_PARTS;

/// One frame of meter data: the peak magnitude of every part plus the
/// summed output, as returned by `Part::get_last_peak_sample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakSnapshot {
    /// Peak magnitude per part since the previous snapshot
    pub parts: [f32; NUM_PARTS],
    /// Peak magnitude of the mixed output
    pub output: f32,
}

impl Default for PeakSnapshot {
    fn default() -> Self {
        PeakSnapshot {
            parts: [0.0; NUM_PARTS],
            output: 0.0,
        }
    }
}

/// Bounded lossy queue of [`PeakSnapshot`]s.
#[derive(Debug)]
pub struct PeakRing {
    queue: Mutex<VecDeque<PeakSnapshot>>,
    capacity: usize,
}

impl PeakRing {
    /// Create a ring holding at most `capacity` snapshots.
    pub fn new(capacity: usize) -> Self {
        PeakRing {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Maximum number of buffered snapshots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffered snapshots.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Publish a snapshot without blocking.
    ///
    /// Returns `false` when the snapshot was dropped because the consumer
    /// held the lock. When the ring is full the oldest snapshot gives way.
    pub fn push(&self, snapshot: PeakSnapshot) -> bool {
        let mut queue = match self.queue.try_lock() {
            Some(queue) => queue,
            None => return false,
        };
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(snapshot);
        true
    }

    /// Take the oldest buffered snapshot, if any. Consumer side; may block
    /// briefly on the lock.
    pub fn pop(&self) -> Option<PeakSnapshot> {
        self.queue.lock().pop_front()
    }

    /// Take every buffered snapshot, oldest first.
    pub fn drain(&self) -> Vec<PeakSnapshot> {
        self.queue.lock().drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn snapshot(output: f32) -> PeakSnapshot {
        PeakSnapshot {
            output,
            ..PeakSnapshot::default()
        }
    }

    #[test]
    fn test_fifo_order() {
        let ring = PeakRing::new(4);
        for i in 0..3 {
            assert!(ring.push(snapshot(i as f32)));
        }

        assert_eq!(ring.pop().unwrap().output, 0.0);
        assert_eq!(ring.pop().unwrap().output, 1.0);
        assert_eq!(ring.pop().unwrap().output, 2.0);
        assert!(ring.pop().is_none());
    }

    #[test]
    fn test_full_ring_drops_oldest() {
        let ring = PeakRing::new(2);
        ring.push(snapshot(1.0));
        ring.push(snapshot(2.0));
        ring.push(snapshot(3.0));

        assert_eq!(ring.len(), 2);
        let drained = ring.drain();
        assert_eq!(drained[0].output, 2.0, "oldest snapshot must give way");
        assert_eq!(drained[1].output, 3.0);
    }

    #[test]
    fn test_contended_push_is_dropped() {
        let ring = PeakRing::new(4);
        let guard = ring.queue.lock();
        assert!(!ring.push(snapshot(1.0)), "locked ring must drop the push");
        drop(guard);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_producer_consumer_threads() {
        let ring = Arc::new(PeakRing::new(64));

        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut published = 0u32;
                for i in 0..10_000 {
                    if ring.push(snapshot(i as f32)) {
                        published += 1;
                    }
                }
                published
            })
        };
        let consumer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                let mut seen = 0u32;
                for _ in 0..10_000 {
                    seen += ring.drain().len() as u32;
                }
                seen
            })
        };

        let published = producer.join().unwrap();
        let seen = consumer.join().unwrap() + ring.drain().len() as u32;
        assert!(published > 0);
        assert!(seen <= published, "consumer cannot see dropped snapshots");
    }
}
