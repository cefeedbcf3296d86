//! Synchronization primitives
//!
//! Reusable spinning barrier used to hold secondary harts until the boot
//! hart has finished the global interrupt controller bring-up.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Generation-counting barrier for a fixed number of harts
#[derive(Debug)]
pub struct SyncBarrier {
    /// Number of participants
    participants: usize,
    /// Harts arrived in the current round
    arrived: AtomicUsize,
    /// Completed rounds
    generation: AtomicUsize,
}

impl SyncBarrier {
    /// Create a barrier for `participants` harts
    pub const fn new(participants: usize) -> Self {
        Self {
            participants,
            arrived: AtomicUsize::new(0),
            generation: AtomicUsize::new(0),
        }
    }

    /// Block until every participant has called `wait` for this round
    pub fn wait(&self) {
        let generation = self.generation.load(Ordering::Acquire);
        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived >= self.participants {
            self.arrived.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            return;
        }

        while self.generation.load(Ordering::Acquire) == generation {
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_single_participant_does_not_block() {
        let barrier = SyncBarrier::new(1);
        barrier.wait();
        barrier.wait();
    }

    #[test]
    fn test_barrier_releases_all() {
        let barrier = Arc::new(SyncBarrier::new(4));
        let done = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                let done = done.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    assert!(done.load(Ordering::SeqCst));
                })
            })
            .collect();

        done.store(true, Ordering::SeqCst);
        barrier.wait();

        for worker in workers {
            worker.join().unwrap();
        }
    }
}
