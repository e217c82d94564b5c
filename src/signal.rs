//! Completion gate between the background loader and probing threads.
//!
//! A probe that arrives before a reader's initial units are loaded must not
//! see a half-built residency set. The loader wraps the load in a scoped
//! guard; dropping the guard flips the flag and wakes every waiter, even when
//! the load bails out early on an I/O error. The mutex hand-off gives waiters
//! the acquire/release ordering they need to observe a fully-loaded reader.

use std::sync::{Condvar, Mutex, MutexGuard};

pub struct Gate {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    /// A fresh gate reports not-done: waiters block until the first guard
    /// drops.
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Marks the gate not-done and returns a guard that signals completion
    /// when dropped.
    pub fn begin(&self) -> GateGuard<'_> {
        *self.done.lock().unwrap() = false;
        GateGuard { gate: self }
    }

    /// Blocks until the pending guard (if any) has dropped.
    pub fn wait(&self) {
        let mut done = self.done.lock().unwrap();
        while !*done {
            done = self.cv.wait(done).unwrap();
        }
    }

    pub fn is_done(&self) -> bool {
        *self.done.lock().unwrap()
    }

    fn finish(&self) {
        let mut done: MutexGuard<bool> = self.done.lock().unwrap();
        *done = true;
        drop(done);
        self.cv.notify_all();
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GateGuard<'a> {
    gate: &'a Gate,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_waiter_blocks_until_guard_drops() {
        let gate = Arc::new(Gate::new());
        let observed = Arc::new(AtomicBool::new(false));

        let waiter = {
            let gate = gate.clone();
            let observed = observed.clone();
            thread::spawn(move || {
                gate.wait();
                observed.store(true, Ordering::SeqCst);
            })
        };

        let guard = gate.begin();
        thread::sleep(Duration::from_millis(20));
        assert!(!observed.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(observed.load(Ordering::SeqCst));
        assert!(gate.is_done());
    }

    #[test]
    fn test_guard_signals_on_early_return() {
        fn failing_load(gate: &Gate) -> Result<(), &'static str> {
            let _signal = gate.begin();
            Err("read failed")?;
            unreachable!()
        }

        let gate = Gate::new();
        assert!(failing_load(&gate).is_err());
        // The guard dropped on the error path, so waiters do not hang.
        gate.wait();
        assert!(gate.is_done());
    }

    #[test]
    fn test_begin_resets_gate() {
        let gate = Gate::new();
        drop(gate.begin());
        assert!(gate.is_done());

        let guard = gate.begin();
        assert!(!gate.is_done());
        drop(guard);
        assert!(gate.is_done());
    }
}
