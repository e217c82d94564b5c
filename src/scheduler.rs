//! Dedicated background thread for filter loads.
//!
//! Initial unit loads run off the read path on a single worker draining a
//! FIFO job queue. The worker must be distinct from any compaction or flush
//! thread: a job scheduled from a thread that then blocks waiting for that
//! job's completion would never run if both shared one queue.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct MqScheduler {
    state: Mutex<State>,
    work_cv: Condvar,
}

struct State {
    queue: VecDeque<Job>,
    worker: Option<JoinHandle<()>>,
    shutting_down: bool,
}

impl MqScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                worker: None,
                shutting_down: false,
            }),
            work_cv: Condvar::new(),
        })
    }

    /// The process-wide scheduler used for initial filter loads.
    pub fn global() -> &'static Arc<MqScheduler> {
        static GLOBAL: OnceLock<Arc<MqScheduler>> = OnceLock::new();
        GLOBAL.get_or_init(MqScheduler::new)
    }

    /// Enqueues a job, lazily starting the worker on first use. Jobs
    /// scheduled after shutdown are dropped.
    pub fn schedule(self: &Arc<Self>, job: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        if state.shutting_down {
            tracing::warn!("job scheduled after scheduler shutdown, dropping");
            return;
        }

        if state.worker.is_none() {
            let scheduler = self.clone();
            state.worker = Some(
                thread::Builder::new()
                    .name("emberdb-filter-loader".into())
                    .spawn(move || scheduler.worker_main())
                    .expect("failed to spawn filter loader thread"),
            );
        }

        // The worker may be asleep waiting for work.
        if state.queue.is_empty() {
            self.work_cv.notify_one();
        }
        state.queue.push_back(Box::new(job));
    }

    /// Stops accepting work, lets the worker drain the queue, and joins it.
    pub fn shutdown(&self) {
        let worker = {
            let mut state = self.state.lock().unwrap();
            state.shutting_down = true;
            self.work_cv.notify_all();
            state.worker.take()
        };
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }

    fn worker_main(&self) {
        loop {
            let job = {
                let mut state = self.state.lock().unwrap();
                loop {
                    if let Some(job) = state.queue.pop_front() {
                        break job;
                    }
                    if state.shutting_down {
                        return;
                    }
                    state = self.work_cv.wait(state).unwrap();
                }
            };
            // Run outside the queue lock so new work can be scheduled while
            // the job performs its reads.
            job();
        }
    }
}
