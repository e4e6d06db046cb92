use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread;

use super::{Dimensions, LayoutInput, LayoutOutput, LayoutStrategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchMode {
    /// Run on the caller's thread; the result is already queued when
    /// `submit` returns.
    Inline,
    /// One background thread per job.
    Worker,
    /// Hold jobs until `run_deferred` is called. Lets the embedding loop (or
    /// a test) decide when results land.
    Deferred,
}

pub struct LayoutJob {
    pub graph: String,
    pub generation: u64,
    pub input: LayoutInput,
    pub dimensions: Dimensions,
    pub strategy: Arc<dyn LayoutStrategy>,
    pub reply: Sender<LayoutResponse>,
}

impl LayoutJob {
    fn complete(self) {
        let output = self.strategy.run(&self.input, self.dimensions);
        log::debug!(
            "{} layout for {} (generation {}) placed {} nodes",
            self.strategy.name(),
            self.graph,
            self.generation,
            output.positions.len()
        );

        // The graph may have been torn down meanwhile; nobody to tell.
        let _ = self.reply.send(LayoutResponse {
            graph: self.graph,
            generation: self.generation,
            output,
        });
    }
}

#[derive(Clone, Debug)]
pub struct LayoutResponse {
    pub graph: String,
    pub generation: u64,
    pub output: LayoutOutput,
}

pub struct LayoutDispatcher {
    mode: DispatchMode,
    deferred: Mutex<VecDeque<LayoutJob>>,
}

impl LayoutDispatcher {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            deferred: Mutex::new(VecDeque::new()),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Fire and forget: the result arrives on the job's reply channel exactly
    /// once, or never if the job is discarded.
    pub fn submit(&self, job: LayoutJob) {
        match self.mode {
            DispatchMode::Inline => job.complete(),
            DispatchMode::Worker => {
                thread::spawn(move || job.complete());
            }
            DispatchMode::Deferred => match self.deferred.lock() {
                Ok(mut queue) => queue.push_back(job),
                Err(_) => {
                    log::warn!("deferred layout queue poisoned; running job inline");
                    job.complete();
                }
            },
        }
    }

    pub fn run_deferred(&self) -> usize {
        let jobs = match self.deferred.lock() {
            Ok(mut queue) => queue.drain(..).collect::<Vec<_>>(),
            Err(_) => return 0,
        };

        let count = jobs.len();
        for job in jobs {
            job.complete();
        }
        count
    }

    /// Drops queued jobs without answering them, as a worker that died would.
    pub fn discard_deferred(&self) -> usize {
        self.deferred
            .lock()
            .map(|mut queue| queue.drain(..).count())
            .unwrap_or(0)
    }

    pub fn pending(&self) -> usize {
        self.deferred.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}
