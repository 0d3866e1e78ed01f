//! The task-execution seam used to filter blur planes.
//!
//! The blur volume builder never creates threads itself. The caller passes an
//! [`Executor`], which decides where the independent plane jobs run.

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Runs a batch of independent jobs and returns once all of them have finished.
pub trait Executor {
    /// Apply `job` to every input and return the outputs in input order.
    ///
    /// Jobs may run in any order and concurrently. Implementations must not return
    /// before every job has completed.
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync;
}

/// Runs every job in order on the calling thread.
#[derive(Debug, Default, Copy, Clone)]
pub struct Sequential;

impl Executor for Sequential {
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync,
    {
        inputs.into_iter().map(job).collect()
    }
}

/// Runs jobs on a caller-owned rayon pool.
#[cfg(feature = "rayon")]
impl Executor for rayon::ThreadPool {
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync,
    {
        self.install(|| inputs.into_par_iter().map(job).collect())
    }
}

/// Runs jobs on rayon's global pool.
#[cfg(feature = "rayon")]
#[derive(Debug, Default, Copy, Clone)]
pub struct GlobalPool;

#[cfg(feature = "rayon")]
impl Executor for GlobalPool {
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync,
    {
        inputs.into_par_iter().map(job).collect()
    }
}

impl<E: Executor> Executor for &E {
    fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Send + Sync,
    {
        (**self).map(inputs, job)
    }
}
