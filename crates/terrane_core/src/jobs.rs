use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use tracing::debug;

/// Rayon pool used for chunk population bursts. Work submitted here must not
/// touch chunk slots that another thread is mutating.
pub struct JobSystem {
    pool: ThreadPool,
}

impl JobSystem {
    pub fn new(num_threads: Option<usize>, name: &str) -> Result<Self, ThreadPoolBuildError> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(count) = num_threads {
            builder = builder.num_threads(count);
        }
        let prefix = name.to_string();
        builder = builder.thread_name(move |index| format!("{prefix}-{index}"));

        let pool = builder.build()?;
        debug!("Started job pool '{}' with {} threads", name, pool.current_num_threads());
        Ok(Self { pool })
    }

    /// Runs `job` over every input on the pool and returns the results in
    /// input order.
    pub fn map<I, O, F>(&self, inputs: Vec<I>, job: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync + Send,
    {
        self.pool
            .install(|| inputs.into_par_iter().map(job).collect())
    }
}
