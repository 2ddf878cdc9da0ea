//! Independent units of work on the rayon pool.

use crate::error::{ErrorCode, ProberError, Result};
use log::{error, info};
use rayon::prelude::*;

/// Sizes the global pool. `None` keeps rayon's default of one thread per core.
pub fn configure_threads(threads: Option<usize>) -> Result<()> {
    let Some(threads) = threads else {
        return Ok(());
    };
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| {
            ProberError::new(
                ErrorCode::Internal,
                format!("Failed to configure thread pool: {e}"),
            )
        })
}

#[derive(Debug)]
pub struct UnitResult<T> {
    pub name: String,
    pub result: Result<T>,
}

/// Runs `work` on every unit in parallel. Results come back in input order and
/// a failing unit does not stop the others.
pub fn run_units<U, T, N, W>(units: &[U], name: N, work: W) -> Vec<UnitResult<T>>
where
    U: Sync,
    T: Send,
    N: Fn(&U) -> String + Sync,
    W: Fn(&U) -> Result<T> + Sync,
{
    info!("Starting {} job(s)", units.len());
    let results: Vec<UnitResult<T>> = units
        .par_iter()
        .map(|unit| {
            let name = name(unit);
            info!("--- Starting job: {name} ---");
            let result = work(unit);
            if let Err(e) = &result {
                error!("Job '{name}' failed: {e}");
            }
            UnitResult { name, result }
        })
        .collect();
    let failed = results.iter().filter(|r| r.result.is_err()).count();
    info!(
        "{} of {} job(s) finished successfully",
        results.len() - failed,
        results.len()
    );
    results
}
