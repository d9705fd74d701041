//! In-process engines completing their requests on background threads.
//!
//! They stand in for a real player SDK and a real cast receiver in the demo
//! binary and in the integration tests. Callbacks are delivered from worker
//! threads, exactly like a vendor SDK would.

mod cast;
mod player;

use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

pub use cast::SimulatedCastEngine;
pub use player::SimulatedPlayerEngine;

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationOptions {
    /// Delay before a prepare request completes.
    pub prepare_delay: Duration,
    /// Delay before a session or queue request completes.
    pub request_delay: Duration,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            prepare_delay: Duration::from_millis(150),
            request_delay: Duration::from_millis(100),
        }
    }
}

/// Runs `job` on a named thread after `delay`.
fn spawn_delayed<F>(name: &str, delay: Duration, job: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            job();
        })
        .with_context(|| format!("cannot spawn {} thread", name))?;
    Ok(())
}

/// Locks `mutex`, recovering the data if a worker panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
