//! Cancellable countdown and delay timers owned by a room.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a spawned countdown or one-shot delay.
///
/// The underlying task is aborted when the handle is cancelled or dropped, so
/// a superseded timer can never fire a late tick or expiry. Exactly one
/// countdown is active per room at a time; installing a new one drops (and
/// thereby aborts) the previous handle.
#[derive(Debug)]
pub struct RoundTimer {
    handle: JoinHandle<()>,
}

impl RoundTimer {
    /// Spawn a countdown of `seconds` seconds.
    ///
    /// `on_tick` fires immediately with the full value, then once per second
    /// with the remaining seconds down to and including 0. `on_expire` fires
    /// exactly once after the final tick, then the task ends.
    pub fn start<T, E>(seconds: u32, mut on_tick: T, on_expire: E) -> Self
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            for remaining in (0..=seconds).rev() {
                interval.tick().await;
                on_tick(remaining);
            }
            on_expire();
        });

        Self { handle }
    }

    /// Spawn a one-shot callback after `delay`.
    pub fn after<F>(delay: Duration, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });

        Self { handle }
    }

    /// Stop the timer unconditionally. Safe to call on an already-finished or
    /// already-cancelled timer.
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
