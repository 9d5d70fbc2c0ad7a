//! Expiry timers.
//!
//! Timers run on a dedicated thread with its own current-thread runtime, so they keep
//! running after the runtime that scheduled them shuts down. The thread exits once every
//! [`ExpiryTimers`] clone is dropped and the pending timers have fired. Timers do not
//! survive the process.

use crate::container::{ContainerError, Result};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

struct Expiry {
    id: String,
    deadline: Instant,
}

/// Handle for scheduling container stops on the timer thread.
#[derive(Clone)]
pub(crate) struct ExpiryTimers {
    tx: mpsc::UnboundedSender<Expiry>,
}

impl ExpiryTimers {
    /// Start the timer thread.
    ///
    /// `init` runs on the timer thread and builds the target `stop` is called with, so
    /// connections it opens belong to the thread's runtime. Blocks until `init` returns.
    ///
    /// # Errors
    ///
    /// Returns the error from `init`, or an IO error if the thread or runtime cannot
    /// be created.
    pub(crate) fn start<T, I, S, F>(init: I, stop: S) -> Result<Self>
    where
        T: Clone + Send + 'static,
        I: FnOnce() -> Result<T> + Send + 'static,
        S: Fn(T, String) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Expiry>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        std::thread::Builder::new()
            .name("tcontainer-expiry".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                rt.block_on(async move {
                    let target = match init() {
                        Ok(target) => {
                            let _ = ready_tx.send(Ok(()));
                            target
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    let mut timers = JoinSet::new();
                    loop {
                        tokio::select! {
                            job = rx.recv() => match job {
                                Some(Expiry { id, deadline }) => {
                                    let stopped = stop(target.clone(), id);
                                    timers.spawn(async move {
                                        tokio::time::sleep_until(deadline.into()).await;
                                        stopped.await;
                                    });
                                }
                                None => break,
                            },
                            Some(_) = timers.join_next(), if !timers.is_empty() => {}
                        }
                    }

                    if !timers.is_empty() {
                        debug!("Waiting for {} pending expiry timers", timers.len());
                    }
                    while timers.join_next().await.is_some() {}
                });
            })?;

        ready_rx.recv().map_err(|_| {
            ContainerError::Other("expiry timer thread exited during startup".to_string())
        })??;

        Ok(Self { tx })
    }

    /// Call `stop` for container `id` once `after` has elapsed.
    ///
    /// # Errors
    ///
    /// Returns error if the timer thread is gone.
    pub(crate) fn schedule(&self, id: &str, after: Duration) -> Result<()> {
        let job = Expiry {
            id: id.to_string(),
            deadline: Instant::now() + after,
        };
        self.tx.send(job).map_err(|_| {
            warn!("Expiry timer thread is not running");
            ContainerError::Other(format!("cannot schedule expiry for container {}", id))
        })
    }
}
