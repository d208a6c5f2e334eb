//! Runs long-lived processes side by side and shuts them down together.
//!
//! Every process receives a shared [`CancellationToken`]. The token is
//! cancelled on SIGINT, on SIGTERM, or as soon as any process fails. Once all
//! processes have stopped the registered closers run concurrently under a
//! single timeout.
//!
//! ```no_run
//! use relay_runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Runner::new()
//!         .with_app_process("heartbeat", |ctx| async move {
//!             ctx.cancelled().await;
//!             Ok(())
//!         })
//!         .with_closer("flush", || async move { Ok(()) })
//!         .with_closer_timeout(Duration::from_secs(5))
//!         .run()
//!         .await
//! }
//! ```

use anyhow::anyhow;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedTask = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A long-running process; must return once its token is cancelled
pub type AppProcess = Box<dyn FnOnce(CancellationToken) -> BoxedTask + Send>;

/// Cleanup run after every process has stopped
pub type Closer = Box<dyn FnOnce() -> BoxedTask + Send>;

pub struct Runner {
    app_processes: Vec<(String, AppProcess)>,
    closers: Vec<(String, Closer)>,
    closer_timeout: Duration,
    cancellation_token: CancellationToken,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    /// No processes, no closers, 10 second closer timeout
    pub fn new() -> Self {
        Self {
            app_processes: Vec::new(),
            closers: Vec::new(),
            closer_timeout: Duration::from_secs(10),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_app_process<F, Fut>(mut self, name: impl Into<String>, process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.app_processes
            .push((name.into(), Box::new(|token| Box::pin(process(token)))));
        self
    }

    /// Register a process that is already boxed, as returned by workers
    pub fn with_boxed_app_process(mut self, name: impl Into<String>, process: AppProcess) -> Self {
        self.app_processes.push((name.into(), process));
        self
    }

    /// Closers all run, even when some of them fail
    pub fn with_closer<F, Fut>(mut self, name: impl Into<String>, closer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.closers
            .push((name.into(), Box::new(|| Box::pin(closer()))));
        self
    }

    pub fn with_closer_timeout(mut self, timeout: Duration) -> Self {
        self.closer_timeout = timeout;
        self
    }

    /// Use an externally owned token, e.g. to stop the runner from a test
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Run until a signal arrives or a process fails, then run the closers
    ///
    /// Returns the first process error. A process that ends cleanly before
    /// shutdown was requested does not stop the others.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = self.cancellation_token;

        let mut join_set = JoinSet::new();
        for (name, process) in self.app_processes {
            let process_token = token.clone();
            info!(process = %name, "starting app process");
            join_set.spawn(async move { (name, process(process_token).await) });
        }

        spawn_signal_listener(token.clone());

        let mut first_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(process = %name, "app process finished"),
                Ok((name, Err(err))) => {
                    if token.is_cancelled() {
                        warn!(process = %name, error = %format!("{err:#}"), "app process failed during shutdown");
                    } else {
                        error!(process = %name, error = %format!("{err:#}"), "app process failed");
                        first_error = Some(err.context(format!("process {name} failed")));
                        token.cancel();
                    }
                }
                Err(err) => {
                    error!(error = %err, "app process panicked");
                    if first_error.is_none() {
                        first_error = Some(anyhow!("app process panicked: {err}"));
                    }
                    token.cancel();
                }
            }
        }

        run_closers(self.closers, self.closer_timeout).await;

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("all app processes stopped");
                Ok(())
            }
        }
    }
}

fn spawn_signal_listener(token: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = shutdown_signal() => {
                match signal {
                    Ok(name) => info!(signal = name, "received shutdown signal"),
                    Err(err) => error!(error = %err, "failed to listen for shutdown signals"),
                }
                token.cancel();
            }
        }
    });
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = sigterm.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "SIGINT")
}

async fn run_closers(closers: Vec<(String, Closer)>, timeout: Duration) {
    if closers.is_empty() {
        return;
    }

    info!(closers = closers.len(), timeout_ms = timeout.as_millis() as u64, "running closers");

    let mut closer_set = JoinSet::new();
    for (name, closer) in closers {
        closer_set.spawn(async move { (name, closer().await) });
    }

    let all_closed = async {
        while let Some(joined) = closer_set.join_next().await {
            match joined {
                Ok((name, Ok(()))) => debug!(closer = %name, "closer completed"),
                Ok((name, Err(err))) => {
                    error!(closer = %name, error = %format!("{err:#}"), "closer failed")
                }
                Err(err) => error!(error = %err, "closer panicked"),
            }
        }
    };

    if tokio::time::timeout(timeout, all_closed).await.is_err() {
        error!(timeout_ms = timeout.as_millis() as u64, "closers timed out");
        closer_set.abort_all();
    } else {
        info!("all closers completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_cancellation_stops_processes_and_runs_closers() {
        let closed = Arc::new(AtomicBool::new(false));
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_closer("mark", {
                let closed = Arc::clone(&closed);
                move || async move {
                    closed.store(true, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_cancellation_token(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), runner.run()).await;
        canceller.await.unwrap();

        assert!(matches!(result, Ok(Ok(()))));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failing_process_cancels_others_and_is_returned() {
        let runner = Runner::new()
            .with_app_process("waiter", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_app_process("broken", |_ctx| async move {
                Err(anyhow!("consumer could not bind"))
            });

        let result = tokio::time::timeout(Duration::from_secs(5), runner.run())
            .await
            .unwrap();

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("process broken failed"));
        assert!(format!("{err:#}").contains("consumer could not bind"));
    }

    #[tokio::test]
    async fn test_boxed_process_runs() {
        let runs = Arc::new(AtomicUsize::new(0));
        let process: AppProcess = {
            let runs = Arc::clone(&runs);
            Box::new(move |_ctx| {
                Box::pin(async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        };

        Runner::new()
            .with_boxed_app_process("once", process)
            .run()
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_closer_does_not_stop_others() {
        let closed = Arc::new(AtomicUsize::new(0));

        let mut runner = Runner::new().with_closer("failing", || async move {
            Err(anyhow!("flush failed"))
        });
        for name in ["first", "second"] {
            let closed = Arc::clone(&closed);
            runner = runner.with_closer(name, move || async move {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        run_closers(runner.closers, Duration::from_secs(1)).await;

        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_closer_is_abandoned_at_timeout() {
        let runner = Runner::new().with_closer("stuck", || async move {
            std::future::pending::<()>().await;
            Ok(())
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run_closers(runner.closers, Duration::from_millis(50)),
        )
        .await;

        assert!(result.is_ok());
    }
}
