//! Background thread that sweeps the pools on a fixed interval.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::GlPoolError;

enum SweepMessage {
    Shutdown,
}

/// Periodic sweep task with a blocking shutdown.
///
/// The thread waits on its message channel with a timeout of one
/// interval; each timeout runs the task once. [`shutdown`](Self::shutdown)
/// (also run on drop) waits for an in-flight sweep to finish, so the
/// pools the task touches outlive it.
pub struct Sweeper {
    tx: mpsc::Sender<SweepMessage>,
    thread: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawn the sweeper thread.
    ///
    /// # Errors
    ///
    /// [`GlPoolError::ThreadSpawn`] if the thread can't be started.
    pub fn spawn<F>(interval: Duration, mut task: F) -> Result<Self, GlPoolError>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<SweepMessage>();
        let thread = std::thread::Builder::new()
            .name("glpool-sweeper".into())
            .spawn(move || loop {
                match rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => task(),
                    Ok(SweepMessage::Shutdown)
                    | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(GlPoolError::ThreadSpawn)?;
        log::debug!("Sweeper started ({} ms interval)", interval.as_millis());
        Ok(Self {
            tx,
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it to finish.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(SweepMessage::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            log::debug!("Sweeper stopped");
        }
    }

    /// Whether the thread is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
