use crate::{Error, Result};

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

/// Receiving half of the stop signal raised when a unit of work fails.
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
    parent: Option<watch::Receiver<bool>>,
}

impl Cancellation {
    /// A signal that never fires.
    pub fn none() -> Self {
        let (tx, receiver) = watch::channel(false);
        // Dropping the sender closes the channel, so `cancelled` waits forever.
        drop(tx);
        Self::from(receiver)
    }

    /// Also fires when `parent` fires.
    pub fn join(self, parent: &Cancellation) -> Self {
        Self {
            parent: Some(parent.receiver.clone()),
            ..self
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow() || self.parent.as_ref().map(|p| *p.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is raised.
    pub async fn cancelled(&self) {
        match self.parent.clone() {
            Some(parent) => {
                tokio::select! {
                    _ = fired(self.receiver.clone()) => {}
                    _ = fired(parent) => {}
                }
            }
            None => fired(self.receiver.clone()).await,
        }
    }
}

async fn fired(mut receiver: watch::Receiver<bool>) {
    loop {
        if *receiver.borrow_and_update() {
            return;
        }

        if receiver.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl From<watch::Receiver<bool>> for Cancellation {
    fn from(receiver: watch::Receiver<bool>) -> Self {
        Self {
            receiver,
            parent: None,
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::none()
    }
}

/// Bounded pool running independent units of work on the multi-threaded runtime.
#[derive(Debug, Clone, Copy)]
pub struct ParallelExecutor {
    workers: usize,
}

impl ParallelExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Runs `worker` over every unit and collects the results in completion order.
    ///
    /// The first error raises cancellation: idle workers stop taking units while in-flight
    /// ones run to completion. That error is returned; finished units are kept as they are.
    pub async fn run<U, T, F, Fut>(&self, units: Vec<U>, worker: F) -> Result<Vec<T>>
    where
        U: Send + 'static,
        T: Send + 'static,
        F: Fn(U, Cancellation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let unit_len = units.len();
        if unit_len == 0 {
            return Ok(vec![]);
        }

        let queue = Arc::new(Mutex::new(VecDeque::from(units)));
        let worker = Arc::new(worker);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (tx, mut rx) = mpsc::channel::<Result<T>>(unit_len);

        let mut handles = vec![];

        for id in 0..self.workers.min(unit_len) {
            let queue = Arc::clone(&queue);
            let worker = Arc::clone(&worker);
            let cancellation = Cancellation::from(cancel_rx.clone());
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        info!("Worker {id} stops taking units.");
                        break;
                    }

                    let unit = match next_unit(&queue) {
                        Ok(Some(unit)) => unit,
                        Ok(None) => break,
                        Err(err) => {
                            if tx.send(Err(err)).await.is_err() {
                                error!("Result channel is closed unexpectedly.");
                            }
                            break;
                        }
                    };

                    let result = worker(unit, cancellation.clone()).await;

                    if tx.send(result).await.is_err() {
                        error!("Result channel is closed unexpectedly.");
                        break;
                    }
                }
            }));
        }

        drop(tx);

        let mut results: Vec<T> = vec![];
        let mut failure: Option<Error> = None;

        while let Some(result) = rx.recv().await {
            match result {
                Ok(value) => results.push(value),
                Err(err) => {
                    if cancel_tx.send(true).is_err() {
                        error!("No worker is listening for cancellation.");
                    }

                    // A cancelled unit only reports the fallout of the first failure.
                    match failure.as_ref() {
                        None => failure = Some(err),
                        Some(first) if first.is_cancelled() && !err.is_cancelled() => {
                            failure = Some(err)
                        }
                        Some(_) => error!("{err}"),
                    }
                }
            }
        }

        for handle in handles {
            if let Err(err) = handle.await {
                failure.get_or_insert(Error::from(err));
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(results),
        }
    }
}

fn next_unit<U>(queue: &Mutex<VecDeque<U>>) -> Result<Option<U>> {
    queue
        .lock()
        .map(|mut queue| queue.pop_front())
        .map_err(from_guard)
}

fn from_guard<G>(err: PoisonError<G>) -> Error {
    error!("{:#?}", err);
    Error::Worker(err.to_string())
}
