//! Single-worker task serialization
//!
//! An [`Actor`] owns a piece of state and a small bounded queue of tasks.
//! One tokio task drains the queue, handing each task `&mut S` in turn, so
//! state owned by an actor is mutated by at most one task at a time and in
//! submission order, without locks at the call sites.
//!
//! Panics inside a task are caught at the actor boundary. Callers of
//! [`Actor::run`] get them back as [`ActorError::Panicked`]; tasks submitted
//! with [`Actor::post`] only produce a log entry since nobody is waiting.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::ActorError;

/// Queue depth; submitters wait once this many tasks are pending.
pub const QUEUE_DEPTH: usize = 5;

type Task<S> = Box<dyn for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send>;

/// Serializes access to a state value through a queue of tasks
pub struct Actor<S> {
    /// Name used in log output
    name: String,
    /// Task queue feeding the worker
    tx: mpsc::Sender<Task<S>>,
    /// Cancelled by `kill`
    stopped: CancellationToken,
}

impl<S: Send + 'static> Actor<S> {
    /// Create an actor owning `state` and spawn its worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, state: S) -> Self {
        let name = name.into();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let stopped = CancellationToken::new();

        tokio::spawn(work(name.clone(), state, rx, stopped.clone()));

        Self { name, tx, stopped }
    }

    /// Submit a task and wait for its result.
    pub async fn run<R, F>(&self, f: F) -> Result<R, ActorError>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, R> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();

        self.submit(task(move |state: &mut S| {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { f(state).await })
                    .catch_unwind()
                    .await
                    .map_err(panic_message);
                let _ = done_tx.send(outcome);
            })
        }))
        .await?;

        match done_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(ActorError::Panicked(message)),
            Err(_) => Err(ActorError::Stopped),
        }
    }

    /// Submit a task without waiting for it.
    pub async fn post<F>(&self, f: F) -> Result<(), ActorError>
    where
        F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
    {
        let name = self.name.clone();

        self.submit(task(move |state: &mut S| {
            Box::pin(async move {
                let outcome = AssertUnwindSafe(async move { f(state).await })
                    .catch_unwind()
                    .await;
                if let Err(payload) = outcome {
                    tracing::error!(
                        "Recovered from panic in actor {}: {}",
                        name,
                        panic_message(payload)
                    );
                }
            })
        }))
        .await
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn kill(&self) {
        self.stopped.cancel();
    }

    /// Whether `kill` has been called
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    async fn submit(&self, task: Task<S>) -> Result<(), ActorError> {
        if self.stopped.is_cancelled() {
            return Err(ActorError::Stopped);
        }
        self.tx.send(task).await.map_err(|_| ActorError::Stopped)
    }
}

impl<S> Drop for Actor<S> {
    fn drop(&mut self) {
        self.stopped.cancel();
    }
}

fn task<S, F>(f: F) -> Task<S>
where
    F: for<'a> FnOnce(&'a mut S) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

async fn work<S>(
    name: String,
    mut state: S,
    mut rx: mpsc::Receiver<Task<S>>,
    stopped: CancellationToken,
) {
    tracing::trace!("Actor {} started", name);

    loop {
        tokio::select! {
            biased;
            Some(task) = rx.recv() => task(&mut state).await,
            _ = stopped.cancelled() => break,
        }
    }

    rx.close();
    while let Some(task) = rx.recv().await {
        task(&mut state).await;
    }

    tracing::trace!("Actor {} stopped", name);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_returns_value() {
        let actor = Actor::new("test", 41u32);
        let value = actor
            .run(|n| {
                Box::pin(async move {
                    *n += 1;
                    *n
                })
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_tasks_run_in_submission_order() {
        let actor = Actor::new("order", Vec::<usize>::new());

        for i in 0..20 {
            if i % 3 == 0 {
                actor
                    .run(move |seen| Box::pin(async move { seen.push(i) }))
                    .await
                    .unwrap();
            } else {
                actor
                    .post(move |seen| Box::pin(async move { seen.push(i) }))
                    .await
                    .unwrap();
            }
        }

        let seen = actor
            .run(|seen| Box::pin(async move { seen.clone() }))
            .await
            .unwrap();
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_tasks_never_overlap() {
        let actor = Arc::new(Actor::new("exclusive", ()));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let actor = Arc::clone(&actor);
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                actor
                    .run(move |_| {
                        Box::pin(async move {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(2)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                        })
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_surfaces_panic_and_actor_survives() {
        let actor = Actor::new("panicky", 0u32);

        let err = actor
            .run(|_| Box::pin(async move { panic!("boom") }))
            .await
            .unwrap_err();
        assert_eq!(err, ActorError::Panicked("boom".to_string()));

        let value = actor
            .run(|n| Box::pin(async move { *n + 7 }))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_post_panic_is_only_logged() {
        let actor = Actor::new("posted", 0u32);

        actor
            .post(|_| Box::pin(async move { panic!("ignored") }))
            .await
            .unwrap();
        actor
            .post(|n| Box::pin(async move { *n = 5 }))
            .await
            .unwrap();

        let value = actor.run(|n| Box::pin(async move { *n })).await.unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_kill_rejects_new_tasks() {
        let actor = Actor::new("killed", ());
        actor.kill();
        assert!(actor.is_stopped());

        let err = actor
            .run(|_| Box::pin(async move {}))
            .await
            .unwrap_err();
        assert_eq!(err, ActorError::Stopped);
        assert_eq!(
            actor.post(|_| Box::pin(async move {})).await.unwrap_err(),
            ActorError::Stopped
        );
    }
}
