//! Reconciliation supervisor.
//!
//! # Responsibilities
//! - Run one never-terminating task per watcher
//! - Drain the watcher's stream and dispatch events to `put`/`delete`
//! - Re-subscribe on cancellation, store-side cancel or stream close
//! - Recover from panics in event handlers and relaunch immediately
//!
//! # Design Decisions
//! - Each iteration of a watcher's loop runs in its own spawned task; the
//!   outer task awaits its `JoinHandle`, so a panic is isolated to one
//!   iteration and one watcher
//! - Restart policy is immediate with no backoff. A store that keeps
//!   failing refreshes produces a tight respawn loop; the loop only
//!   yields to the scheduler between attempts
//! - Event errors are logged and counted, never retried

use dashmap::DashMap;
use serde::Serialize;
use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::WatchError;
use crate::store::{EventKind, WatchEvent, WatchResponse};
use crate::watcher::{SharedStream, Watcher, WatcherKind};

/// Process-wide watcher → current stream mapping.
#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<WatcherKind, SharedStream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: WatcherKind, stream: SharedStream) {
        self.streams.insert(kind, stream);
    }

    pub fn get(&self, kind: WatcherKind) -> Option<SharedStream> {
        self.streams.get(&kind).map(|s| Arc::clone(s.value()))
    }

    /// True when `stream` is the registered stream for `kind`.
    pub fn is_current(&self, kind: WatcherKind, stream: &SharedStream) -> bool {
        self.streams.get(&kind).is_some_and(|s| Arc::ptr_eq(s.value(), stream))
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// Counters for one supervised watcher.
#[derive(Debug, Default)]
pub struct WatcherStats {
    restarts: AtomicU64,
    panics: AtomicU64,
    refreshes: AtomicU64,
    events: AtomicU64,
    failures: AtomicU64,
}

impl WatcherStats {
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }

    pub fn panics(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherStatsView {
    pub watcher: &'static str,
    pub restarts: u64,
    pub panics: u64,
    pub refreshes: u64,
    pub events: u64,
    pub failures: u64,
}

/// Why one iteration of a watcher loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopExit {
    Canceled,
    StoreCanceled,
    StreamClosed,
    RefreshFailed(String),
}

#[derive(Default)]
pub struct Supervisor {
    registry: Arc<StreamRegistry>,
    stats: HashMap<WatcherKind, Arc<WatcherStats>>,
    watchers: HashMap<WatcherKind, Arc<dyn Watcher>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(registry: Arc<StreamRegistry>) -> Self {
        Self {
            registry,
            ..Default::default()
        }
    }

    /// Start supervising `watcher`. It must already be bound to a table.
    pub fn spawn(&mut self, watcher: Arc<dyn Watcher>) -> Result<(), WatchError> {
        let kind = watcher.kind();
        if watcher.table().is_none() {
            return Err(WatchError::Unbound(kind.as_str()));
        }

        let stats = Arc::new(WatcherStats::default());
        self.registry.insert(kind, watcher.watch_stream());
        let task = tokio::spawn(supervise(
            Arc::clone(&watcher),
            Arc::clone(&self.registry),
            Arc::clone(&stats),
        ));

        tracing::info!(watcher = %kind, "Watcher supervised");
        self.stats.insert(kind, stats);
        self.watchers.insert(kind, watcher);
        self.tasks.push(task);
        Ok(())
    }

    pub fn into_handle(self) -> SupervisorHandle {
        SupervisorHandle {
            registry: self.registry,
            stats: self.stats,
            watchers: self.watchers,
            tasks: self.tasks,
        }
    }
}

/// Start one supervised task per watcher.
pub fn watch_all(
    registry: Arc<StreamRegistry>,
    watchers: Vec<Arc<dyn Watcher>>,
) -> Result<SupervisorHandle, WatchError> {
    let mut supervisor = Supervisor::new(registry);
    for watcher in watchers {
        supervisor.spawn(watcher)?;
    }
    Ok(supervisor.into_handle())
}

/// Running supervisor: counters and manual resubscription.
pub struct SupervisorHandle {
    registry: Arc<StreamRegistry>,
    stats: HashMap<WatcherKind, Arc<WatcherStats>>,
    watchers: HashMap<WatcherKind, Arc<dyn Watcher>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SupervisorHandle {
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn stats(&self, kind: WatcherKind) -> Option<Arc<WatcherStats>> {
        self.stats.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<WatcherKind> {
        WatcherKind::ALL
            .into_iter()
            .filter(|k| self.watchers.contains_key(k))
            .collect()
    }

    pub fn snapshot(&self) -> Vec<WatcherStatsView> {
        self.kinds()
            .into_iter()
            .filter_map(|kind| {
                let s = self.stats.get(&kind)?;
                Some(WatcherStatsView {
                    watcher: kind.as_str(),
                    restarts: s.restarts(),
                    panics: s.panics(),
                    refreshes: s.refreshes(),
                    events: s.events(),
                    failures: s.failures(),
                })
            })
            .collect()
    }

    /// Fire the watcher's cancellation token, forcing a re-subscribe.
    pub fn resubscribe(&self, kind: WatcherKind) -> bool {
        match self.watchers.get(&kind) {
            Some(watcher) => {
                watcher.cancellation().cancel();
                true
            }
            None => false,
        }
    }

    /// Abort every supervised task. Only used when the process exits.
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn supervise(watcher: Arc<dyn Watcher>, registry: Arc<StreamRegistry>, stats: Arc<WatcherStats>) {
    let kind = watcher.kind();
    loop {
        let mut child = ChildTask(tokio::spawn(run(
            Arc::clone(&watcher),
            Arc::clone(&registry),
            Arc::clone(&stats),
        )));

        match (&mut child.0).await {
            Ok(exit) => tracing::debug!(watcher = %kind, exit = ?exit, "Watch loop exited"),
            Err(err) if err.is_panic() => {
                let message = panic_message(err.into_panic());
                stats.panics.fetch_add(1, Ordering::Relaxed);
                tracing::error!(
                    watcher = %kind,
                    panic = %message,
                    backtrace = %Backtrace::force_capture(),
                    "Watch loop panicked, recovering"
                );
            }
            Err(err) => tracing::warn!(watcher = %kind, error = %err, "Watch loop aborted"),
        }

        stats.restarts.fetch_add(1, Ordering::Relaxed);
        tokio::task::yield_now().await;
    }
}

/// Aborts the watch loop when the supervising task itself is aborted.
struct ChildTask(JoinHandle<LoopExit>);

impl Drop for ChildTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Next {
    Canceled,
    Response(Option<WatchResponse>),
}

async fn run(watcher: Arc<dyn Watcher>, registry: Arc<StreamRegistry>, stats: Arc<WatcherStats>) -> LoopExit {
    let kind = watcher.kind();
    let token = watcher.cancellation();
    let stream = watcher.watch_stream();
    registry.insert(kind, Arc::clone(&stream));
    let mut events = stream.lock().await;

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => Next::Canceled,
            response = events.recv() => Next::Response(response),
        };

        match next {
            Next::Canceled => {
                tracing::warn!(watcher = %kind, "Watch context canceled");
                drop(events);
                return resubscribe(watcher.as_ref(), &registry, &stats, LoopExit::Canceled).await;
            }
            Next::Response(None) => {
                tracing::warn!(watcher = %kind, "Watch stream closed");
                drop(events);
                return resubscribe(watcher.as_ref(), &registry, &stats, LoopExit::StreamClosed).await;
            }
            Next::Response(Some(response)) if response.canceled => {
                tracing::warn!(watcher = %kind, "Watch canceled by store");
                drop(events);
                return resubscribe(watcher.as_ref(), &registry, &stats, LoopExit::StoreCanceled).await;
            }
            Next::Response(Some(response)) => {
                for event in &response.events {
                    dispatch(watcher.as_ref(), event, &stats).await;
                }
            }
        }
    }
}

async fn resubscribe(
    watcher: &dyn Watcher,
    registry: &StreamRegistry,
    stats: &WatcherStats,
    exit: LoopExit,
) -> LoopExit {
    let kind = watcher.kind();
    match watcher.refresh().await {
        Ok(()) => {
            stats.refreshes.fetch_add(1, Ordering::Relaxed);
            registry.insert(kind, watcher.watch_stream());
            exit
        }
        Err(e) => {
            tracing::error!(watcher = %kind, error = %e, "Watch refresh failed");
            LoopExit::RefreshFailed(e.to_string())
        }
    }
}

async fn dispatch(watcher: &dyn Watcher, event: &WatchEvent, stats: &WatcherStats) {
    let kind = watcher.kind();
    let result = match event.kind {
        EventKind::Put => watcher.put(&event.kv, event.is_create()).await,
        EventKind::Delete => watcher.delete(&event.kv).await,
        EventKind::Unknown(raw) => {
            tracing::warn!(watcher = %kind, kind = raw, key = %event.kv.key_str(), "Unrecognized watch event");
            return;
        }
    };

    stats.events.fetch_add(1, Ordering::Relaxed);
    if let Err(e) = result {
        stats.failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(watcher = %kind, key = %event.kv.key_str(), error = %e, "Watch event failed");
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7_u32)), "non-string panic payload");
    }

    #[test]
    fn test_stats_view_defaults() {
        let handle = Supervisor::new(Arc::new(StreamRegistry::new())).into_handle();
        assert!(handle.snapshot().is_empty());
        assert!(!handle.resubscribe(WatcherKind::Route));
        assert!(handle.registry().is_empty());
    }
}
