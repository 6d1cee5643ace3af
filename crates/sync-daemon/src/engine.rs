//! The sync engine: one event loop driving push and pull.
//!
//! The loop multiplexes four sources:
//! - filesystem notifications, which (re)arm the push debounce
//! - the debounce deadline, which runs one push
//! - the periodic pull tick
//! - the stop signal
//!
//! Push and pull run inline, so they never overlap. A stop received while
//! one of them is in flight takes effect once it returns.

use crate::watcher::{WatchError, WatchSet};
use std::path::PathBuf;
use std::time::Duration;
use sync_core::cursor::CursorStore;
use sync_core::fs::FileSystem;
use sync_core::gateway::RemoteGateway;
use sync_core::pull::{pull, PullOptions, PullReport};
use sync_core::push::{push, PushReport};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Timers driving the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Quiet period after the last local change before pushing
    pub debounce: Duration,
    /// Interval between pulls
    pub pull_interval: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            pull_interval: Duration::from_secs(30),
        }
    }
}

/// Requests the engine loop to stop. Cloneable, callable from any thread,
/// and safe to call more than once.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct Engine<F, G, C> {
    root: PathBuf,
    fs: F,
    gateway: G,
    cursor: C,
    pull_options: PullOptions,
    timing: EngineTiming,
    authenticated: bool,
    stop_tx: watch::Sender<bool>,
}

impl<F, G, C> Engine<F, G, C>
where
    F: FileSystem,
    G: RemoteGateway,
    C: CursorStore,
{
    /// Create an engine for the tree at `root`, accessed through `fs`.
    pub fn new(root: PathBuf, fs: F, gateway: G, cursor: C, pull_options: PullOptions) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            root,
            fs,
            gateway,
            cursor,
            pull_options,
            timing: EngineTiming::default(),
            authenticated: true,
            stop_tx,
        }
    }

    pub fn with_timing(mut self, timing: EngineTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Without credentials push and pull are skipped.
    pub fn with_auth(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    pub fn cursor(&self) -> &C {
        &self.cursor
    }

    /// Run one push. Failures are logged; `None` when skipped or failed.
    pub async fn push_once(&mut self) -> Option<PushReport> {
        if !self.authenticated {
            info!("No auth token configured, skipping push");
            return None;
        }
        match push(&self.fs, &self.gateway, &mut self.cursor).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    warn!("Push finished with {} failure(s)", report.failures.len());
                }
                Some(report)
            }
            Err(e) => {
                error!("Push failed: {}", e);
                None
            }
        }
    }

    /// Run one pull. Failures are logged; `None` when skipped or failed.
    pub async fn pull_once(&mut self) -> Option<PullReport> {
        if !self.authenticated {
            info!("No auth token configured, skipping pull");
            return None;
        }
        match pull(&self.fs, &self.gateway, &mut self.cursor, &self.pull_options).await {
            Ok(report) => {
                if !report.failures.is_empty() {
                    warn!("Pull finished with {} failure(s)", report.failures.len());
                }
                Some(report)
            }
            Err(e) => {
                error!("Pull failed: {}", e);
                None
            }
        }
    }

    /// Watch the tree and sync until stopped.
    ///
    /// A push is scheduled one debounce period after start so changes made
    /// while the daemon was down are sent. The first pull runs one pull
    /// interval after start.
    pub async fn run(&mut self) -> Result<(), WatchError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() {
            return Ok(());
        }

        let (mut watch_set, mut events) = WatchSet::new(self.root.clone())?;
        let root = watch_set.root().to_path_buf();
        let watched = watch_set.register_tree(&root);
        info!("Watching {} ({} directories)", root.display(), watched);

        let timing = self.timing;
        let mut push_due = Some(Instant::now() + timing.debounce);
        let mut pull_tick =
            tokio::time::interval_at(Instant::now() + timing.pull_interval, timing.pull_interval);
        pull_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow_and_update() {
                        break;
                    }
                }

                event = events.recv() => match event {
                    Some(Ok(event)) => {
                        if watch_set.handle(&event) {
                            debug!("Change detected: {:?}", event.paths);
                            push_due = Some(Instant::now() + timing.debounce);
                        }
                    }
                    Some(Err(e)) => warn!("File watcher error: {}", e),
                    None => {
                        warn!("File watcher closed");
                        break;
                    }
                },

                _ = wait_until(push_due) => {
                    push_due = None;
                    self.push_once().await;
                }

                _ = pull_tick.tick() => {
                    self.pull_once().await;
                }
            }
        }

        drop(watch_set);
        info!("Sync engine stopped");
        Ok(())
    }
}

/// Sleep until `deadline`, or forever when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
