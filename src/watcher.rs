//! Trigger sources for the watch loop
//!
//! The controller does not care why a pass runs, only that something asked
//! for one. [`TriggerSource`] captures that contract and two strategies
//! implement it:
//!
//! - [`EventWatcher`] subscribes to file system notifications for the
//!   target's directory (non-recursive). Every notification, whatever its
//!   kind, is treated as "something happened"; bursts already queued are
//!   folded into a single trigger.
//! - [`PollingWatcher`] fires on a fixed interval.
//!
//! [`Watcher`] picks one of them once, from the configured [`WatchMode`] and
//! what the platform supports, and keeps it for the whole run.

use crate::error::{GuardError, Result};
use crate::types::{Trigger, WatchMode};
use crate::utils;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, trace, warn};

/// Something that decides when the next detection pass runs
pub trait TriggerSource {
    /// Wait until the next pass should run
    fn next_trigger(&mut self) -> impl Future<Output = Result<Trigger>> + Send;

    /// Ask for an extra pass after a recoverable failure
    fn schedule_retry(&mut self) {}

    /// Stop delivering triggers and release OS resources
    fn shutdown(&mut self) -> Result<()>;
}

/// Fixed-interval trigger source
#[derive(Debug)]
pub struct PollingWatcher {
    interval: Interval,
}

impl PollingWatcher {
    /// Create a poller ticking every `period`; the first tick is immediate
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        PollingWatcher { interval }
    }
}

impl TriggerSource for PollingWatcher {
    async fn next_trigger(&mut self) -> Result<Trigger> {
        self.interval.tick().await;
        Ok(Trigger::Poll)
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Notification-driven trigger source backed by `notify`
pub struct EventWatcher {
    /// Backend handle; `None` once shut down
    watcher: Option<RecommendedWatcher>,
    /// Directory containing the target
    dir: PathBuf,
    /// Notifications forwarded from the backend's delivery thread
    events: UnboundedReceiver<notify::Result<Event>>,
    /// Pending follow-up pass after a transient failure
    retry: Option<Pin<Box<Sleep>>>,
    /// Delay before a scheduled retry fires
    retry_delay: Duration,
}

impl std::fmt::Debug for EventWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWatcher")
            .field("dir", &self.dir)
            .field("active", &self.watcher.is_some())
            .field("retry_pending", &self.retry.is_some())
            .finish()
    }
}

enum Wake {
    Retry,
    Event(Option<notify::Result<Event>>),
}

impl EventWatcher {
    /// Subscribe to notifications for the directory containing `target`
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Watch`] if the platform backend cannot be
    /// created or the directory cannot be watched.
    pub fn new(target: &Path, retry_delay: Duration) -> Result<Self> {
        let dir = utils::parent_dir(target);
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // The receiver is gone once the guard shut down; nothing left to notify.
            let _ = tx.send(res);
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        info!("Watching directory for changes: {}", dir.display());

        Ok(EventWatcher {
            watcher: Some(watcher),
            dir,
            events,
            retry: None,
            retry_delay,
        })
    }

    /// Directory being watched
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_event(res: &notify::Result<Event>) {
        match res {
            Ok(event) => trace!("File system event: {:?}", event),
            Err(e) => error!("Watch error: {}", e),
        }
    }
}

impl TriggerSource for EventWatcher {
    async fn next_trigger(&mut self) -> Result<Trigger> {
        let wake = match self.retry.as_mut() {
            Some(retry) => tokio::select! {
                _ = retry => Wake::Retry,
                event = self.events.recv() => Wake::Event(event),
            },
            None => Wake::Event(self.events.recv().await),
        };

        // Any pass supersedes a pending retry.
        self.retry = None;

        match wake {
            Wake::Retry => {
                debug!("Running scheduled retry");
                Ok(Trigger::Retry)
            }
            Wake::Event(None) => Err(GuardError::internal("event channel closed")),
            Wake::Event(Some(res)) => {
                Self::log_event(&res);
                let mut coalesced = 0usize;
                while let Ok(res) = self.events.try_recv() {
                    Self::log_event(&res);
                    coalesced += 1;
                }
                if coalesced > 0 {
                    trace!("Coalesced {} queued events", coalesced);
                }
                Ok(Trigger::Event)
            }
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry.is_none() {
            self.retry = Some(Box::pin(tokio::time::sleep(self.retry_delay)));
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut watcher) = self.watcher.take() {
            info!("Stopping file system watch on: {}", self.dir.display());
            let unwatched = watcher.unwatch(&self.dir);
            // Dropping the backend joins its delivery thread.
            drop(watcher);
            self.events.close();
            unwatched?;
        }
        Ok(())
    }
}

impl Drop for EventWatcher {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to stop file system watch: {}", e);
        }
    }
}

/// The trigger strategy chosen for a run
#[derive(Debug)]
pub enum Watcher {
    /// File system notifications
    Events(EventWatcher),
    /// Fixed-interval polling
    Polling(PollingWatcher),
}

impl Watcher {
    /// Pick the strategy for `mode`
    ///
    /// `WatchMode::Auto` falls back to polling when the event backend is
    /// unavailable; `WatchMode::Events` turns that into an error.
    pub fn select(mode: WatchMode, target: &Path, poll_interval: Duration) -> Result<Self> {
        match mode {
            WatchMode::Poll => Ok(Watcher::Polling(PollingWatcher::new(poll_interval))),
            WatchMode::Events => Ok(Watcher::Events(EventWatcher::new(target, poll_interval)?)),
            WatchMode::Auto => match EventWatcher::new(target, poll_interval) {
                Ok(events) => Ok(Watcher::Events(events)),
                Err(e) => {
                    warn!("Event watching unavailable ({}), falling back to polling", e);
                    Ok(Watcher::Polling(PollingWatcher::new(poll_interval)))
                }
            },
        }
    }

    /// Short name of the strategy, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Watcher::Events(_) => "event-driven",
            Watcher::Polling(_) => "polling",
        }
    }
}

impl TriggerSource for Watcher {
    async fn next_trigger(&mut self) -> Result<Trigger> {
        match self {
            Watcher::Events(w) => w.next_trigger().await,
            Watcher::Polling(w) => w.next_trigger().await,
        }
    }

    fn schedule_retry(&mut self) {
        match self {
            Watcher::Events(w) => w.schedule_retry(),
            Watcher::Polling(w) => w.schedule_retry(),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        match self {
            Watcher::Events(w) => w.shutdown(),
            Watcher::Polling(w) => w.shutdown(),
        }
    }
}
