//! User activity tracking.
//!
//! The monitor owns a background task that keeps a rolling idle timer. Every
//! qualifying input event pushes the deadline out by the idle window; when
//! the deadline passes without input the monitor reports idle. Dropping the
//! monitor aborts the task, which releases the subscription and any pending
//! idle timer.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::debug;

/// Idle window used when the configuration does not override it (3 minutes)
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(3 * 60);

/// Input observed on the global input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove,
    KeyPress,
    Click,
    Scroll,
    /// Anything else (resize, paste, focus...). Does not count as activity.
    Other,
}

impl InputEvent {
    pub fn is_activity(&self) -> bool {
        !matches!(self, InputEvent::Other)
    }
}

/// Cloneable handle that forwards input events to a monitor.
///
/// Sending after the monitor has been dropped is silently ignored.
#[derive(Debug, Clone)]
pub struct ActivitySink {
    tx: mpsc::UnboundedSender<InputEvent>,
}

impl ActivitySink {
    pub fn record(&self, event: InputEvent) {
        let _ = self.tx.send(event);
    }
}

#[derive(Debug)]
pub struct ActivityMonitor {
    sink: ActivitySink,
    idle: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ActivityMonitor {
    /// Start monitoring. The user counts as active at start.
    pub fn start(idle_window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (idle_tx, idle_rx) = watch::channel(false);
        let task = tokio::spawn(run_idle_timer(idle_window, rx, idle_tx));
        debug!(idle_window_secs = idle_window.as_secs(), "Activity monitor started");

        Self {
            sink: ActivitySink { tx },
            idle: idle_rx,
            task,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.idle.borrow()
    }

    pub fn sink(&self) -> ActivitySink {
        self.sink.clone()
    }

    /// Receiver that observes idle/active flips.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.idle.clone()
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
        debug!("Activity monitor stopped");
    }
}

async fn run_idle_timer(
    idle_window: Duration,
    mut events: mpsc::UnboundedReceiver<InputEvent>,
    idle: watch::Sender<bool>,
) {
    let timer = time::sleep(idle_window);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) if event.is_activity() => {
                    if *idle.borrow() {
                        debug!(?event, "User active again");
                    }
                    idle.send_if_modified(|is_idle| std::mem::replace(is_idle, false));
                    timer.as_mut().reset(Instant::now() + idle_window);
                }
                Some(_) => {}
                None => break,
            },
            () = &mut timer, if !*idle.borrow() => {
                debug!("User idle");
                idle.send_replace(true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(180);

    /// Let the monitor task process whatever is queued
    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_active() {
        let monitor = ActivityMonitor::start(WINDOW);
        settle().await;
        assert!(!monitor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_goes_idle_after_window() {
        let monitor = ActivityMonitor::start(WINDOW);
        settle().await;

        time::advance(Duration::from_secs(179)).await;
        settle().await;
        assert!(!monitor.is_idle());

        time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(monitor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_resets_idle_timer() {
        let monitor = ActivityMonitor::start(WINDOW);
        let sink = monitor.sink();
        settle().await;

        time::advance(Duration::from_secs(120)).await;
        sink.record(InputEvent::KeyPress);
        settle().await;

        // 240s since start but only 120s since the key press
        time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert!(!monitor.is_idle());

        time::advance(Duration::from_secs(61)).await;
        settle().await;
        assert!(monitor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_input_clears_idle() {
        let monitor = ActivityMonitor::start(WINDOW);
        let sink = monitor.sink();
        time::advance(Duration::from_secs(200)).await;
        settle().await;
        assert!(monitor.is_idle());

        sink.record(InputEvent::PointerMove);
        settle().await;
        assert!(!monitor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_qualifying_events_are_ignored() {
        let monitor = ActivityMonitor::start(WINDOW);
        let sink = monitor.sink();
        time::advance(Duration::from_secs(200)).await;
        settle().await;

        sink.record(InputEvent::Other);
        settle().await;
        assert!(monitor.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down_task() {
        let monitor = ActivityMonitor::start(WINDOW);
        let sink = monitor.sink();
        let mut idle = monitor.subscribe();
        settle().await;

        drop(monitor);
        settle().await;

        // Task is gone: the idle sender was dropped with it
        assert!(idle.changed().await.is_err());
        // Late events go nowhere and do not panic
        sink.record(InputEvent::Click);
    }
}
