//! Credential lifecycle coordinator.
//!
//! The coordinator runs as a single tokio task that owns the credential
//! store, the activity monitor and the one expiry timer. The UI talks to it
//! through [`LifecycleCoordinator`], which sends commands and reads a
//! [`LifecycleStatus`] snapshot. Validation and renewal calls run in a
//! `JoinSet` owned by the task; their results are applied only if they
//! belong to the current credential generation. Dropping the handle aborts
//! the task, which cancels the timer, unsubscribes the activity monitor and
//! aborts any in-flight call before it can touch state.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Sleep};
use tracing::{debug, info, warn};

use super::{
    ActivityMonitor, ActivitySink, Credential, CredentialError, CredentialStore, ExpiryPolicy,
    RenewalClient, RenewalMode, SessionClock, TokenValidator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NoCredential,
    Active,
    PromptingRefresh,
    LoggedOut,
}

impl LifecycleState {
    pub fn holds_credential(&self) -> bool {
        matches!(self, LifecycleState::Active | LifecycleState::PromptingRefresh)
    }

    pub fn label(&self) -> &'static str {
        match self {
            LifecycleState::NoCredential => "no credential",
            LifecycleState::Active => "active",
            LifecycleState::PromptingRefresh => "refresh needed",
            LifecycleState::LoggedOut => "logged out",
        }
    }
}

/// Snapshot published to the UI after every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleStatus {
    pub state: LifecycleState,
    pub show_prompt: bool,
    pub issued_at: Option<DateTime<Utc>>,
    pub warn_at: Option<DateTime<Utc>>,
    pub renewing: bool,
}

impl LifecycleStatus {
    fn initial() -> Self {
        Self {
            state: LifecycleState::NoCredential,
            show_prompt: false,
            issued_at: None,
            warn_at: None,
            renewing: false,
        }
    }
}

/// Callbacks into the application.
///
/// Suppressed once the coordinator handle has been dropped. A callback that
/// was already running when the handle dropped may still complete.
pub trait SessionObserver: Send + Sync {
    fn on_renewed(&self, credential: &Credential);
    fn on_logged_out(&self);
}

/// Everything the coordinator needs from the outside.
pub struct Collaborators {
    pub store: CredentialStore,
    pub renewal: Arc<RenewalClient>,
    pub validator: Option<Arc<dyn TokenValidator>>,
    pub observer: Arc<dyn SessionObserver>,
    pub clock: SessionClock,
}

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub policy: ExpiryPolicy,
    pub idle_window: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            policy: ExpiryPolicy::default(),
            idle_window: super::activity::DEFAULT_IDLE_WINDOW,
        }
    }
}

#[derive(Debug)]
enum Command {
    SupplyCredential(String),
    Refresh,
    Dismiss,
    Login,
    Logout,
    SetVisible(bool),
}

/// Handle to a mounted coordinator.
pub struct LifecycleCoordinator {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<LifecycleStatus>,
    activity: ActivitySink,
    idle: watch::Receiver<bool>,
    store: CredentialStore,
    disposed: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LifecycleCoordinator {
    /// Start the coordinator, optionally with a credential already in hand.
    pub fn mount(
        settings: LifecycleSettings,
        collaborators: Collaborators,
        credential: Option<String>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(LifecycleStatus::initial());
        let monitor = ActivityMonitor::start(settings.idle_window);
        let activity = monitor.sink();
        let idle = monitor.subscribe();
        let store = collaborators.store.clone();
        let disposed = Arc::new(AtomicBool::new(false));

        let mut lifecycle = Lifecycle {
            policy: settings.policy,
            store: collaborators.store,
            renewal: collaborators.renewal,
            validator: collaborators.validator,
            observer: Notifier {
                observer: collaborators.observer,
                disposed: disposed.clone(),
            },
            clock: collaborators.clock,
            monitor,
            commands: command_rx,
            status: status_tx,
            state: LifecycleState::NoCredential,
            show_prompt: false,
            visible: true,
            timer: None,
            generation: 0,
            inflight: JoinSet::new(),
            renewing: None,
        };

        if let Some(token) = credential {
            lifecycle.observe_credential(token);
        }
        lifecycle.publish();

        let task = tokio::spawn(lifecycle.run());
        info!("Lifecycle coordinator mounted");

        Self {
            commands,
            status,
            activity,
            idle,
            store,
            disposed,
            task,
        }
    }

    pub fn status(&self) -> LifecycleStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> LifecycleState {
        self.status.borrow().state
    }

    pub fn show_prompt(&self) -> bool {
        self.status.borrow().show_prompt
    }

    /// Receiver for awaiting status changes.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleStatus> {
        self.status.clone()
    }

    /// Read-only view of the current credential.
    pub fn credential(&self) -> Option<Credential> {
        if !self.status.borrow().state.holds_credential() {
            return None;
        }
        self.store.current()
    }

    /// Bearer value for API calls, while a credential is held.
    pub fn access_token(&self) -> Option<String> {
        if !self.status.borrow().state.holds_credential() {
            return None;
        }
        self.store.token()
    }

    /// Current idle flag, for display only; decisions sample it at fire time.
    pub fn is_idle(&self) -> bool {
        *self.idle.borrow()
    }

    /// Where the UI forwards input events.
    pub fn activity_sink(&self) -> ActivitySink {
        self.activity.clone()
    }

    /// A credential obtained outside the coordinator (e.g. a login page).
    pub fn supply_credential(&self, token: impl Into<String>) {
        self.send(Command::SupplyCredential(token.into()));
    }

    /// User-initiated renewal. Attempted regardless of idleness or visibility.
    pub fn refresh(&self) {
        self.send(Command::Refresh);
    }

    /// Hide the refresh prompt. No-op when it is not showing.
    pub fn dismiss(&self) {
        self.send(Command::Dismiss);
    }

    /// Interactive sign-in when no credential is held.
    pub fn login(&self) {
        self.send(Command::Login);
    }

    pub fn logout(&self) {
        self.send(Command::Logout);
    }

    /// Page/terminal visibility, sampled when the expiry timer fires.
    pub fn set_visible(&self, visible: bool) {
        self.send(Command::SetVisible(visible));
    }

    /// Tear down: cancels the timer, the activity monitor and any call in flight.
    pub fn dispose(self) {
        drop(self);
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Lifecycle coordinator already stopped");
        }
    }
}

impl Drop for LifecycleCoordinator {
    fn drop(&mut self) {
        // Abort does not wait for a poll already running on another worker
        self.disposed.store(true, Ordering::Release);
        self.task.abort();
        debug!("Lifecycle coordinator disposed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deadline {
    /// `issued_at + lifetime - lead`: decide between silent renewal and prompt
    Warning,
    /// `issued_at + lifetime`: the credential is dead
    Expiry,
}

struct ExpiryTimer {
    deadline: Deadline,
    sleep: Pin<Box<Sleep>>,
}

/// Observer calls, gated on the handle still being alive.
struct Notifier {
    observer: Arc<dyn SessionObserver>,
    disposed: Arc<AtomicBool>,
}

impl Notifier {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn renewed(&self, credential: &Credential) {
        if self.is_disposed() {
            debug!("Renewal notification suppressed after dispose");
            return;
        }
        self.observer.on_renewed(credential);
    }

    fn logged_out(&self) {
        if self.is_disposed() {
            debug!("Logout notification suppressed after dispose");
            return;
        }
        self.observer.on_logged_out();
    }
}

enum Outcome {
    Validated(bool),
    Renewed(RenewalMode, Result<Credential, CredentialError>),
}

struct Lifecycle {
    policy: ExpiryPolicy,
    store: CredentialStore,
    renewal: Arc<RenewalClient>,
    validator: Option<Arc<dyn TokenValidator>>,
    observer: Notifier,
    clock: SessionClock,
    monitor: ActivityMonitor,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<LifecycleStatus>,
    state: LifecycleState,
    show_prompt: bool,
    visible: bool,
    /// The only expiry timer. Replacing it drops (cancels) the previous one.
    timer: Option<ExpiryTimer>,
    /// Bumped whenever the credential changes; stale results are discarded.
    generation: u64,
    inflight: JoinSet<(u64, Outcome)>,
    renewing: Option<RenewalMode>,
}

impl Lifecycle {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                deadline = fire(&mut self.timer) => {
                    self.timer = None;
                    self.on_deadline(deadline);
                }
                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    match joined {
                        Ok((generation, outcome)) => self.on_outcome(generation, outcome),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            warn!(error = %e, "Credential call panicked");
                            self.renewing = None;
                            self.logout("credential call panicked");
                        }
                    }
                }
            }
            self.publish();
        }
        debug!("Lifecycle task finished");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SupplyCredential(token) => self.observe_credential(token),
            Command::Refresh => {
                if self.state.holds_credential() {
                    self.start_renewal(RenewalMode::Silent);
                } else {
                    debug!(state = self.state.label(), "Refresh ignored without a credential");
                }
            }
            Command::Dismiss => {
                if self.show_prompt {
                    self.show_prompt = false;
                    self.state = LifecycleState::Active;
                    info!("Refresh prompt dismissed");
                }
            }
            Command::Login => {
                if self.state.holds_credential() {
                    debug!("Login ignored, credential already held");
                } else {
                    self.start_renewal(RenewalMode::Interactive);
                }
            }
            Command::Logout => {
                if self.state.holds_credential() {
                    self.logout("user logged out");
                } else if self.renewing.is_some() {
                    self.begin_generation();
                    info!("Sign-in cancelled");
                }
            }
            Command::SetVisible(visible) => {
                if self.visible != visible {
                    debug!(visible, "Visibility changed");
                    self.visible = visible;
                }
            }
        }
    }

    /// A credential arriving from outside: record it, validate once, then
    /// arm the warning timer.
    fn observe_credential(&mut self, token: String) {
        if token.is_empty() {
            warn!("Ignoring empty credential");
            return;
        }

        // Same value as already stored keeps its issuance time
        if self.store.token().as_deref() != Some(token.as_str()) {
            self.store.put(&Credential::new(token.clone(), self.clock.now()));
        }

        self.begin_generation();
        self.state = LifecycleState::Active;
        self.show_prompt = false;
        info!(issued_at = ?self.store.issued_at(), "Credential observed");

        match self.validator.clone() {
            Some(validator) => {
                let generation = self.generation;
                self.inflight.spawn(async move {
                    let valid = validator.validate(&token).await;
                    (generation, Outcome::Validated(valid))
                });
            }
            None => self.schedule(Deadline::Warning),
        }
    }

    /// Invalidate everything tied to the previous credential.
    fn begin_generation(&mut self) {
        self.generation += 1;
        self.timer = None;
        self.inflight.abort_all();
        self.renewing = None;
    }

    fn schedule(&mut self, deadline: Deadline) {
        let now = self.clock.now();
        let delay = match (self.store.issued_at(), deadline) {
            (Some(issued), Deadline::Warning) => self.policy.delay_until_warning(issued, now),
            (Some(issued), Deadline::Expiry) => self.policy.delay_until_expiry(issued, now),
            (None, Deadline::Warning) => {
                // Unknown issuance: decide on the next tick instead of never
                warn!("No usable issuance time, warning fires immediately");
                chrono::Duration::zero()
            }
            (None, Deadline::Expiry) => {
                debug!("No usable issuance time, expiry timer not armed");
                self.timer = None;
                return;
            }
        };
        // Delays are floored at zero by the policy
        let delay = delay.to_std().unwrap_or(Duration::ZERO);

        debug!(?deadline, delay_ms = delay.as_millis() as u64, "Expiry timer scheduled");
        self.timer = Some(ExpiryTimer {
            deadline,
            sleep: Box::pin(time::sleep(delay)),
        });
    }

    fn on_deadline(&mut self, deadline: Deadline) {
        match deadline {
            Deadline::Warning => {
                if self.state != LifecycleState::Active {
                    return;
                }
                // Sampled once; later changes do not revisit the decision
                let idle = self.monitor.is_idle();
                if self.visible && !idle {
                    info!("Credential nearing expiry, renewing silently");
                    self.start_renewal(RenewalMode::Silent);
                } else {
                    info!(idle, visible = self.visible, "Credential nearing expiry, prompting");
                    self.state = LifecycleState::PromptingRefresh;
                    self.show_prompt = true;
                    self.schedule(Deadline::Expiry);
                }
            }
            Deadline::Expiry => {
                if self.renewing.is_some() {
                    debug!("Credential expired while renewal in flight");
                    return;
                }
                if self.state.holds_credential() {
                    self.logout("credential expired");
                }
            }
        }
    }

    fn start_renewal(&mut self, mode: RenewalMode) {
        if let Some(current) = self.renewing {
            debug!(in_flight = current.as_str(), "Renewal already in flight");
            return;
        }

        self.renewing = Some(mode);
        let generation = self.generation;
        let renewal = self.renewal.clone();
        self.inflight.spawn(async move {
            let result = renewal.renew(mode).await;
            (generation, Outcome::Renewed(mode, result))
        });
    }

    fn on_outcome(&mut self, generation: u64, outcome: Outcome) {
        if generation != self.generation {
            debug!(generation, current = self.generation, "Discarding stale result");
            return;
        }

        match outcome {
            Outcome::Validated(true) => self.schedule(Deadline::Warning),
            Outcome::Validated(false) => self.logout("credential failed validation"),
            Outcome::Renewed(mode, Ok(credential)) => {
                self.renewing = None;
                self.store.put(&credential);
                self.begin_generation();
                self.state = LifecycleState::Active;
                self.show_prompt = false;
                self.schedule(Deadline::Warning);
                info!(mode = mode.as_str(), issued_at = %credential.issued_at, "Credential replaced");
                self.observer.renewed(&credential);
            }
            Outcome::Renewed(mode, Err(e)) => {
                self.renewing = None;
                warn!(
                    mode = mode.as_str(),
                    kind = e.kind(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Renewal failed"
                );
                // A failed sign-in from a logged-out state has nothing to tear down
                self.logout("renewal failed");
            }
        }
    }

    /// Enter `LoggedOut`. The observer hears about each entry exactly once.
    fn logout(&mut self, reason: &str) {
        if !self.state.holds_credential() {
            return;
        }

        self.store.clear();
        self.begin_generation();
        self.state = LifecycleState::LoggedOut;
        self.show_prompt = false;
        info!(reason, "Logged out");
        self.observer.logged_out();
    }

    fn publish(&self) {
        let holds = self.state.holds_credential();
        let issued_at = if holds { self.store.issued_at() } else { None };
        let status = LifecycleStatus {
            state: self.state,
            show_prompt: self.show_prompt && holds,
            issued_at,
            warn_at: issued_at.map(|issued| self.policy.warn_at(issued)),
            renewing: self.renewing.is_some(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Resolves when the armed timer fires; pends forever when none is armed.
async fn fire(timer: &mut Option<ExpiryTimer>) -> Deadline {
    match timer {
        Some(timer) => {
            timer.sleep.as_mut().await;
            timer.deadline
        }
        None => std::future::pending().await,
    }
}
