//! Application state for the tokenwarden terminal.
//!
//! `App` mounts the lifecycle coordinator, wires its observer and consent
//! callbacks into a channel, and keeps the latest status snapshot for
//! rendering.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tokenwarden_core::auth::{
    Collaborators, ConsentSurface, Credential, CredentialStore, HttpIdentityProvider,
    IntrospectionValidator, LifecycleCoordinator, LifecycleSettings, LifecycleState,
    LifecycleStatus, RenewalClient, SessionClock, SessionObserver, TokenValidator,
};
use tokenwarden_core::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Running,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Notifications from the coordinator's callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    Renewed { issued_at: DateTime<Utc> },
    LoggedOut,
    Consent { verification_uri: String, user_code: String },
}

struct ChannelObserver {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl SessionObserver for ChannelObserver {
    fn on_renewed(&self, credential: &Credential) {
        let _ = self.tx.send(UiEvent::Renewed {
            issued_at: credential.issued_at,
        });
    }

    fn on_logged_out(&self) {
        let _ = self.tx.send(UiEvent::LoggedOut);
    }
}

/// Shows the device code in the UI and opens the verification page.
struct ChannelConsent {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ConsentSurface for ChannelConsent {
    fn present(&self, verification_uri: &str, user_code: &str) {
        if let Err(e) = open::that(verification_uri) {
            debug!(error = %e, "Could not open browser");
        }
        let _ = self.tx.send(UiEvent::Consent {
            verification_uri: verification_uri.to_string(),
            user_code: user_code.to_string(),
        });
    }
}

pub struct App {
    pub state: AppState,
    pub coordinator: LifecycleCoordinator,
    pub lifecycle: LifecycleStatus,
    pub idle: bool,
    pub visible: bool,
    pub status_message: Option<String>,
    /// Verification URL and user code while an interactive sign-in is pending.
    pub consent: Option<(String, String)>,
    events: mpsc::UnboundedReceiver<UiEvent>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let clock = SessionClock::new();

        let provider = HttpIdentityProvider::new(
            config.provider_endpoints(),
            config.client_secret.clone(),
            Arc::new(ChannelConsent { tx: tx.clone() }),
        )?;
        let renewal = RenewalClient::new(
            Arc::new(provider),
            config.client_id.clone(),
            config.scope.clone(),
            clock,
        );

        let validator: Option<Arc<dyn TokenValidator>> = match config.introspection_endpoint() {
            Some(endpoint) => Some(Arc::new(IntrospectionValidator::new(endpoint, clock)?)),
            None => None,
        };

        let settings = LifecycleSettings {
            policy: config.expiry_policy()?,
            idle_window: config.idle_window(),
        };

        let coordinator = LifecycleCoordinator::mount(
            settings,
            Collaborators {
                store: CredentialStore::in_memory(),
                renewal: Arc::new(renewal),
                validator,
                observer: Arc::new(ChannelObserver { tx }),
                clock,
            },
            config.access_token.clone(),
        );
        let lifecycle = coordinator.status();

        let status_message = if config.client_id.is_empty() {
            warn!("No client id configured");
            Some("No client id configured - set TOKENWARDEN_CLIENT_ID".to_string())
        } else {
            None
        };

        Ok(Self {
            state: AppState::Running,
            coordinator,
            lifecycle,
            idle: false,
            visible: true,
            status_message,
            consent: None,
            events,
        })
    }

    /// Drain coordinator notifications and take a fresh status snapshot.
    pub fn check_background_tasks(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
        }
        self.lifecycle = self.coordinator.status();
        self.idle = self.coordinator.is_idle();
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Renewed { issued_at } => {
                info!(%issued_at, "Credential renewed");
                self.consent = None;
                self.status_message = Some(format!(
                    "Session renewed at {}",
                    crate::format::clock_time(issued_at)
                ));
            }
            UiEvent::LoggedOut => {
                self.consent = None;
                self.status_message = Some("Logged out - press [i] to sign in".to_string());
            }
            UiEvent::Consent {
                verification_uri,
                user_code,
            } => {
                self.status_message = Some("Waiting for approval in the browser".to_string());
                self.consent = Some((verification_uri, user_code));
            }
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.coordinator.set_visible(visible);
    }

    pub fn refresh(&mut self) {
        if self.lifecycle.state.holds_credential() {
            self.status_message = Some("Renewing session...".to_string());
            self.coordinator.refresh();
        }
    }

    pub fn dismiss(&mut self) {
        self.coordinator.dismiss();
    }

    pub fn login(&mut self) {
        if !self.lifecycle.state.holds_credential() {
            self.status_message = Some("Starting sign-in...".to_string());
            self.coordinator.login();
        }
    }

    pub fn logout(&mut self) {
        if self.lifecycle.state.holds_credential() {
            self.coordinator.logout();
        } else if self.lifecycle.renewing {
            self.consent = None;
            self.status_message = Some("Sign-in cancelled".to_string());
            self.coordinator.logout();
        }
    }

    /// Whether the refresh prompt overlay should be drawn.
    pub fn show_prompt(&self) -> bool {
        self.lifecycle.show_prompt
    }

    pub fn state_label(&self) -> &'static str {
        match (self.lifecycle.state, self.lifecycle.renewing) {
            (LifecycleState::NoCredential | LifecycleState::LoggedOut, true) => "signing in",
            (_, true) => "renewing",
            (state, false) => state.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> Config {
        Config {
            client_id: "client-123".to_string(),
            introspection_endpoint: String::new(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_new_app_without_credential() {
        let app = App::new(&offline_config()).unwrap();
        assert_eq!(app.state, AppState::Running);
        assert_eq!(app.lifecycle.state, LifecycleState::NoCredential);
        assert_eq!(app.state_label(), "no credential");
        assert!(app.status_message.is_none());
    }

    #[tokio::test]
    async fn test_new_app_with_credential_is_active() {
        let config = Config {
            access_token: Some("ya29.token".to_string()),
            ..offline_config()
        };
        let mut app = App::new(&config).unwrap();
        app.check_background_tasks();

        assert_eq!(app.lifecycle.state, LifecycleState::Active);
        assert!(!app.show_prompt());
        assert!(app.lifecycle.warn_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_client_id_is_reported() {
        let config = Config {
            client_id: String::new(),
            ..offline_config()
        };
        let app = App::new(&config).unwrap();
        assert!(app
            .status_message
            .as_deref()
            .unwrap_or_default()
            .contains("TOKENWARDEN_CLIENT_ID"));
    }

    #[tokio::test]
    async fn test_logged_out_event_updates_message() {
        let mut app = App::new(&offline_config()).unwrap();
        app.consent = Some(("https://example.com/device".into(), "ABCD".into()));
        app.apply_event(UiEvent::LoggedOut);

        assert!(app.consent.is_none());
        assert!(app.status_message.unwrap().contains("Logged out"));
    }

    #[tokio::test]
    async fn test_consent_event_is_shown() {
        let mut app = App::new(&offline_config()).unwrap();
        app.apply_event(UiEvent::Consent {
            verification_uri: "https://www.google.com/device".into(),
            user_code: "WXYZ-1234".into(),
        });
        assert_eq!(
            app.consent,
            Some(("https://www.google.com/device".to_string(), "WXYZ-1234".to_string()))
        );
    }
}
