//! Credential lifecycle management.
//!
//! This module provides:
//! - `CredentialStore`: session-scoped storage of the bearer credential and its issuance time
//! - `ActivityMonitor`: idle detection from user input events
//! - `IntrospectionValidator`: one-shot validation against a token-info endpoint
//! - `RenewalClient`: silent and interactive renewal through an identity provider
//! - `LifecycleCoordinator`: the state machine tying it all together
//!
//! Credentials are issued for one hour; the user is warned five minutes before expiry.

pub mod activity;
pub mod clock;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod renewal;
pub mod store;
pub mod validator;

pub use activity::{ActivityMonitor, ActivitySink, InputEvent};
pub use clock::SessionClock;
pub use coordinator::{
    Collaborators, LifecycleCoordinator, LifecycleSettings, LifecycleState, LifecycleStatus,
    SessionObserver,
};
pub use credential::{Credential, ExpiryPolicy};
pub use error::CredentialError;
pub use renewal::{
    ConsentSurface, HttpIdentityProvider, IdentityProvider, LogConsentSurface, ProviderEndpoints,
    RenewalClient, RenewalMode, TokenGrant, TokenRequest,
};
pub use store::{CredentialStore, MemorySessionStorage, SessionStorage};
pub use validator::{IntrospectionValidator, TokenValidator};
