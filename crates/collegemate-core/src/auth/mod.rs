//! Authentication for the College Mate portal
//!
//! Sign-in is a two-step flow: credentials (or signup details) are checked
//! first, then a six-digit one-time code is mailed to the account's address
//! and must be entered before a session is opened.
//!
//! # Flow
//!
//! - `Anonymous -> PendingLogin -> Authenticated`
//! - `Anonymous -> PendingSignup -> Authenticated`
//!
//! Any failed step leaves the previous state untouched. The pending attempt
//! and its code live only in memory for the lifetime of one [`Authenticator`];
//! accounts and the session are durable.

mod credentials;
mod orchestrator;
mod otp;
mod session;

pub use credentials::{Account, CredentialStore, KvCredentialStore};
pub use orchestrator::Authenticator;
pub use otp::{
    DeferredDelivery, InvalidCodeTtl, LogDelivery, OtpChallenge, OtpConfig, OtpDelivery,
    OtpEngine, OtpError, OtpMessage, Outbox, MAX_CODE_TTL_SECS, OTP_CODE_MAX, OTP_CODE_MIN,
};
pub use session::{KvSessionStore, Session, SessionStore};

use crate::store::StoreError;

/// Authentication state as seen by the UI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No session and nothing in flight
    #[default]
    Anonymous,
    /// Credentials accepted, waiting for the one-time code
    PendingLogin,
    /// Signup details collected, waiting for the one-time code
    PendingSignup,
    /// A session is open on this installation
    Authenticated,
}

/// What a pending attempt will do once its code is confirmed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptKind {
    Login,
    Signup,
}

/// An in-flight login or signup awaiting OTP confirmation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAttempt {
    pub kind: AttemptKind,
    pub account: Account,
}

impl PendingAttempt {
    pub fn login(account: Account) -> Self {
        Self {
            kind: AttemptKind::Login,
            account,
        }
    }

    pub fn signup(account: Account) -> Self {
        Self {
            kind: AttemptKind::Signup,
            account,
        }
    }

    /// Address the one-time code is sent to
    pub fn email(&self) -> &str {
        &self.account.email
    }
}

/// Authentication error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No pending verification found")]
    NoPendingChallenge,

    #[error("OTP expired - please resend")]
    Expired,

    #[error("Incorrect OTP - please try again")]
    IncorrectCode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OtpError> for AuthError {
    fn from(e: OtpError) -> Self {
        match e {
            OtpError::NoPendingChallenge => AuthError::NoPendingChallenge,
            OtpError::Expired => AuthError::Expired,
            OtpError::IncorrectCode => AuthError::IncorrectCode,
        }
    }
}
