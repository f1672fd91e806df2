//! Login and signup orchestration
//!
//! [`Authenticator`] is the per-tab auth context: it owns the pending attempt
//! and the OTP engine, and talks to the durable credential and session stores.
//! Build one at startup; drop it (or call [`Authenticator::log_out`]) to
//! discard everything transient.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    Account, AttemptKind, AuthError, AuthState, CredentialStore, KvCredentialStore,
    KvSessionStore, OtpConfig, OtpDelivery, OtpEngine, PendingAttempt, Session, SessionStore,
};
use crate::clock::Clock;
use crate::routes::{Navigator, Route};
use crate::store::KeyValueStore;

/// Auth context for one portal tab
pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    otp: OtpEngine,
    navigator: Arc<dyn Navigator>,
    pending: Option<PendingAttempt>,
}

impl Authenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        otp: OtpEngine,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            credentials,
            sessions,
            otp,
            navigator,
            pending: None,
        }
    }

    /// Wire the default stores over one key-value backend
    pub fn with_store(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: OtpConfig,
        delivery: Arc<dyn OtpDelivery>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let credentials = Arc::new(KvCredentialStore::new(Arc::clone(&store)));
        let sessions = Arc::new(KvSessionStore::new(store, Arc::clone(&clock)));
        let otp = OtpEngine::new(config, clock, delivery);
        Self::new(credentials, sessions, otp, navigator)
    }

    /// Replace the OTP engine (tests use a seeded one)
    pub fn with_otp_engine(mut self, otp: OtpEngine) -> Self {
        self.otp = otp;
        self
    }

    /// Check credentials and send a login code
    pub fn initiate_login(&mut self, email: &str, password: &str) -> Result<(), AuthError> {
        let account = match self.credentials.find_by_credentials(email, password)? {
            Some(account) => account,
            None => {
                warn!(email, "login rejected: invalid credentials");
                return Err(AuthError::InvalidCredentials);
            }
        };

        debug!(email, "credentials accepted, sending login code");
        self.pending = Some(PendingAttempt::login(account));
        self.otp.issue(email);
        Ok(())
    }

    /// Collect signup details and send a verification code
    ///
    /// Nothing is persisted until the code is confirmed.
    pub fn initiate_signup(&mut self, mut candidate: Account) -> Result<(), AuthError> {
        if self.credentials.is_registered(&candidate.email)? {
            warn!(email = %candidate.email, "signup rejected: email already registered");
            return Err(AuthError::DuplicateEmail(candidate.email));
        }

        candidate.is_verified = false;
        debug!(email = %candidate.email, "signup details accepted, sending verification code");
        self.otp.issue(&candidate.email);
        self.pending = Some(PendingAttempt::signup(candidate));
        Ok(())
    }

    /// Confirm the pending attempt with `code` and open a session
    ///
    /// OTP failures pass through unchanged. On a signup, the account is
    /// registered first; if the email was taken in the meantime the attempt
    /// is abandoned and `DuplicateEmail` is returned.
    pub fn complete_verification(&mut self, code: &str) -> Result<Session, AuthError> {
        if self.pending.is_none() {
            return Err(AuthError::NoPendingChallenge);
        }

        self.otp.verify(code)?;

        let attempt = self.pending.take().ok_or(AuthError::NoPendingChallenge)?;
        self.otp.clear();

        let account = match attempt.kind {
            AttemptKind::Signup => self.credentials.register(attempt.account)?,
            AttemptKind::Login => attempt.account,
        };

        let session = self.sessions.start_session(&account)?;
        info!(email = %session.email(), kind = ?attempt.kind, "verification complete");
        Ok(session)
    }

    /// Send a fresh code for the pending attempt
    pub fn resend_code(&mut self) -> Result<(), AuthError> {
        let email = match &self.pending {
            Some(attempt) => attempt.email().to_string(),
            None => return Err(AuthError::NoPendingChallenge),
        };

        debug!(email = %email, "resending code");
        self.otp.resend(&email);
        Ok(())
    }

    /// Abandon the pending attempt and its code
    pub fn cancel_pending(&mut self) {
        if let Some(attempt) = self.pending.take() {
            debug!(email = %attempt.email(), "pending attempt cancelled");
        }
        self.otp.clear();
    }

    /// True iff a session is open
    ///
    /// An unreadable session record counts as signed out.
    pub fn is_authenticated(&self) -> bool {
        match self.sessions.current_session() {
            Ok(session) => session.is_some(),
            Err(e) => {
                warn!(error = %e, "could not read session, treating as signed out");
                false
            }
        }
    }

    /// Guard for actions that need a signed-in user
    ///
    /// Redirects to the login page and returns false when signed out.
    pub fn require_authentication(&self) -> bool {
        if self.is_authenticated() {
            return true;
        }
        debug!("authentication required, redirecting to login");
        self.navigator.redirect(Route::Login);
        false
    }

    /// End the session and reset the tab
    ///
    /// Pending attempts and codes are discarded here as well, matching what a
    /// full reload does to in-memory state.
    pub fn log_out(&mut self) -> Result<(), AuthError> {
        self.sessions.end_session()?;
        self.pending = None;
        self.otp.clear();

        self.navigator.redirect(Route::Home);
        self.navigator.reload();
        Ok(())
    }

    pub fn current_user(&self) -> Result<Option<Session>, AuthError> {
        self.sessions.current_session()
    }

    pub fn state(&self) -> AuthState {
        match &self.pending {
            Some(attempt) if attempt.kind == AttemptKind::Login => AuthState::PendingLogin,
            Some(_) => AuthState::PendingSignup,
            None if self.is_authenticated() => AuthState::Authenticated,
            None => AuthState::Anonymous,
        }
    }

    pub fn pending_attempt(&self) -> Option<&PendingAttempt> {
        self.pending.as_ref()
    }

    /// Address the current code was sent to
    pub fn pending_email(&self) -> Option<&str> {
        self.pending.as_ref().map(|attempt| attempt.email())
    }

    pub fn otp(&self) -> &OtpEngine {
        &self.otp
    }

    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Outbox;
    use crate::clock::ManualClock;
    use crate::routes::{NavigatorEvent, RecordingNavigator};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};

    struct Harness {
        auth: Authenticator,
        clock: ManualClock,
        outbox: Outbox,
        navigator: RecordingNavigator,
    }

    impl Harness {
        fn new() -> Self {
            let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap());
            let outbox = Outbox::new();
            let navigator = RecordingNavigator::new();
            let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
            let auth = Authenticator::with_store(
                Arc::clone(&store),
                Arc::new(clock.clone()),
                OtpConfig::default(),
                Arc::new(outbox.clone()),
                Arc::new(navigator.clone()),
            );
            let auth = auth.with_otp_engine(
                OtpEngine::new(
                    OtpConfig::default(),
                    Arc::new(clock.clone()),
                    Arc::new(outbox.clone()),
                )
                .with_seed(42),
            );
            Self {
                auth,
                clock,
                outbox,
                navigator,
            }
        }

        fn code_for(&self, email: &str) -> String {
            self.outbox.latest_code_for(email).unwrap()
        }

        fn wrong_code_for(&self, email: &str) -> String {
            let code = self.code_for(email);
            if code == "999999" {
                "100000".to_string()
            } else {
                "999999".to_string()
            }
        }

        fn sign_up(&mut self, account: Account) {
            let email = account.email.clone();
            self.auth.initiate_signup(account).unwrap();
            let code = self.code_for(&email);
            self.auth.complete_verification(&code).unwrap();
        }
    }

    fn asha() -> Account {
        Account::new("Asha", "asha@college.edu", "secret")
            .with_college("GEC")
            .with_branch("CSE")
            .with_year("3")
            .with_roll_number("21CS042")
    }

    #[test]
    fn test_signup_flow_registers_and_signs_in() {
        let mut h = Harness::new();
        assert_eq!(h.auth.state(), AuthState::Anonymous);

        h.auth.initiate_signup(asha()).unwrap();
        assert_eq!(h.auth.state(), AuthState::PendingSignup);
        assert!(h.auth.credentials().list_accounts().unwrap().is_empty());

        let code = h.code_for("asha@college.edu");
        let session = h.auth.complete_verification(&code).unwrap();

        assert_eq!(session.email(), "asha@college.edu");
        assert!(session.account.is_verified);
        assert!(h.auth.is_authenticated());
        assert_eq!(h.auth.state(), AuthState::Authenticated);
        assert_eq!(h.auth.credentials().list_accounts().unwrap().len(), 1);
        assert!(h.auth.pending_attempt().is_none());
        assert!(!h.auth.otp().has_challenge());
    }

    #[test]
    fn test_signup_with_registered_email_fails_before_code() {
        let mut h = Harness::new();
        h.sign_up(asha());
        h.auth.log_out().unwrap();

        let err = h.auth.initiate_signup(asha()).unwrap_err();
        assert!(matches!(err, AuthError::DuplicateEmail(_)));
        assert_eq!(h.outbox.len(), 1);
        assert_eq!(h.auth.state(), AuthState::Anonymous);
    }

    #[test]
    fn test_login_flow() {
        let mut h = Harness::new();
        h.sign_up(asha());
        h.auth.log_out().unwrap();
        assert!(!h.auth.is_authenticated());

        h.auth.initiate_login("asha@college.edu", "secret").unwrap();
        assert_eq!(h.auth.state(), AuthState::PendingLogin);
        assert_eq!(h.auth.pending_email(), Some("asha@college.edu"));

        let code = h.code_for("asha@college.edu");
        let session = h.auth.complete_verification(&code).unwrap();
        assert_eq!(session.account.roll_number, "21CS042");
        assert_eq!(h.auth.state(), AuthState::Authenticated);
    }

    #[test]
    fn test_wrong_password_always_invalid_credentials() {
        let mut h = Harness::new();
        h.sign_up(asha());
        h.auth.log_out().unwrap();

        assert!(matches!(
            h.auth.initiate_login("asha@college.edu", "Secret"),
            Err(AuthError::InvalidCredentials)
        ));

        // a pending login does not change the outcome
        h.auth.initiate_login("asha@college.edu", "secret").unwrap();
        assert!(matches!(
            h.auth.initiate_login("asha@college.edu", "wrong"),
            Err(AuthError::InvalidCredentials)
        ));
        assert_eq!(h.auth.state(), AuthState::PendingLogin);
    }

    #[test]
    fn test_unknown_email_is_invalid_credentials() {
        let mut h = Harness::new();
        assert!(matches!(
            h.auth.initiate_login("ghost@college.edu", "secret"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(h.outbox.is_empty());
    }

    #[test]
    fn test_verify_without_pending_attempt() {
        let mut h = Harness::new();
        assert!(matches!(
            h.auth.complete_verification("123456"),
            Err(AuthError::NoPendingChallenge)
        ));
    }

    #[test]
    fn test_incorrect_code_keeps_attempt() {
        let mut h = Harness::new();
        h.auth.initiate_signup(asha()).unwrap();
        let wrong = h.wrong_code_for("asha@college.edu");

        assert!(matches!(
            h.auth.complete_verification(&wrong),
            Err(AuthError::IncorrectCode)
        ));
        assert_eq!(h.auth.state(), AuthState::PendingSignup);
        assert!(h.auth.credentials().list_accounts().unwrap().is_empty());

        let code = h.code_for("asha@college.edu");
        assert!(h.auth.complete_verification(&code).is_ok());
    }

    #[test]
    fn test_expired_code_then_resend() {
        let mut h = Harness::new();
        h.auth.initiate_signup(asha()).unwrap();
        let stale = h.code_for("asha@college.edu");

        h.clock.advance(Duration::seconds(61));
        assert!(matches!(
            h.auth.complete_verification(&stale),
            Err(AuthError::Expired)
        ));
        assert!(matches!(
            h.auth.complete_verification(&stale),
            Err(AuthError::Expired)
        ));
        // attempt survives expiry so a resend is possible
        assert_eq!(h.auth.state(), AuthState::PendingSignup);

        h.auth.resend_code().unwrap();
        assert_eq!(h.outbox.len(), 2);
        let fresh = h.code_for("asha@college.edu");
        assert!(h.auth.complete_verification(&fresh).is_ok());
        assert!(h.auth.is_authenticated());
    }

    #[test]
    fn test_resend_without_pending_attempt() {
        let mut h = Harness::new();
        assert!(matches!(
            h.auth.resend_code(),
            Err(AuthError::NoPendingChallenge)
        ));
    }

    #[test]
    fn test_code_consumed_after_success() {
        let mut h = Harness::new();
        h.auth.initiate_signup(asha()).unwrap();
        let code = h.code_for("asha@college.edu");

        h.auth.complete_verification(&code).unwrap();
        assert!(matches!(
            h.auth.complete_verification(&code),
            Err(AuthError::NoPendingChallenge)
        ));
    }

    #[test]
    fn test_signup_race_surfaces_duplicate_email() {
        let mut h = Harness::new();
        h.auth.initiate_signup(asha()).unwrap();
        let code = h.code_for("asha@college.edu");

        // Someone else registers the same address before the code is entered
        h.auth
            .credentials()
            .register(Account::new("Other", "asha@college.edu", "x"))
            .unwrap();

        assert!(matches!(
            h.auth.complete_verification(&code),
            Err(AuthError::DuplicateEmail(_))
        ));
        assert!(!h.auth.is_authenticated());
        assert_eq!(h.auth.state(), AuthState::Anonymous);

        let accounts = h.auth.credentials().list_accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Other");
    }

    #[test]
    fn test_cancel_pending() {
        let mut h = Harness::new();
        h.auth.initiate_signup(asha()).unwrap();
        let code = h.code_for("asha@college.edu");

        h.auth.cancel_pending();
        assert_eq!(h.auth.state(), AuthState::Anonymous);
        assert!(matches!(
            h.auth.complete_verification(&code),
            Err(AuthError::NoPendingChallenge)
        ));
    }

    #[test]
    fn test_require_authentication_redirects_when_signed_out() {
        let mut h = Harness::new();
        assert!(!h.auth.require_authentication());
        assert_eq!(h.navigator.last_redirect(), Some(Route::Login));

        h.sign_up(asha());
        h.navigator.drain();
        assert!(h.auth.require_authentication());
        assert!(h.navigator.events().is_empty());
    }

    #[test]
    fn test_log_out_clears_everything_and_reloads() {
        let mut h = Harness::new();
        h.sign_up(asha());

        // leave a stray attempt in flight
        h.auth.initiate_login("asha@college.edu", "secret").unwrap();
        h.auth.log_out().unwrap();

        assert!(!h.auth.is_authenticated());
        assert!(h.auth.pending_attempt().is_none());
        assert!(!h.auth.otp().has_challenge());
        assert_eq!(
            h.navigator.events(),
            vec![
                NavigatorEvent::Redirect(Route::Home),
                NavigatorEvent::Reload
            ]
        );
    }
}
