//! One-time passcode challenges
//!
//! The engine holds at most one live challenge. It only judges whether a
//! submitted code matches and has not expired; it knows nothing about
//! accounts or sessions.
//!
//! Codes are handed to an [`OtpDelivery`] channel, fire-and-forget. In the
//! portal that channel is a mock mailbox: [`DeferredDelivery`] shows the code
//! a short moment after the issuing call has returned, so the confirmation
//! screen appears first.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::clock::Clock;

/// Smallest code ever issued
pub const OTP_CODE_MIN: u32 = 100_000;
/// Largest code ever issued
pub const OTP_CODE_MAX: u32 = 999_999;
/// Longest code lifetime a configuration may ask for (one day)
pub const MAX_CODE_TTL_SECS: u64 = 86_400;

/// OTP timing configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    /// Seconds a code stays valid after issuance
    pub code_ttl_secs: u64,
    /// Delay before the mock mailbox shows the code
    pub delivery_delay_ms: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: 60,
            delivery_delay_ms: 500,
        }
    }
}

/// Rejected OTP configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("code_ttl_secs must be between 1 and {max}, got {got}")]
pub struct InvalidCodeTtl {
    pub got: u64,
    pub max: u64,
}

impl OtpConfig {
    /// Check the values are usable before any code is issued
    pub fn validate(&self) -> Result<(), InvalidCodeTtl> {
        if (1..=MAX_CODE_TTL_SECS).contains(&self.code_ttl_secs) {
            Ok(())
        } else {
            Err(InvalidCodeTtl {
                got: self.code_ttl_secs,
                max: MAX_CODE_TTL_SECS,
            })
        }
    }

    /// Code lifetime, saturating at the largest representable span
    pub fn code_ttl(&self) -> Duration {
        i64::try_from(self.code_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    pub fn delivery_delay(&self) -> StdDuration {
        StdDuration::from_millis(self.delivery_delay_ms)
    }
}

/// OTP verification failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    #[error("No pending verification found")]
    NoPendingChallenge,

    #[error("OTP expired - please resend")]
    Expired,

    #[error("Incorrect OTP - please try again")]
    IncorrectCode,
}

/// A live one-time code
///
/// The code is wiped when the challenge is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OtpChallenge {
    code: String,
    #[zeroize(skip)]
    recipient: String,
    #[zeroize(skip)]
    issued_at: DateTime<Utc>,
    #[zeroize(skip)]
    expires_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Expired strictly after `expires_at`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whole seconds left before expiry, zero once expired
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

impl fmt::Debug for OtpChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpChallenge")
            .field("code", &"******")
            .field("recipient", &self.recipient)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What the delivery channel receives
///
/// The message carries its own copy of the code, wiped when the message is
/// dropped. Strings a channel derives from it (a rendered mail body, the
/// [`Outbox`] lookups) are plain copies owned by whoever asked for them.
#[derive(Clone, Debug, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OtpMessage {
    #[zeroize(skip)]
    pub recipient: String,
    pub code: String,
    #[zeroize(skip)]
    pub expires_at: DateTime<Utc>,
}

impl OtpMessage {
    /// Body text of the mock verification mail
    pub fn body(&self, ttl_secs: u64) -> String {
        format!(
            "COLLEGE MATE OTP\n\nYour verification code is: {}\n\n(Valid for {} seconds)",
            self.code, ttl_secs
        )
    }
}

/// Out-of-band channel for one-time codes
///
/// Dispatch must not block or fail the issuing call.
pub trait OtpDelivery: Send + Sync {
    fn dispatch(&self, message: OtpMessage);
}

/// Writes codes to the log (the mock mail service)
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDelivery;

impl OtpDelivery for LogDelivery {
    fn dispatch(&self, message: OtpMessage) {
        info!(
            target: "collegemate::mock_email",
            recipient = %message.recipient,
            "sending OTP {}",
            message.code
        );
    }
}

/// In-memory mailbox that keeps every dispatched message
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    messages: Arc<Mutex<Vec<OtpMessage>>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<OtpMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last(&self) -> Option<OtpMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Most recent code sent to `recipient`
    pub fn latest_code_for(&self, recipient: &str) -> Option<String> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|m| m.recipient == recipient)
            .map(|m| m.code.clone())
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OtpDelivery for Outbox {
    fn dispatch(&self, message: OtpMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

/// Hands messages to an inner channel after a fixed delay on a tokio runtime
///
/// There is no cancellation: a resend schedules another delivery and both
/// arrive. Only the latest code verifies.
#[derive(Clone)]
pub struct DeferredDelivery {
    handle: tokio::runtime::Handle,
    delay: StdDuration,
    inner: Arc<dyn OtpDelivery>,
}

impl DeferredDelivery {
    pub fn new(handle: tokio::runtime::Handle, delay: StdDuration, inner: Arc<dyn OtpDelivery>) -> Self {
        Self {
            handle,
            delay,
            inner,
        }
    }

    /// Bind to the runtime the caller is running on
    pub fn on_current_runtime(
        delay: StdDuration,
        inner: Arc<dyn OtpDelivery>,
    ) -> Result<Self, tokio::runtime::TryCurrentError> {
        Ok(Self::new(tokio::runtime::Handle::try_current()?, delay, inner))
    }
}

impl OtpDelivery for DeferredDelivery {
    fn dispatch(&self, message: OtpMessage) {
        let delay = self.delay;
        let inner = Arc::clone(&self.inner);
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.dispatch(message);
        });
    }
}

/// Slot holding the engine's single challenge
enum ChallengeSlot {
    Empty,
    Live(OtpChallenge),
    /// Kept after expiry so retries keep reporting `Expired` until a resend
    Expired,
}

/// Issues and verifies one-time codes
pub struct OtpEngine {
    config: OtpConfig,
    clock: Arc<dyn Clock>,
    delivery: Arc<dyn OtpDelivery>,
    rng: ChaCha20Rng,
    slot: ChallengeSlot,
}

impl OtpEngine {
    pub fn new(config: OtpConfig, clock: Arc<dyn Clock>, delivery: Arc<dyn OtpDelivery>) -> Self {
        Self {
            config,
            clock,
            delivery,
            rng: ChaCha20Rng::from_entropy(),
            slot: ChallengeSlot::Empty,
        }
    }

    /// Use a deterministic code sequence
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = ChaCha20Rng::seed_from_u64(seed);
        self
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Mint a fresh code for `recipient`, replacing any previous challenge
    pub fn issue(&mut self, recipient: &str) -> OtpChallenge {
        let code = self.rng.gen_range(OTP_CODE_MIN..=OTP_CODE_MAX).to_string();
        let issued_at = self.clock.now();
        let challenge = OtpChallenge {
            code,
            recipient: recipient.to_string(),
            issued_at,
            expires_at: issued_at
                .checked_add_signed(self.config.code_ttl())
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        debug!(
            recipient,
            expires_at = %challenge.expires_at,
            "issued one-time code"
        );

        self.delivery.dispatch(OtpMessage {
            recipient: challenge.recipient.clone(),
            code: challenge.code.clone(),
            expires_at: challenge.expires_at,
        });

        self.slot = ChallengeSlot::Live(challenge.clone());
        challenge
    }

    /// Same as [`issue`](Self::issue); the previous code need not have expired
    pub fn resend(&mut self, recipient: &str) -> OtpChallenge {
        self.issue(recipient)
    }

    /// Check `submitted` against the live challenge
    ///
    /// A correct code consumes the challenge. An expired challenge is
    /// invalidated and keeps failing with `Expired` until reissued. A wrong
    /// code leaves the challenge as it was.
    pub fn verify(&mut self, submitted: &str) -> Result<(), OtpError> {
        let now = self.clock.now();

        let challenge = match &self.slot {
            ChallengeSlot::Empty => return Err(OtpError::NoPendingChallenge),
            ChallengeSlot::Expired => return Err(OtpError::Expired),
            ChallengeSlot::Live(challenge) => challenge,
        };

        if challenge.is_expired(now) {
            warn!(recipient = %challenge.recipient, "one-time code expired");
            self.slot = ChallengeSlot::Expired;
            return Err(OtpError::Expired);
        }

        if challenge.code != submitted {
            warn!(recipient = %challenge.recipient, "incorrect one-time code");
            return Err(OtpError::IncorrectCode);
        }

        debug!(recipient = %challenge.recipient, "one-time code accepted");
        self.slot = ChallengeSlot::Empty;
        Ok(())
    }

    /// Discard any challenge
    pub fn clear(&mut self) {
        self.slot = ChallengeSlot::Empty;
    }

    /// The live challenge, if any
    pub fn challenge(&self) -> Option<&OtpChallenge> {
        match &self.slot {
            ChallengeSlot::Live(challenge) => Some(challenge),
            _ => None,
        }
    }

    /// True if a challenge is live or sitting expired awaiting resend
    pub fn has_challenge(&self) -> bool {
        !matches!(self.slot, ChallengeSlot::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn test_engine() -> (OtpEngine, ManualClock, Outbox) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap());
        let outbox = Outbox::new();
        let engine = OtpEngine::new(
            OtpConfig::default(),
            Arc::new(clock.clone()),
            Arc::new(outbox.clone()),
        )
        .with_seed(7);
        (engine, clock, outbox)
    }

    #[test]
    fn test_issue_format_and_delivery() {
        let (mut engine, clock, outbox) = test_engine();
        let challenge = engine.issue("asha@college.edu");

        assert_eq!(challenge.code().len(), 6);
        assert!(challenge.code().chars().all(|c| c.is_ascii_digit()));
        assert_ne!(challenge.code().as_bytes()[0], b'0');
        assert_eq!(challenge.expires_at(), clock.now() + Duration::seconds(60));

        let sent = outbox.last().unwrap();
        assert_eq!(sent.recipient, "asha@college.edu");
        assert_eq!(sent.code, challenge.code());
    }

    #[test]
    fn test_verify_succeeds_once() {
        let (mut engine, _, _) = test_engine();
        let code = engine.issue("asha@college.edu").code().to_string();

        assert_eq!(engine.verify(&code), Ok(()));
        assert_eq!(engine.verify(&code), Err(OtpError::NoPendingChallenge));
    }

    #[test]
    fn test_verify_without_challenge() {
        let (mut engine, _, _) = test_engine();
        assert_eq!(engine.verify("123456"), Err(OtpError::NoPendingChallenge));
    }

    #[test]
    fn test_incorrect_code_keeps_challenge() {
        let (mut engine, _, _) = test_engine();
        let code = engine.issue("asha@college.edu").code().to_string();
        let wrong = if code == "111111" { "222222" } else { "111111" };

        assert_eq!(engine.verify(wrong), Err(OtpError::IncorrectCode));
        assert!(engine.challenge().is_some());
        assert_eq!(engine.verify(&code), Ok(()));
    }

    #[test]
    fn test_expired_code_rejected_even_if_correct() {
        let (mut engine, clock, _) = test_engine();
        let code = engine.issue("asha@college.edu").code().to_string();

        clock.advance(Duration::seconds(61));
        assert_eq!(engine.verify(&code), Err(OtpError::Expired));
        // stays expired until reissued
        assert_eq!(engine.verify(&code), Err(OtpError::Expired));
        assert!(engine.challenge().is_none());
        assert!(engine.has_challenge());
    }

    #[test]
    fn test_code_valid_at_exact_expiry_instant() {
        let (mut engine, clock, _) = test_engine();
        let code = engine.issue("asha@college.edu").code().to_string();

        clock.advance(Duration::seconds(60));
        assert_eq!(engine.verify(&code), Ok(()));
    }

    #[test]
    fn test_resend_replaces_code() {
        let (mut engine, clock, outbox) = test_engine();
        let first = engine.issue("asha@college.edu").code().to_string();
        clock.advance(Duration::seconds(90));

        let second = engine.resend("asha@college.edu");
        assert_eq!(outbox.len(), 2);
        assert_eq!(second.expires_at(), clock.now() + Duration::seconds(60));

        if first != second.code() {
            assert_eq!(engine.verify(&first), Err(OtpError::IncorrectCode));
        }
        assert_eq!(engine.verify(second.code()), Ok(()));
    }

    #[test]
    fn test_clear_drops_challenge() {
        let (mut engine, _, _) = test_engine();
        engine.issue("asha@college.edu");
        engine.clear();
        assert!(!engine.has_challenge());
        assert_eq!(engine.verify("123456"), Err(OtpError::NoPendingChallenge));
    }

    #[test]
    fn test_debug_redacts_code() {
        let (mut engine, _, _) = test_engine();
        let challenge = engine.issue("asha@college.edu");
        let rendered = format!("{:?}", challenge);
        assert!(!rendered.contains(challenge.code()));
    }

    #[test]
    fn test_oversized_ttl_issues_live_code() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap());
        for code_ttl_secs in [10_000_000_000_000_000, u64::MAX] {
            let config = OtpConfig {
                code_ttl_secs,
                ..OtpConfig::default()
            };
            let mut engine =
                OtpEngine::new(config, Arc::new(clock.clone()), Arc::new(Outbox::new())).with_seed(3);

            let challenge = engine.issue("asha@college.edu");
            assert!(challenge.expires_at() > clock.now());
            let code = challenge.code().to_string();
            assert_eq!(engine.verify(&code), Ok(()));
        }
    }

    #[test]
    fn test_validate_ttl_bounds() {
        let with_ttl = |code_ttl_secs| OtpConfig {
            code_ttl_secs,
            ..OtpConfig::default()
        };

        assert_eq!(OtpConfig::default().validate(), Ok(()));
        assert_eq!(with_ttl(MAX_CODE_TTL_SECS).validate(), Ok(()));
        assert_eq!(
            with_ttl(0).validate(),
            Err(InvalidCodeTtl {
                got: 0,
                max: MAX_CODE_TTL_SECS
            })
        );
        assert!(with_ttl(u64::MAX).validate().is_err());
    }

    #[test]
    fn test_message_code_is_wiped() {
        let mut message = OtpMessage {
            recipient: "asha@college.edu".into(),
            code: "482913".into(),
            expires_at: Utc::now(),
        };
        message.zeroize();
        assert!(message.code.is_empty());
        assert_eq!(message.recipient, "asha@college.edu");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deferred_delivery_arrives_after_delay() {
        let outbox = Outbox::new();
        let deferred = DeferredDelivery::on_current_runtime(
            StdDuration::from_millis(500),
            Arc::new(outbox.clone()),
        )
        .unwrap();

        deferred.dispatch(OtpMessage {
            recipient: "asha@college.edu".into(),
            code: "123456".into(),
            expires_at: Utc::now(),
        });
        assert!(outbox.is_empty());

        tokio::time::sleep(StdDuration::from_millis(600)).await;
        assert_eq!(outbox.latest_code_for("asha@college.edu").as_deref(), Some("123456"));
    }
}
