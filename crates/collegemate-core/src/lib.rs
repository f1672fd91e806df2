//! College Mate - portal core
//!
//! This crate holds the stateful parts of the College Mate student portal:
//! - Account registration and OTP-confirmed login/signup
//! - The single per-installation session
//! - The daily bunk poll
//! - User-contributed study material
//! - The navigation guard used by the view layer
//!
//! All durable state goes through [`store::KeyValueStore`], so the same logic
//! runs over an in-memory map in tests and a JSON file in the CLI.

pub mod auth;
pub mod clock;
pub mod error;
pub mod poll;
pub mod routes;
pub mod store;
pub mod uploads;

pub use auth::{Account, AuthError, AuthState, Authenticator, OtpConfig, Session};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use poll::{DailyPoll, PollError, PollOption, PollResults};
pub use routes::{guard, Navigation, Navigator, Route};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use uploads::{Upload, UploadDraft, UploadStore};
