//! Error types for the College Mate core

use thiserror::Error;

use crate::auth::AuthError;
use crate::poll::PollError;
use crate::store::StoreError;
use crate::uploads::UploadError;

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure a portal operation can report
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
