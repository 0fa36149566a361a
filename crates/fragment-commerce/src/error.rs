//! Policy error types.

use thiserror::Error;

/// Reasons a storefront deriver refuses to produce a key.
///
/// Interceptors treat any of these as a cache bypass.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    /// A fact the key must embed was not resolved for this request.
    #[error("missing request fact: {0}")]
    MissingFact(&'static str),

    /// A non-empty cart without a session cannot be keyed safely.
    #[error("cart has contents but no session")]
    MissingSession,

    /// The deriver was invoked for the wrong fragment family.
    #[error("unexpected fragment context: {0}")]
    WrongContext(&'static str),
}
