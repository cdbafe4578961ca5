// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error type for store operations.

/// A failed store operation.
///
/// Opaque on purpose: the engine never inspects store failures, it only hands them back to
/// its caller. Use [`std::error::Error::source()`] to reach the backend's own error.
///
/// # Example
///
/// ```
/// use cachetree_store::Error;
///
/// let error = Error::from_message("connection reset");
/// assert!(error.to_string().contains("connection reset"));
/// ```
#[ohno::error]
pub struct Error {}

impl Error {
    /// Creates a store error from a message or from a backend error.
    pub fn from_message(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::caused_by(cause)
    }
}

/// A specialized [`Result`] type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_backend_message() {
        let error = Error::from_message("delete_many rejected");
        let display = format!("{error}");
        assert!(display.contains("delete_many rejected"), "unexpected display: {display}");
    }

    #[test]
    fn wraps_backend_error_types() {
        let io = std::io::Error::other("socket closed");
        let error = Error::from_message(io);
        assert!(format!("{error:?}").contains("socket closed"));
    }
}
