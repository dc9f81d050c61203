//! Error taxonomy for resource and share operations.
//!
//! Filesystem errors are classified exactly once, when they cross into this
//! type, and are never retried.

use std::io;

use thiserror::Error;

/// Errors surfaced by resource and share operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The request carried no resolvable user.
    #[error("unauthorized")]
    Unauthorized,

    /// Authorization, permission or root-protection violation.
    ///
    /// Never carries detail; the cause is logged where it is detected.
    #[error("forbidden")]
    Forbidden,

    /// The target does not exist.
    #[error("not found")]
    NotFound,

    /// The target already exists.
    #[error("conflict")]
    Conflict,

    /// A malformed or unsupported request parameter.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// The method cannot be applied to this kind of target.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Storage, randomness or unexpected filesystem failure.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;

impl ResourceError {
    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ResourceError::Unauthorized => 401,
            ResourceError::Forbidden => 403,
            ResourceError::NotFound => 404,
            ResourceError::Conflict => 409,
            ResourceError::InvalidOption(_) => 400,
            ResourceError::MethodNotAllowed => 405,
            ResourceError::Internal(_) => 500,
        }
    }

    /// Message safe to return to a client.
    ///
    /// Internal details are withheld.
    pub fn public_message(&self) -> String {
        match self {
            ResourceError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this is a server-side failure.
    pub fn is_internal(&self) -> bool {
        matches!(self, ResourceError::Internal(_))
    }
}

impl From<io::Error> for ResourceError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => ResourceError::Forbidden,
            io::ErrorKind::NotFound => ResourceError::NotFound,
            io::ErrorKind::AlreadyExists => ResourceError::Conflict,
            _ => ResourceError::Internal(err.to_string()),
        }
    }
}

impl From<crate::shares::StoreError> for ResourceError {
    fn from(err: crate::shares::StoreError) -> Self {
        ResourceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_classification() {
        let err: ResourceError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(err, ResourceError::Forbidden));

        let err: ResourceError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(err, ResourceError::NotFound));

        let err: ResourceError = io::Error::from(io::ErrorKind::AlreadyExists).into();
        assert!(matches!(err, ResourceError::Conflict));

        let err: ResourceError = io::Error::other("disk on fire").into();
        assert!(matches!(err, ResourceError::Internal(_)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ResourceError::Unauthorized.status_code(), 401);
        assert_eq!(ResourceError::Forbidden.status_code(), 403);
        assert_eq!(ResourceError::NotFound.status_code(), 404);
        assert_eq!(ResourceError::Conflict.status_code(), 409);
        assert_eq!(ResourceError::InvalidOption("x".into()).status_code(), 400);
        assert_eq!(ResourceError::MethodNotAllowed.status_code(), 405);
        assert_eq!(ResourceError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_public_message_hides_internals() {
        let err = ResourceError::Internal("/etc/shadow unreadable".to_string());
        assert_eq!(err.public_message(), "internal error");
        assert!(err.is_internal());

        let err = ResourceError::InvalidOption("checksum".to_string());
        assert_eq!(err.public_message(), "invalid option: checksum");
    }
}
