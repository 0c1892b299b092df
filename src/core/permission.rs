//! Outcome of an authorization hook

use crate::core::error::{ApiError, ApiResult, Denial};
use serde_json::Value;

/// Result of an `allow_*` hook on a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Permission {
    /// Operation may proceed
    Allowed,

    /// Operation refused with a plain message
    Denied(String),

    /// Operation refused with a structured diagnostic body
    DeniedWith(Value),
}

impl Permission {
    /// Plain denial with the standard message
    pub fn denied() -> Self {
        Permission::Denied("Permission denied".to_string())
    }

    /// Allowed when the condition holds, plain denial otherwise
    pub fn when(condition: bool) -> Self {
        condition.into()
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Permission::Allowed)
    }

    /// Turn a denial into the matching 403 error
    pub fn check(self) -> ApiResult<()> {
        match self {
            Permission::Allowed => Ok(()),
            Permission::Denied(message) => Err(ApiError::PermissionDenied(Denial::Message(message))),
            Permission::DeniedWith(payload) => {
                Err(ApiError::PermissionDenied(Denial::Payload(payload)))
            }
        }
    }
}

impl From<bool> for Permission {
    fn from(allowed: bool) -> Self {
        if allowed {
            Permission::Allowed
        } else {
            Permission::denied()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_bool() {
        assert_eq!(Permission::from(true), Permission::Allowed);
        assert_eq!(
            Permission::from(false),
            Permission::Denied("Permission denied".to_string())
        );
        assert!(Permission::when(true).is_allowed());
        assert!(!Permission::when(false).is_allowed());
    }

    #[test]
    fn test_check_allowed() {
        assert!(Permission::Allowed.check().is_ok());
    }

    #[test]
    fn test_check_denied_with_payload_keeps_payload() {
        let payload = json!({"message": "Quota exceeded", "quota": 1, "storiesCount": 1});
        match Permission::DeniedWith(payload.clone()).check() {
            Err(ApiError::PermissionDenied(Denial::Payload(p))) => assert_eq!(p, payload),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_denied_message() {
        match Permission::denied().check() {
            Err(ApiError::PermissionDenied(Denial::Message(m))) => {
                assert_eq!(m, "Permission denied")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
