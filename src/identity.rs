//! Session identities.
//!
//! An identity is `{name}-{uuid v4}`. It is the routing id the broker sees
//! (ZMTP `Identity` property) and stays the same across reconnects.

use uuid::Uuid;

use crate::error::{MdpError, Result};

/// Longest identity a ZMTP peer will accept.
pub const MAX_IDENTITY_LEN: usize = 255;

/// Default identity prefix for client sessions.
pub const DEFAULT_CLIENT_NAME: &str = "client";

/// Generate a process-unique identity with the given prefix.
pub fn generate(name: &str) -> String {
    format!("{}-{}", name, Uuid::new_v4())
}

/// Check that an identity can be used as a routing id.
///
/// Identities starting with a zero byte are reserved by ZeroMQ routers.
pub fn validate(identity: &str) -> Result<()> {
    if identity.is_empty() {
        return Err(MdpError::Config("identity must not be empty".to_string()));
    }
    if identity.len() > MAX_IDENTITY_LEN {
        return Err(MdpError::Config(format!(
            "identity is {} bytes, maximum is {}",
            identity.len(),
            MAX_IDENTITY_LEN
        )));
    }
    if identity.as_bytes()[0] == 0 {
        return Err(MdpError::Config(
            "identity must not start with a zero byte".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_format() {
        let id = generate("echo");
        assert!(id.starts_with("echo-"));
        // "echo-" + 36 char hyphenated uuid
        assert_eq!(id.len(), 5 + 36);
        assert!(validate(&id).is_ok());
    }

    #[test]
    fn test_generate_uniqueness() {
        let ids: Vec<String> = (0..10).map(|_| generate("w")).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_validate_limits() {
        assert!(validate("").is_err());
        assert!(validate("\0worker").is_err());
        assert!(validate(&"x".repeat(MAX_IDENTITY_LEN)).is_ok());
        assert!(validate(&"x".repeat(MAX_IDENTITY_LEN + 1)).is_err());
    }
}
