//! Trusted proxy header extraction
//!
//! An upstream proxy that already authenticated the caller passes the user
//! name and roles in headers. Only use behind a proxy that strips these
//! headers from client requests.

use super::{AuthError, AuthRequest, Challenge, CredentialExtractor, Credentials};

/// Type name in configuration
pub const TYPE: &str = "proxy";

pub const DEFAULT_USER_HEADER: &str = "x-proxy-user";
pub const DEFAULT_ROLES_HEADER: &str = "x-proxy-roles";

#[derive(Debug, Clone)]
pub struct ProxyExtractor {
    user_header: String,
    roles_header: String,
}

impl ProxyExtractor {
    pub fn new(user_header: &str, roles_header: &str) -> Self {
        Self {
            user_header: user_header.to_ascii_lowercase(),
            roles_header: roles_header.to_ascii_lowercase(),
        }
    }
}

impl Default for ProxyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_USER_HEADER, DEFAULT_ROLES_HEADER)
    }
}

impl CredentialExtractor for ProxyExtractor {
    fn type_name(&self) -> &'static str {
        TYPE
    }

    fn extract(&self, request: &AuthRequest) -> Result<Option<Credentials>, AuthError> {
        let Some(user) = request
            .header(&self.user_header)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return Ok(None);
        };

        let roles = request
            .header(&self.roles_header)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Ok(Some(Credentials::verified(user).with_backend_roles(roles)))
    }

    // The proxy does the prompting
    fn challenge(&self, _credentials: Option<&Credentials>) -> Option<Challenge> {
        None
    }
}
