use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps a secret so it never shows up in `Debug`/`Display` output.
/// Serialization still writes the real value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn expose(&self) -> &T {
        &self.0
    }
}

/// Identity of the signed-in traveler, passed explicitly to every attempt.
/// Created on login, torn down with [`SessionContext::logout`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub traveler_id: String,
    /// Set when the booking is made on behalf of a service provider
    pub provider_id: Option<String>,
    token: Option<Masked<String>>,
}

impl SessionContext {
    pub fn login(traveler_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            traveler_id: traveler_id.into(),
            provider_id: None,
            token: Some(Masked(token.into())),
        }
    }

    /// Session without credentials, for sandbox use
    pub fn anonymous(traveler_id: impl Into<String>) -> Self {
        Self {
            traveler_id: traveler_id.into(),
            provider_id: None,
            token: None,
        }
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose().as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn logout(&mut self) {
        self.token = None;
        self.provider_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_masked_in_debug() {
        let ctx = SessionContext::login("traveler-7", "secret-token");
        let debug = format!("{:?}", ctx);
        assert!(!debug.contains("secret-token"));
        assert_eq!(ctx.bearer_token(), Some("secret-token"));
    }

    #[test]
    fn test_logout_clears_credentials() {
        let mut ctx = SessionContext::login("traveler-7", "t").with_provider("hotel-3");
        ctx.logout();
        assert!(!ctx.is_authenticated());
        assert_eq!(ctx.provider_id, None);
        assert_eq!(ctx.traveler_id, "traveler-7");
    }
}
