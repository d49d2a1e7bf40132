use std::fmt;

use crate::errors::AgentError;

/// Portal login, collected from the operator once per run
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Somewhere credentials can be asked for
///
/// `None` means the operator declined, and the run must not start.
pub trait CredentialSource {
    fn credentials(&mut self) -> Option<Credentials>;
}

/// Credentials fixed up front, e.g. from the command line or environment.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Option<Credentials>);

impl CredentialSource for StaticCredentials {
    fn credentials(&mut self) -> Option<Credentials> {
        self.0.clone()
    }
}

/// Try each source in order; the first that answers wins.
pub fn first_available(sources: &mut [&mut dyn CredentialSource]) -> Option<Credentials> {
    sources.iter_mut().find_map(|source| source.credentials())
}

/// As [`first_available`], but declining everywhere is an error.
pub fn require_credentials(
    sources: &mut [&mut dyn CredentialSource],
) -> Result<Credentials, AgentError> {
    first_available(sources).ok_or(AgentError::CredentialsCancelled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_the_password() {
        let creds = Credentials::new("user1", "s3cret");
        let shown = format!("{creds:?}");
        assert!(shown.contains("user1"));
        assert!(!shown.contains("s3cret"));
    }

    #[test]
    fn first_answering_source_wins() {
        let mut none = StaticCredentials(None);
        let mut some = StaticCredentials(Some(Credentials::new("u", "p")));
        let mut both: [&mut dyn CredentialSource; 2] = [&mut none, &mut some];
        let found = first_available(&mut both);
        assert_eq!(found.map(|c| c.username), Some("u".to_string()));

        let mut empty = StaticCredentials(None);
        let mut only_empty: [&mut dyn CredentialSource; 1] = [&mut empty];
        assert_eq!(first_available(&mut only_empty), None);
        assert!(matches!(
            require_credentials(&mut only_empty),
            Err(AgentError::CredentialsCancelled)
        ));
    }
}
