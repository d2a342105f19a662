//! Destination login held in zeroizing memory.
//!
//! The password is only handed out to URL assembly inside the crate and is
//! masked in `Debug` output.

use zeroize::{Zeroize, Zeroizing};

/// Database login that zeroes its memory on drop.
///
/// # Example
///
/// ```rust
/// use cdmloader_core::config::Credentials;
///
/// let creds = Credentials::new("loader".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "loader");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Wraps a login; the password is optional.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether a password was supplied.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Password for URL assembly; never log the returned value.
    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}
