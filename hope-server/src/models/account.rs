//! Account field validation: usernames, emails, passwords, MPINs, names

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ValidationError;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MPIN_LEN: usize = 4;
const MAX_NAME_LEN: usize = 128;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("invalid username regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex")
});

/// Validated login name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Create a username.
    ///
    /// # Rules
    /// - 3 to 32 characters after trimming
    /// - ASCII letters, digits, `_`, `.`, `-`
    ///
    /// # Example
    /// ```
    /// use hope_server::models::Username;
    ///
    /// assert!(Username::new("maria_santos").is_ok());
    /// assert!(Username::new("ab").is_err());
    /// assert!(Username::new("has space").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "username" });
        }
        if trimmed.len() < MIN_USERNAME_LEN {
            return Err(ValidationError::TooShort {
                field: "username",
                min: MIN_USERNAME_LEN,
            });
        }
        if trimmed.len() > MAX_USERNAME_LEN {
            return Err(ValidationError::TooLong {
                field: "username",
                max: MAX_USERNAME_LEN,
            });
        }
        if !USERNAME_RE.is_match(trimmed) {
            return Err(ValidationError::InvalidFormat {
                field: "username",
                reason: "only letters, digits, '_', '.' and '-' are allowed",
            });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Validated, lowercased email address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Email(String);

impl Email {
    /// Create an email address. Stored lowercased so uniqueness is
    /// case-insensitive.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }
        if trimmed.len() > MAX_EMAIL_LEN {
            return Err(ValidationError::TooLong {
                field: "email",
                max: MAX_EMAIL_LEN,
            });
        }
        if !EMAIL_RE.is_match(trimmed) {
            return Err(ValidationError::InvalidFormat {
                field: "email",
                reason: "must look like name@example.org",
            });
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Plaintext password held only long enough to hash or verify it.
///
/// `Debug` is redacted so a password never reaches the logs.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        if s.is_empty() {
            return Err(ValidationError::Empty { field: "password" });
        }
        if s.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::TooShort {
                field: "password",
                min: MIN_PASSWORD_LEN,
            });
        }
        if s.len() > MAX_PASSWORD_LEN {
            return Err(ValidationError::TooLong {
                field: "password",
                max: MAX_PASSWORD_LEN,
            });
        }
        Ok(Self(s.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Four-digit secondary PIN for admin login
#[derive(Clone)]
pub struct Mpin(String);

impl Mpin {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "mpin" });
        }
        if trimmed.len() != MPIN_LEN || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "mpin",
                reason: "must be exactly 4 digits",
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Mpin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mpin(****)")
    }
}

/// Display name of a person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName(String);

impl PersonName {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field: "full_name" });
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::TooLong {
                field: "full_name",
                max: MAX_NAME_LEN,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(Username::new("maria_santos").is_ok());
        assert!(Username::new("j.dela-cruz").is_ok());
        assert_eq!(Username::new("  padded  ").unwrap().as_str(), "padded");

        assert!(matches!(
            Username::new("").unwrap_err(),
            ValidationError::Empty { .. }
        ));
        assert!(matches!(
            Username::new("ab").unwrap_err(),
            ValidationError::TooShort { min: 3, .. }
        ));
        assert!(matches!(
            Username::new(&"x".repeat(33)).unwrap_err(),
            ValidationError::TooLong { max: 32, .. }
        ));
        assert!(matches!(
            Username::new("bad name").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn email_is_lowercased() {
        let email = Email::new("  Donor@Example.ORG ").unwrap();
        assert_eq!(email.as_str(), "donor@example.org");
    }

    #[test]
    fn email_rejects_garbage() {
        assert!(Email::new("").is_err());
        assert!(Email::new("no-at-sign").is_err());
        assert!(Email::new("two@@example.org").is_err());
        assert!(Email::new("missing@tld").is_err());
    }

    #[test]
    fn password_length() {
        assert!(Password::new("longenough").is_ok());
        assert!(matches!(
            Password::new("short").unwrap_err(),
            ValidationError::TooShort { min: 8, .. }
        ));
        assert!(Password::new(&"p".repeat(129)).is_err());
    }

    #[test]
    fn password_debug_is_redacted() {
        let password = Password::new("hunter2hunter2").unwrap();
        assert_eq!(format!("{:?}", password), "Password(***)");
    }

    #[test]
    fn mpin_is_four_digits() {
        assert!(Mpin::new("0420").is_ok());
        assert!(Mpin::new("123").is_err());
        assert!(Mpin::new("12345").is_err());
        assert!(Mpin::new("12a4").is_err());
        assert!(matches!(
            Mpin::new("").unwrap_err(),
            ValidationError::Empty { field: "mpin" }
        ));
    }

    #[test]
    fn person_name_trims() {
        assert_eq!(PersonName::new(" Ana Cruz ").unwrap().as_str(), "Ana Cruz");
        assert!(PersonName::new("   ").is_err());
    }
}
