//! Free-text fields: titles and bodies

use super::ValidationError;

const MAX_TITLE_LEN: usize = 200;
const MAX_BODY_LEN: usize = 10_000;

/// Validated short title (events, posts, notifications)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Title(String);

impl Title {
    /// Create a title.
    ///
    /// # Rules
    /// - Non-empty after trimming
    /// - Max 200 characters
    ///
    /// # Example
    /// ```
    /// use hope_server::models::Title;
    ///
    /// assert!(Title::new("Coastal clean-up").is_ok());
    /// assert!(Title::new("   ").is_err());
    /// ```
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::for_field("title", s)
    }

    /// Same rules, reporting a different field name.
    pub fn for_field(field: &'static str, s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field });
        }

        if trimmed.chars().count() > MAX_TITLE_LEN {
            return Err(ValidationError::TooLong {
                field,
                max: MAX_TITLE_LEN,
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

/// Validated long-form text (post content, comments, messages)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body(String);

impl Body {
    pub fn new(field: &'static str, s: &str) -> Result<Self, ValidationError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(ValidationError::Empty { field });
        }

        if trimmed.chars().count() > MAX_BODY_LEN {
            return Err(ValidationError::TooLong {
                field,
                max: MAX_BODY_LEN,
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

/// Trim an optional free-text field, treating blank as absent.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong { field, max }),
        Some(v) => Ok(Some(v.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_limits() {
        assert!(Title::new(&"a".repeat(200)).is_ok());
        let err = Title::new(&"a".repeat(201)).unwrap_err();
        assert!(matches!(err, ValidationError::TooLong { max: 200, .. }));
    }

    #[test]
    fn title_custom_field() {
        let err = Title::for_field("question", "").unwrap_err();
        assert_eq!(err, ValidationError::Empty { field: "question" });
    }

    #[test]
    fn body_trims_and_rejects_empty() {
        assert_eq!(Body::new("content", "  hi  ").unwrap().as_str(), "hi");
        assert_eq!(
            Body::new("comment", "\n\t").unwrap_err(),
            ValidationError::Empty { field: "comment" }
        );
    }

    #[test]
    fn optional_text_blank_is_none() {
        assert_eq!(optional_text("phone", None, 10).unwrap(), None);
        assert_eq!(optional_text("phone", Some("  "), 10).unwrap(), None);
        assert_eq!(
            optional_text("phone", Some(" 0917 "), 10).unwrap(),
            Some("0917".to_owned())
        );
        assert!(optional_text("phone", Some("01234567890"), 10).is_err());
    }
}
