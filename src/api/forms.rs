//! Form payloads and their validation rules

use serde::{Deserialize, Serialize};

use crate::data::NewMessage;
use crate::error::AppError;

/// Shortest accepted password, in UTF-16 code units
pub const MIN_PASSWORD_LEN: usize = 5;

pub const PASSWORD_MISMATCH: &str = "Password does Not match";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 5 characters";

/// POST /signup body
///
/// Missing fields read as empty strings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub password2: String,
}

impl SignupForm {
    /// Check every signup rule
    ///
    /// All rules are evaluated; the error lists each one that failed.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        if self.password != self.password2 {
            errors.push(PASSWORD_MISMATCH.to_string());
        }
        if self.password.encode_utf16().count() < MIN_PASSWORD_LEN {
            errors.push(PASSWORD_TOO_SHORT.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// POST /contactUs body
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ContactForm {
    pub fullname: String,
    pub email: String,
    pub message: String,
}

impl ContactForm {
    /// Require every field, returning the trimmed message to store
    pub fn validate(&self) -> Result<NewMessage, AppError> {
        let mut errors = Vec::new();

        if self.fullname.trim().is_empty() {
            errors.push("Full name is required".to_string());
        }
        if self.email.trim().is_empty() {
            errors.push("Email is required".to_string());
        }
        if self.message.trim().is_empty() {
            errors.push("Message is required".to_string());
        }

        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        Ok(NewMessage {
            fullname: self.fullname.trim().to_string(),
            email: self.email.trim().to_string(),
            message: self.message.trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(password: &str, password2: &str) -> SignupForm {
        SignupForm {
            username: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password: password.to_string(),
            password2: password2.to_string(),
        }
    }

    fn errors_of(result: Result<(), AppError>) -> Vec<String> {
        match result {
            Err(AppError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn matching_long_password_passes() {
        assert!(signup("secret", "secret").validate().is_ok());
        assert!(signup("12345", "12345").validate().is_ok());
    }

    #[test]
    fn mismatch_is_reported() {
        assert_eq!(
            errors_of(signup("secret", "secreT").validate()),
            vec![PASSWORD_MISMATCH]
        );
    }

    #[test]
    fn short_password_is_reported() {
        assert_eq!(
            errors_of(signup("abcd", "abcd").validate()),
            vec![PASSWORD_TOO_SHORT]
        );
    }

    #[test]
    fn both_rules_reported_together() {
        assert_eq!(
            errors_of(signup("abc", "xyz").validate()),
            vec![PASSWORD_MISMATCH, PASSWORD_TOO_SHORT]
        );
    }

    #[test]
    fn length_counts_utf16_units_not_bytes() {
        assert!(signup("ééééé", "ééééé").validate().is_ok());
        assert!(signup("éééé", "éééé").validate().is_err());
        // Each emoji is a surrogate pair, so three of them count as six.
        assert!(signup("😀😀😀", "😀😀😀").validate().is_ok());
        assert_eq!(
            errors_of(signup("😀😀", "😀😀").validate()),
            vec![PASSWORD_TOO_SHORT]
        );
    }

    #[test]
    fn missing_signup_fields_are_empty() {
        let form: SignupForm = serde_json::from_str("{}").unwrap();
        assert_eq!(errors_of(form.validate()), vec![PASSWORD_TOO_SHORT]);
    }

    #[test]
    fn contact_form_requires_every_field() {
        let form = ContactForm {
            fullname: "  ".to_string(),
            email: "a@x.com".to_string(),
            message: String::new(),
        };

        match form.validate() {
            Err(AppError::Validation(errors)) => {
                assert_eq!(errors, vec!["Full name is required", "Message is required"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn contact_form_trims_values() {
        let form = ContactForm {
            fullname: " A ".to_string(),
            email: "a@x.com ".to_string(),
            message: "hi\n".to_string(),
        };

        let message = form.validate().unwrap();
        assert_eq!(message.fullname, "A");
        assert_eq!(message.email, "a@x.com");
        assert_eq!(message.message, "hi");
    }
}
