//! Field validation for sign-up, upload, generation and profile forms
//!
//! Each check returns a user-facing message; callers collect them into a
//! single bad-request response.

use once_cell::sync::Lazy;
use regex::Regex;

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("static regex"));

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex")
});

/// Accumulates field errors as "Error in <Field>: <message>"
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .push(format!("Error in {}: {}", field_label(field), message.into()));
    }

    /// Required, trimmed length between `min` and `max` characters
    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len == 0 {
            self.add(field, "This field is required.");
        } else if len < min || len > max {
            self.add(
                field,
                format!("Field must be between {} and {} characters long.", min, max),
            );
        }
    }

    /// Optional value no longer than `max`
    pub fn max_length(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.add(field, format!("Field cannot be longer than {} characters.", max));
            }
        }
    }

    pub fn username(&mut self, value: &str) {
        self.length("username", value, 4, 80);
        if !value.trim().is_empty() && !USERNAME_RE.is_match(value) {
            self.add(
                "username",
                "Usernames must have only letters, numbers, dots or underscores",
            );
        }
    }

    pub fn email(&mut self, value: &str) {
        if value.trim().is_empty() {
            self.add("email", "This field is required.");
        } else if !EMAIL_RE.is_match(value) {
            self.add("email", "Invalid email address.");
        } else if value.chars().count() > 120 {
            self.add("email", "Field cannot be longer than 120 characters.");
        }
    }

    /// Minimum length plus confirmation match
    pub fn password_pair(&mut self, field: &str, password: &str, confirm: &str, mismatch: &str) {
        if password.chars().count() < 8 {
            self.add(field, format!("{} must be at least 8 characters long.", password_noun(field)));
        }
        if password != confirm {
            self.add(&format!("confirm_{}", field), mismatch);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_messages(self) -> Vec<String> {
        self.errors
    }
}

fn password_noun(field: &str) -> &'static str {
    if field == "new_password" {
        "New password"
    } else {
        "Password"
    }
}

/// `subject_name` → `Subject Name`
pub fn field_label(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        let mut errors = FieldErrors::new();
        errors.username("jdoe.it");
        assert!(errors.is_empty());

        let mut errors = FieldErrors::new();
        errors.username("9lives");
        let messages = errors.into_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Error in Username:"));

        let mut errors = FieldErrors::new();
        errors.username("abc");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_email_rules() {
        let mut errors = FieldErrors::new();
        errors.email("teacher@uls.edu.ph");
        assert!(errors.is_empty());

        let mut errors = FieldErrors::new();
        errors.email("not-an-email");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_password_pair() {
        let mut errors = FieldErrors::new();
        errors.password_pair("password", "short", "shorter", "Passwords must match.");
        let messages = errors.into_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("at least 8 characters"));
        assert_eq!(messages[1], "Error in Confirm Password: Passwords must match.");
    }

    #[test]
    fn test_length_bounds() {
        let mut errors = FieldErrors::new();
        errors.length("subject", "AI", 3, 100);
        errors.length("subject", "   ", 3, 100);
        errors.length("subject", "Human Computer Interaction", 3, 100);
        assert_eq!(errors.into_messages().len(), 2);
    }

    #[test]
    fn test_field_label() {
        assert_eq!(field_label("subject_name"), "Subject Name");
        assert_eq!(field_label("email"), "Email");
    }
}
