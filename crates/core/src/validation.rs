//! Field-level validation errors shared by the domain modules.

use serde::Serialize;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check that a string's trimmed length lies in `min..=max` characters.
pub fn check_length(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: &str,
    min: usize,
    max: usize,
) {
    let len = value.trim().chars().count();
    if len < min {
        if min == 1 {
            errors.push(FieldError::new(field, "is required"));
        } else {
            errors.push(FieldError::new(field, format!("must be at least {min} characters")));
        }
    } else if len > max {
        errors.push(FieldError::new(field, format!("must be at most {max} characters")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_length() {
        let mut errors = Vec::new();
        check_length(&mut errors, "name", "  ", 1, 10);
        check_length(&mut errors, "title", "abcdef", 1, 5);
        check_length(&mut errors, "ok", "abc", 1, 5);
        assert_eq!(
            errors,
            vec![
                FieldError::new("name", "is required"),
                FieldError::new("title", "must be at most 5 characters"),
            ]
        );
    }
}
