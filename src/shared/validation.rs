//! Validation Utilities

use validator::{Validate, ValidationErrors};

use super::error::{AppError, FieldError};

/// Convert validation errors to AppError
pub fn validation_error(errors: ValidationErrors) -> AppError {
    let mut field_errors: Vec<FieldError> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();

    field_errors.sort_by(|a, b| a.field.cmp(&b.field));

    if field_errors.is_empty() {
        return AppError::Validation("Validation failed".into());
    }
    AppError::InvalidFields(field_errors)
}

/// Validate a request body, mapping failures to a 400 with field errors.
pub fn validate_body<T: Validate>(body: &T) -> Result<(), AppError> {
    body.validate().map_err(validation_error)
}

/// Trim a free-text search term, treating blank input as absent.
pub fn normalize_query(q: Option<&str>) -> Option<String> {
    q.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(email(message = "Invalid email"))]
        email: String,
        #[validate(length(min = 3))]
        name: String,
    }

    #[test]
    fn test_valid_body_passes() {
        let sample = Sample {
            email: "a@example.com".into(),
            name: "alice".into(),
        };
        assert!(validate_body(&sample).is_ok());
    }

    #[test]
    fn test_field_errors_collected() {
        let sample = Sample {
            email: "nope".into(),
            name: "a".into(),
        };
        match validate_body(&sample) {
            Err(AppError::InvalidFields(fields)) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field, "email");
                assert_eq!(fields[0].message, "Invalid email");
                assert_eq!(fields[1].field, "name");
                assert_eq!(fields[1].message, "length");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query(Some("  bob ")), Some("bob".into()));
        assert_eq!(normalize_query(Some("   ")), None);
        assert_eq!(normalize_query(None), None);
    }
}
