use crate::error::{RedressError, RedressResult};
use validator::{Validate, ValidationErrors};

pub fn validate_model<T: Validate>(model: &T) -> RedressResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => Err(RedressError::validation(
            first_invalid_field(&errors).unwrap_or_else(|| "model".to_string()),
            format_validation_errors(&errors),
        )),
    }
}

fn first_invalid_field(errors: &ValidationErrors) -> Option<String> {
    let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
    fields.sort_unstable();
    fields.first().map(|f| f.to_string())
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    let mut messages = Vec::new();

    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match (&error.message, error.code.as_ref()) {
                (Some(message), _) => message.to_string(),
                (None, "email") => "Invalid email format".to_string(),
                (None, "length") => format!("Length validation failed for field '{}'", field),
                (None, "range") => format!("Value out of range for field '{}'", field),
                (None, "required") => format!("Field '{}' is required", field),
                (None, code) => format!("Validation failed for field '{}': {}", field, code),
            };
            messages.push(message);
        }
    }

    messages.sort();
    messages.join(", ")
}

/// Rejects empty or whitespace-only values.
pub fn require_non_blank(field: &str, value: &str) -> RedressResult<()> {
    if value.trim().is_empty() {
        return Err(RedressError::validation(field, format!("Field '{}' must not be blank", field)));
    }
    Ok(())
}
