pub mod handlers;
pub mod repository;

use crate::errors::AppError;

const MIN_PASSWORD_LEN: usize = 8;

/// Trims and lowercases an email, rejecting anything without a local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AppError::Validation(format!("'{}' is not a valid email", raw.trim())));
    }
    Ok(email)
}

pub fn validate_full_name(raw: &str) -> Result<&str, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("full_name cannot be empty".to_string()));
    }
    Ok(name)
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
