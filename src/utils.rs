use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand_core::OsRng;
use uuid::Uuid;

use crate::errors::AppError;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.is_empty() {
        return Err(AppError::bad_request("Password is required"));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|err| AppError::internal(format!("invalid password hash: {err}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims and drops empty strings.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS` and bare dates
/// (midnight UTC).
pub fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Path ids that do not parse are reported the same way as unknown rows.
pub fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found(not_found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash).unwrap());
        assert!(!verify_password("secret2", &hash).unwrap());
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(hash_password(""), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn due_date_formats() {
        let date = parse_due_date("2025-10-10").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2025, 10, 10));

        let ts = parse_due_date("2025-10-10T12:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-10-10T10:30:00+00:00");

        assert!(parse_due_date("next tuesday").is_none());
        assert!(parse_due_date("").is_none());
    }

    #[test]
    fn blank_values_are_dropped() {
        assert_eq!(non_blank(Some("  milk ")), Some("milk".to_string()));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn malformed_ids_read_as_not_found() {
        assert!(matches!(parse_id("abc", "Task not found"), Err(AppError::NotFound(_))));
        let id = Uuid::new_v4();
        assert_eq!(parse_id(&id.to_string(), "Task not found").unwrap(), id);
    }
}
