use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use ufb_db::Database;
use ufb_db::models::CodeRow;
use ufb_types::models::{CodeType, InvitationData};

use crate::error::ApiError;

pub const CODE_LENGTH: usize = 6;

/// A freshly stored code, returned so the caller can deliver it.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expired_at: DateTime<Utc>,
}

pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// Issue a new code for (type, key), replacing any earlier one.
pub fn set_code(
    db: &Database,
    code_type: CodeType,
    key: &str,
    data: Option<&serde_json::Value>,
    now: DateTime<Utc>,
) -> Result<IssuedCode, ApiError> {
    let code = generate_code();
    let expired_at = now + code_type.ttl();
    let data = data.map(|v| v.to_string());

    db.upsert_code(
        code_type.as_str(),
        key,
        &code,
        data.as_deref(),
        &ufb_db::time::format(expired_at),
    )?;
    debug!("Issued {} code for {}", code_type.as_str(), key);

    Ok(IssuedCode { code, expired_at })
}

/// Check `code` against the stored one and mark it verified.
///
/// Unknown (type, key) is 404; a wrong or expired code is 400. The code is
/// compared before the expiry so a stale guess still reads as invalid.
pub fn verify_code(
    db: &Database,
    code_type: CodeType,
    key: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<CodeRow, ApiError> {
    let mut row = db
        .get_code(code_type.as_str(), key)?
        .ok_or_else(|| ApiError::not_found("code not found"))?;

    if row.code != code {
        return Err(ApiError::bad_request("invalid code"));
    }

    let expired_at = ufb_db::time::parse(&row.expired_at)?;
    if now > expired_at {
        return Err(ApiError::bad_request("code expired"));
    }

    db.mark_code_verified(row.id)?;
    row.is_verified = true;
    Ok(row)
}

/// Whether a code for (type, key) has been verified and has not expired.
pub fn is_verified(db: &Database, code_type: CodeType, key: &str, now: DateTime<Utc>) -> Result<bool, ApiError> {
    let Some(row) = db.get_code(code_type.as_str(), key)? else {
        return Ok(false);
    };
    let expired_at = ufb_db::time::parse(&row.expired_at)?;
    Ok(row.is_verified && now <= expired_at)
}

/// Verify an invitation code and return its row id with its payload. The
/// code stays in place until `Database::redeem_invitation` consumes it.
pub fn check_invitation(
    db: &Database,
    key: &str,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(i64, InvitationData), ApiError> {
    let row = verify_code(db, CodeType::UserInvitation, key, code, now)?;
    let raw = row.data.as_deref().unwrap_or_default();
    let data: InvitationData = serde_json::from_str(raw).map_err(|e| {
        warn!("Corrupt invitation payload for {}: {}", key, e);
        ApiError::bad_request("invalid invitation")
    })?;
    Ok((row.id, data))
}

/// Drop a consumed code of the given type, if any.
pub fn consume(db: &Database, code_type: CodeType, key: &str) -> Result<(), ApiError> {
    if let Some(row) = db.get_code(code_type.as_str(), key)? {
        db.delete_code(row.id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use ufb_db::models::NewUser;
    use ufb_types::models::UserType;
    use uuid::Uuid;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn code_is_six_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn set_code_uses_type_ttl() {
        let db = db();
        let now = Utc::now();
        let email = set_code(&db, CodeType::EmailVerification, "a@example.com", None, now).unwrap();
        assert_eq!(email.expired_at, now + Duration::minutes(5));
        let invite = set_code(&db, CodeType::UserInvitation, "b@example.com", None, now).unwrap();
        assert_eq!(invite.expired_at, now + Duration::hours(24));
    }

    #[test]
    fn verify_accepts_matching_code() {
        let db = db();
        let now = Utc::now();
        let issued = set_code(&db, CodeType::EmailVerification, "a@example.com", None, now).unwrap();

        assert!(!is_verified(&db, CodeType::EmailVerification, "a@example.com", now).unwrap());
        let row = verify_code(&db, CodeType::EmailVerification, "a@example.com", &issued.code, now).unwrap();
        assert!(row.is_verified);
        assert!(is_verified(&db, CodeType::EmailVerification, "a@example.com", now).unwrap());
    }

    #[test]
    fn wrong_code_is_bad_request() {
        let db = db();
        let now = Utc::now();
        let issued = set_code(&db, CodeType::EmailVerification, "a@example.com", None, now).unwrap();
        let wrong = if issued.code == "000000" { "111111" } else { "000000" };

        let err = verify_code(&db, CodeType::EmailVerification, "a@example.com", wrong, now).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let db = db();
        let err = verify_code(&db, CodeType::EmailVerification, "nobody@example.com", "123456", Utc::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn expired_code_is_bad_request() {
        let db = db();
        let issued_at = Utc::now() - Duration::minutes(10);
        let issued = set_code(&db, CodeType::ResetPassword, "a@example.com", None, issued_at).unwrap();

        let err = verify_code(&db, CodeType::ResetPassword, "a@example.com", &issued.code, Utc::now())
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(ref m) if m == "code expired"));
    }

    #[test]
    fn invitation_is_single_use() {
        let db = db();
        let now = Utc::now();
        let data = InvitationData {
            role_id: None,
            user_type: UserType::General,
            invited_by: Uuid::new_v4(),
        };
        let payload = serde_json::to_value(&data).unwrap();
        let issued = set_code(&db, CodeType::UserInvitation, "c@example.com", Some(&payload), now).unwrap();

        let (code_id, checked) = check_invitation(&db, "c@example.com", &issued.code, now).unwrap();
        assert_eq!(checked, data);

        let user = NewUser {
            id: "invitee",
            email: "c@example.com",
            user_type: checked.user_type.as_str(),
            password_hash: None,
        };
        assert_eq!(db.redeem_invitation(code_id, &user, None).unwrap(), Some(false));

        let again = check_invitation(&db, "c@example.com", &issued.code, now).unwrap_err();
        assert!(matches!(again, ApiError::NotFound(_)));
    }
}
