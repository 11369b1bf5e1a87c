use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

fn unknown(kind: &'static str, value: &str) -> UnknownVariant {
    UnknownVariant {
        kind,
        value: value.to_string(),
    }
}

// -- Users --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    /// Holds every permission regardless of role bindings.
    Super,
    General,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Super => "SUPER",
            Self::General => "GENERAL",
        }
    }
}

impl FromStr for UserType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPER" => Ok(Self::Super),
            "GENERAL" => Ok(Self::General),
            other => Err(unknown("user type", other)),
        }
    }
}

// -- Permissions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    ReadFeedbacks,
    ManageFeedbacks,
    ReadUsers,
    ManageUsers,
    ManagePosts,
    ManageTenant,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Self::ReadFeedbacks,
        Self::ManageFeedbacks,
        Self::ReadUsers,
        Self::ManageUsers,
        Self::ManagePosts,
        Self::ManageTenant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadFeedbacks => "READ_FEEDBACKS",
            Self::ManageFeedbacks => "MANAGE_FEEDBACKS",
            Self::ReadUsers => "READ_USERS",
            Self::ManageUsers => "MANAGE_USERS",
            Self::ManagePosts => "MANAGE_POSTS",
            Self::ManageTenant => "MANAGE_TENANT",
        }
    }
}

impl FromStr for Permission {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| unknown("permission", s))
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// -- Verification codes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodeType {
    EmailVerification,
    ResetPassword,
    UserInvitation,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmailVerification => "EMAIL_VERIFICATION",
            Self::ResetPassword => "RESET_PASSWORD",
            Self::UserInvitation => "USER_INVITATION",
        }
    }

    /// How long a freshly issued code of this type stays valid.
    pub fn ttl(&self) -> chrono::Duration {
        match self {
            Self::EmailVerification | Self::ResetPassword => chrono::Duration::minutes(5),
            Self::UserInvitation => chrono::Duration::hours(24),
        }
    }
}

impl FromStr for CodeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL_VERIFICATION" => Ok(Self::EmailVerification),
            "RESET_PASSWORD" => Ok(Self::ResetPassword),
            "USER_INVITATION" => Ok(Self::UserInvitation),
            other => Err(unknown("code type", other)),
        }
    }
}

/// Payload stored alongside a `USER_INVITATION` code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationData {
    pub role_id: Option<i64>,
    pub user_type: UserType,
    pub invited_by: uuid::Uuid,
}

// -- Feedback fields --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldFormat {
    Text,
    Keyword,
    Number,
    Boolean,
    Date,
    Select,
    MultiSelect,
}

impl FieldFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Keyword => "keyword",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Select => "select",
            Self::MultiSelect => "multiSelect",
        }
    }

    /// Select formats carry a fixed option list; nothing else may.
    pub fn has_options(&self) -> bool {
        matches!(self, Self::Select | Self::MultiSelect)
    }
}

impl FromStr for FieldFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "keyword" => Ok(Self::Keyword),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "select" => Ok(Self::Select),
            "multiSelect" => Ok(Self::MultiSelect),
            other => Err(unknown("field format", other)),
        }
    }
}

// -- Statistics --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsInterval {
    #[default]
    Day,
    Week,
    Month,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_round_trips_through_str() {
        for p in Permission::ALL {
            assert_eq!(p.as_str().parse::<Permission>().unwrap(), p);
        }
        assert!("DROP_TABLES".parse::<Permission>().is_err());
    }

    #[test]
    fn permission_serializes_screaming_case() {
        let json = serde_json::to_string(&Permission::ReadFeedbacks).unwrap();
        assert_eq!(json, "\"READ_FEEDBACKS\"");
    }

    #[test]
    fn code_ttls() {
        assert_eq!(CodeType::EmailVerification.ttl(), chrono::Duration::minutes(5));
        assert_eq!(CodeType::ResetPassword.ttl(), chrono::Duration::minutes(5));
        assert_eq!(CodeType::UserInvitation.ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn field_format_names_match_serde() {
        for f in [FieldFormat::Text, FieldFormat::MultiSelect, FieldFormat::Date] {
            let json = serde_json::to_string(&f).unwrap();
            assert_eq!(json, format!("\"{}\"", f.as_str()));
        }
        assert!(FieldFormat::Select.has_options());
        assert!(!FieldFormat::Number.has_options());
    }
}
