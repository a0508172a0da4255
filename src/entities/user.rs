use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::features::{FieldKind, Queryable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "user_role")]
#[serde(rename_all = "kebab-case")]
pub enum UserRole {
    #[sea_orm(string_value = "user")]
    User,
    #[sea_orm(string_value = "guide")]
    Guide,
    #[sea_orm(string_value = "lead-guide")]
    LeadGuide,
    #[sea_orm(string_value = "admin")]
    Admin,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub photo: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub password_changed_at: Option<DateTimeWithTimeZone>,
    pub role: UserRole,
    #[serde(skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires: Option<DateTimeWithTimeZone>,
    #[serde(skip_serializing)]
    pub active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// True when the password was changed after a token issued at `issued_at`
    /// (unix seconds), which makes that token stale.
    pub fn changed_password_after(&self, issued_at: i64) -> bool {
        self.password_changed_at
            .map(|changed| changed.timestamp() > issued_at)
            .unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::review::Entity")]
    Reviews,
}

impl Related<super::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reviews.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Queryable for Entity {
    const FIELDS: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "photo",
        "role",
        "passwordChangedAt",
        "createdAt",
        "updatedAt",
    ];

    fn field(name: &str) -> Option<(Column, FieldKind)> {
        let field = match name {
            "id" => (Column::Id, FieldKind::Uuid),
            "name" => (Column::Name, FieldKind::Text),
            "email" => (Column::Email, FieldKind::Text),
            "role" => (
                Column::Role,
                FieldKind::Enum(&["user", "guide", "lead-guide", "admin"]),
            ),
            "createdAt" => (Column::CreatedAt, FieldKind::Timestamp),
            "updatedAt" => (Column::UpdatedAt, FieldKind::Timestamp),
            _ => return None,
        };
        Some(field)
    }

    fn default_sort() -> Column {
        Column::CreatedAt
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn sample_user() -> Model {
        let now = Utc::now().fixed_offset();
        Model {
            id: Uuid::new_v4(),
            name: "Laura".to_string(),
            email: "laura@example.com".to_string(),
            photo: "default.jpg".to_string(),
            password_hash: "$argon2id$hash".to_string(),
            password_changed_at: None,
            role: UserRole::User,
            password_reset_token: Some("abc".to_string()),
            password_reset_expires: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_password_never_changed_keeps_tokens_valid() {
        let user = sample_user();
        assert!(!user.changed_password_after(0));
    }

    #[test]
    fn test_password_change_invalidates_older_tokens() {
        let mut user = sample_user();
        let issued_at = Utc::now() - Duration::hours(1);
        user.password_changed_at = Some(Utc::now().fixed_offset());

        assert!(user.changed_password_after(issued_at.timestamp()));
        assert!(!user.changed_password_after((Utc::now() + Duration::minutes(1)).timestamp()));
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();

        assert!(json.get("passwordHash").is_none());
        assert!(json.get("passwordResetToken").is_none());
        assert!(json.get("active").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_lead_guide_role_is_kebab_case() {
        assert_eq!(
            serde_json::to_string(&UserRole::LeadGuide).unwrap(),
            r#""lead-guide""#
        );
    }
}
