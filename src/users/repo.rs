use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, name, email, phone_number, password_hash, profile_picture, is_admin, created_at, updated_at";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 hash, never exposed in JSON
    pub profile_picture: Option<String>, // storage key under /uploads
    pub is_admin: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields for a new user row. The password arrives already hashed; this
/// layer never sees plaintext.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub is_admin: bool,
}

/// Admin patch: every present field overwrites, absent fields keep the
/// stored value.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password_hash: Option<String>,
    pub profile_picture: Option<String>,
    pub is_admin: Option<bool>,
}

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Lookup by whichever identifier is supplied; email takes precedence
    /// when both are given.
    pub async fn find_by_email_or_phone(
        db: &PgPool,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = match (email, phone) {
            (Some(email), _) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
                ))
                .bind(email)
                .fetch_optional(db)
                .await?
            }
            (None, Some(phone)) => {
                sqlx::query_as::<_, User>(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE phone_number = $1"
                ))
                .bind(phone)
                .fetch_optional(db)
                .await?
            }
            (None, None) => None,
        };
        Ok(user)
    }

    /// Fast-path duplicate check. The unique constraints remain the
    /// authority; a concurrent insert can still win between this check and
    /// `create`.
    pub async fn identity_taken(
        db: &PgPool,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> anyhow::Result<bool> {
        let taken: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM users
            WHERE ($1::text IS NOT NULL AND email = $1)
               OR ($2::text IS NOT NULL AND phone_number = $2)
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(phone)
        .fetch_optional(db)
        .await?;
        Ok(taken.is_some())
    }

    pub async fn create(db: &PgPool, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, phone_number, password_hash, profile_picture, is_admin)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.name)
        .bind(new.email)
        .bind(new.phone_number)
        .bind(new.password_hash)
        .bind(new.profile_picture)
        .bind(new.is_admin)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Self-service update: only name and picture are mutable here.
    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        name: Option<&str>,
        profile_picture: Option<&str>,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                profile_picture = COALESCE($3, profile_picture),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(profile_picture)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn update_full(db: &PgPool, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone_number = COALESCE($4, phone_number),
                password_hash = COALESCE($5, password_hash),
                profile_picture = COALESCE($6, profile_picture),
                is_admin = COALESCE($7, is_admin),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.email)
        .bind(patch.phone_number)
        .bind(patch.password_hash)
        .bind(patch.profile_picture)
        .bind(patch.is_admin)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Permanent delete. Returns the removed row so callers can release
    /// attached resources, or None when no row matched.
    pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(db)
        .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: Some("ada@x.com".into()),
            phone_number: None,
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".into(),
            profile_picture: Some("pic.png".into()),
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_string(&sample_user()).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }
}
