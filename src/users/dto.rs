use axum::extract::Multipart;
use axum::http::{header, HeaderMap};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::users::repo::User;

/// Upload size cap, enforced at the upload layer before the service sees
/// the file.
pub const MAX_UPLOAD_BYTES: usize = 1_000_000;

/// An uploaded profile picture, held in memory until stored.
#[derive(Debug)]
pub struct Upload {
    pub bytes: Bytes,
    pub content_type: String,
}

/// Fields collected from the multipart registration/update forms. All
/// optional at parse time; the service validates per operation.
#[derive(Debug, Default)]
pub struct UserForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub picture: Option<Upload>,
}

impl UserForm {
    pub async fn from_multipart(mut mp: Multipart) -> Result<Self, AppError> {
        let mut form = UserForm::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|_| AppError::validation("invalid multipart form"))?
        {
            let Some(name) = field.name().map(|s| s.to_string()) else {
                continue;
            };
            match name.as_str() {
                "name" => form.name = Some(read_text(field).await?),
                "email" => form.email = Some(read_text(field).await?),
                "phoneNumber" => form.phone_number = Some(read_text(field).await?),
                "password" => form.password = Some(read_text(field).await?),
                "isAdmin" => {
                    let v = read_text(field).await?;
                    form.is_admin = Some(matches!(v.as_str(), "true" | "1"));
                }
                "profilePicture" => {
                    let content_type = field
                        .content_type()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|_| AppError::validation("invalid profile picture upload"))?;
                    if bytes.len() > MAX_UPLOAD_BYTES {
                        return Err(AppError::validation("profile picture too large"));
                    }
                    form.picture = Some(Upload {
                        bytes,
                        content_type,
                    });
                }
                _ => {}
            }
        }
        Ok(form)
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|_| AppError::validation("invalid multipart form"))
}

/// Login body. Email wins when both identifiers are supplied.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: String,
}

/// Public projection of a user: everything a client may see, never the
/// password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub profile_picture: Option<String>,
    pub is_admin: bool,
}

impl PublicUser {
    /// Project a user for the response, resolving the stored picture key
    /// to a fetchable URL (absolute when the request carried a Host
    /// header).
    pub fn from_user(user: User, headers: &HeaderMap, production: bool) -> Self {
        let profile_picture = user
            .profile_picture
            .as_deref()
            .map(|key| picture_url(headers, production, key));
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            profile_picture,
            is_admin: user.is_admin,
        }
    }
}

fn picture_url(headers: &HeaderMap, production: bool, key: &str) -> String {
    let scheme = if production { "https" } else { "http" };
    match headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => format!("{scheme}://{host}/uploads/{key}"),
        None => format!("/uploads/{key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: Some("ada@x.com".into()),
            phone_number: Some("5551234567".into()),
            password_hash: "$argon2id$hash".into(),
            profile_picture: Some("abc.png".into()),
            is_admin: false,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn projection_is_camel_case_and_hashless() {
        let public = PublicUser::from_user(sample_user(), &HeaderMap::new(), false);
        let json = serde_json::to_string(&public).unwrap();
        assert!(json.contains("phoneNumber"));
        assert!(json.contains("isAdmin"));
        assert!(json.contains("profilePicture"));
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn picture_resolves_against_request_host() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "api.example.com".parse().unwrap());
        let public = PublicUser::from_user(sample_user(), &headers, true);
        assert_eq!(
            public.profile_picture.as_deref(),
            Some("https://api.example.com/uploads/abc.png")
        );
    }

    #[test]
    fn picture_falls_back_to_relative_url() {
        let public = PublicUser::from_user(sample_user(), &HeaderMap::new(), false);
        assert_eq!(public.profile_picture.as_deref(), Some("/uploads/abc.png"));
    }

    #[test]
    fn missing_picture_stays_absent() {
        let mut user = sample_user();
        user.profile_picture = None;
        let public = PublicUser::from_user(user, &HeaderMap::new(), false);
        assert!(public.profile_picture.is_none());
    }

    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::Request;

    const BOUNDARY: &str = "form-boundary";

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
    }

    fn file_part(name: &str, content_type: &str, bytes: &[u8]) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n{}\r\n",
            String::from_utf8_lossy(bytes)
        )
    }

    async fn parse_form(body: String) -> Result<UserForm, AppError> {
        let req = Request::builder()
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        let mp = Multipart::from_request(req, &()).await.unwrap();
        UserForm::from_multipart(mp).await
    }

    #[tokio::test]
    async fn multipart_form_maps_camel_case_fields() {
        let body = format!(
            "{}{}{}{}{}{}{}--{BOUNDARY}--\r\n",
            text_part("name", "Ada"),
            text_part("email", "ada@x.com"),
            text_part("phoneNumber", "5551234567"),
            text_part("password", "secret1"),
            text_part("isAdmin", "true"),
            text_part("favouriteColour", "green"),
            file_part("profilePicture", "image/png", b"png-bytes"),
        );
        let form = parse_form(body).await.unwrap();
        assert_eq!(form.name.as_deref(), Some("Ada"));
        assert_eq!(form.email.as_deref(), Some("ada@x.com"));
        assert_eq!(form.phone_number.as_deref(), Some("5551234567"));
        assert_eq!(form.password.as_deref(), Some("secret1"));
        assert_eq!(form.is_admin, Some(true));
        let picture = form.picture.expect("picture field");
        assert_eq!(picture.content_type, "image/png");
        assert_eq!(&picture.bytes[..], b"png-bytes");
    }

    #[tokio::test]
    async fn multipart_form_coerces_is_admin_to_bool() {
        let body = format!("{}--{BOUNDARY}--\r\n", text_part("isAdmin", "false"));
        let form = parse_form(body).await.unwrap();
        assert_eq!(form.is_admin, Some(false));
    }

    #[tokio::test]
    async fn multipart_form_rejects_oversized_picture() {
        let big = "a".repeat(MAX_UPLOAD_BYTES + 1);
        let body = format!(
            "{}--{BOUNDARY}--\r\n",
            file_part("profilePicture", "image/png", big.as_bytes())
        );
        let err = parse_form(body).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn multipart_form_accepts_picture_at_the_cap() {
        let exact = "a".repeat(MAX_UPLOAD_BYTES);
        let body = format!(
            "{}--{BOUNDARY}--\r\n",
            file_part("profilePicture", "image/jpeg", exact.as_bytes())
        );
        let form = parse_form(body).await.unwrap();
        assert_eq!(form.picture.expect("picture field").bytes.len(), MAX_UPLOAD_BYTES);
    }

    #[test]
    fn login_request_accepts_either_identifier() {
        let by_phone: LoginRequest =
            serde_json::from_str(r#"{"phoneNumber":"5551234567","password":"pw"}"#).unwrap();
        assert_eq!(by_phone.phone_number.as_deref(), Some("5551234567"));
        assert!(by_phone.email.is_none());

        let by_email: LoginRequest =
            serde_json::from_str(r#"{"email":"ada@x.com","password":"pw"}"#).unwrap();
        assert_eq!(by_email.email.as_deref(), Some("ada@x.com"));
    }
}
