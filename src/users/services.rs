use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::auth::password;
use crate::error::{is_unique_violation, AppError};
use crate::state::AppState;
use crate::users::dto::{LoginRequest, Upload, UserForm};
use crate::users::repo::{NewUser, User, UserPatch};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\d{10}$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_identifiers(
    email: &Option<String>,
    phone: &Option<String>,
) -> Result<(), AppError> {
    if email.is_none() && phone.is_none() {
        return Err(AppError::validation("email or phone number is required"));
    }
    if let Some(email) = email {
        if !is_valid_email(email) {
            return Err(AppError::validation("invalid email format"));
        }
    }
    if let Some(phone) = phone {
        if !is_valid_phone(phone) {
            return Err(AppError::validation("invalid phone number"));
        }
    }
    Ok(())
}

/// Argon2 is slow on purpose; run it off the async reactor.
async fn hash_blocking(state: &AppState, plain: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .map_err(|e| AppError::internal(e, &state.config))
}

async fn verify_blocking(
    state: &AppState,
    plain: String,
    hash: String,
) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || password::verify_password(&plain, &hash))
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .map_err(|e| AppError::internal(e, &state.config))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Best-effort removal of a stored picture. The request it serves has
/// already succeeded, so a storage failure only logs.
async fn discard_picture(state: &AppState, key: &str) {
    if let Err(e) = state.storage.delete_object(key).await {
        tracing::warn!(error = %e, key, "failed to delete stored picture");
    }
}

/// Store an uploaded picture and return its storage key.
async fn store_picture(state: &AppState, upload: Upload) -> Result<String, AppError> {
    let ext = ext_from_mime(&upload.content_type)
        .ok_or_else(|| AppError::validation("only image uploads are allowed"))?;
    let key = format!("{}.{}", Uuid::new_v4(), ext);
    state
        .storage
        .put_object(&key, upload.bytes)
        .await
        .map_err(|e| AppError::internal(e, &state.config))?;
    Ok(key)
}

async fn create_user(state: &AppState, form: UserForm, is_admin: bool) -> Result<User, AppError> {
    let name = clean(form.name).ok_or_else(|| AppError::validation("name is required"))?;
    let password = form
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::validation("password is required"))?;
    let email = clean(form.email).map(|e| e.to_lowercase());
    let phone = clean(form.phone_number);
    validate_identifiers(&email, &phone)?;

    // Fast path only; the unique constraints decide concurrent races.
    let taken = User::identity_taken(&state.db, email.as_deref(), phone.as_deref())
        .await
        .map_err(|e| AppError::internal(e, &state.config))?;
    if taken {
        return Err(AppError::AlreadyExists);
    }

    let password_hash = hash_blocking(state, password).await?;
    let profile_picture = match form.picture {
        Some(upload) => Some(store_picture(state, upload).await?),
        None => None,
    };

    User::create(
        &state.db,
        NewUser {
            name,
            email,
            phone_number: phone,
            password_hash,
            profile_picture,
            is_admin,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::AlreadyExists
        } else {
            AppError::internal(e, &state.config)
        }
    })
}

pub async fn register(state: &AppState, form: UserForm) -> Result<User, AppError> {
    create_user(state, form, false).await
}

/// Same validation path as `register`, but the created account is an admin
/// and no session is issued for it.
pub async fn create_admin(state: &AppState, form: UserForm) -> Result<User, AppError> {
    create_user(state, form, true).await
}

/// "No such account" and "wrong password" are deliberately the same error,
/// so callers cannot enumerate accounts.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<User, AppError> {
    let email = clean(req.email).map(|e| e.to_lowercase());
    let phone = clean(req.phone_number);
    if email.is_none() && phone.is_none() {
        return Err(AppError::validation("email or phone number is required"));
    }

    let user = User::find_by_email_or_phone(&state.db, email.as_deref(), phone.as_deref())
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .ok_or(AppError::InvalidCredentials)?;

    let ok = verify_blocking(state, req.password, user.password_hash.clone()).await?;
    if !ok {
        return Err(AppError::InvalidCredentials);
    }
    Ok(user)
}

pub async fn get_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    User::find_by_id(&state.db, id)
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))
}

/// Self-service update: name and picture only. Every other field is
/// immutable through this path.
pub async fn update_profile(
    state: &AppState,
    id: Uuid,
    form: UserForm,
) -> Result<User, AppError> {
    let name = clean(form.name);
    // Capture the old key before the update overwrites it.
    let old_picture = match &form.picture {
        Some(_) => get_user(state, id).await?.profile_picture,
        None => None,
    };
    let picture = match form.picture {
        Some(upload) => Some(store_picture(state, upload).await?),
        None => None,
    };

    let user = User::update_profile(&state.db, id, name.as_deref(), picture.as_deref())
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    if let Some(old) = old_picture.as_deref() {
        if picture.as_deref() != Some(old) {
            discard_picture(state, old).await;
        }
    }
    Ok(user)
}

/// Admin update: any field may change. The password is re-hashed only when
/// a new plaintext is supplied.
pub async fn admin_update(
    state: &AppState,
    id: Uuid,
    form: UserForm,
) -> Result<User, AppError> {
    let email = clean(form.email).map(|e| e.to_lowercase());
    let phone = clean(form.phone_number);
    if let Some(email) = &email {
        if !is_valid_email(email) {
            return Err(AppError::validation("invalid email format"));
        }
    }
    if let Some(phone) = &phone {
        if !is_valid_phone(phone) {
            return Err(AppError::validation("invalid phone number"));
        }
    }

    let password_hash = match clean(form.password) {
        Some(plain) => Some(hash_blocking(state, plain).await?),
        None => None,
    };
    let old_picture = match &form.picture {
        Some(_) => get_user(state, id).await?.profile_picture,
        None => None,
    };
    let profile_picture = match form.picture {
        Some(upload) => Some(store_picture(state, upload).await?),
        None => None,
    };

    let updated = User::update_full(
        &state.db,
        id,
        UserPatch {
            name: clean(form.name),
            email,
            phone_number: phone,
            password_hash,
            profile_picture: profile_picture.clone(),
            is_admin: form.is_admin,
        },
    )
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::AlreadyExists
        } else {
            AppError::internal(e, &state.config)
        }
    })?
    .ok_or_else(|| AppError::NotFound("user not found".into()))?;

    if let Some(old) = old_picture.as_deref() {
        if profile_picture.as_deref() != Some(old) {
            discard_picture(state, old).await;
        }
    }
    Ok(updated)
}

pub async fn delete_user(state: &AppState, id: Uuid) -> Result<(), AppError> {
    let deleted = User::delete(&state.db, id)
        .await
        .map_err(|e| AppError::internal(e, &state.config))?
        .ok_or_else(|| AppError::NotFound("user not found".into()))?;
    // The account is gone; its stored picture goes with it.
    if let Some(key) = deleted.profile_picture.as_deref() {
        discard_picture(state, key).await;
    }
    Ok(())
}

pub async fn list_users(state: &AppState) -> Result<Vec<User>, AppError> {
    User::list_all(&state.db)
        .await
        .map_err(|e| AppError::internal(e, &state.config))
}

/// Route ids that are not store-native are a plain 404, never a raw parse
/// error surfaced to the client.
pub fn parse_user_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("user not found".into()))
}
