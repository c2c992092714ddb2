use axum::{
    extract::{FromRef, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use tracing::{info, instrument};

use crate::auth::guard::{AdminUser, CurrentUser};
use crate::auth::jwt::{self, SessionKeys};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::dto::{LoginRequest, PublicUser, UserForm};
use crate::users::services;

#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    mp: Multipart,
) -> Result<(StatusCode, CookieJar, Json<PublicUser>), AppError> {
    let form = UserForm::from_multipart(mp).await?;
    let user = services::register(&state, form).await?;

    let keys = SessionKeys::from_ref(&state);
    let token = keys
        .sign(user.id)
        .map_err(|e| AppError::internal(e, &state.config))?;
    let jar = jar.add(keys.session_cookie(token));

    info!(user_id = %user.id, "user registered");
    let profile = PublicUser::from_user(user, &headers, state.config.production);
    Ok((StatusCode::CREATED, jar, Json(profile)))
}

#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<PublicUser>), AppError> {
    let user = services::login(&state, payload).await?;

    let keys = SessionKeys::from_ref(&state);
    let token = keys
        .sign(user.id)
        .map_err(|e| AppError::internal(e, &state.config))?;
    let jar = jar.add(keys.session_cookie(token));

    info!(user_id = %user.id, "user logged in");
    let profile = PublicUser::from_user(user, &headers, state.config.production);
    Ok((jar, Json(profile)))
}

#[instrument(skip_all)]
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentUser(user): CurrentUser,
) -> Json<PublicUser> {
    Json(PublicUser::from_user(user, &headers, state.config.production))
}

#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentUser(user): CurrentUser,
    mp: Multipart,
) -> Result<Json<PublicUser>, AppError> {
    let form = UserForm::from_multipart(mp).await?;
    let updated = services::update_profile(&state, user.id, form).await?;
    info!(user_id = %updated.id, "profile updated");
    Ok(Json(PublicUser::from_user(
        updated,
        &headers,
        state.config.production,
    )))
}

#[instrument(skip_all)]
pub async fn delete_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<serde_json::Value>), AppError> {
    services::delete_user(&state, user.id).await?;
    // Revoke the session along with the account.
    let jar = jar.remove(jwt::removal_cookie());
    info!(user_id = %user.id, "user deleted own account");
    Ok((jar, Json(json!({ "message": "user deleted" }))))
}

#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = services::list_users(&state).await?;
    let items = users
        .into_iter()
        .map(|u| PublicUser::from_user(u, &headers, state.config.production))
        .collect();
    Ok(Json(items))
}

#[instrument(skip_all)]
pub async fn create_admin(
    State(state): State<AppState>,
    headers: HeaderMap,
    AdminUser(admin): AdminUser,
    mp: Multipart,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let form = UserForm::from_multipart(mp).await?;
    // The caller keeps their own session; no cookie for the new account.
    let user = services::create_admin(&state, form).await?;
    info!(user_id = %user.id, created_by = %admin.id, "admin account created");
    let profile = PublicUser::from_user(user, &headers, state.config.production);
    Ok((StatusCode::CREATED, Json(profile)))
}

#[instrument(skip_all, fields(target = %id))]
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<PublicUser>, AppError> {
    let id = services::parse_user_id(&id)?;
    let user = services::get_user(&state, id).await?;
    Ok(Json(PublicUser::from_user(
        user,
        &headers,
        state.config.production,
    )))
}

#[instrument(skip_all, fields(target = %id))]
pub async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    mp: Multipart,
) -> Result<Json<PublicUser>, AppError> {
    let id = services::parse_user_id(&id)?;
    let form = UserForm::from_multipart(mp).await?;
    let user = services::admin_update(&state, id, form).await?;
    info!(user_id = %user.id, updated_by = %admin.id, "user updated by admin");
    Ok(Json(PublicUser::from_user(
        user,
        &headers,
        state.config.production,
    )))
}

#[instrument(skip_all, fields(target = %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let id = services::parse_user_id(&id)?;
    services::delete_user(&state, id).await?;
    info!(user_id = %id, deleted_by = %admin.id, "user deleted by admin");
    Ok(Json(json!({ "message": "user deleted" })))
}
