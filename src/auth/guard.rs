use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::jwt::{SessionKeys, SESSION_COOKIE};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo::User;

/// Authentication stage: reads the session cookie, verifies the token and
/// resolves the caller's user record. A record deleted after the token was
/// issued is a hard `Unauthenticated`, not a dangling identity.
#[derive(Debug)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .ok_or(AppError::Unauthenticated("not authorized, no token"))?;

        let keys = SessionKeys::from_ref(state);
        let claims = keys.verify(token.value()).map_err(|_| {
            warn!("invalid or expired session token");
            AppError::Unauthenticated("not authorized, token failed")
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await
            .map_err(|e| AppError::internal(e, &state.config))?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "session token for deleted user");
                AppError::Unauthenticated("not authorized, token failed")
            })?;

        Ok(CurrentUser(user))
    }
}

/// Authorization stage: authentication first, then the admin flag.
#[derive(Debug)]
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
