use axum::extract::FromRef;
use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

/// Name of the browser cookie carrying the session token.
pub const SESSION_COOKIE: &str = "jwt";

const PROD_TTL: Duration = Duration::days(1);
const DEV_TTL: Duration = Duration::days(7);

/// Session token payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// Signing/verification keys plus the mode-dependent session policy.
/// Production uses the shorter lifetime and HTTPS-only cookies.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure: bool,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt_secret, state.config.production)
    }
}

impl SessionKeys {
    pub fn new(secret: &str, production: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: if production { PROD_TTL } else { DEV_TTL },
            secure: production,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn sign_with_ttl(&self, user_id: Uuid, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "session token signed");
        Ok(token)
    }

    pub fn sign(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_ttl(user_id, self.ttl)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())?;
        debug!(user_id = %data.claims.sub, "session token verified");
        Ok(data.claims)
    }

    /// Browser-held session credential: HTTP-only, strict same-site,
    /// HTTPS-only in production, lifetime matching the token's.
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Strict)
            .max_age(self.ttl)
            .build()
    }
}

/// Cookie matching the session cookie's name and path, used with
/// `CookieJar::remove` to revoke the credential.
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = SessionKeys::new("dev-secret", false);
        let user_id = Uuid::new_v4();
        let token = keys.sign(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, user_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let good = SessionKeys::new("secret-a", false);
        let bad = SessionKeys::new("secret-b", false);
        let token = good.sign(Uuid::new_v4()).expect("sign");
        assert!(bad.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_tampered_token() {
        let keys = SessionKeys::new("dev-secret", false);
        let mut token = keys.sign(Uuid::new_v4()).expect("sign");
        token.push('x');
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = SessionKeys::new("dev-secret", false);
        // Past the default 60s validation leeway.
        let token = keys
            .sign_with_ttl(Uuid::new_v4(), Duration::minutes(-5))
            .expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn production_lifetime_is_one_seventh_of_development() {
        let prod = SessionKeys::new("s", true);
        let dev = SessionKeys::new("s", false);
        assert_eq!(dev.ttl(), prod.ttl() * 7);
        assert!(prod.ttl() < dev.ttl());
    }

    #[test]
    fn session_cookie_flags() {
        let keys = SessionKeys::new("s", true);
        let cookie = keys.session_cookie("tok".into());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.max_age(), Some(Duration::days(1)));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn development_cookie_is_not_https_only() {
        let keys = SessionKeys::new("s", false);
        let cookie = keys.session_cookie("tok".into());
        assert_ne!(cookie.secure(), Some(true));
        assert_eq!(cookie.max_age(), Some(Duration::days(7)));
    }
}
