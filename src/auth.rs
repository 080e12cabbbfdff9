//! Password hashing, session tokens and the authenticated-user extractor.

use std::collections::BTreeMap;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::User;
use crate::error::ServiceError;
use crate::http_server::AppState;

pub const SESSION_COOKIE: &str = "sessionid";

const USERNAME_MAX_LEN: usize = 150;
const PASSWORD_MIN_LEN: usize = 8;

pub fn generate_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn generate_session_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(user: &User, password: &str) -> bool {
    let candidate = hash_password(password, &user.password_salt);
    candidate.len() == user.password_hash.len()
        && candidate
            .bytes()
            .zip(user.password_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn push_error(errors: &mut BTreeMap<String, Vec<String>>, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

/// Field-level checks for registration; all problems are reported at once.
pub fn validate_registration(
    username: &str,
    password: &str,
    email: Option<&str>,
) -> Result<(), ServiceError> {
    let mut errors = BTreeMap::new();

    if username.is_empty() {
        push_error(&mut errors, "username", "This field is required.");
    } else {
        if username.chars().count() > USERNAME_MAX_LEN {
            push_error(
                &mut errors,
                "username",
                "Ensure this field has no more than 150 characters.",
            );
        }
        if !username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
        {
            push_error(
                &mut errors,
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
    }

    if password.is_empty() {
        push_error(&mut errors, "password", "This field is required.");
    } else {
        if password.chars().count() < PASSWORD_MIN_LEN {
            push_error(
                &mut errors,
                "password",
                "This password is too short. It must contain at least 8 characters.",
            );
        }
        if password.chars().all(|c| c.is_ascii_digit()) {
            push_error(&mut errors, "password", "This password is entirely numeric.");
        }
        if !username.is_empty() && password.eq_ignore_ascii_case(username) {
            push_error(
                &mut errors,
                "password",
                "The password is too similar to the username.",
            );
        }
    }

    if let Some(email) = email.filter(|e| !e.is_empty()) {
        let valid = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !valid {
            push_error(&mut errors, "email", "Enter a valid email address.");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::FieldErrors { errors })
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// A request carrying a live session. Rejects with 403 otherwise.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = session_token(&jar).ok_or(ServiceError::Unauthenticated)?;

        let user = state
            .engine
            .resolve_session(&token)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        Ok(AuthUser { user, token })
    }
}
