use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;

use crate::auth::{
    dto::{LoginRequest, RegisterRequest},
    error::AuthError,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::{StoreError, UserStore},
    repo_types::{NewUser, User, DEFAULT_ROLE},
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

// Verified against when the email is unknown so both failure paths cost one argon2 run.
// Same parameters as `Argon2::default()`; matches no password.
const DUMMY_HASH: &str = concat!(
    "$argon2id$v=19$m=19456,t=2,p=1",
    "$c29tZXNhbHRzb21lc2FsdA",
    "$BwgJCgsMDQ4PEBESExQVFhcYGRobHB0eHyAhIiMkJSY",
);

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validated_email(raw: &str) -> Result<String, AuthError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(AuthError::validation("email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AuthError::validation("email is invalid"));
    }
    Ok(email)
}

/// Validates, hashes and persists a new user. Nothing is stored unless every step before
/// the insert succeeded.
pub async fn register(store: &dyn UserStore, req: RegisterRequest) -> Result<User, AuthError> {
    let username = req.username.trim().to_owned();
    if username.is_empty() {
        return Err(AuthError::validation("username is required"));
    }
    let email = validated_email(&req.email)?;
    if req.password.is_empty() {
        return Err(AuthError::validation("password is required"));
    }
    let full_name = req
        .full_name
        .map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty());

    let password_hash = hash_password(&req.password)?;

    let now = OffsetDateTime::now_utc();
    let new_user = NewUser {
        username,
        email,
        password_hash,
        full_name,
        role: DEFAULT_ROLE.to_owned(),
        created_at: now,
        updated_at: now,
    };
    let id = store.insert(&new_user).await?;
    Ok(new_user.into_user(id))
}

/// Checks credentials and returns a signed token for the user's email.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<String, AuthError> {
    let email = validated_email(&req.email)?;
    if req.password.is_empty() {
        return Err(AuthError::validation("password is required"));
    }

    let user = match store.find_by_email(&email).await {
        Ok(u) => u,
        Err(StoreError::NotFound) => {
            verify_password(&req.password, DUMMY_HASH);
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(&req.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(keys.issue(&user.email)?)
}
