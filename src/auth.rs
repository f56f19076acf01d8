use std::sync::Arc;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    AppState,
    db::now_ms,
    entities::user,
    error::{AppError, AppResult},
    models::{AuthResponse, UserView},
};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Account creation, credential checks and bearer tokens.
#[derive(Clone)]
pub struct Identity {
    db: DatabaseConnection,
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl Identity {
    pub fn new(db: DatabaseConnection, secret: &str, ttl_hours: i64) -> Self {
        Self {
            db,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours: ttl_hours.max(1),
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> AppResult<AuthResponse> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AppError::validation("Please add a name"));
        }
        if !is_plausible_email(&email) {
            return Err(AppError::validation("Please use a valid email address"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        if self.find_by_email(&email).await?.is_some() {
            return Err(AppError::validation("User already exists with that email"));
        }

        let password_hash = hash_password(password.to_string()).await?;
        let now = now_ms();
        let model = user::ActiveModel {
            id: Default::default(),
            name: Set(name.to_string()),
            email: Set(email.clone()),
            password_hash: Set(password_hash),
            is_admin: Set(false),
            watched: Set("[]".to_string()),
            watchlist: Set("[]".to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let user = match model.insert(&self.db).await {
            Ok(user) => user,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(AppError::validation("User already exists with that email"));
            },
            Err(err) => return Err(err.into()),
        };

        info!(user_id = user.id, "registered user");
        let token = self.issue_token(user.id)?;
        Ok(AuthResponse { user: UserView::from(&user), token })
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<AuthResponse> {
        let invalid = || AppError::Unauthenticated("Invalid email or password".to_string());

        let user = self.find_by_email(&normalize_email(email)).await?.ok_or_else(invalid)?;
        if !verify_password(password.to_string(), user.password_hash.clone()).await? {
            debug!(user_id = user.id, "password mismatch");
            return Err(invalid());
        }

        let token = self.issue_token(user.id)?;
        Ok(AuthResponse { user: UserView::from(&user), token })
    }

    pub fn issue_token(&self, user_id: i32) -> AppResult<String> {
        let now = jiff::Timestamp::now().as_second();
        let claims = Claims { sub: user_id, iat: now, exp: now + self.ttl_hours * 3600 };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|err| {
                debug!(error = %err, "rejected bearer token");
                AppError::Unauthenticated("Not authorized, token failed".to_string())
            })
    }

    pub async fn find_user(&self, id: i32) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<user::Model>> {
        Ok(user::Entity::find().filter(user::Column::Email.eq(email)).one(&self.db).await?)
    }
}

/// The authenticated caller, resolved from the `Authorization: Bearer` header.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i32,
    pub name: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthenticated("Not authorized, no token".to_string()))?;

        let claims = state.identity.verify_token(token)?;
        let user = state
            .identity
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("Not authorized, token failed".to_string()))?;

        Ok(AuthUser { id: user.id, name: user.name })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").or_else(|| value.strip_prefix("bearer "))?.trim();
    (!token.is_empty()).then_some(token)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// `local@domain.tld`, nothing stricter.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !local.is_empty()
        && !host.is_empty()
        && !tld.is_empty()
        && !email.chars().any(char::is_whitespace)
}

async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(AppError::from)
    })
    .await
    .map_err(|err| AppError::Internal(err.into()))?
}

async fn verify_password(password: String, stored: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || -> AppResult<bool> {
        let parsed = PasswordHash::new(&stored)?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
    .map_err(|err| AppError::Internal(err.into()))?
}
