use std::sync::Arc;

use anyhow::anyhow;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::WithRejection;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info, warn};
use uuid::Uuid;

use party_db::Database;
use party_db::models::{NewUser, UserRow};
use party_types::api::{AuthResponse, Claims, FacebookTokenRequest, LoginRequest, RegisterRequest};
use party_types::models::{FacebookLink, User};
use party_types::rules::{PROVIDER_FACEBOOK, PROVIDER_LOCAL, ROLE_ADMIN};

use crate::error::ApiError;
use crate::facebook::FacebookVerifier;
use crate::geocode::Geocoder;
use crate::middleware::CurrentUser;
use crate::parties::parse_id;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub geocoder: Geocoder,
    pub facebook: FacebookVerifier,
    /// Emails that receive the admin role when they register.
    pub admin_emails: Vec<String>,
}

impl AppStateInner {
    /// Run a blocking DB call off the async runtime.
    pub async fn with_db<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow!("blocking task failed: {}", e))
            })?
            .map_err(ApiError::from)
    }
}

pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.len() < MIN_PASSWORD_LEN || req.password.len() > MAX_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "password must be {}-{} characters long",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }

    let (password_hash, salt) = hash_password(&req.password).map_err(ApiError::Internal)?;

    let roles = if state.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(&req.email)) {
        vec![ROLE_ADMIN.to_string()]
    } else {
        vec![]
    };

    let new_user = NewUser {
        name: req.name,
        username: req.username,
        email: req.email,
        provider: PROVIDER_LOCAL.to_string(),
        password_hash,
        salt,
        roles,
    };

    let row = state
        .with_db(move |db| db.create_user(&new_user))
        .await
        .map_err(|e| match e {
            ApiError::Conflict(_) => ApiError::Conflict("email or username already in use".into()),
            other => other,
        })?;

    let user = to_user(row)?;
    let token = create_token(&state.jwt_secret, user.id, &user.username).map_err(ApiError::Internal)?;
    info!("Registered user {}", user.id);

    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    const BAD_LOGIN: ApiError = ApiError::Unauthenticated("Invalid email or password");

    let email = req.email;
    let row = state
        .with_db(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(BAD_LOGIN)?;

    if row.provider != PROVIDER_LOCAL || !verify_password(&req.password, &row.password_hash) {
        return Err(BAD_LOGIN);
    }

    let user = to_user(row)?;
    let token = create_token(&state.jwt_secret, user.id, &user.username).map_err(ApiError::Internal)?;

    Ok(Json(AuthResponse { user, token }))
}

/// POST /api/auth/facebook/getorcreate: exchange a Facebook token for the
/// local user linked to it, creating both on first contact.
pub async fn facebook_get_or_create(
    State(state): State<AppState>,
    WithRejection(Json(req), _): WithRejection<Json<FacebookTokenRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if req.user_id.is_empty() || req.access_token.is_empty() {
        return Err(ApiError::Validation("user_id and access_token are required".into()));
    }

    let profile = state
        .facebook
        .verify(&req.user_id, &req.access_token)
        .await
        .map_err(|e| {
            warn!("Facebook verification failed for {}: {}", req.user_id, e);
            ApiError::Unauthenticated("Facebook token rejected")
        })?;

    let new_user = NewUser {
        name: profile.name.clone().unwrap_or_else(|| "Facebook User".into()),
        username: format!("fb{}", profile.id),
        email: profile
            .email
            .clone()
            .unwrap_or_else(|| format!("{}@facebook.com", profile.id)),
        provider: PROVIDER_FACEBOOK.to_string(),
        password_hash: String::new(),
        salt: String::new(),
        roles: vec![],
    };

    let fb_user_id = profile.id;
    let access_token = req.access_token;
    let (row, created) = state
        .with_db(move |db| db.get_or_create_facebook_user(&fb_user_id, &access_token, &new_user))
        .await?;

    if created {
        info!("Created user {} for Facebook login", row.id);
    }

    let user = to_user(row)?;
    let token = create_token(&state.jwt_secret, user.id, &user.username).map_err(ApiError::Internal)?;

    Ok(Json(AuthResponse { user, token }))
}

/// Echo the authenticated user. Handy to check either credential style.
pub async fn requires_login(Extension(CurrentUser(row)): Extension<CurrentUser>) -> Result<Json<User>, ApiError> {
    Ok(Json(to_user(row)?))
}

pub(crate) fn to_user(row: UserRow) -> Result<User, ApiError> {
    Ok(User {
        id: parse_id("user", &row.id)?,
        name: row.name,
        username: row.username,
        email: row.email,
        roles: row.roles,
        provider: row.provider,
        facebook: row.facebook_id.map(|user_id| FacebookLink { user_id }),
    })
}

/// Hash a password with Argon2id. Returns the PHC hash string and its salt.
pub fn hash_password(password: &str) -> anyhow::Result<(String, String)> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok((hash, salt.as_str().to_string()))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
