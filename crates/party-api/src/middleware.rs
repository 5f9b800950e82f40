use axum::{
    Extension,
    extract::{Path, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::WithRejection;
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::{debug, warn};
use uuid::Uuid;

use party_db::models::{PartyRow, UserRow};
use party_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::facebook::FacebookVerifier;

/// Header selecting how the bearer token is interpreted.
pub const AUTH_STRATEGY_HEADER: &str = "passport-auth-strategy";

/// The authenticated user, attached by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

/// The party named in the path, attached by [`require_party_owner`].
#[derive(Debug, Clone)]
pub struct LoadedParty(pub PartyRow);

/// Resolve the bearer token to a user. Tokens are session JWTs unless the
/// request names the Facebook strategy, in which case they are Facebook
/// access tokens.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthenticated("User is not logged in"))?
        .token()
        .to_string();

    let user = if is_facebook_strategy(req.headers()) {
        user_from_facebook_token(&state, token).await?
    } else {
        user_from_jwt(&state, &token).await?
    };

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}

/// Only the party's owner or an admin gets through. Runs after
/// [`require_auth`].
pub async fn require_party_owner(
    State(state): State<AppState>,
    WithRejection(Path(party_id), _): WithRejection<Path<Uuid>, ApiError>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let party = state
        .with_db(move |db| db.get_party(&party_id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("party"))?;

    if !user.is_admin() && party.user_id != user.id {
        debug!("User {} denied access to party {}", user.id, party.id);
        return Err(ApiError::NotAuthorized);
    }

    req.extensions_mut().insert(LoadedParty(party));
    Ok(next.run(req).await)
}

fn is_facebook_strategy(headers: &HeaderMap) -> bool {
    headers
        .get(AUTH_STRATEGY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("facebook"))
}

async fn user_from_jwt(state: &AppState, token: &str) -> Result<UserRow, ApiError> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthenticated("Invalid session token"))?
    .claims;

    state
        .with_db(move |db| db.get_user_by_id(&claims.sub.to_string()))
        .await?
        .ok_or(ApiError::Unauthenticated("Unknown user"))
}

async fn user_from_facebook_token(state: &AppState, token: String) -> Result<UserRow, ApiError> {
    let login = match &state.facebook {
        // Facebook vouches for every request; the stored row only maps the
        // Facebook id to the local user.
        FacebookVerifier::Graph(_) => {
            let profile = state.facebook.resolve(&token).await.map_err(|e| {
                warn!("Facebook token rejected: {}", e);
                ApiError::Unauthenticated("Facebook token rejected")
            })?;
            state
                .with_db(move |db| {
                    if db.update_fb_token(&profile.id, &token)? {
                        db.get_fb_login(&profile.id)
                    } else {
                        Ok(None)
                    }
                })
                .await?
                .ok_or(ApiError::Unauthenticated("No account linked to this Facebook user"))?
        }
        FacebookVerifier::Trust => state
            .with_db(move |db| db.get_fb_login_by_token(&token))
            .await?
            .ok_or(ApiError::Unauthenticated("Facebook token rejected"))?,
    };

    state
        .with_db(move |db| db.get_user_by_id(&login.user_id))
        .await?
        .ok_or(ApiError::Unauthenticated("Unknown user"))
}
