use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::{require_auth, require_party_owner};
use crate::parties;

/// All `/api` routes. Auth and ownership gates are layered per method so that
/// reads stay public.
pub fn router(state: AppState) -> Router {
    let auth_gate = middleware::from_fn_with_state(state.clone(), require_auth);
    let owner_gate = middleware::from_fn_with_state(state.clone(), require_party_owner);

    Router::new()
        // Accounts
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/auth/facebook/getorcreate", post(auth::facebook_get_or_create))
        .route(
            "/api/auth/test/requireslogin",
            post(auth::requires_login).route_layer(auth_gate.clone()),
        )
        // Parties
        .route("/api/parties", post(parties::create).route_layer(auth_gate.clone()))
        .route(
            "/api/parties/{party_id}",
            get(parties::show).merge(
                put(parties::update)
                    .delete(parties::destroy)
                    .route_layer(owner_gate)
                    .route_layer(auth_gate),
            ),
        )
        .route("/api/parties/{party_id}/word", put(parties::send_word))
        .route("/api/parties/university/{university_name}", get(parties::list_current))
        .with_state(state)
}
