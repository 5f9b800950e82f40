mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use party_api::facebook::{FacebookVerifier, GraphVerifier};
use party_api::geocode::{Geocoder, GoogleGeocoder, StaticGeocoder};
use party_api::{AppState, AppStateInner};

use crate::config::{Config, FacebookChoice, GeocoderChoice};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "party_on=debug,party_api=debug,party_db=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = party_db::Database::open(&config.db_path)?;

    // Outbound HTTP for geocoding and Facebook
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;

    let geocoder = match &config.geocoder {
        GeocoderChoice::Google { api_key } => {
            info!("Geocoding with the Google Geocoding API");
            Geocoder::Google(GoogleGeocoder::new(http.clone(), api_key.clone()))
        }
        GeocoderChoice::Static { table } => {
            info!("Geocoding from table {}", table.display());
            Geocoder::Static(StaticGeocoder::from_file(table)?)
        }
    };

    let facebook = match config.facebook {
        FacebookChoice::Graph => FacebookVerifier::Graph(GraphVerifier::new(http)),
        FacebookChoice::Trust => {
            warn!("Facebook tokens are NOT verified (PARTY_FACEBOOK_VERIFY=trust)");
            FacebookVerifier::Trust
        }
    };

    // Shared state
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        geocoder,
        facebook,
        admin_emails: config.admin_emails.clone(),
    });

    let app = party_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("party-on server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
