use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone, PartialEq)]
pub enum GeocoderChoice {
    Google { api_key: String },
    Static { table: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacebookChoice {
    Graph,
    Trust,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub geocoder: GeocoderChoice,
    pub facebook: FacebookChoice,
    pub admin_emails: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("PARTY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARTY_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("PARTY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PARTY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARTY_PORT is not a port number")?;
        let db_path: PathBuf = get("PARTY_DB_PATH").unwrap_or_else(|| "party-on.db".into()).into();

        let api_key = get("PARTY_GOOGLE_API_KEY").filter(|k| !k.is_empty());
        let table = get("PARTY_GEOCODE_TABLE").filter(|t| !t.is_empty()).map(PathBuf::from);
        let geocoder = match (get("PARTY_GEOCODER").as_deref(), api_key, table) {
            (Some("google") | None, Some(api_key), _) => GeocoderChoice::Google { api_key },
            (Some("static") | None, _, Some(table)) => GeocoderChoice::Static { table },
            (Some("google"), None, _) => bail!("PARTY_GEOCODER=google needs PARTY_GOOGLE_API_KEY"),
            (Some("static"), _, None) => bail!("PARTY_GEOCODER=static needs PARTY_GEOCODE_TABLE"),
            (Some(other), _, _) if other != "google" && other != "static" => {
                bail!("unknown PARTY_GEOCODER '{}'", other)
            }
            _ => bail!("no geocoder configured: set PARTY_GOOGLE_API_KEY or PARTY_GEOCODE_TABLE"),
        };

        let facebook = match get("PARTY_FACEBOOK_VERIFY").as_deref() {
            None | Some("graph") => FacebookChoice::Graph,
            Some("trust") => FacebookChoice::Trust,
            Some(other) => bail!("unknown PARTY_FACEBOOK_VERIFY '{}'", other),
        };

        let admin_emails = get("PARTY_ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            geocoder,
            facebook,
            admin_emails,
        })
    }
}
