use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use party_types::api::{
    AuthResponse, ErrorBody, FacebookTokenRequest, ListPartiesResponse, PartyPayload, SendWordRequest,
};
use party_types::models::Party;

use crate::cache::PartyCache;
use crate::error::ClientError;

/// Every request gives up after this long.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(2500);

const AUTH_STRATEGY_HEADER: &str = "Passport-Auth-Strategy";

/// HTTP client for the party-on API. Successful responses are folded into the
/// shared [`PartyCache`]; failures come back to the caller as they happened.
#[derive(Debug, Clone)]
pub struct PartiesClient {
    http: reqwest::Client,
    base: Url,
    cache: Arc<PartyCache>,
    facebook_token: Option<String>,
}

impl PartiesClient {
    pub fn new(base_url: &str, cache: Arc<PartyCache>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, cache, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, cache: Arc<PartyCache>, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(base_url).map_err(|e| ClientError::InvalidBase(format!("{}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidBase(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base,
            cache,
            facebook_token: None,
        })
    }

    /// Authenticate later requests with a Facebook access token.
    pub fn with_facebook_token(mut self, token: impl Into<String>) -> Self {
        self.facebook_token = Some(token.into());
        self
    }

    pub fn cache(&self) -> &Arc<PartyCache> {
        &self.cache
    }

    /// Fetch the parties currently relevant at `university` and replace the
    /// cached list with them.
    pub async fn requery_nearby(&self, university: &str, cancel: &CancellationToken) -> Result<Vec<Party>, ClientError> {
        let url = self.endpoint(&["api", "parties", "university", university])?;
        let resp: ListPartiesResponse = self.send(self.http.get(url), cancel).await?;

        self.cache.replace_all(resp.parties.clone(), cancel).await?;
        debug!("Cached {} parties for {}", resp.parties.len(), university);
        Ok(resp.parties)
    }

    /// Fetch one party. The cached copy is refreshed when there is one.
    pub async fn get_party(&self, party_id: Uuid, cancel: &CancellationToken) -> Result<Party, ClientError> {
        let url = self.endpoint(&["api", "parties", &party_id.to_string()])?;
        let party: Party = self.send(self.http.get(url), cancel).await?;

        self.cache.update_single(party.clone(), cancel).await?;
        Ok(party)
    }

    /// Create a party. It is shown first in the cached list.
    pub async fn post_party(&self, payload: &PartyPayload, cancel: &CancellationToken) -> Result<Party, ClientError> {
        let url = self.endpoint(&["api", "parties"])?;
        let party: Party = self.send(self.http.post(url).json(payload), cancel).await?;

        self.cache.insert_front(party.clone(), cancel).await?;
        Ok(party)
    }

    pub async fn put_party(&self, party: &Party, cancel: &CancellationToken) -> Result<Party, ClientError> {
        let url = self.endpoint(&["api", "parties", &party.id.to_string()])?;
        let payload = PartyPayload::from(party);
        let updated: Party = self.send(self.http.put(url).json(&payload), cancel).await?;

        if !self.cache.update_single(updated.clone(), cancel).await? {
            debug!("Updated party {} is not cached", updated.id);
        }
        Ok(updated)
    }

    /// Append a message to a party's word. The party must be cached so the
    /// refreshed copy has somewhere to go.
    pub async fn send_word(&self, party_id: Uuid, body: &str, cancel: &CancellationToken) -> Result<Party, ClientError> {
        let url = self.endpoint(&["api", "parties", &party_id.to_string(), "word"])?;
        let req = SendWordRequest { body: body.to_string() };
        let party: Party = self.send(self.http.put(url).json(&req), cancel).await?;

        if !self.cache.update_single(party.clone(), cancel).await? {
            warn!("Word sent to party {} which is not cached", party_id);
            return Err(ClientError::NotCachedLocally(party_id));
        }
        Ok(party)
    }

    /// Exchange a Facebook login for a party-on user.
    pub async fn facebook_get_or_create(
        &self,
        user_id: &str,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<AuthResponse, ClientError> {
        let url = self.endpoint(&["api", "auth", "facebook", "getorcreate"])?;
        let req = FacebookTokenRequest {
            user_id: user_id.to_string(),
            access_token: access_token.to_string(),
        };
        self.send(self.http.post(url).json(&req), cancel).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidBase(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.facebook_token {
            Some(token) => req
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(AUTH_STRATEGY_HEADER, "facebook"),
            None => req,
        }
    }

    /// Send a request and decode its JSON body, giving up as soon as `cancel`
    /// fires.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, cancel: &CancellationToken) -> Result<T, ClientError> {
        let req = self.authorize(req);

        let resp = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            resp = req.send() => resp?,
        };

        let status = resp.status();
        if !status.is_success() {
            let body = tokio::select! {
                _ = cancel.cancelled() => return Err(ClientError::Cancelled),
                body = resp.bytes() => body?,
            };
            let (code, message) = match serde_json::from_slice::<ErrorBody>(&body) {
                Ok(err) => (Some(err.error_code), err.message),
                Err(_) => (None, String::from_utf8_lossy(&body).into_owned()),
            };
            return Err(ClientError::Api { status, code, message });
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            value = resp.json::<T>() => Ok(value?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> PartiesClient {
        PartiesClient::new(base, Arc::new(PartyCache::new())).unwrap()
    }

    #[test]
    fn endpoints_escape_path_segments() {
        let c = client("http://localhost:3000");
        let url = c.endpoint(&["api", "parties", "university", "Indiana University"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/parties/university/Indiana%20University");

        let c = client("http://localhost:3000/mobile/");
        let url = c.endpoint(&["api", "parties"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/mobile/api/parties");
    }

    #[test]
    fn rejects_unusable_base() {
        let cache = Arc::new(PartyCache::new());
        assert!(matches!(
            PartiesClient::new("not a url", cache.clone()),
            Err(ClientError::InvalidBase(_))
        ));
        assert!(matches!(
            PartiesClient::new("mailto:party@example.com", cache),
            Err(ClientError::InvalidBase(_))
        ));
    }

    #[test]
    fn timeout_is_two_and_a_half_seconds() {
        assert_eq!(REQUEST_TIMEOUT, Duration::from_millis(2500));
    }
}
