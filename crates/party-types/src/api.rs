use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{Party, User};

// -- JWT Claims --

/// Session claims issued by the auth endpoints and checked by the API
/// middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of `POST /api/auth/facebook/getorcreate`.
#[derive(Debug, Serialize, Deserialize)]
pub struct FacebookTokenRequest {
    pub user_id: String,
    pub access_token: String,
}

/// A user plus a session token. The user fields are inlined so the body reads
/// as a plain user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
}

// -- Parties --

/// Create/update body for a party. Every field is optional on the wire so that
/// missing values surface as validation errors instead of decode failures, and
/// so that a PUT may carry only the fields it changes. The optional party
/// fields distinguish "absent" (`None`) from an explicit `null`
/// (`Some(None)`). Fields the server owns (`_id`, `user`, `theWord`) are
/// ignored when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub start_time: Option<DateTime<Utc>>,
    /// `null` clears the end time.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable_millis")]
    pub end_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub male_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub female_cost: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byob: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub colloquial_name: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
}

impl From<&Party> for PartyPayload {
    fn from(party: &Party) -> Self {
        Self {
            formatted_address: Some(party.formatted_address.clone()),
            latitude: Some(party.latitude),
            longitude: Some(party.longitude),
            start_time: Some(party.start_time),
            end_time: Some(party.end_time),
            male_cost: Some(i64::from(party.male_cost)),
            female_cost: Some(i64::from(party.female_cost)),
            byob: Some(party.byob),
            university: Some(party.university.clone()),
            colloquial_name: Some(party.colloquial_name.clone()),
            description: Some(party.description.clone()),
        }
    }
}

/// Present-but-null becomes `Some(None)`; an absent field stays `None` via
/// `#[serde(default)]`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

mod nullable_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<DateTime<Utc>>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(Some(time)) => serializer.serialize_i64(time.timestamp_millis()),
            _ => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error> {
        chrono::serde::ts_milliseconds_option::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendWordRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPartiesResponse {
    pub parties: Vec<Party>,
}

// -- Errors --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The address could not be geocoded.
    Unknown,
    Validation,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error_code: ErrorCode,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_tells_null_from_absent() {
        let absent: PartyPayload = serde_json::from_value(json!({ "byob": false })).unwrap();
        assert_eq!(absent.end_time, None);
        assert_eq!(absent.description, None);
        assert_eq!(absent.colloquial_name, None);

        let cleared: PartyPayload =
            serde_json::from_value(json!({ "endTime": null, "description": null, "colloquialName": null })).unwrap();
        assert_eq!(cleared.end_time, Some(None));
        assert_eq!(cleared.description, Some(None));
        assert_eq!(cleared.colloquial_name, Some(None));

        let set: PartyPayload =
            serde_json::from_value(json!({ "endTime": 1_441_238_400_000i64, "description": "Bring a towel" })).unwrap();
        assert_eq!(set.end_time.unwrap().unwrap().timestamp_millis(), 1_441_238_400_000);
        assert_eq!(set.description, Some(Some("Bring a towel".to_string())));
    }

    #[test]
    fn cleared_fields_serialize_as_null() {
        let payload = PartyPayload {
            end_time: Some(None),
            description: Some(None),
            byob: Some(true),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "endTime": null, "description": null, "byob": true })
        );
    }
}
