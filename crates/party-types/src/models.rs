use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A party as it travels over the wire. Timestamps are milliseconds since the
/// Unix epoch, which is what the mobile clients consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub end_time: Option<DateTime<Utc>>,
    pub male_cost: u32,
    pub female_cost: u32,
    pub byob: bool,
    /// Owning user.
    pub user: Uuid,
    pub university: String,
    /// Chronological message log ("the word").
    #[serde(default)]
    pub the_word: Vec<WordMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colloquial_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordMessage {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub body: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub provider: String,
    pub facebook: Option<FacebookLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacebookLink {
    pub user_id: String,
}
