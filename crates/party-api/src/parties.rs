use std::collections::HashMap;

use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use party_db::models::{PartyRow, WordRow};
use party_types::api::{ListPartiesResponse, PartyPayload, SendWordRequest};
use party_types::models::{Party, WordMessage};
use party_types::rules;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::geocode::Geocoded;
use crate::middleware::{CurrentUser, LoadedParty};

/// POST /api/parties: the authenticated user becomes the owner.
pub async fn create(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    WithRejection(Json(payload), _): WithRejection<Json<PartyPayload>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let formatted_address = payload
        .formatted_address
        .clone()
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("formattedAddress is required".into()))?;
    let start_time = payload
        .start_time
        .ok_or_else(|| ApiError::Validation("startTime is required".into()))?;
    let university = payload
        .university
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("university is required".into()))?;

    let mut row = PartyRow {
        id: Uuid::new_v4().to_string(),
        formatted_address,
        latitude: 0.0,
        longitude: 0.0,
        start_time: start_time.timestamp_millis(),
        end_time: None,
        male_cost: 0,
        female_cost: 0,
        byob: true,
        user_id: user.id,
        university,
        colloquial_name: None,
        description: None,
    };
    apply_payload(&mut row, payload)?;

    let geocoded = geocode(&state, &row.formatted_address).await?;
    apply_geocoded(&mut row, geocoded);

    let party_row = row.clone();
    state.with_db(move |db| db.insert_party(&party_row)).await?;
    info!("Party {} created by {}", row.id, row.user_id);

    Ok((StatusCode::CREATED, Json(to_party(row, Vec::new())?)))
}

/// GET /api/parties/{party_id}
pub async fn show(
    State(state): State<AppState>,
    WithRejection(Path(party_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let party = load_party(&state, party_id).await?.ok_or(ApiError::NotFound("party"))?;
    Ok(Json(party))
}

/// PUT /api/parties/{party_id}: owner or admin. Only the fields present in
/// the body change; a changed address is geocoded again.
pub async fn update(
    State(state): State<AppState>,
    Extension(LoadedParty(mut row)): Extension<LoadedParty>,
    WithRejection(Json(payload), _): WithRejection<Json<PartyPayload>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let previous_address = row.formatted_address.clone();
    apply_payload(&mut row, payload)?;

    if row.formatted_address != previous_address {
        let geocoded = geocode(&state, &row.formatted_address).await?;
        apply_geocoded(&mut row, geocoded);
    }

    let party_id = row.id.clone();
    let (updated, words) = state
        .with_db(move |db| {
            if !db.update_party(&row)? {
                return Ok((None, Vec::new()));
            }
            Ok((Some(row), db.get_words(&party_id)?))
        })
        .await?;

    let row = updated.ok_or(ApiError::NotFound("party"))?;
    Ok(Json(to_party(row, words)?))
}

/// DELETE /api/parties/{party_id}: owner or admin. Responds with the removed party.
pub async fn destroy(
    State(state): State<AppState>,
    Extension(LoadedParty(row)): Extension<LoadedParty>,
) -> Result<impl IntoResponse, ApiError> {
    let party_id = row.id.clone();
    let (deleted, words) = state
        .with_db(move |db| {
            let words = db.get_words(&party_id)?;
            Ok((db.delete_party(&party_id)?, words))
        })
        .await?;

    if !deleted {
        return Err(ApiError::NotFound("party"));
    }
    info!("Party {} deleted", row.id);

    Ok(Json(to_party(row, words)?))
}

/// GET /api/parties/university/{university_name}: parties that are running,
/// recently started or starting soon.
pub async fn list_current(
    State(state): State<AppState>,
    WithRejection(Path(university), _): WithRejection<Path<String>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (from, to) = rules::relevant_band(Utc::now());

    let (rows, word_rows) = state
        .with_db(move |db| {
            let rows = db.list_current_parties(&university, from.timestamp_millis(), to.timestamp_millis())?;
            let party_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
            let words = db.get_words_for_parties(&party_ids)?;
            Ok((rows, words))
        })
        .await?;

    let mut words_by_party: HashMap<String, Vec<WordRow>> = HashMap::new();
    for word in word_rows {
        words_by_party.entry(word.party_id.clone()).or_default().push(word);
    }

    let parties = rows
        .into_iter()
        .map(|row| {
            let words = words_by_party.remove(&row.id).unwrap_or_default();
            to_party(row, words)
        })
        .collect::<Result<_, _>>()?;

    Ok(Json(ListPartiesResponse { parties }))
}

/// PUT /api/parties/{party_id}/word: append to the party's message log and
/// return the whole party.
pub async fn send_word(
    State(state): State<AppState>,
    WithRejection(Path(party_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<SendWordRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if req.body.trim().is_empty() {
        return Err(ApiError::Validation("body must not be empty".into()));
    }

    let word = WordRow {
        id: Uuid::new_v4().to_string(),
        party_id: party_id.to_string(),
        body: req.body,
        created_at: Utc::now().timestamp_millis(),
    };

    let appended = state.with_db(move |db| db.append_word(&word)).await?;
    if !appended {
        return Err(ApiError::NotFound("party"));
    }

    let party = load_party(&state, party_id).await?.ok_or(ApiError::NotFound("party"))?;
    Ok(Json(party))
}

async fn load_party(state: &AppState, party_id: Uuid) -> Result<Option<Party>, ApiError> {
    let id = party_id.to_string();
    let found = state
        .with_db(move |db| {
            let Some(row) = db.get_party(&id)? else {
                return Ok(None);
            };
            let words = db.get_words(&id)?;
            Ok(Some((row, words)))
        })
        .await?;

    found.map(|(row, words)| to_party(row, words)).transpose()
}

async fn geocode(state: &AppState, address: &str) -> Result<Geocoded, ApiError> {
    state
        .geocoder
        .geocode(address)
        .await
        .map_err(|e| ApiError::Geocode(e.to_string()))
}

fn apply_geocoded(row: &mut PartyRow, geocoded: Geocoded) {
    row.formatted_address = geocoded.formatted_address;
    row.latitude = geocoded.latitude;
    row.longitude = geocoded.longitude;
}

/// Copy the fields present in `payload` onto `row`, rejecting bad values.
fn apply_payload(row: &mut PartyRow, payload: PartyPayload) -> Result<(), ApiError> {
    if let Some(address) = payload.formatted_address {
        if address.trim().is_empty() {
            return Err(ApiError::Validation("formattedAddress must not be empty".into()));
        }
        row.formatted_address = address;
    }
    // Coordinates belong to the geocoder. Client values are range-checked
    // and otherwise ignored.
    if let Some(latitude) = payload.latitude {
        rules::check_latitude(latitude).map_err(ApiError::Validation)?;
    }
    if let Some(longitude) = payload.longitude {
        rules::check_longitude(longitude).map_err(ApiError::Validation)?;
    }
    if let Some(start_time) = payload.start_time {
        row.start_time = start_time.timestamp_millis();
    }
    if let Some(end_time) = payload.end_time {
        row.end_time = end_time.map(|t| t.timestamp_millis());
    }
    if let Some(cost) = payload.male_cost {
        row.male_cost = i64::from(rules::check_cost("maleCost", cost).map_err(ApiError::Validation)?);
    }
    if let Some(cost) = payload.female_cost {
        row.female_cost = i64::from(rules::check_cost("femaleCost", cost).map_err(ApiError::Validation)?);
    }
    if let Some(byob) = payload.byob {
        row.byob = byob;
    }
    if let Some(university) = payload.university {
        if university.trim().is_empty() {
            return Err(ApiError::Validation("university must not be empty".into()));
        }
        row.university = university;
    }
    if let Some(name) = payload.colloquial_name {
        row.colloquial_name = name;
    }
    if let Some(description) = payload.description {
        if let Some(text) = &description {
            rules::check_description(text).map_err(ApiError::Validation)?;
        }
        row.description = description;
    }

    let start = millis_to_datetime(row.start_time)?;
    let end = row.end_time.map(millis_to_datetime).transpose()?;
    rules::check_time_window(start, end).map_err(ApiError::Validation)
}

fn to_party(row: PartyRow, words: Vec<WordRow>) -> Result<Party, ApiError> {
    Ok(Party {
        id: parse_id("party", &row.id)?,
        formatted_address: row.formatted_address,
        latitude: row.latitude,
        longitude: row.longitude,
        start_time: millis_to_datetime(row.start_time)?,
        end_time: row.end_time.map(millis_to_datetime).transpose()?,
        male_cost: stored_cost(row.male_cost)?,
        female_cost: stored_cost(row.female_cost)?,
        byob: row.byob,
        user: parse_id("owner", &row.user_id)?,
        university: row.university,
        the_word: words.into_iter().map(to_word).collect::<Result<_, _>>()?,
        colloquial_name: row.colloquial_name,
        description: row.description,
    })
}

fn to_word(row: WordRow) -> Result<WordMessage, ApiError> {
    Ok(WordMessage {
        id: parse_id("word", &row.id)?,
        body: row.body,
        created: millis_to_datetime(row.created_at)?,
    })
}

/// Parse a stored id. A bad one means the database is corrupt.
pub(crate) fn parse_id(kind: &str, id: &str) -> Result<Uuid, ApiError> {
    id.parse()
        .map_err(|e| ApiError::Internal(anyhow!("corrupt {} id '{}': {}", kind, id, e)))
}

fn stored_cost(cost: i64) -> Result<u32, ApiError> {
    u32::try_from(cost).map_err(|_| ApiError::Internal(anyhow!("stored cost {} out of range", cost)))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, ApiError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| ApiError::Internal(anyhow!("timestamp out of range: {}", ms)))
}
