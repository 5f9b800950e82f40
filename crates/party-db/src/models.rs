//! Database row types: these map directly to SQLite rows.
//! Distinct from party-types API models to keep the DB layer independent.

use party_types::rules::ROLE_ADMIN;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub username: String,
    pub email: String,
    pub provider: String,
    pub password_hash: String,
    pub salt: String,
    pub roles: Vec<String>,
    /// Linked Facebook user id, if any.
    pub facebook_id: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }
}

/// Input for creating a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub provider: String,
    pub password_hash: String,
    pub salt: String,
    /// Extra roles on top of "authenticated".
    pub roles: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FbLoginRow {
    pub id: String,
    pub user_id: String,
    pub fb_user_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartyRow {
    pub id: String,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Unix milliseconds.
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub male_cost: i64,
    pub female_cost: i64,
    pub byob: bool,
    pub user_id: String,
    pub university: String,
    pub colloquial_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordRow {
    pub id: String,
    pub party_id: String,
    pub body: String,
    /// Unix milliseconds.
    pub created_at: i64,
}
