use crate::Database;
use crate::error::ValidationError;
use crate::models::{FbLoginRow, NewUser, PartyRow, UserRow, WordRow};
use anyhow::{Result, anyhow};
use party_types::rules::{self, PROVIDER_LOCAL, ROLE_AUTHENTICATED};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const PARTY_COLUMNS: &str = "id, formatted_address, latitude, longitude, start_time, end_time, \
     male_cost, female_cost, byob, user_id, university, colloquial_name, description";

impl Database {
    // -- Users --

    /// Save a new user. Name and username are HTML-escaped, the email is
    /// validated, and the "authenticated" role is always granted.
    pub fn create_user(&self, user: &NewUser) -> Result<UserRow> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let id = insert_user(&tx, user)?;
            tx.commit()?;
            query_user_by_id(conn, &id)?.ok_or_else(|| anyhow!("User not found after insert: {}", id))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        let email = email.to_lowercase();
        self.with_conn(|conn| query_user_where(conn, "u.email = ?1", &email))
    }

    pub fn grant_role(&self, user_id: &str, role: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
                (user_id, role),
            )?;
            Ok(())
        })
    }

    /// Delete a user along with its roles, Facebook login and parties.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    // -- Facebook logins --

    /// Find the user linked to `fb_user_id`, refreshing its stored token, or
    /// create `new_user` and link it. Returns the user and whether it was created.
    pub fn get_or_create_facebook_user(
        &self,
        fb_user_id: &str,
        access_token: &str,
        new_user: &NewUser,
    ) -> Result<(UserRow, bool)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM fb_logins WHERE fb_user_id = ?1",
                    [fb_user_id],
                    |row| row.get(0),
                )
                .optional()?;

            let (user_id, created) = match existing {
                Some(user_id) => {
                    tx.execute(
                        "UPDATE fb_logins SET access_token = ?1, updated_at = datetime('now') WHERE fb_user_id = ?2",
                        (access_token, fb_user_id),
                    )?;
                    (user_id, false)
                }
                None => {
                    let user_id = insert_user(&tx, new_user)?;
                    tx.execute(
                        "INSERT INTO fb_logins (id, user_id, fb_user_id, access_token) VALUES (?1, ?2, ?3, ?4)",
                        (Uuid::new_v4().to_string(), &user_id, fb_user_id, access_token),
                    )?;
                    (user_id, true)
                }
            };

            tx.commit()?;

            let user = query_user_by_id(conn, &user_id)?
                .ok_or_else(|| anyhow!("User not found: {}", user_id))?;
            Ok((user, created))
        })
    }

    pub fn get_fb_login(&self, fb_user_id: &str) -> Result<Option<FbLoginRow>> {
        self.with_conn(|conn| query_fb_login_where(conn, "fb_user_id = ?1", fb_user_id))
    }

    pub fn get_fb_login_by_token(&self, access_token: &str) -> Result<Option<FbLoginRow>> {
        self.with_conn(|conn| query_fb_login_where(conn, "access_token = ?1", access_token))
    }

    pub fn update_fb_token(&self, fb_user_id: &str, access_token: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE fb_logins SET access_token = ?1, updated_at = datetime('now') WHERE fb_user_id = ?2",
                (access_token, fb_user_id),
            )?;
            Ok(changed > 0)
        })
    }

    // -- Parties --

    pub fn insert_party(&self, party: &PartyRow) -> Result<()> {
        validate_party(party)?;
        self.with_conn(|conn| {
            conn.execute(
                &format!("INSERT INTO parties ({PARTY_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"),
                rusqlite::params![
                    party.id,
                    party.formatted_address,
                    party.latitude,
                    party.longitude,
                    party.start_time,
                    party.end_time,
                    party.male_cost,
                    party.female_cost,
                    party.byob,
                    party.user_id,
                    party.university,
                    party.colloquial_name,
                    party.description,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_party(&self, id: &str) -> Result<Option<PartyRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PARTY_COLUMNS} FROM parties WHERE id = ?1"),
                [id],
                party_from_row,
            )
            .optional()
        })
    }

    /// Overwrite every mutable column of an existing party. The owner never
    /// changes. Returns false when the party does not exist.
    pub fn update_party(&self, party: &PartyRow) -> Result<bool> {
        validate_party(party)?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE parties SET
                    formatted_address = ?2, latitude = ?3, longitude = ?4,
                    start_time = ?5, end_time = ?6, male_cost = ?7, female_cost = ?8,
                    byob = ?9, university = ?10, colloquial_name = ?11, description = ?12
                 WHERE id = ?1",
                rusqlite::params![
                    party.id,
                    party.formatted_address,
                    party.latitude,
                    party.longitude,
                    party.start_time,
                    party.end_time,
                    party.male_cost,
                    party.female_cost,
                    party.byob,
                    party.university,
                    party.colloquial_name,
                    party.description,
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_party(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM parties WHERE id = ?1", [id])? > 0))
    }

    /// Parties of a university whose window `[start, end or start]` overlaps
    /// `[from_ms, to_ms]`, earliest first.
    pub fn list_current_parties(&self, university: &str, from_ms: i64, to_ms: i64) -> Result<Vec<PartyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PARTY_COLUMNS} FROM parties
                 WHERE university = ?1
                   AND start_time <= ?3
                   AND COALESCE(end_time, start_time) >= ?2
                 ORDER BY start_time ASC"
            ))?;

            let rows = stmt
                .query_map(rusqlite::params![university, from_ms, to_ms], party_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Words --

    /// Append a word to its party's log. Returns false when the party does
    /// not exist.
    pub fn append_word(&self, word: &WordRow) -> Result<bool> {
        if word.body.trim().is_empty() {
            return Err(ValidationError::new("body", "must not be empty").into());
        }

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let exists: Option<i64> = tx
                .query_row("SELECT 1 FROM parties WHERE id = ?1", [&word.party_id], |row| row.get(0))
                .optional()?;
            if exists.is_none() {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO words (id, party_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![word.id, word.party_id, word.body, word.created_at],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_words(&self, party_id: &str) -> Result<Vec<WordRow>> {
        self.get_words_for_parties(&[party_id.to_string()])
    }

    /// Batch-fetch words for a set of parties, oldest first.
    pub fn get_words_for_parties(&self, party_ids: &[String]) -> Result<Vec<WordRow>> {
        if party_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=party_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, party_id, body, created_at FROM words
                 WHERE party_id IN ({})
                 ORDER BY created_at ASC, rowid ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = party_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(WordRow {
                        id: row.get(0)?,
                        party_id: row.get(1)?,
                        body: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn insert_user(conn: &Connection, user: &NewUser) -> Result<String> {
    validate_user(user)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users (id, name, username, email, provider, password_hash, salt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            &id,
            rules::escape_html(&user.name),
            rules::escape_html(&user.username),
            user.email.to_lowercase(),
            &user.provider,
            &user.password_hash,
            &user.salt,
        ),
    )?;

    let mut stmt = conn.prepare("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)")?;
    stmt.execute((&id, ROLE_AUTHENTICATED))?;
    for role in &user.roles {
        stmt.execute((&id, role))?;
    }

    Ok(id)
}

fn validate_user(user: &NewUser) -> std::result::Result<(), ValidationError> {
    if user.name.trim().is_empty() {
        return Err(ValidationError::new("name", "must not be empty"));
    }
    if user.username.trim().is_empty() {
        return Err(ValidationError::new("username", "must not be empty"));
    }
    if !rules::is_valid_email(&user.email) {
        return Err(ValidationError::new("email", format!("'{}' is not a valid address", user.email)));
    }
    if user.provider.is_empty() {
        return Err(ValidationError::new("provider", "must not be empty"));
    }
    if user.provider == PROVIDER_LOCAL && (user.password_hash.is_empty() || user.salt.is_empty()) {
        return Err(ValidationError::new("password", "required for local accounts"));
    }
    Ok(())
}

fn validate_party(party: &PartyRow) -> std::result::Result<(), ValidationError> {
    if party.formatted_address.trim().is_empty() {
        return Err(ValidationError::new("formattedAddress", "must not be empty"));
    }
    rules::check_latitude(party.latitude).map_err(|e| ValidationError::new("latitude", e))?;
    rules::check_longitude(party.longitude).map_err(|e| ValidationError::new("longitude", e))?;
    rules::check_cost("maleCost", party.male_cost).map_err(|e| ValidationError::new("maleCost", e))?;
    rules::check_cost("femaleCost", party.female_cost).map_err(|e| ValidationError::new("femaleCost", e))?;
    if party.user_id.trim().is_empty() {
        return Err(ValidationError::new("user", "a party needs an owner"));
    }
    if party.university.trim().is_empty() {
        return Err(ValidationError::new("university", "must not be empty"));
    }
    if let Some(end) = party.end_time {
        if end < party.start_time {
            return Err(ValidationError::new("endTime", "is before startTime"));
        }
    }
    if let Some(description) = &party.description {
        rules::check_description(description).map_err(|e| ValidationError::new("description", e))?;
    }
    Ok(())
}

fn party_from_row(row: &Row<'_>) -> rusqlite::Result<PartyRow> {
    Ok(PartyRow {
        id: row.get(0)?,
        formatted_address: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        male_cost: row.get(6)?,
        female_cost: row.get(7)?,
        byob: row.get(8)?,
        user_id: row.get(9)?,
        university: row.get(10)?,
        colloquial_name: row.get(11)?,
        description: row.get(12)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    query_user_where(conn, "u.id = ?1", id)
}

fn query_user_where(conn: &Connection, predicate: &'static str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT u.id, u.name, u.username, u.email, u.provider, u.password_hash, u.salt, u.created_at, f.fb_user_id
         FROM users u
         LEFT JOIN fb_logins f ON f.user_id = u.id
         WHERE {predicate}"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                username: row.get(2)?,
                email: row.get(3)?,
                provider: row.get(4)?,
                password_hash: row.get(5)?,
                salt: row.get(6)?,
                roles: Vec::new(),
                created_at: row.get(7)?,
                facebook_id: row.get(8)?,
            })
        })
        .optional()?;

    let Some(mut user) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
    user.roles = stmt
        .query_map([&user.id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Some(user))
}

fn query_fb_login_where(conn: &Connection, predicate: &'static str, value: &str) -> Result<Option<FbLoginRow>> {
    conn.query_row(
        &format!("SELECT id, user_id, fb_user_id, access_token FROM fb_logins WHERE {predicate}"),
        [value],
        |row| {
            Ok(FbLoginRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                fb_user_id: row.get(2)?,
                access_token: row.get(3)?,
            })
        },
    )
    .optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Constraint;
    use party_types::rules::{PROVIDER_FACEBOOK, ROLE_ADMIN};

    const HOUR_MS: i64 = 60 * 60 * 1000;

    fn local_user(email: &str, username: &str) -> NewUser {
        NewUser {
            name: "Full name".into(),
            username: username.into(),
            email: email.into(),
            provider: PROVIDER_LOCAL.into(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".into(),
            salt: "c2FsdA".into(),
            roles: vec![],
        }
    }

    fn seeded() -> (Database, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user(&local_user("test@test.com", "user")).unwrap();
        (db, user)
    }

    fn party_for(user: &UserRow, start_time: i64) -> PartyRow {
        PartyRow {
            id: Uuid::new_v4().to_string(),
            formatted_address: "629 South Woodlawn Avenue".into(),
            latitude: 73.2,
            longitude: -176.32,
            start_time,
            end_time: None,
            male_cost: 5,
            female_cost: 0,
            byob: true,
            user_id: user.id.clone(),
            university: "Indiana University".into(),
            colloquial_name: None,
            description: None,
        }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    #[test]
    fn saves_party_with_defaults() {
        let (db, user) = seeded();
        let party = party_for(&user, now_ms());
        db.insert_party(&party).unwrap();

        let stored = db.get_party(&party.id).unwrap().unwrap();
        assert_eq!(stored, party);
        assert_eq!(stored.female_cost, 0);
        assert!(stored.byob);
    }

    #[test]
    fn rejects_party_without_address() {
        let (db, user) = seeded();
        let mut party = party_for(&user, now_ms());
        party.formatted_address = String::new();

        let err = db.insert_party(&party).unwrap_err();
        assert_eq!(err.downcast_ref::<ValidationError>().unwrap().field, "formattedAddress");
        assert!(db.get_party(&party.id).unwrap().is_none());
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let (db, user) = seeded();
        let mut party = party_for(&user, now_ms());
        party.latitude = 34345.2;

        assert!(db.insert_party(&party).is_err());
    }

    #[test]
    fn rejects_party_without_owner() {
        let (db, user) = seeded();
        let mut party = party_for(&user, now_ms());
        party.user_id = String::new();
        assert!(db.insert_party(&party).is_err());

        party.user_id = Uuid::new_v4().to_string();
        let err = db.insert_party(&party).unwrap_err();
        assert_eq!(Constraint::of(&err), Some(Constraint::ForeignKey));
    }

    #[test]
    fn lists_only_current_parties() {
        let (db, user) = seeded();
        let now = now_ms();

        let too_old = party_for(&user, now - 14 * HOUR_MS);
        let too_far = party_for(&user, now + 72 * HOUR_MS);
        let young_enough = party_for(&user, now - 7 * HOUR_MS);
        let close_enough = party_for(&user, now + 47 * HOUR_MS);
        let mut elsewhere = party_for(&user, now);
        elsewhere.university = "Purdue University".into();

        for p in [&too_old, &too_far, &young_enough, &close_enough, &elsewhere] {
            db.insert_party(p).unwrap();
        }

        let listed: Vec<String> = db
            .list_current_parties("Indiana University", now - 12 * HOUR_MS, now + 48 * HOUR_MS)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(listed, vec![young_enough.id, close_enough.id]);
    }

    #[test]
    fn listing_agrees_with_is_current() {
        let (db, user) = seeded();
        let now = chrono::Utc::now();
        let at = |h: i64| (now + chrono::Duration::hours(h)).timestamp_millis();

        // (start, end) offsets in hours
        let windows = [(-20, None), (-20, Some(-13)), (-20, Some(-11)), (-2, Some(3)), (30, Some(60)), (49, None)];
        let mut expected = Vec::new();
        for (start, end) in windows {
            let mut party = party_for(&user, at(start));
            party.end_time = end.map(at);
            db.insert_party(&party).unwrap();

            let start = chrono::DateTime::from_timestamp_millis(party.start_time).unwrap();
            let end = party.end_time.and_then(chrono::DateTime::from_timestamp_millis);
            if rules::is_current(start, end, now) {
                expected.push(party.id);
            }
        }

        let (from, to) = rules::relevant_band(now);
        let listed: Vec<String> = db
            .list_current_parties("Indiana University", from.timestamp_millis(), to.timestamp_millis())
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();

        assert_eq!(expected.len(), 3);
        assert_eq!(listed, expected);
    }

    #[test]
    fn appends_words_in_order() {
        let (db, user) = seeded();
        let party = party_for(&user, now_ms());
        db.insert_party(&party).unwrap();

        for (i, body) in ["Nothing yet", "Heating up"].iter().enumerate() {
            let appended = db
                .append_word(&WordRow {
                    id: Uuid::new_v4().to_string(),
                    party_id: party.id.clone(),
                    body: body.to_string(),
                    created_at: 1_000 + i as i64,
                })
                .unwrap();
            assert!(appended);
        }

        let words = db.get_words(&party.id).unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].body, "Heating up");

        let missing = db
            .append_word(&WordRow {
                id: Uuid::new_v4().to_string(),
                party_id: Uuid::new_v4().to_string(),
                body: "hello".into(),
                created_at: 0,
            })
            .unwrap();
        assert!(!missing);
    }

    #[test]
    fn deleting_party_removes_words() {
        let (db, user) = seeded();
        let party = party_for(&user, now_ms());
        db.insert_party(&party).unwrap();
        db.append_word(&WordRow {
            id: Uuid::new_v4().to_string(),
            party_id: party.id.clone(),
            body: "Great keg just got here".into(),
            created_at: 1,
        })
        .unwrap();

        assert!(db.delete_party(&party.id).unwrap());
        assert!(db.get_words(&party.id).unwrap().is_empty());
        assert!(!db.delete_party(&party.id).unwrap());
    }

    #[test]
    fn user_save_assigns_authenticated_role_and_escapes() {
        let db = Database::open_in_memory().unwrap();
        let mut new_user = local_user("john.doe@example.com", "<b>xss</b>");
        new_user.name = "</script><script>alert(1)</script>".into();

        let user = db.create_user(&new_user).unwrap();
        assert_eq!(user.roles, vec![ROLE_AUTHENTICATED.to_string()]);
        assert!(!user.is_admin());
        assert_eq!(user.name, "&lt;/script&gt;&lt;script&gt;alert(1)&lt;/script&gt;");
        assert_eq!(user.username, "&lt;b&gt;xss&lt;/b&gt;");
        assert!(!user.password_hash.is_empty());
        assert!(!user.salt.is_empty());

        db.grant_role(&user.id, ROLE_ADMIN).unwrap();
        assert!(db.get_user_by_id(&user.id).unwrap().unwrap().is_admin());
    }

    #[test]
    fn rejects_invalid_users() {
        let db = Database::open_in_memory().unwrap();

        let bad_email = local_user("john..doe@example.com", "john");
        assert!(db.create_user(&bad_email).is_err());

        let mut no_name = local_user("a@example.com", "a");
        no_name.name = String::new();
        assert!(db.create_user(&no_name).is_err());

        let mut no_password = local_user("b@example.com", "b");
        no_password.password_hash = String::new();
        no_password.salt = String::new();
        assert!(db.create_user(&no_password).is_err());

        let mut twitter = no_password.clone();
        twitter.provider = "twitter".into();
        let user = db.create_user(&twitter).unwrap();
        assert!(user.password_hash.is_empty());
    }

    #[test]
    fn rejects_duplicate_user() {
        let db = Database::open_in_memory().unwrap();
        let user = local_user("dup@example.com", "dup");
        db.create_user(&user).unwrap();

        let err = db.create_user(&user).unwrap_err();
        assert_eq!(Constraint::of(&err), Some(Constraint::Unique));
    }

    #[test]
    fn facebook_user_is_reused_and_cascades() {
        let db = Database::open_in_memory().unwrap();
        let new_user = NewUser {
            name: "Facebook User".into(),
            username: "fb150901598586601".into(),
            email: "150901598586601@facebook.com".into(),
            provider: PROVIDER_FACEBOOK.into(),
            password_hash: String::new(),
            salt: String::new(),
            roles: vec![],
        };

        let (first, created) = db
            .get_or_create_facebook_user("150901598586601", "token-1", &new_user)
            .unwrap();
        assert!(created);
        assert_eq!(first.facebook_id.as_deref(), Some("150901598586601"));

        let (second, created) = db
            .get_or_create_facebook_user("150901598586601", "token-2", &new_user)
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert!(db.get_fb_login_by_token("token-1").unwrap().is_none());
        assert_eq!(db.get_fb_login_by_token("token-2").unwrap().unwrap().user_id, first.id);

        assert!(db.delete_user(&first.id).unwrap());
        assert!(db.get_fb_login("150901598586601").unwrap().is_none());
    }
}
