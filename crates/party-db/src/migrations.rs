use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL CHECK (length(name) > 0),
            username        TEXT NOT NULL UNIQUE CHECK (length(username) > 0),
            email           TEXT NOT NULL UNIQUE,
            provider        TEXT NOT NULL DEFAULT 'local',
            password_hash   TEXT NOT NULL DEFAULT '',
            salt            TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            -- local accounts must carry a password
            CHECK (provider <> 'local' OR (length(password_hash) > 0 AND length(salt) > 0))
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role        TEXT NOT NULL,
            PRIMARY KEY (user_id, role)
        );

        CREATE TABLE IF NOT EXISTS fb_logins (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            fb_user_id      TEXT NOT NULL UNIQUE,
            access_token    TEXT NOT NULL,
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_fb_logins_token
            ON fb_logins(access_token);

        -- times are unix milliseconds
        CREATE TABLE IF NOT EXISTS parties (
            id                  TEXT PRIMARY KEY,
            formatted_address   TEXT NOT NULL CHECK (length(trim(formatted_address)) > 0),
            latitude            REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
            longitude           REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
            start_time          INTEGER NOT NULL,
            end_time            INTEGER CHECK (end_time IS NULL OR end_time >= start_time),
            male_cost           INTEGER NOT NULL DEFAULT 0 CHECK (male_cost >= 0),
            female_cost         INTEGER NOT NULL DEFAULT 0 CHECK (female_cost >= 0),
            byob                INTEGER NOT NULL DEFAULT 1,
            user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            university          TEXT NOT NULL CHECK (length(university) > 0),
            colloquial_name     TEXT,
            description         TEXT CHECK (description IS NULL OR length(description) <= 256),
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_parties_university
            ON parties(university, start_time);

        CREATE TABLE IF NOT EXISTS words (
            id          TEXT PRIMARY KEY,
            party_id    TEXT NOT NULL REFERENCES parties(id) ON DELETE CASCADE,
            body        TEXT NOT NULL CHECK (length(trim(body)) > 0),
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_words_party
            ON words(party_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
