use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, social accounts)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                username            TEXT NOT NULL UNIQUE,
                email               TEXT NOT NULL UNIQUE,
                password_hash       TEXT NOT NULL,
                two_factor_enabled  INTEGER NOT NULL DEFAULT 0,
                two_factor_secret   TEXT,
                google_id           TEXT UNIQUE,
                facebook_id         TEXT UNIQUE,
                avatar              TEXT,
                is_verified         INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            CREATE TABLE social_accounts (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                provider        TEXT NOT NULL,
                provider_id     TEXT NOT NULL,
                username        TEXT NOT NULL,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT,
                expires_at      TEXT,
                instance_url    TEXT,
                created_at      TEXT NOT NULL,
                connected_at    TEXT NOT NULL,
                UNIQUE(user_id, provider, provider_id)
            );

            CREATE INDEX idx_social_accounts_user
                ON social_accounts(user_id, provider);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        // post_queue and schedules back a deferred-posting feature that has
        // no worker yet; nothing reads or writes them.
        info!("Running migration v2 (posts, history, queue, schedules)");
        conn.execute_batch(
            "
            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                is_instant      INTEGER NOT NULL DEFAULT 1,
                scheduled_at    TEXT,
                status          TEXT NOT NULL DEFAULT 'pending'
                                CHECK (status IN ('pending', 'published', 'failed')),
                created_at      TEXT NOT NULL
            );

            CREATE TABLE post_history (
                id                  TEXT PRIMARY KEY,
                post_id             TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                social_account_id   TEXT REFERENCES social_accounts(id) ON DELETE SET NULL,
                published_at        TEXT NOT NULL,
                result              TEXT
            );

            CREATE INDEX idx_post_history_post
                ON post_history(post_id);

            CREATE TABLE post_queue (
                id          TEXT PRIMARY KEY,
                post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                queued_at   TEXT NOT NULL,
                process_at  TEXT NOT NULL,
                processed   INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE schedules (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                day_of_week INTEGER NOT NULL CHECK (day_of_week BETWEEN 0 AND 6),
                time_of_day TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('users', 'social_accounts', 'posts', 'post_history', 'post_queue', 'schedules')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
    }
}
