use crate::models::{NewSocialAccount, PostHistoryRow, PostRow, SocialAccountRow, UserRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::{Connection, Row};
use socialhub_types::models::PostStatus;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, password_hash, two_factor_enabled, two_factor_secret,
     is_verified, created_at";

const ACCOUNT_COLUMNS: &str = "id, user_id, provider, provider_id, username, access_token, refresh_token,
     expires_at, instance_url, created_at, connected_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, username, email, password_hash, now_timestamp()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Store a freshly generated TOTP secret. The enabled flag is untouched:
    /// the secret stays pending until a code is verified against it.
    pub fn set_two_factor_secret(&self, user_id: &str, secret: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET two_factor_secret = ?1 WHERE id = ?2",
                (secret, user_id),
            )?;
            Ok(())
        })
    }

    pub fn enable_two_factor(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET two_factor_enabled = 1 WHERE id = ?1", [user_id])?;
            Ok(())
        })
    }

    pub fn disable_two_factor(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET two_factor_enabled = 0, two_factor_secret = NULL WHERE id = ?1",
                [user_id],
            )?;
            Ok(())
        })
    }

    // -- Social accounts --

    /// Insert or refresh a social account in one statement.
    ///
    /// On conflict over (user, provider, provider_id) the tokens, username,
    /// instance URL and `connected_at` are replaced while `id` and
    /// `created_at` keep their original values. Returns the stored row and
    /// whether it was newly created.
    pub fn upsert_social_account(&self, account: &NewSocialAccount<'_>) -> Result<(SocialAccountRow, bool)> {
        let new_id = Uuid::new_v4().to_string();
        let now = now_timestamp();

        let row = self.with_conn(|conn| {
            let sql = format!(
                "INSERT INTO social_accounts
                    (id, user_id, provider, provider_id, username, access_token, refresh_token,
                     expires_at, instance_url, created_at, connected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT (user_id, provider, provider_id) DO UPDATE SET
                    username = excluded.username,
                    access_token = excluded.access_token,
                    refresh_token = excluded.refresh_token,
                    expires_at = excluded.expires_at,
                    instance_url = excluded.instance_url,
                    connected_at = excluded.connected_at
                 RETURNING {}",
                ACCOUNT_COLUMNS
            );

            let row = conn.query_row(
                &sql,
                rusqlite::params![
                    new_id,
                    account.user_id,
                    account.provider,
                    account.provider_id,
                    account.username,
                    account.access_token,
                    account.refresh_token,
                    account.expires_at,
                    account.instance_url,
                    now,
                ],
                map_account,
            )?;
            Ok(row)
        })?;

        let created = row.id == new_id;
        Ok((row, created))
    }

    pub fn get_social_account(&self, id: &str) -> Result<Option<SocialAccountRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM social_accounts WHERE id = ?1", ACCOUNT_COLUMNS);
            conn.query_row(&sql, [id], map_account).optional()
        })
    }

    /// All of a user's accounts, most recently connected first.
    pub fn get_social_accounts(&self, user_id: &str) -> Result<Vec<SocialAccountRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM social_accounts WHERE user_id = ?1 ORDER BY connected_at DESC",
                ACCOUNT_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_account)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// A user's accounts for one provider in insertion order, optionally
    /// narrowed to `ids`. Ids that belong to another user or provider are
    /// silently dropped.
    pub fn get_provider_accounts(
        &self,
        user_id: &str,
        provider: &str,
        ids: Option<&[String]>,
    ) -> Result<Vec<SocialAccountRow>> {
        self.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {} FROM social_accounts WHERE user_id = ?1 AND provider = ?2",
                ACCOUNT_COLUMNS
            );
            let mut params: Vec<&dyn rusqlite::types::ToSql> = vec![&user_id, &provider];

            if let Some(ids) = ids {
                if ids.is_empty() {
                    return Ok(vec![]);
                }
                let placeholders: Vec<String> = (3..3 + ids.len()).map(|i| format!("?{}", i)).collect();
                sql.push_str(&format!(" AND id IN ({})", placeholders.join(", ")));
                params.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));
            }
            sql.push_str(" ORDER BY created_at ASC, rowid ASC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), map_account)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete an account only if `user_id` owns it. Returns false when no
    /// such row exists for that owner.
    pub fn delete_social_account(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM social_accounts WHERE id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Posts --

    pub fn create_post(&self, id: &str, user_id: &str, content: &str, status: PostStatus) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, user_id, content, is_instant, status, created_at)
                 VALUES (?1, ?2, ?3, 1, ?4, ?5)",
                (id, user_id, content, status.as_str(), now_timestamp()),
            )?;
            Ok(())
        })
    }

    pub fn insert_post_history(
        &self,
        id: &str,
        post_id: &str,
        social_account_id: &str,
        result: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO post_history (id, post_id, social_account_id, published_at, result)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, post_id, social_account_id, now_timestamp(), result),
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, content, is_instant, scheduled_at, status, created_at
                 FROM posts WHERE id = ?1",
                [id],
                |row| {
                    Ok(PostRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        content: row.get(2)?,
                        is_instant: row.get(3)?,
                        scheduled_at: row.get(4)?,
                        status: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn get_post_history(&self, post_id: &str) -> Result<Vec<PostHistoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, post_id, social_account_id, published_at, result
                 FROM post_history WHERE post_id = ?1 ORDER BY published_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], |row| {
                    Ok(PostHistoryRow {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        social_account_id: row.get(2)?,
                        published_at: row.get(3)?,
                        result: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never user input.
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], |row| {
        Ok(UserRow {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            two_factor_enabled: row.get(4)?,
            two_factor_secret: row.get(5)?,
            is_verified: row.get(6)?,
            created_at: row.get(7)?,
        })
    })
    .optional()
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<SocialAccountRow> {
    Ok(SocialAccountRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        provider_id: row.get(3)?,
        username: row.get(4)?,
        access_token: row.get(5)?,
        refresh_token: row.get(6)?,
        expires_at: row.get(7)?,
        instance_url: row.get(8)?,
        created_at: row.get(9)?,
        connected_at: row.get(10)?,
    })
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
    use crate::is_unique_violation;

    fn db_with_user(id: &str, username: &str) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user(id, username, &format!("{}@example.com", username), "hash").unwrap();
        db
    }

    fn account<'a>(user_id: &'a str, provider: &'a str, provider_id: &'a str, token: &'a str) -> NewSocialAccount<'a> {
        NewSocialAccount {
            user_id,
            provider,
            provider_id,
            username: "alice",
            access_token: token,
            refresh_token: None,
            expires_at: None,
            instance_url: Some("https://mastodon.example"),
        }
    }

    #[test]
    fn duplicate_email_is_a_unique_violation() {
        let db = db_with_user("u1", "alice");
        let err = db.create_user("u2", "bob", "alice@example.com", "hash").unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(db.get_user_by_id("u2").unwrap().is_none());
    }

    #[test]
    fn users_are_found_by_each_key() {
        let db = db_with_user("u1", "alice");
        assert_eq!(db.get_user_by_email("alice@example.com").unwrap().unwrap().id, "u1");
        assert_eq!(db.get_user_by_username("alice").unwrap().unwrap().id, "u1");

        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert!(!user.two_factor_enabled);
        assert!(!user.is_verified);
        assert!(user.two_factor_secret.is_none());
        assert_eq!(user.email, "alice@example.com");
        assert!(user.created_at.ends_with('Z'));
    }

    #[test]
    fn two_factor_secret_stays_pending_until_enabled() {
        let db = db_with_user("u1", "alice");
        db.set_two_factor_secret("u1", "SECRET").unwrap();
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert_eq!(user.two_factor_secret.as_deref(), Some("SECRET"));
        assert!(!user.two_factor_enabled);

        db.enable_two_factor("u1").unwrap();
        assert!(db.get_user_by_id("u1").unwrap().unwrap().two_factor_enabled);

        db.disable_two_factor("u1").unwrap();
        let user = db.get_user_by_id("u1").unwrap().unwrap();
        assert!(!user.two_factor_enabled);
        assert!(user.two_factor_secret.is_none());
    }

    #[test]
    fn upsert_updates_in_place_for_same_identity() {
        let db = db_with_user("u1", "alice");

        let (first, created) = db.upsert_social_account(&account("u1", "mastodon", "42", "token-1")).unwrap();
        assert!(created);

        let mut second_input = account("u1", "mastodon", "42", "token-2");
        second_input.refresh_token = Some("refresh-2");
        let (second, created) = db.upsert_social_account(&second_input).unwrap();
        assert!(!created);

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.access_token, "token-2");
        assert_eq!(second.refresh_token.as_deref(), Some("refresh-2"));
        assert!(second.connected_at >= first.connected_at);
        assert_eq!(db.get_social_accounts("u1").unwrap().len(), 1);
    }

    #[test]
    fn upsert_keeps_distinct_identities_apart() {
        let db = db_with_user("u1", "alice");
        db.create_user("u2", "bob", "bob@example.com", "hash").unwrap();

        db.upsert_social_account(&account("u1", "mastodon", "42", "a")).unwrap();
        db.upsert_social_account(&account("u1", "reddit", "42", "b")).unwrap();
        db.upsert_social_account(&account("u2", "mastodon", "42", "c")).unwrap();

        assert_eq!(db.get_social_accounts("u1").unwrap().len(), 2);
        assert_eq!(db.get_social_accounts("u2").unwrap().len(), 1);
    }

    #[test]
    fn provider_accounts_are_filtered_by_owner_provider_and_ids() {
        let db = db_with_user("u1", "alice");
        db.create_user("u2", "bob", "bob@example.com", "hash").unwrap();

        let (a, _) = db.upsert_social_account(&account("u1", "mastodon", "1", "t")).unwrap();
        let (b, _) = db.upsert_social_account(&account("u1", "mastodon", "2", "t")).unwrap();
        let (r, _) = db.upsert_social_account(&account("u1", "reddit", "3", "t")).unwrap();
        let (other, _) = db.upsert_social_account(&account("u2", "mastodon", "4", "t")).unwrap();

        let all = db.get_provider_accounts("u1", "mastodon", None).unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![a.id.as_str(), b.id.as_str()]);

        let picked = db
            .get_provider_accounts("u1", "mastodon", Some(&[b.id.clone(), r.id.clone(), other.id.clone()]))
            .unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].id, b.id);

        assert!(db.get_provider_accounts("u1", "mastodon", Some(&[])).unwrap().is_empty());
    }

    #[test]
    fn delete_requires_ownership() {
        let db = db_with_user("u1", "alice");
        db.create_user("u2", "bob", "bob@example.com", "hash").unwrap();
        let (acc, _) = db.upsert_social_account(&account("u1", "mastodon", "1", "t")).unwrap();

        assert!(!db.delete_social_account(&acc.id, "u2").unwrap());
        assert!(db.get_social_account(&acc.id).unwrap().is_some());

        assert!(db.delete_social_account(&acc.id, "u1").unwrap());
        assert!(db.get_social_account(&acc.id).unwrap().is_none());
    }

    #[test]
    fn history_survives_account_disconnect() {
        let db = db_with_user("u1", "alice");
        let (acc, _) = db.upsert_social_account(&account("u1", "mastodon", "1", "t")).unwrap();

        db.create_post("p1", "u1", "hello", PostStatus::Published).unwrap();
        db.insert_post_history("h1", "p1", &acc.id, r#"{"success":true}"#).unwrap();
        db.delete_social_account(&acc.id, "u1").unwrap();

        let post = db.get_post("p1").unwrap().unwrap();
        assert_eq!(post.status, "published");
        assert!(post.is_instant);

        let history = db.get_post_history("p1").unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].social_account_id.is_none());
    }
}
