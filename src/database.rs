use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::models::{Comment, FeedFilter, Follow, Group, Post, User, UserUpdate};

// Async database layer with an SQLx connection pool. All SQL lives here;
// handlers only see typed rows.
pub struct Database {
    pub pool: SqlitePool,
}

const POST_SELECT: &str = "SELECT p.id, p.text, p.created, p.author_id, \
     u.username AS author_username, p.group_id, g.slug AS group_slug, p.image \
     FROM posts p \
     JOIN users u ON u.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id";

impl Database {
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Internal(format!("bad database url: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Database { pool })
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::Internal(format!("bad database url: {}", e)))?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Database { pool })
    }

    pub async fn init(&self) -> AppResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                first_name TEXT NOT NULL DEFAULT '',
                last_name TEXT NOT NULL DEFAULT '',
                password_hash TEXT NOT NULL,
                profile_picture TEXT,
                created INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Deleting an author removes their posts; deleting a group only
        // detaches it from posts.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY,
                text TEXT NOT NULL CHECK(length(text) > 0),
                created INTEGER NOT NULL,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id INTEGER REFERENCES groups(id) ON DELETE SET NULL,
                image TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                text TEXT NOT NULL CHECK(length(text) > 0 AND length(text) <= 500),
                created INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS follows (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                UNIQUE(user_id, author_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        // Feed queries order by creation time and filter by author/group.
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created DESC, id DESC)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_group ON posts(group_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_follows_user ON follows(user_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---- users ----

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        first_name: &str,
        last_name: &str,
        password_hash: &str,
    ) -> AppResult<User> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, created) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Validation("username already taken".to_string())
            }
            _ => e.into(),
        })?;

        let id = result.last_insert_rowid();
        self.get_user(id)
            .await?
            .ok_or_else(|| AppError::Internal("user vanished after insert".to_string()))
    }

    pub async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_user(&r)))
    }

    pub async fn update_user(&self, id: i64, update: &UserUpdate) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET username = ?, email = ?, first_name = ?, last_name = ?, \
             profile_picture = COALESCE(?, profile_picture) WHERE id = ?",
        )
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.profile_picture)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Validation("username already taken".to_string())
            }
            _ => e.into(),
        })?;
        Ok(())
    }

    pub async fn delete_user(&self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- groups ----

    pub async fn create_group(
        &self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> AppResult<Group> {
        let result = sqlx::query("INSERT INTO groups (title, slug, description) VALUES (?, ?, ?)")
            .bind(title)
            .bind(slug)
            .bind(description)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AppError::Validation("slug already taken".to_string())
                }
                _ => e.into(),
            })?;
        Ok(Group {
            id: result.last_insert_rowid(),
            title: title.to_string(),
            slug: slug.to_string(),
            description: description.to_string(),
        })
    }

    pub async fn get_group(&self, id: i64) -> AppResult<Option<Group>> {
        let row = sqlx::query("SELECT * FROM groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_group(&r)))
    }

    pub async fn get_group_by_slug(&self, slug: &str) -> AppResult<Option<Group>> {
        let row = sqlx::query("SELECT * FROM groups WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| row_to_group(&r)))
    }

    pub async fn delete_group(&self, id: i64) -> AppResult<()> {
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- posts ----

    pub async fn create_post(
        &self,
        author_id: i64,
        text: &str,
        group_id: Option<i64>,
        image: Option<&str>,
    ) -> AppResult<Post> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            "INSERT INTO posts (text, created, author_id, group_id, image) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(text)
        .bind(now)
        .bind(author_id)
        .bind(group_id)
        .bind(image)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_post(id)
            .await?
            .ok_or_else(|| AppError::Internal("post vanished after insert".to_string()))
    }

    pub async fn get_post(&self, id: i64) -> AppResult<Option<Post>> {
        let sql = format!("{} WHERE p.id = ?", POST_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_post(&r)))
    }

    /// Updates everything but the author and the creation timestamp. A
    /// `None` image keeps whatever was stored before.
    pub async fn update_post(
        &self,
        id: i64,
        text: &str,
        group_id: Option<i64>,
        image: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE posts SET text = ?, group_id = ?, image = COALESCE(?, image) WHERE id = ?",
        )
        .bind(text)
        .bind(group_id)
        .bind(image)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn count_posts(&self, filter: FeedFilter) -> AppResult<i64> {
        let (condition, bind) = feed_condition(filter);
        let sql = format!("SELECT COUNT(*) FROM posts p {}", condition);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        Ok(query.fetch_one(&self.pool).await?)
    }

    /// One page of a feed, newest first (id breaks same-second ties).
    pub async fn list_posts(
        &self,
        filter: FeedFilter,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Post>> {
        let (condition, bind) = feed_condition(filter);
        let sql = format!(
            "{} {} ORDER BY p.created DESC, p.id DESC LIMIT ? OFFSET ?",
            POST_SELECT, condition
        );
        let mut query = sqlx::query(&sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.bind(limit).bind(offset).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_post).collect())
    }

    pub async fn count_posts_by_author(&self, author_id: i64) -> AppResult<i64> {
        self.count_posts(FeedFilter::Author(author_id)).await
    }

    // ---- comments ----

    pub async fn create_comment(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
    ) -> AppResult<Comment> {
        let now = chrono::Utc::now().timestamp();
        let result =
            sqlx::query("INSERT INTO comments (post_id, author_id, text, created) VALUES (?, ?, ?, ?)")
                .bind(post_id)
                .bind(author_id)
                .bind(text)
                .bind(now)
                .execute(&self.pool)
                .await?;

        let id = result.last_insert_rowid();
        let row = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, u.username AS author_username, c.text, c.created \
             FROM comments c JOIN users u ON u.id = c.author_id WHERE c.id = ?",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row_to_comment(&row))
    }

    pub async fn comments_for_post(&self, post_id: i64) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT c.id, c.post_id, c.author_id, u.username AS author_username, c.text, c.created \
             FROM comments c JOIN users u ON u.id = c.author_id \
             WHERE c.post_id = ? ORDER BY c.created ASC, c.id ASC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    // ---- follows ----

    /// Inserts a follow edge. A duplicate (user, author) pair is rejected
    /// with `Conflict`; following yourself is not prevented.
    pub async fn create_follow(&self, user_id: i64, author_id: i64) -> AppResult<Follow> {
        let result = sqlx::query("INSERT INTO follows (user_id, author_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    AppError::Conflict("already following this author".to_string())
                }
                _ => e.into(),
            })?;
        Ok(Follow {
            id: result.last_insert_rowid(),
            user_id,
            author_id,
        })
    }

    /// Removes a follow edge; returns whether one existed.
    pub async fn delete_follow(&self, user_id: i64, author_id: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM follows WHERE user_id = ? AND author_id = ?")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_following(&self, user_id: i64, author_id: i64) -> AppResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM follows WHERE user_id = ? AND author_id = ?",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}

fn feed_condition(filter: FeedFilter) -> (&'static str, Option<i64>) {
    match filter {
        FeedFilter::All => ("", None),
        FeedFilter::Group(id) => ("WHERE p.group_id = ?", Some(id)),
        FeedFilter::Author(id) => ("WHERE p.author_id = ?", Some(id)),
        FeedFilter::FollowedBy(id) => (
            "WHERE p.author_id IN (SELECT author_id FROM follows WHERE user_id = ?)",
            Some(id),
        ),
    }
}

fn row_to_user(row: &SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        password_hash: row.get("password_hash"),
        profile_picture: row.get("profile_picture"),
        created: row.get("created"),
    }
}

fn row_to_group(row: &SqliteRow) -> Group {
    Group {
        id: row.get("id"),
        title: row.get("title"),
        slug: row.get("slug"),
        description: row.get("description"),
    }
}

fn row_to_post(row: &SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        text: row.get("text"),
        created: row.get("created"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        group_id: row.get("group_id"),
        group_slug: row.get("group_slug"),
        image: row.get("image"),
    }
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        author_id: row.get("author_id"),
        author_username: row.get("author_username"),
        text: row.get("text"),
        created: row.get("created"),
    }
}
