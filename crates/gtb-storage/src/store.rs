use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row};

use gtb_core::{
    domain::{
        AccountId, BoardId, BoardRole, CategoryId, ChatId, ChatIdentity, Goal, GoalCategory,
        GoalId,
    },
    ports::GoalStore,
    Error, Result,
};

pub type DbPool = Pool<SqliteConnectionManager>;
type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Schema shared with the web application. Idempotent so opening an
/// existing database is a no-op.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS boards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS board_participants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    board_id INTEGER NOT NULL REFERENCES boards(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    role INTEGER NOT NULL DEFAULT 1,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    UNIQUE (board_id, user_id)
);

CREATE TABLE IF NOT EXISTS goal_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    board_id INTEGER NOT NULL REFERENCES boards(id),
    title TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    category_id INTEGER NOT NULL REFERENCES goal_categories(id),
    title TEXT NOT NULL,
    description TEXT,
    status INTEGER NOT NULL DEFAULT 1,
    priority INTEGER NOT NULL DEFAULT 2,
    due_date TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created TEXT NOT NULL,
    updated TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tg_users (
    chat_id INTEGER PRIMARY KEY,
    user_id INTEGER REFERENCES users(id),
    tg_user_id INTEGER,
    username TEXT,
    verification_code TEXT
);
";

pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Open (or create) the database file and bootstrap the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_manager(SqliteConnectionManager::file(path.as_ref()), 10)
    }

    /// Fully in-memory database for tests. Pool size 1 so every caller
    /// sees the same database; each in-memory connection is otherwise its
    /// own empty universe.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_manager(SqliteConnectionManager::memory(), 1)
    }

    fn from_manager(manager: SqliteConnectionManager, max_size: u32) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(max_size)
            .build(manager)
            .map_err(pool_err)?;
        let store = Self { pool };
        store.conn()?.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(store)
    }

    fn conn(&self) -> Result<DbConnection> {
        self.pool.get().map_err(pool_err)
    }

    fn load_chat(&self, chat_id: ChatId) -> Result<ChatIdentity> {
        self.conn()?
            .query_row(
                "SELECT chat_id, user_id, tg_user_id, username, verification_code
                 FROM tg_users WHERE chat_id = ?1",
                params![chat_id.0],
                chat_identity_from_row,
            )
            .map_err(db_err)
    }

    // Seed operations for the surrounding application and the test suite.

    pub fn create_account(&self, username: &str) -> Result<AccountId> {
        let conn = self.conn()?;
        conn.execute("INSERT INTO users (username) VALUES (?1)", params![username])
            .map_err(db_err)?;
        Ok(AccountId(conn.last_insert_rowid()))
    }

    pub fn create_board(&self, title: &str) -> Result<BoardId> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO boards (title, created, updated) VALUES (?1, ?2, ?2)",
            params![title, now],
        )
        .map_err(db_err)?;
        Ok(BoardId(conn.last_insert_rowid()))
    }

    pub fn add_participant(
        &self,
        board: BoardId,
        account: AccountId,
        role: BoardRole,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "INSERT INTO board_participants (board_id, user_id, role, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![board.0, account.0, role as i64, now],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn create_category(
        &self,
        board: BoardId,
        owner: AccountId,
        title: &str,
    ) -> Result<CategoryId> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO goal_categories (user_id, board_id, title, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![owner.0, board.0, title, now],
        )
        .map_err(db_err)?;
        Ok(CategoryId(conn.last_insert_rowid()))
    }

    pub fn soft_delete_category(&self, category: CategoryId) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE goal_categories SET is_deleted = 1 WHERE id = ?1",
                params![category.0],
            )
            .map_err(db_err)?;
        Ok(())
    }

    pub fn soft_delete_goal(&self, goal: GoalId) -> Result<()> {
        self.conn()?
            .execute("UPDATE goals SET is_deleted = 1 WHERE id = ?1", params![goal.0])
            .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl GoalStore for SqliteStore {
    async fn get_or_create_chat(
        &self,
        chat_id: ChatId,
        tg_user_id: Option<i64>,
        username: Option<&str>,
    ) -> Result<ChatIdentity> {
        // INSERT OR IGNORE keeps concurrent first contacts from the same
        // chat down to a single row.
        self.conn()?
            .execute(
                "INSERT OR IGNORE INTO tg_users (chat_id, tg_user_id, username)
                 VALUES (?1, ?2, ?3)",
                params![chat_id.0, tg_user_id, username],
            )
            .map_err(db_err)?;
        self.load_chat(chat_id)
    }

    async fn set_verification_code(&self, chat_id: ChatId, code: &str) -> Result<()> {
        self.conn()?
            .execute(
                "UPDATE tg_users SET verification_code = ?1 WHERE chat_id = ?2",
                params![code, chat_id.0],
            )
            .map_err(db_err)?;
        Ok(())
    }

    async fn link_account(&self, code: &str, account: AccountId) -> Result<Option<ChatIdentity>> {
        let conn = self.conn()?;
        let chat_id: Option<i64> = conn
            .query_row(
                "SELECT chat_id FROM tg_users
                 WHERE verification_code = ?1 AND user_id IS NULL",
                params![code],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        let Some(chat_id) = chat_id else {
            return Ok(None);
        };

        // Guarded again so a concurrent link of the same chat loses cleanly.
        let updated = conn
            .execute(
                "UPDATE tg_users SET user_id = ?1 WHERE chat_id = ?2 AND user_id IS NULL",
                params![account.0, chat_id],
            )
            .map_err(db_err)?;
        if updated == 0 {
            return Ok(None);
        }

        // Release the pooled connection before load_chat reacquires one;
        // the in-memory test pool holds a single connection.
        drop(conn);
        self.load_chat(ChatId(chat_id)).map(Some)
    }

    async fn goals_for_account(&self, account: AccountId) -> Result<Vec<Goal>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT g.id, g.category_id, g.title
                 FROM goals g
                 JOIN goal_categories c ON c.id = g.category_id
                 JOIN board_participants p ON p.board_id = c.board_id
                 WHERE p.user_id = ?1 AND g.is_deleted = 0
                 ORDER BY g.id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![account.0], goal_from_row)
            .map_err(db_err)?;
        collect_rows(rows)
    }

    async fn categories_for_account(&self, account: AccountId) -> Result<Vec<GoalCategory>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.board_id, c.title
                 FROM goal_categories c
                 JOIN board_participants p ON p.board_id = c.board_id
                 WHERE p.user_id = ?1 AND c.is_deleted = 0
                 ORDER BY c.id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![account.0], category_from_row)
            .map_err(db_err)?;
        collect_rows(rows)
    }

    async fn category_for_account(
        &self,
        account: AccountId,
        category: CategoryId,
    ) -> Result<Option<GoalCategory>> {
        self.conn()?
            .query_row(
                "SELECT c.id, c.board_id, c.title
                 FROM goal_categories c
                 JOIN board_participants p ON p.board_id = c.board_id
                 WHERE p.user_id = ?1 AND c.id = ?2 AND c.is_deleted = 0",
                params![account.0, category.0],
                category_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    async fn board_role(&self, account: AccountId, board: BoardId) -> Result<Option<BoardRole>> {
        let raw: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT role FROM board_participants WHERE board_id = ?1 AND user_id = ?2",
                params![board.0, account.0],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match raw {
            None => Ok(None),
            Some(value) => BoardRole::from_i64(value)
                .map(Some)
                .ok_or_else(|| Error::Storage(format!("unknown board role {value}"))),
        }
    }

    async fn create_goal(
        &self,
        account: AccountId,
        category: CategoryId,
        title: &str,
    ) -> Result<Goal> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO goals (user_id, category_id, title, created, updated)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![account.0, category.0, title, now],
        )
        .map_err(db_err)?;
        Ok(Goal {
            id: GoalId(conn.last_insert_rowid()),
            category,
            title: title.to_string(),
        })
    }
}

fn chat_identity_from_row(row: &Row<'_>) -> rusqlite::Result<ChatIdentity> {
    Ok(ChatIdentity {
        chat_id: ChatId(row.get(0)?),
        account: row.get::<_, Option<i64>>(1)?.map(AccountId),
        tg_user_id: row.get(2)?,
        username: row.get(3)?,
        verification_code: row.get(4)?,
    })
}

fn goal_from_row(row: &Row<'_>) -> rusqlite::Result<Goal> {
    Ok(Goal {
        id: GoalId(row.get(0)?),
        category: CategoryId(row.get(1)?),
        title: row.get(2)?,
    })
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<GoalCategory> {
    Ok(GoalCategory {
        id: CategoryId(row.get(0)?),
        board: BoardId(row.get(1)?),
        title: row.get(2)?,
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    rows.collect::<rusqlite::Result<Vec<T>>>().map_err(db_err)
}

fn db_err(err: rusqlite::Error) -> Error {
    Error::Storage(err.to_string())
}

fn pool_err(err: r2d2::Error) -> Error {
    Error::Storage(err.to_string())
}
