//! SQLite-backed job, user, and score store.
//!
//! The store is the only resource mutated by multiple workers at once. The
//! claim operation is a single conditional `UPDATE ... RETURNING` statement,
//! so under any number of concurrent callers exactly one of them receives a
//! given waiting job.

use std::fs;
use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::create_timestamp;
use crate::verdict::{STATUS_PENDING, STATUS_WAITING, Verdict};

const DATABASE_NAME: &str = "judged.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "judged").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(4)
        .min_connections(0) // Allow pool to shrink when idle
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;", // Balance between safety and performance
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS jobs (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            username      TEXT     NOT NULL,
            question      TEXT     NOT NULL,
            code          TEXT     NOT NULL,
            lang          TEXT     NOT NULL,
            status        TEXT     NOT NULL DEFAULT 'waiting',
            submitted     TEXT     NOT NULL
        );",
        "CREATE INDEX IF NOT EXISTS idx_jobs_status_submitted ON jobs(status, submitted);",
        r"
        CREATE TABLE IF NOT EXISTS users (
            id               INTEGER  PRIMARY KEY AUTOINCREMENT,
            username         TEXT     NOT NULL UNIQUE,
            hashed_password  TEXT     NOT NULL,
            salt             TEXT     NOT NULL,
            score            INTEGER  NOT NULL DEFAULT 0
        );",
        r"
        CREATE TABLE IF NOT EXISTS scores (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            username      TEXT     NOT NULL,
            question      TEXT     NOT NULL,
            score         INTEGER  NOT NULL,
            submitted     TEXT     NOT NULL,
            UNIQUE (username, question)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// One claimed submission, as handed to a dispatcher worker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    pub id: i64,
    pub username: String,
    pub question: String,
    pub code: String,
    pub lang: String,
    pub submitted: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub hashed_password: String,
    pub salt: String,
    pub score: i64,
}

/// Inserts a new submission in `waiting` state and returns its id.
///
/// Intake itself is external to the judge; this is the write path it (and
/// the tests) use.
pub async fn enqueue(
    pool: &SqlitePool,
    username: &str,
    question: &str,
    code: &str,
    lang: &str,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO jobs (username, question, code, lang, status, submitted)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(question)
    .bind(code)
    .bind(lang)
    .bind(STATUS_WAITING)
    .bind(create_timestamp())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Atomically claims the oldest `waiting` job: flips it to `pending` and
/// returns it, or returns `None` when nothing is waiting.
///
/// This single statement is the sole correctness boundary preventing two
/// workers from judging the same submission; the inner `status` guard makes
/// the update match at most one row even when racing claimers picked the
/// same candidate.
pub async fn claim_next(pool: &SqlitePool) -> sqlx::Result<Option<Job>> {
    sqlx::query_as::<_, Job>(
        r#"
        UPDATE jobs
        SET status = ?
        WHERE status = ?
          AND id = (
            SELECT id FROM jobs WHERE status = ? ORDER BY submitted, id LIMIT 1
          )
        RETURNING id, username, question, code, lang, submitted
        "#,
    )
    .bind(STATUS_PENDING)
    .bind(STATUS_WAITING)
    .bind(STATUS_WAITING)
    .fetch_optional(pool)
    .await
}

/// Persists the terminal verdict for a claimed job.
///
/// Guarded on `pending` so a verdict is write-once: returns `false` when the
/// job already carried a terminal status (or was never claimed).
pub async fn finish(pool: &SqlitePool, id: i64, verdict: Verdict) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE jobs SET status = ? WHERE id = ? AND status = ?")
        .bind(verdict.as_str())
        .bind(id)
        .bind(STATUS_PENDING)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn job_status(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Whether any user has an accepted score for this question yet
/// (system-wide first-solver check).
pub async fn question_solved(pool: &SqlitePool, question: &str) -> sqlx::Result<bool> {
    let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM scores WHERE question = ? LIMIT 1")
        .bind(question)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn score_exists(pool: &SqlitePool, username: &str, question: &str) -> sqlx::Result<bool> {
    let row: Option<i32> =
        sqlx::query_scalar("SELECT 1 FROM scores WHERE username = ? AND question = ? LIMIT 1")
            .bind(username)
            .bind(question)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Creates the score record for `(username, question)` if it does not exist
/// yet. Returns whether the insert actually landed; the unique index makes
/// this effectively exactly-once even under racing workers.
pub async fn insert_score(
    pool: &SqlitePool,
    username: &str,
    question: &str,
    score: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO scores (username, question, score, submitted)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(question)
    .bind(score)
    .bind(create_timestamp())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Adds `delta` to the user's running total in a single statement.
pub async fn add_user_score(pool: &SqlitePool, username: &str, delta: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE users SET score = score + ? WHERE username = ?")
        .bind(delta)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn username_exists(pool: &SqlitePool, username: &str) -> sqlx::Result<bool> {
    let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    hashed_password: &str,
    salt: &str,
) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO users (username, hashed_password, salt) VALUES (?, ?, ?)")
            .bind(username)
            .bind(hashed_password)
            .bind(salt)
            .execute(pool)
            .await?;

    Ok(result.last_insert_rowid())
}

pub async fn fetch_user(pool: &SqlitePool, username: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>(
        "SELECT id, username, hashed_password, salt, score FROM users WHERE username = ?",
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}
