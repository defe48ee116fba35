use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use chrono::{DateTime, Utc};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use thiserror::Error;

use crate::polls::{Choice, Question};
use crate::util::{decode_timestamp, encode_timestamp, is_storable};

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No such question")]
    NoSuchQuestion,
    #[error("Database query error: {0:?}")]
    Query(rusqlite::Error),
    #[error("Database insert error: {0:?}")]
    Insert(rusqlite::Error),
    #[error("Timestamp cannot be stored: {0}")]
    UnstorableTimestamp(DateTime<Utc>),
    #[error("Database connection error: {0:?}")]
    Connection(r2d2::Error),
    #[error("Database migration {0} failed: {1:?}")]
    Migration(usize, rusqlite::Error),
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::NoSuchQuestion => StatusCode::NOT_FOUND,
            Error::UnstorableTimestamp(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            Error::NoSuchQuestion => crate::error::UserError::NotFound.error_response(),
            Error::UnstorableTimestamp(_) => HttpResponse::BadRequest()
                .content_type("text/plain; charset=utf-8")
                .body(self.to_string()),
            other => {
                log::error!("{}", other);
                HttpResponse::InternalServerError()
                    .content_type("text/plain; charset=utf-8")
                    .body("Internal server error. Try again later")
            }
        }
    }
}

/// Schema migrations, applied in order. `PRAGMA user_version` holds the number
/// of migrations already applied to a database.
const MIGRATIONS: &[&str] = &[
    "CREATE TABLE questions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_text VARCHAR(200) NOT NULL,
        pub_date TEXT NOT NULL
    );
    CREATE TABLE choices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        question_id INTEGER NOT NULL REFERENCES questions (id) ON DELETE CASCADE,
        choice_text VARCHAR(200) NOT NULL,
        votes INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE INDEX questions_pub_date ON questions (pub_date);
    CREATE INDEX choices_question_id ON choices (question_id);",
];

/// Connection manager for a database file.
/// Every connection has foreign keys on, which cascading deletes rely on.
pub fn file_manager(path: &std::path::Path) -> SqliteConnectionManager {
    SqliteConnectionManager::file(path).with_init(enable_foreign_keys)
}

fn enable_foreign_keys(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}

/// Builds a pool of at most `max_size` connections and brings the schema up to date
pub fn open(manager: SqliteConnectionManager, max_size: u32) -> Result<DbPool, Error> {
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(Error::Connection)?;

    let mut conn = pool.get().map_err(Error::Connection)?;
    let applied = migrate(&mut conn)?;
    if applied > 0 {
        log::info!("Applied {} database migration(s)", applied);
    }
    drop(conn);

    Ok(pool)
}

/// Runs pending migrations, each in its own transaction.
/// Returns the number of migrations applied.
pub fn migrate(conn: &mut Connection) -> Result<usize, Error> {
    let version: usize = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| Error::Migration(0, e))?;

    for (i, sql) in MIGRATIONS.iter().enumerate().skip(version) {
        let n = i + 1;
        log::debug!("Running migration {}", n);
        let tx = conn.transaction().map_err(|e| Error::Migration(n, e))?;
        tx.execute_batch(sql).map_err(|e| Error::Migration(n, e))?;
        // PRAGMA does not take bound parameters
        tx.execute_batch(&format!("PRAGMA user_version = {}", n))
            .map_err(|e| Error::Migration(n, e))?;
        tx.commit().map_err(|e| Error::Migration(n, e))?;
    }

    Ok(MIGRATIONS.len().saturating_sub(version))
}

fn question_from_row(row: &Row) -> Result<Question, rusqlite::Error> {
    use rusqlite::types::Type;
    Ok(Question {
        id: row.get(0)?,
        question_text: row.get(1)?,
        pub_date: decode_timestamp(&row.get::<_, String>(2)?)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?,
    })
}

fn choice_from_row(row: &Row) -> Result<Choice, rusqlite::Error> {
    Ok(Choice {
        id: row.get(0)?,
        question_id: row.get(1)?,
        choice_text: row.get(2)?,
        votes: row.get(3)?,
    })
}

/// Inserts a question, returns it with its new id.
/// `pub_date` has to be in years 0..=9999, see `util::is_storable`.
pub async fn insert_question(
    pool: &DbPool,
    question_text: &str,
    pub_date: DateTime<Utc>,
) -> Result<Question, Error> {
    if !is_storable(pub_date) {
        return Err(Error::UnstorableTimestamp(pub_date));
    }
    let conn = pool.get().map_err(Error::Connection)?;

    conn.execute(
        "INSERT INTO questions (question_text, pub_date) VALUES (?1, ?2)",
        params![question_text, encode_timestamp(pub_date)],
    )
    .map_err(Error::Insert)?;

    Ok(Question {
        id: conn.last_insert_rowid(),
        question_text: question_text.to_string(),
        pub_date,
    })
}

/// Inserts a choice with no votes for an existing question
pub async fn insert_choice(
    pool: &DbPool,
    question_id: i64,
    choice_text: &str,
) -> Result<Choice, Error> {
    let conn = pool.get().map_err(Error::Connection)?;

    conn.execute(
        "INSERT INTO choices (question_id, choice_text) VALUES (?1, ?2)",
        params![question_id, choice_text],
    )
    .map_err(|e| match e.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => Error::NoSuchQuestion,
        _ => Error::Insert(e),
    })?;

    Ok(Choice {
        id: conn.last_insert_rowid(),
        question_id,
        choice_text: choice_text.to_string(),
        votes: 0,
    })
}

/// Retrieves a single question by id, published or not
pub async fn get_question(pool: &DbPool, id: i64) -> Result<Question, Error> {
    let conn = pool.get().map_err(Error::Connection)?;

    conn.query_row(
        "SELECT id, question_text, pub_date FROM questions WHERE id = ?1",
        [id],
        question_from_row,
    )
    .optional()
    .map_err(Error::Query)?
    .ok_or(Error::NoSuchQuestion)
}

/// Retrieves a question the public pages may show at `now`.
/// Questions published after `now` are reported as missing.
pub async fn published_question(
    pool: &DbPool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<Question, Error> {
    let question = get_question(pool, id).await?;
    if !question.is_published_at(now) {
        return Err(Error::NoSuchQuestion);
    }
    Ok(question)
}

/// Questions published at or before `now`, most recent first
pub async fn published_questions(
    pool: &DbPool,
    now: DateTime<Utc>,
) -> Result<Vec<Question>, Error> {
    let conn = pool.get().map_err(Error::Connection)?;

    let mut query = conn
        .prepare(
            "SELECT id, question_text, pub_date FROM questions
            WHERE pub_date <= ?1 ORDER BY pub_date DESC, id DESC",
        )
        .map_err(Error::Query)?;

    let questions: Result<Vec<Question>, rusqlite::Error> = query
        .query_map([encode_timestamp(now)], question_from_row)
        .map_err(Error::Query)?
        .collect();

    questions.map_err(Error::Query)
}

/// Retrieves *all* questions, future ones included, most recent first
pub async fn all_questions(pool: &DbPool) -> Result<Vec<Question>, Error> {
    let conn = pool.get().map_err(Error::Connection)?;

    let mut query = conn
        .prepare("SELECT id, question_text, pub_date FROM questions ORDER BY pub_date DESC, id DESC")
        .map_err(Error::Query)?;

    let questions: Result<Vec<Question>, rusqlite::Error> = query
        .query_map([], question_from_row)
        .map_err(Error::Query)?
        .collect();

    questions.map_err(Error::Query)
}

pub async fn count_questions(pool: &DbPool) -> Result<usize, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))
        .map_err(Error::Query)
}

/// Choices of a question in insertion order
pub async fn choices_of(pool: &DbPool, question_id: i64) -> Result<Vec<Choice>, Error> {
    let conn = pool.get().map_err(Error::Connection)?;

    let mut query = conn
        .prepare(
            "SELECT id, question_id, choice_text, votes FROM choices
            WHERE question_id = ?1 ORDER BY id",
        )
        .map_err(Error::Query)?;

    let choices: Result<Vec<Choice>, rusqlite::Error> = query
        .query_map([question_id], choice_from_row)
        .map_err(Error::Query)?
        .collect();

    choices.map_err(Error::Query)
}

/// Number of choices belonging to a question, 0 for unknown questions
pub async fn choices_count(pool: &DbPool, question_id: i64) -> Result<usize, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .query_row(
            "SELECT COUNT(*) FROM choices WHERE question_id = ?1",
            [question_id],
            |row| row.get(0),
        )
        .map_err(Error::Query)
}

/// Adds one vote to a choice of the given question.
/// Returns false if the question has no such choice.
pub async fn vote(pool: &DbPool, question_id: i64, choice_id: i64) -> Result<bool, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .execute(
            "UPDATE choices SET votes = votes + 1 WHERE id = ?1 AND question_id = ?2",
            [choice_id, question_id],
        )
        .map_err(Error::Query)
        // Safety: id is unique, so the number of rows updated is always 0 or 1
        .map(|u| u == 1)
}

/// Sets the votes of every choice of a question to 0,
/// returns the number of choices reset
pub async fn reset_votes(pool: &DbPool, question_id: i64) -> Result<usize, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .execute(
            "UPDATE choices SET votes = 0 WHERE question_id = ?1",
            [question_id],
        )
        .map_err(Error::Query)
}

/// Deletes a question together with its choices,
/// returns true if a question was deleted
pub async fn delete_question(pool: &DbPool, id: i64) -> Result<bool, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .execute("DELETE FROM questions WHERE id = ?1", [id])
        .map_err(Error::Query)
        .map(|u| u == 1)
}

/// Completely clears the questions table (and through the cascade, the choices table),
/// returns number of deleted questions
pub async fn purge(pool: &DbPool) -> Result<usize, Error> {
    pool.get()
        .map_err(Error::Connection)?
        .execute("DELETE FROM questions", [])
        .map_err(Error::Query)
}
