use exam_core::model::{SessionId, SessionMode, SessionResult};
use sqlx::Row;
use uuid::Uuid;

use super::SqliteRepository;
use crate::repository::{SessionResultRepository, SessionResultRow, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn count_i64(field: &'static str, v: usize) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn write_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        other => StorageError::Connection(other.to_string()),
    }
}

/// The JSON payload holds the full result; indexed columns are for queries.
fn map_result_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionResultRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let payload: String = row.try_get("payload").map_err(ser)?;

    let result: SessionResult = serde_json::from_str(&payload).map_err(ser)?;
    let column_id = SessionId::from_uuid(Uuid::parse_str(&session_id).map_err(ser)?);
    if result.session_id != column_id {
        return Err(StorageError::Serialization(format!(
            "session id mismatch in row {id}"
        )));
    }
    Ok(SessionResultRow::new(id, result))
}

#[async_trait::async_trait]
impl SessionResultRepository for SqliteRepository {
    async fn append_result(&self, result: &SessionResult) -> Result<i64, StorageError> {
        let payload = serde_json::to_string(result).map_err(ser)?;

        let res = sqlx::query(
            r"
                INSERT INTO session_results (
                    session_id, mode, started_at, submitted_at, total_questions,
                    answered_questions, correct_answers, accuracy, passed, payload
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ",
        )
        .bind(result.session_id.value().to_string())
        .bind(result.mode.as_str())
        .bind(result.started_at)
        .bind(result.submitted_at)
        .bind(count_i64("total_questions", result.total_questions)?)
        .bind(count_i64("answered_questions", result.answered_questions)?)
        .bind(count_i64("correct_answers", result.correct_answers)?)
        .bind(result.accuracy)
        .bind(result.passed)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(res.last_insert_rowid())
    }

    async fn get_result(&self, id: i64) -> Result<SessionResult, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, payload
                FROM session_results
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_result_row(&row).map(|r| r.result)
    }

    async fn find_by_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<SessionResultRow>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, payload
                FROM session_results
                WHERE session_id = ?1
            ",
        )
        .bind(session_id.value().to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_result_row).transpose()
    }

    async fn list_results(
        &self,
        mode: Option<SessionMode>,
        limit: u32,
    ) -> Result<Vec<SessionResultRow>, StorageError> {
        let mut sql = String::from(
            r"
                SELECT id, session_id, payload
                FROM session_results
            ",
        );

        let mut bind_index = 1;
        if mode.is_some() {
            sql.push_str(" WHERE mode = ?1");
            bind_index += 1;
        }
        sql.push_str(" ORDER BY submitted_at DESC, id DESC");
        sql.push_str(" LIMIT ?");
        sql.push_str(&bind_index.to_string());

        let mut query = sqlx::query(&sql);
        if let Some(mode) = mode {
            query = query.bind(mode.as_str());
        }
        query = query.bind(i64::from(limit));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_result_row(&row)?);
        }

        Ok(out)
    }
}
