use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Row, Value};
use tokio::sync::{Mutex, MutexGuard};

use super::traits::{HistoryStore, QueryRecorder};
use crate::types::{
    AppError, ExpertType, ExpertiseResult, ModelCallRecord, ParsedDocument, QueryStats,
    QueryStatus, Result, RoundPayload, SessionConfig, SessionHistory, SessionStatus,
    SessionSummary, SourceDocument, StoredExpertise, StoredRound, StoredSession,
};

/// libsql-backed store for research history and query telemetry.
///
/// A single connection is shared and guarded by an async mutex. Every call
/// holds the guard for its whole duration, so multi-statement writes run as
/// one unit and an in-memory database stays a single database.
pub struct TursoClient {
    _db: Database,
    conn: Mutex<Connection>,
}

fn db_err(context: &str) -> impl Fn(libsql::Error) -> AppError + '_ {
    move |e| AppError::Database(format!("{}: {}", context, e))
}

fn col_err(e: libsql::Error) -> AppError {
    AppError::Database(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp {}", ms)))
}

fn get_u32(row: &Row, idx: i32) -> Result<u32> {
    let value: i64 = row.get(idx).map_err(col_err)?;
    u32::try_from(value).map_err(|_| AppError::Database(format!("Value {} out of range", value)))
}

fn opt_int(value: Option<u32>) -> Value {
    value.map_or(Value::Null, |v| Value::Integer(i64::from(v)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Database(format!("Failed to encode JSON column: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::Database(format!("Invalid JSON in column: {}", e)))
}

impl TursoClient {
    /// Remote Turso database
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(db_err("Failed to connect to Turso"))?;

        Self::from_database(db).await
    }

    /// Local database file; parent directories are created as needed
    pub async fn new_local(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(db_err("Failed to open local database"))?;

        Self::from_database(db).await
    }

    /// Ephemeral in-memory database
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(db_err("Failed to open in-memory database"))?;

        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db.connect().map_err(db_err("Failed to get connection"))?;
        let client = Self {
            _db: db,
            conn: Mutex::new(conn),
        };
        client.initialize_schema().await?;
        Ok(client)
    }

    async fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS research_sessions (
                id TEXT PRIMARY KEY,
                task TEXT NOT NULL,
                config TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS research_rounds (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (session_id) REFERENCES research_sessions(id)
            );
            CREATE INDEX IF NOT EXISTS idx_rounds_session
                ON research_rounds(session_id, round_number);
            CREATE TABLE IF NOT EXISTS expertise_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                round_number INTEGER NOT NULL,
                expert_type TEXT NOT NULL,
                findings TEXT NOT NULL,
                suggestions TEXT NOT NULL,
                score REAL NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (session_id) REFERENCES research_sessions(id)
            );
            CREATE INDEX IF NOT EXISTS idx_expertise_session
                ON expertise_results(session_id, round_number);
            CREATE TABLE IF NOT EXISTS queries (
                id TEXT PRIMARY KEY,
                query_text TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                snippet TEXT NOT NULL,
                rank INTEGER NOT NULL,
                FOREIGN KEY (query_id) REFERENCES queries(id)
            );
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_id TEXT NOT NULL,
                url TEXT NOT NULL,
                title TEXT NOT NULL,
                cleaned_text TEXT NOT NULL,
                raw_content TEXT NOT NULL,
                word_count INTEGER NOT NULL,
                FOREIGN KEY (query_id) REFERENCES queries(id)
            );
            CREATE TABLE IF NOT EXISTS model_calls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query_id TEXT NOT NULL,
                model_name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                prompt_tokens INTEGER,
                completion_tokens INTEGER,
                total_tokens INTEGER,
                response_time_ms INTEGER NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT,
                FOREIGN KEY (query_id) REFERENCES queries(id)
            );",
        )
        .await
        .map_err(db_err("Failed to initialize schema"))?;

        Ok(())
    }

    async fn session_exists(conn: &Connection, session_id: &str) -> Result<bool> {
        Self::row_exists(conn, "SELECT 1 FROM research_sessions WHERE id = ?", session_id).await
    }

    async fn query_exists(conn: &Connection, query_id: &str) -> Result<bool> {
        Self::row_exists(conn, "SELECT 1 FROM queries WHERE id = ?", query_id).await
    }

    async fn row_exists(conn: &Connection, sql: &str, id: &str) -> Result<bool> {
        let mut rows = conn
            .query(sql, [id])
            .await
            .map_err(db_err("Failed to check existence"))?;
        Ok(rows.next().await.map_err(col_err)?.is_some())
    }

    async fn count(conn: &Connection, sql: &str, id: &str) -> Result<u64> {
        let mut rows = conn.query(sql, [id]).await.map_err(db_err("Failed to count"))?;
        let value = match rows.next().await.map_err(col_err)? {
            Some(row) => row.get::<i64>(0).map_err(col_err)?,
            None => 0,
        };
        Ok(u64::try_from(value).unwrap_or(0))
    }

    fn session_from_row(row: &Row) -> Result<StoredSession> {
        let config: String = row.get(2).map_err(col_err)?;
        Ok(StoredSession {
            id: row.get(0).map_err(col_err)?,
            task: row.get(1).map_err(col_err)?,
            config: from_json::<SessionConfig>(&config)?,
            created_at: from_millis(row.get(3).map_err(col_err)?)?,
        })
    }

    fn round_from_row(row: &Row) -> Result<StoredRound> {
        let data: String = row.get(1).map_err(col_err)?;
        Ok(StoredRound {
            round_number: get_u32(row, 0)?,
            payload: from_json::<RoundPayload>(&data)?,
            created_at: from_millis(row.get(2).map_err(col_err)?)?,
        })
    }

    fn expertise_from_row(row: &Row) -> Result<StoredExpertise> {
        let expert_type: String = row.get(1).map_err(col_err)?;
        let findings: String = row.get(2).map_err(col_err)?;
        let suggestions: String = row.get(3).map_err(col_err)?;
        Ok(StoredExpertise {
            round_number: get_u32(row, 0)?,
            result: ExpertiseResult::new(
                expert_type.parse::<ExpertType>().map_err(|e| AppError::Database(e.to_string()))?,
                from_json(&findings)?,
                from_json(&suggestions)?,
                row.get::<f64>(4).map_err(col_err)?,
            ),
            created_at: from_millis(row.get(5).map_err(col_err)?)?,
        })
    }
}

#[async_trait]
impl HistoryStore for TursoClient {
    async fn create_session(&self, id: &str, task: &str, config: &SessionConfig) -> Result<()> {
        let conn = self.connection().await;

        if Self::session_exists(&conn, id).await? {
            return Err(AppError::DuplicateKey(format!("Session {} already exists", id)));
        }

        conn.execute(
            "INSERT INTO research_sessions (id, task, config, created_at) VALUES (?, ?, ?, ?)",
            libsql::params![id, task, to_json(config)?, now_millis()],
        )
        .await
        .map_err(db_err("Failed to create session"))?;

        Ok(())
    }

    async fn append_round(
        &self,
        session_id: &str,
        round_number: u32,
        payload: &RoundPayload,
    ) -> Result<()> {
        let conn = self.connection().await;

        if !Self::session_exists(&conn, session_id).await? {
            return Err(AppError::NotFound(format!("Session {}", session_id)));
        }

        conn.execute(
            "INSERT INTO research_rounds (session_id, round_number, kind, data, created_at)
             VALUES (?, ?, ?, ?, ?)",
            libsql::params![
                session_id,
                i64::from(round_number),
                payload.kind(),
                to_json(payload)?,
                now_millis()
            ],
        )
        .await
        .map_err(db_err("Failed to append round"))?;

        Ok(())
    }

    async fn append_expertise(
        &self,
        session_id: &str,
        round_number: u32,
        result: &ExpertiseResult,
    ) -> Result<()> {
        let conn = self.connection().await;

        if !Self::session_exists(&conn, session_id).await? {
            return Err(AppError::NotFound(format!("Session {}", session_id)));
        }

        conn.execute(
            "INSERT INTO expertise_results
                (session_id, round_number, expert_type, findings, suggestions, score, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                session_id,
                i64::from(round_number),
                result.expert_type.as_str(),
                to_json(&result.findings)?,
                to_json(&result.suggestions)?,
                crate::types::clamp_score(result.score),
                now_millis()
            ],
        )
        .await
        .map_err(db_err("Failed to append expertise"))?;

        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> Result<SessionHistory> {
        let conn = self.connection().await;

        let mut rows = conn
            .query(
                "SELECT id, task, config, created_at FROM research_sessions WHERE id = ?",
                [session_id],
            )
            .await
            .map_err(db_err("Failed to query session"))?;

        let session = match rows.next().await.map_err(col_err)? {
            Some(row) => Self::session_from_row(&row)?,
            None => return Ok(SessionHistory::default()),
        };

        let mut rounds = Vec::new();
        let mut rows = conn
            .query(
                "SELECT round_number, data, created_at FROM research_rounds
                 WHERE session_id = ? ORDER BY round_number ASC, id ASC",
                [session_id],
            )
            .await
            .map_err(db_err("Failed to query rounds"))?;
        while let Some(row) = rows.next().await.map_err(col_err)? {
            rounds.push(Self::round_from_row(&row)?);
        }

        let mut expertise = Vec::new();
        let mut rows = conn
            .query(
                "SELECT round_number, expert_type, findings, suggestions, score, created_at
                 FROM expertise_results
                 WHERE session_id = ? ORDER BY round_number ASC, id ASC",
                [session_id],
            )
            .await
            .map_err(db_err("Failed to query expertise"))?;
        while let Some(row) = rows.next().await.map_err(col_err)? {
            expertise.push(Self::expertise_from_row(&row)?);
        }

        Ok(SessionHistory {
            session: Some(session),
            rounds,
            expertise,
        })
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        let conn = self.connection().await;
        Self::session_exists(&conn, session_id).await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let conn = self.connection().await;

        let tx = conn
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        tx.execute("DELETE FROM expertise_results WHERE session_id = ?", [session_id])
            .await
            .map_err(db_err("Failed to delete expertise"))?;
        tx.execute("DELETE FROM research_rounds WHERE session_id = ?", [session_id])
            .await
            .map_err(db_err("Failed to delete rounds"))?;
        tx.execute("DELETE FROM research_sessions WHERE id = ?", [session_id])
            .await
            .map_err(db_err("Failed to delete session"))?;
        tx.commit()
            .await
            .map_err(db_err("Failed to commit session delete"))?;

        Ok(())
    }

    async fn list_sessions(&self, limit: u32) -> Result<Vec<SessionSummary>> {
        let conn = self.connection().await;

        let mut rows = conn
            .query(
                "SELECT s.id, s.task, s.created_at,
                        EXISTS (SELECT 1 FROM research_rounds r
                                WHERE r.session_id = s.id AND r.kind IN ('final', 'failed'))
                 FROM research_sessions s
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?",
                [i64::from(limit)],
            )
            .await
            .map_err(db_err("Failed to list sessions"))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next().await.map_err(col_err)? {
            let finished: i64 = row.get(3).map_err(col_err)?;
            sessions.push(SessionSummary {
                id: row.get(0).map_err(col_err)?,
                task: row.get(1).map_err(col_err)?,
                created_at: from_millis(row.get(2).map_err(col_err)?)?,
                status: if finished != 0 {
                    SessionStatus::Finished
                } else {
                    SessionStatus::Active
                },
            });
        }

        Ok(sessions)
    }
}

#[async_trait]
impl QueryRecorder for TursoClient {
    async fn create_query(&self, query_id: &str, query_text: &str) -> Result<()> {
        let conn = self.connection().await;

        if Self::query_exists(&conn, query_id).await? {
            return Err(AppError::DuplicateKey(format!("Query {} already exists", query_id)));
        }

        conn.execute(
            "INSERT INTO queries (id, query_text, timestamp, status) VALUES (?, ?, ?, ?)",
            libsql::params![
                query_id,
                query_text,
                now_millis(),
                QueryStatus::Processing.as_str()
            ],
        )
        .await
        .map_err(db_err("Failed to create query"))?;

        Ok(())
    }

    async fn save_sources(&self, query_id: &str, sources: &[SourceDocument]) -> Result<()> {
        let conn = self.connection().await;

        let tx = conn
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        for source in sources {
            tx.execute(
                "INSERT INTO sources (query_id, url, title, snippet, rank) VALUES (?, ?, ?, ?, ?)",
                libsql::params![
                    query_id,
                    source.url.as_str(),
                    source.title.as_str(),
                    source.snippet.as_str(),
                    i64::from(source.rank)
                ],
            )
            .await
            .map_err(db_err("Failed to save source"))?;
        }
        tx.commit().await.map_err(db_err("Failed to commit sources"))?;

        Ok(())
    }

    async fn save_documents(&self, query_id: &str, documents: &[ParsedDocument]) -> Result<()> {
        let conn = self.connection().await;

        let tx = conn
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        for doc in documents {
            tx.execute(
                "INSERT INTO documents (query_id, url, title, cleaned_text, raw_content, word_count)
                 VALUES (?, ?, ?, ?, ?, ?)",
                libsql::params![
                    query_id,
                    doc.url.as_str(),
                    doc.title.as_str(),
                    doc.cleaned_text.as_str(),
                    doc.raw_content.as_str(),
                    i64::try_from(doc.word_count).unwrap_or(i64::MAX)
                ],
            )
            .await
            .map_err(db_err("Failed to save document"))?;
        }
        tx.commit().await.map_err(db_err("Failed to commit documents"))?;

        Ok(())
    }

    async fn record_model_call(&self, record: &ModelCallRecord) -> Result<()> {
        let conn = self.connection().await;

        conn.execute(
            "INSERT INTO model_calls
                (query_id, model_name, prompt, response, prompt_tokens, completion_tokens,
                 total_tokens, response_time_ms, status, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                record.query_id.as_str(),
                record.model_name.as_str(),
                record.prompt.as_str(),
                record.response.as_str(),
                opt_int(record.prompt_tokens),
                opt_int(record.completion_tokens),
                opt_int(record.total_tokens),
                i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
                record.status.as_str(),
                record
                    .error_message
                    .clone()
                    .map_or(Value::Null, Value::Text)
            ],
        )
        .await
        .map_err(db_err("Failed to record model call"))?;

        Ok(())
    }

    async fn set_query_status(&self, query_id: &str, status: QueryStatus) -> Result<()> {
        let conn = self.connection().await;

        let changed = conn
            .execute(
                "UPDATE queries SET status = ? WHERE id = ?",
                libsql::params![status.as_str(), query_id],
            )
            .await
            .map_err(db_err("Failed to update query status"))?;

        if changed == 0 {
            return Err(AppError::NotFound(format!("Query {}", query_id)));
        }
        Ok(())
    }

    async fn query_stats(&self, query_id: &str) -> Result<QueryStats> {
        let conn = self.connection().await;

        let mut rows = conn
            .query(
                "SELECT query_text, status, timestamp FROM queries WHERE id = ?",
                [query_id],
            )
            .await
            .map_err(db_err("Failed to query stats"))?;

        let row = rows
            .next()
            .await
            .map_err(col_err)?
            .ok_or_else(|| AppError::NotFound(format!("Query {}", query_id)))?;
        let query_text: String = row.get(0).map_err(col_err)?;
        let status: String = row.get(1).map_err(col_err)?;
        let timestamp = from_millis(row.get(2).map_err(col_err)?)?;

        Ok(QueryStats {
            query_id: query_id.to_string(),
            query_text,
            status: status.parse()?,
            timestamp,
            sources_count: Self::count(
                &conn,
                "SELECT COUNT(*) FROM sources WHERE query_id = ?",
                query_id,
            )
            .await?,
            documents_count: Self::count(
                &conn,
                "SELECT COUNT(*) FROM documents WHERE query_id = ?",
                query_id,
            )
            .await?,
            model_calls_count: Self::count(
                &conn,
                "SELECT COUNT(*) FROM model_calls WHERE query_id = ?",
                query_id,
            )
            .await?,
            total_tokens: Self::count(
                &conn,
                "SELECT COALESCE(SUM(total_tokens), 0) FROM model_calls WHERE query_id = ?",
                query_id,
            )
            .await?,
        })
    }

    async fn delete_query(&self, query_id: &str) -> Result<()> {
        let conn = self.connection().await;

        let tx = conn
            .transaction()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        for sql in [
            "DELETE FROM model_calls WHERE query_id = ?",
            "DELETE FROM documents WHERE query_id = ?",
            "DELETE FROM sources WHERE query_id = ?",
            "DELETE FROM queries WHERE id = ?",
        ] {
            tx.execute(sql, [query_id])
                .await
                .map_err(db_err("Failed to delete query data"))?;
        }
        tx.commit()
            .await
            .map_err(db_err("Failed to commit query delete"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client_initializes_schema() {
        let client = TursoClient::new_memory().await.unwrap();
        assert!(!client.exists("missing").await.unwrap());
        assert!(client.list_sessions(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_is_not_found() {
        let client = TursoClient::new_memory().await.unwrap();
        let payload = RoundPayload::Failed {
            error: "boom".to_string(),
        };
        let err = client.append_round("ghost", 0, &payload).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_opt_int_maps_none_to_null() {
        assert_eq!(opt_int(None), Value::Null);
        assert_eq!(opt_int(Some(7)), Value::Integer(7));
    }
}
