use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Instants are stored as Unix seconds (UTC) so range predicates compare
/// integers rather than formatted strings.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE medications (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id           TEXT NOT NULL,
                name              TEXT NOT NULL,
                dosage            INTEGER NOT NULL,
                time_interval     INTEGER NOT NULL CHECK (time_interval > 0),
                duration          INTEGER NOT NULL CHECK (duration >= 0),
                prescribed_by     TEXT,
                purpose           TEXT,
                icon              TEXT,
                start_date        INTEGER NOT NULL,
                start_time        INTEGER NOT NULL,
                next_dosage_time  INTEGER NOT NULL,
                stop_date         INTEGER NOT NULL,
                done              INTEGER NOT NULL DEFAULT 0,
                created_at        INTEGER NOT NULL,
                updated_at        INTEGER NOT NULL
            );

            CREATE INDEX idx_medications_due
                ON medications(done, next_dosage_time);

            CREATE INDEX idx_medications_user
                ON medications(user_id);

            CREATE TABLE medication_history (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                medication_id  INTEGER NOT NULL REFERENCES medications(id),
                name           TEXT NOT NULL,
                due_at         INTEGER NOT NULL,
                created_at     INTEGER NOT NULL
            );

            CREATE INDEX idx_history_medication
                ON medication_history(medication_id, due_at);

            CREATE TABLE device_tokens (
                token       TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, token)
            );

            INSERT INTO schema_version (version) VALUES (1);
            "
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
        assert_eq!(version, 1);
    }
}
