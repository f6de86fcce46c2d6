use crate::models::NewMedication;
use crate::Database;
use anyhow::Result;
use chrono::{DateTime, Utc};
use meddle_types::api::MedicationSearch;
use meddle_types::{Medication, MedicationHistory, NewMedicationHistory};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, ToSql};
use uuid::Uuid;

const MEDICATION_COLUMNS: &str = "id, user_id, name, dosage, time_interval, duration, \
     prescribed_by, purpose, icon, start_date, start_time, next_dosage_time, stop_date, \
     done, created_at, updated_at";

impl Database {
    // -- Medications --

    pub fn insert_medication(&self, med: &NewMedication, now: DateTime<Utc>) -> Result<Medication> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO medications (user_id, name, dosage, time_interval, duration,
                     prescribed_by, purpose, icon, start_date, start_time, next_dosage_time,
                     stop_date, done, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)",
                rusqlite::params![
                    med.user_id.to_string(),
                    med.name,
                    med.dosage,
                    med.time_interval,
                    med.duration,
                    med.prescribed_by,
                    med.purpose,
                    med.icon,
                    med.start_date.timestamp(),
                    med.start_time.timestamp(),
                    med.next_dosage_time.timestamp(),
                    med.stop_date.timestamp(),
                    med.done,
                    now.timestamp(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_medication(conn, id, med.user_id)?
                .ok_or_else(|| anyhow::anyhow!("Medication {} vanished after insert", id))
        })
    }

    /// Rewrite a course after a user edit. A done course stays done.
    /// Returns false when no medication with that id belongs to the user.
    pub fn update_medication(
        &self,
        id: i64,
        med: &NewMedication,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE medications SET name = ?1, dosage = ?2, time_interval = ?3,
                     duration = ?4, prescribed_by = ?5, purpose = ?6, icon = ?7,
                     start_date = ?8, start_time = ?9, next_dosage_time = ?10,
                     stop_date = ?11, done = MAX(done, ?12), updated_at = ?13
                 WHERE id = ?14 AND user_id = ?15",
                rusqlite::params![
                    med.name,
                    med.dosage,
                    med.time_interval,
                    med.duration,
                    med.prescribed_by,
                    med.purpose,
                    med.icon,
                    med.start_date.timestamp(),
                    med.start_time.timestamp(),
                    med.next_dosage_time.timestamp(),
                    med.stop_date.timestamp(),
                    med.done,
                    now.timestamp(),
                    id,
                    med.user_id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_medication(&self, id: i64, user_id: Uuid) -> Result<Option<Medication>> {
        self.with_conn(|conn| query_medication(conn, id, user_id))
    }

    pub fn list_medications(&self, user_id: Uuid) -> Result<Vec<Medication>> {
        self.with_conn(|conn| {
            query_medications(
                conn,
                "WHERE user_id = ?1 ORDER BY id",
                rusqlite::params![user_id.to_string()],
            )
        })
    }

    /// A user's courses matching every filter that is set. Text filters are
    /// case-insensitive substring matches; numbers match exactly.
    pub fn search_medications(
        &self,
        user_id: Uuid,
        search: &MedicationSearch,
    ) -> Result<Vec<Medication>> {
        let mut filter = String::from("WHERE user_id = ?1");
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(user_id.to_string())];

        let text = [
            ("name", &search.name),
            ("prescribed_by", &search.prescribed_by),
            ("purpose", &search.purpose),
        ];
        for (column, value) in text {
            let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            params.push(Box::new(like_pattern(value)));
            filter.push_str(&format!(" AND {} LIKE ?{} ESCAPE '\\'", column, params.len()));
        }
        for (column, value) in [("dosage", search.dosage), ("duration", search.duration)] {
            if let Some(value) = value {
                params.push(Box::new(value));
                filter.push_str(&format!(" AND {} = ?{}", column, params.len()));
            }
        }
        filter.push_str(" ORDER BY id");

        self.with_conn(|conn| {
            let params: Vec<&dyn ToSql> = params.iter().map(|p| &**p).collect();
            query_medications(conn, &filter, &params)
        })
    }

    /// Courses still running for a user, soonest dose first.
    pub fn list_next_medications(&self, user_id: Uuid) -> Result<Vec<Medication>> {
        self.with_conn(|conn| {
            query_medications(
                conn,
                "WHERE user_id = ?1 AND done = 0 ORDER BY next_dosage_time, id",
                rusqlite::params![user_id.to_string()],
            )
        })
    }

    /// Running courses whose next dose is at or before `now`.
    pub fn due_medications(&self, now: DateTime<Utc>) -> Result<Vec<Medication>> {
        self.with_conn(|conn| {
            query_medications(
                conn,
                "WHERE done = 0 AND next_dosage_time <= ?1 ORDER BY next_dosage_time, id",
                rusqlite::params![now.timestamp()],
            )
        })
    }

    /// Running courses whose next dose falls in `[from, until)`.
    pub fn due_soon_medications(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Medication>> {
        self.with_conn(|conn| {
            query_medications(
                conn,
                "WHERE done = 0 AND next_dosage_time >= ?1 AND next_dosage_time < ?2
                 ORDER BY next_dosage_time, id",
                rusqlite::params![from.timestamp(), until.timestamp()],
            )
        })
    }

    /// Returns false if the medication is missing or already done.
    pub fn set_next_dosage_time(
        &self,
        id: i64,
        next: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE medications SET next_dosage_time = ?1, updated_at = ?2
                 WHERE id = ?3 AND done = 0",
                rusqlite::params![next.timestamp(), now.timestamp(), id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Returns false if the medication is missing or already done.
    pub fn mark_medication_done(&self, id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE medications SET done = 1, updated_at = ?1 WHERE id = ?2 AND done = 0",
                rusqlite::params![now.timestamp(), id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- History --

    pub fn insert_history(
        &self,
        entry: &NewMedicationHistory,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO medication_history (medication_id, name, due_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    entry.medication_id,
                    entry.name,
                    entry.due_at.timestamp(),
                    now.timestamp(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn history_for_medication(&self, medication_id: i64) -> Result<Vec<MedicationHistory>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, medication_id, name, due_at, created_at
                 FROM medication_history
                 WHERE medication_id = ?1
                 ORDER BY due_at, id",
            )?;

            let rows = stmt
                .query_map([medication_id], |row| {
                    Ok(MedicationHistory {
                        id: row.get(0)?,
                        medication_id: row.get(1)?,
                        name: row.get(2)?,
                        due_at: instant(row, 3)?,
                        created_at: instant(row, 4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Device tokens --

    /// Register a device token. Re-registering the same pair is a no-op.
    /// Returns true when a new row was written.
    pub fn add_device_token(&self, user_id: Uuid, token: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO device_tokens (token, user_id, created_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![token, user_id.to_string(), now.timestamp()],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn device_tokens_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT token FROM device_tokens WHERE user_id = ?1 ORDER BY created_at, token",
            )?;
            let tokens = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(tokens)
        })
    }
}

fn query_medication(conn: &Connection, id: i64, user_id: Uuid) -> Result<Option<Medication>> {
    let sql = format!(
        "SELECT {} FROM medications WHERE id = ?1 AND user_id = ?2",
        MEDICATION_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(rusqlite::params![id, user_id.to_string()], medication_from_row)
        .optional()?;

    Ok(row)
}

fn query_medications(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Medication>> {
    let sql = format!("SELECT {} FROM medications {}", MEDICATION_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(params, medication_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn medication_from_row(row: &Row<'_>) -> rusqlite::Result<Medication> {
    let user_id: String = row.get(1)?;
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(Medication {
        id: row.get(0)?,
        user_id,
        name: row.get(2)?,
        dosage: row.get(3)?,
        time_interval: row.get(4)?,
        duration: row.get(5)?,
        prescribed_by: row.get(6)?,
        purpose: row.get(7)?,
        icon: row.get(8)?,
        start_date: instant(row, 9)?,
        start_time: instant(row, 10)?,
        next_dosage_time: instant(row, 11)?,
        stop_date: instant(row, 12)?,
        done: row.get::<_, i64>(13)? != 0,
        created_at: instant(row, 14)?,
        updated_at: instant(row, 15)?,
    })
}

/// `%raw%` with LIKE wildcards in `raw` escaped.
fn like_pattern(raw: &str) -> String {
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// Decode a Unix-seconds column.
fn instant(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
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
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn course(user_id: Uuid, name: &str, next: DateTime<Utc>) -> NewMedication {
        NewMedication {
            user_id,
            name: name.into(),
            dosage: 1,
            time_interval: 6,
            duration: 3,
            prescribed_by: Some("Dr. Okafor".into()),
            purpose: None,
            icon: None,
            start_date: at(1, 0),
            start_time: at(1, 8),
            next_dosage_time: next,
            stop_date: at(4, 8),
            done: false,
        }
    }

    #[test]
    fn insert_and_fetch_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let med = db.insert_medication(&course(owner, "Ibuprofen", at(1, 8)), at(1, 7)).unwrap();
        assert!(!med.done);
        assert_eq!(med.next_dosage_time, at(1, 8));
        assert_eq!(med.prescribed_by.as_deref(), Some("Dr. Okafor"));

        assert_eq!(db.get_medication(med.id, owner).unwrap(), Some(med.clone()));
        assert_eq!(db.get_medication(med.id, stranger).unwrap(), None);
    }

    #[test]
    fn due_query_excludes_future_and_done() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        let due = db.insert_medication(&course(user, "due", at(1, 8)), at(1, 0)).unwrap();
        let later = db.insert_medication(&course(user, "later", at(1, 12)), at(1, 0)).unwrap();
        let finished = db.insert_medication(&course(user, "finished", at(1, 6)), at(1, 0)).unwrap();
        assert!(db.mark_medication_done(finished.id, at(1, 0)).unwrap());

        let ids: Vec<i64> = db.due_medications(at(1, 8)).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![due.id]);

        let ids: Vec<i64> = db.due_medications(at(1, 12)).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![due.id, later.id]);
    }

    #[test]
    fn due_soon_window_is_half_open() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        let start = db.insert_medication(&course(user, "start", at(1, 9)), at(1, 0)).unwrap();
        db.insert_medication(&course(user, "end", at(1, 10)), at(1, 0)).unwrap();
        db.insert_medication(&course(user, "before", at(1, 9) - Duration::seconds(1)), at(1, 0))
            .unwrap();

        let ids: Vec<i64> = db
            .due_soon_medications(at(1, 9), at(1, 10))
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec![start.id]);
    }

    #[test]
    fn done_rows_are_not_advanced_or_reopened() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let med = db.insert_medication(&course(user, "x", at(1, 8)), at(1, 0)).unwrap();

        assert!(db.mark_medication_done(med.id, at(1, 9)).unwrap());
        assert!(!db.mark_medication_done(med.id, at(1, 9)).unwrap());
        assert!(!db.set_next_dosage_time(med.id, at(1, 14), at(1, 9)).unwrap());

        let reloaded = db.get_medication(med.id, user).unwrap().unwrap();
        assert!(reloaded.done);
        assert_eq!(reloaded.next_dosage_time, at(1, 8));
    }

    #[test]
    fn user_edit_keeps_done_flag() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let med = db.insert_medication(&course(user, "x", at(1, 8)), at(1, 0)).unwrap();
        db.mark_medication_done(med.id, at(2, 0)).unwrap();

        let edit = course(user, "renamed", at(2, 8));
        assert!(db.update_medication(med.id, &edit, at(2, 1)).unwrap());
        let foreign = course(Uuid::new_v4(), "y", at(2, 8));
        assert!(!db.update_medication(med.id, &foreign, at(2, 1)).unwrap());

        let reloaded = db.get_medication(med.id, user).unwrap().unwrap();
        assert_eq!(reloaded.name, "renamed");
        assert!(reloaded.done);
    }

    #[test]
    fn course_planned_as_done_is_never_due() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let ended = NewMedication {
            done: true,
            ..course(user, "ended", at(1, 8))
        };
        let med = db.insert_medication(&ended, at(1, 9)).unwrap();
        assert!(med.done);
        assert!(db.due_medications(at(2, 0)).unwrap().is_empty());

        let open = db.insert_medication(&course(user, "open", at(1, 8)), at(1, 0)).unwrap();
        let finished = NewMedication {
            done: true,
            ..course(user, "open", at(1, 14))
        };
        assert!(db.update_medication(open.id, &finished, at(1, 9)).unwrap());
        assert!(db.get_medication(open.id, user).unwrap().unwrap().done);
    }

    #[test]
    fn next_medications_sorted_by_next_dose() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let b = db.insert_medication(&course(user, "b", at(2, 8)), at(1, 0)).unwrap();
        let a = db.insert_medication(&course(user, "a", at(1, 20)), at(1, 0)).unwrap();

        let ids: Vec<i64> = db.list_next_medications(user).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a.id, b.id]);
        assert_eq!(db.list_medications(user).unwrap().len(), 2);
    }

    #[test]
    fn search_combines_filters_within_owner() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let insulin = db
            .insert_medication(
                &NewMedication {
                    purpose: Some("Blood sugar".into()),
                    ..course(user, "Insulin", at(1, 8))
                },
                at(1, 0),
            )
            .unwrap();
        let saline = db
            .insert_medication(
                &NewMedication {
                    dosage: 2,
                    ..course(user, "0.9% saline", at(1, 8))
                },
                at(1, 0),
            )
            .unwrap();
        db.insert_medication(&course(Uuid::new_v4(), "Insulin", at(1, 8)), at(1, 0))
            .unwrap();

        let ids = |search: MedicationSearch| -> Vec<i64> {
            db.search_medications(user, &search)
                .unwrap()
                .iter()
                .map(|m| m.id)
                .collect()
        };

        assert_eq!(ids(MedicationSearch::default()), vec![insulin.id, saline.id]);
        assert_eq!(
            ids(MedicationSearch {
                name: Some("insul".into()),
                ..Default::default()
            }),
            vec![insulin.id]
        );
        assert_eq!(
            ids(MedicationSearch {
                purpose: Some("BLOOD".into()),
                dosage: Some(1),
                ..Default::default()
            }),
            vec![insulin.id]
        );
        assert_eq!(
            ids(MedicationSearch {
                name: Some("%".into()),
                ..Default::default()
            }),
            vec![saline.id]
        );
        assert_eq!(
            ids(MedicationSearch {
                prescribed_by: Some("okafor".into()),
                duration: Some(4),
                ..Default::default()
            }),
            Vec::<i64>::new()
        );
    }

    #[test]
    fn history_is_appended_per_due_instant() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();
        let med = db.insert_medication(&course(user, "x", at(1, 8)), at(1, 0)).unwrap();

        let first = NewMedicationHistory::from(&med);
        db.insert_history(&first, at(1, 8)).unwrap();
        db.insert_history(&NewMedicationHistory { due_at: at(1, 14), ..first }, at(1, 14))
            .unwrap();

        let history = db.history_for_medication(med.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].due_at, at(1, 8));
        assert_eq!(history[1].due_at, at(1, 14));
        assert_eq!(history[1].name, "x");
    }

    #[test]
    fn device_tokens_deduplicate_per_user() {
        let db = Database::open_in_memory().unwrap();
        let user = Uuid::new_v4();

        assert!(db.add_device_token(user, "tok-a", at(1, 0)).unwrap());
        assert!(!db.add_device_token(user, "tok-a", at(1, 1)).unwrap());
        assert!(db.add_device_token(user, "tok-b", at(1, 2)).unwrap());

        assert_eq!(db.device_tokens_for_user(user).unwrap(), vec!["tok-a", "tok-b"]);
        assert!(db.device_tokens_for_user(Uuid::new_v4()).unwrap().is_empty());
    }
}
