use crate::calc::{MarkRecord, StudentRef};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";

pub const DEFAULT_EXAM_TYPES: [&str; 3] = ["Opening", "Mid Term", "End of Term"];
pub const DEFAULT_EXAM_TYPE: &str = "End of Term";

pub const EXAM_TYPES_KEY: &str = "grading.exam_types";
pub const DEFAULT_EXAM_TYPE_KEY: &str = "grading.default_exam_type";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            admission_no TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            form TEXT NOT NULL,
            year INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_form_year ON students(form, year, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_assignments(
            teacher_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            form TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY(teacher_id, subject, form)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            term INTEGER NOT NULL,
            year INTEGER NOT NULL,
            exam_type TEXT NOT NULL,
            opening REAL,
            midterm REAL,
            final REAL,
            total REAL NOT NULL,
            percentage REAL NOT NULL,
            grade TEXT NOT NULL,
            points INTEGER NOT NULL,
            approved INTEGER NOT NULL DEFAULT 0,
            approved_by TEXT,
            approved_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject, term, year, exam_type)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student ON marks(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_term_year ON marks(year, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Exam types configured for the workspace, falling back to the defaults
/// when unset or malformed.
pub fn exam_types(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let stored = settings_get_json(conn, EXAM_TYPES_KEY)?;
    let parsed: Option<Vec<String>> = stored.and_then(|v| serde_json::from_value(v).ok());
    Ok(match parsed {
        Some(list) if !list.is_empty() => list,
        _ => DEFAULT_EXAM_TYPES.iter().map(|s| s.to_string()).collect(),
    })
}

pub fn default_exam_type(conn: &Connection) -> anyhow::Result<String> {
    let stored = settings_get_json(conn, DEFAULT_EXAM_TYPE_KEY)?;
    Ok(stored
        .and_then(|v| v.as_str().map(|s| s.to_string()))
        .unwrap_or_else(|| DEFAULT_EXAM_TYPE.to_string()))
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub admission_no: String,
    pub last_name: String,
    pub first_name: String,
    pub form: String,
    pub year: i64,
}

impl StudentRow {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }

    pub fn to_ref(&self) -> StudentRef {
        StudentRef {
            student_id: self.id.clone(),
            display_name: Some(self.display_name()),
            admission_no: Some(self.admission_no.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "admissionNo": self.admission_no,
            "lastName": self.last_name,
            "firstName": self.first_name,
            "displayName": self.display_name(),
            "form": self.form,
            "year": self.year,
        })
    }
}

const STUDENT_COLUMNS: &str = "id, admission_no, last_name, first_name, form, year";

fn student_from_row(r: &Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        admission_no: r.get(1)?,
        last_name: r.get(2)?,
        first_name: r.get(3)?,
        form: r.get(4)?,
        year: r.get(5)?,
    })
}

pub fn find_student(conn: &Connection, student_id: &str) -> rusqlite::Result<Option<StudentRow>> {
    conn.query_row(
        &format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS),
        [student_id],
        student_from_row,
    )
    .optional()
}

/// Roster ordered by insertion, optionally narrowed by form and/or year.
pub fn list_students(
    conn: &Connection,
    form: Option<&str>,
    year: Option<i64>,
) -> rusqlite::Result<Vec<StudentRow>> {
    let mut sql = format!("SELECT {} FROM students WHERE 1 = 1", STUDENT_COLUMNS);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(f) = form {
        sql.push_str(" AND form = ?");
        binds.push(Value::Text(f.to_string()));
    }
    if let Some(y) = year {
        sql.push_str(" AND year = ?");
        binds.push(Value::Integer(y));
    }
    sql.push_str(" ORDER BY sort_order, rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), student_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct MarkFilter {
    pub student_id: Option<String>,
    pub form: Option<String>,
    pub subject: Option<String>,
    pub term: Option<i64>,
    pub year: Option<i64>,
    pub exam_type: Option<String>,
    pub approved_only: bool,
}

const MARK_COLUMNS: &str = "m.id, m.student_id, m.subject, m.term, m.year, m.exam_type,
    m.opening, m.midterm, m.final, m.total, m.percentage, m.grade, m.points,
    m.approved, m.approved_by, m.approved_at, m.created_at, m.updated_at, m.version";

fn mark_from_row(r: &Row<'_>) -> rusqlite::Result<MarkRecord> {
    Ok(MarkRecord {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject: r.get(2)?,
        term: r.get(3)?,
        year: r.get(4)?,
        exam_type: r.get(5)?,
        opening: r.get(6)?,
        midterm: r.get(7)?,
        final_exam: r.get(8)?,
        total: r.get(9)?,
        percentage: r.get(10)?,
        grade: r.get(11)?,
        points: r.get(12)?,
        approved: r.get::<_, i64>(13)? != 0,
        approved_by: r.get(14)?,
        approved_at: r.get(15)?,
        created_at: r.get(16)?,
        updated_at: r.get(17)?,
        version: r.get(18)?,
    })
}

/// Records in a stable order: by student insertion order, then by the
/// order each mark was first created.
pub fn list_marks(conn: &Connection, filter: &MarkFilter) -> rusqlite::Result<Vec<MarkRecord>> {
    let mut sql = format!(
        "SELECT {} FROM marks m JOIN students s ON s.id = m.student_id WHERE 1 = 1",
        MARK_COLUMNS
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(v) = &filter.student_id {
        sql.push_str(" AND m.student_id = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.form {
        sql.push_str(" AND s.form = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = &filter.subject {
        sql.push_str(" AND m.subject = ?");
        binds.push(Value::Text(v.clone()));
    }
    if let Some(v) = filter.term {
        sql.push_str(" AND m.term = ?");
        binds.push(Value::Integer(v));
    }
    if let Some(v) = filter.year {
        sql.push_str(" AND m.year = ?");
        binds.push(Value::Integer(v));
    }
    if let Some(v) = &filter.exam_type {
        sql.push_str(" AND m.exam_type = ?");
        binds.push(Value::Text(v.clone()));
    }
    if filter.approved_only {
        sql.push_str(" AND m.approved = 1");
    }
    sql.push_str(" ORDER BY s.sort_order, s.rowid, m.rowid");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), mark_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn find_mark(
    conn: &Connection,
    student_id: &str,
    subject: &str,
    term: i64,
    year: i64,
    exam_type: &str,
) -> rusqlite::Result<Option<MarkRecord>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM marks m
             WHERE m.student_id = ? AND m.subject = ? AND m.term = ? AND m.year = ? AND m.exam_type = ?",
            MARK_COLUMNS
        ),
        (student_id, subject, term, year, exam_type),
        mark_from_row,
    )
    .optional()
}

pub fn find_mark_by_id(conn: &Connection, mark_id: &str) -> rusqlite::Result<Option<MarkRecord>> {
    conn.query_row(
        &format!("SELECT {} FROM marks m WHERE m.id = ?", MARK_COLUMNS),
        [mark_id],
        mark_from_row,
    )
    .optional()
}

pub fn insert_mark(conn: &Connection, m: &MarkRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO marks(id, student_id, subject, term, year, exam_type,
            opening, midterm, final, total, percentage, grade, points,
            approved, approved_by, approved_at, created_at, updated_at, version)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            m.id,
            m.student_id,
            m.subject,
            m.term,
            m.year,
            m.exam_type,
            m.opening,
            m.midterm,
            m.final_exam,
            m.total,
            m.percentage,
            m.grade,
            m.points,
            m.approved as i64,
            m.approved_by,
            m.approved_at,
            m.created_at,
            m.updated_at,
            m.version,
        ],
    )?;
    Ok(())
}

/// Writes scores and derived fields if the row is still at
/// `expected_version`, bumping the version. Returns false when another
/// writer got there first.
pub fn update_mark_scores(
    conn: &Connection,
    m: &MarkRecord,
    expected_version: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE marks SET
            opening = ?, midterm = ?, final = ?,
            total = ?, percentage = ?, grade = ?, points = ?,
            updated_at = ?, version = version + 1
         WHERE id = ? AND version = ? AND approved = 0",
        rusqlite::params![
            m.opening,
            m.midterm,
            m.final_exam,
            m.total,
            m.percentage,
            m.grade,
            m.points,
            m.updated_at,
            m.id,
            expected_version,
        ],
    )?;
    Ok(changed == 1)
}

/// One-way approval. Returns false if the row was already approved.
pub fn approve_mark(conn: &Connection, mark_id: &str, approver: &str, now: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE marks SET approved = 1, approved_by = ?, approved_at = ?, updated_at = ?,
            version = version + 1
         WHERE id = ? AND approved = 0",
        (approver, now, now, mark_id),
    )?;
    Ok(changed == 1)
}

pub fn teacher_is_assigned(
    conn: &Connection,
    teacher_id: &str,
    subject: &str,
    form: &str,
) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM teacher_assignments WHERE teacher_id = ? AND subject = ? AND form = ?",
            (teacher_id, subject, form),
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
