#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const FORM: &str = "Form 2";
pub const YEAR: i64 = 2025;

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .env_remove("GRADEBOOKD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

/// Returns the error code of a request expected to fail.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error.code")
        .to_string()
}

pub fn principal() -> serde_json::Value {
    json!({ "role": "principal", "id": "P1" })
}

pub fn teacher(id: &str) -> serde_json::Value {
    json!({ "role": "teacher", "id": id })
}

pub fn student_actor(id: &str) -> serde_json::Value {
    json!({ "role": "student", "id": id })
}

pub fn select_workspace(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> PathBuf {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    workspace
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admission_no: &str,
    last_name: &str,
    first_name: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        &format!("student-{}", admission_no),
        "students.create",
        json!({
            "actor": principal(),
            "admissionNo": admission_no,
            "lastName": last_name,
            "firstName": first_name,
            "form": FORM,
            "year": YEAR,
        }),
    );
    created
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string()
}

/// Enters a mark whose three components are all `score`, so the weighted
/// total equals `score`.
pub fn enter_flat_mark(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    student_id: &str,
    subject: &str,
    term: i64,
    score: f64,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        &format!("mark-{}-{}-{}", student_id, subject, term),
        "marks.enter",
        json!({
            "actor": principal(),
            "studentId": student_id,
            "subject": subject,
            "term": term,
            "year": YEAR,
            "opening": score,
            "midterm": score,
            "final": score,
        }),
    )
}

pub fn approve_all(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    term: i64,
) -> serde_json::Value {
    request_ok(
        stdin,
        reader,
        &format!("approve-all-{}", term),
        "marks.approveAll",
        json!({ "actor": principal(), "form": FORM, "term": term, "year": YEAR }),
    )
}
