use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_scolarisd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn scolarisd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn send(
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
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = send(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn one_course_per_slot_until_cleared() {
    let workspace = temp_dir("scolaris-schedule");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "classes.create",
        json!({ "name": "6e B" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let math = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "courses.create",
        json!({ "classId": class_id, "subject": "Mathematics" }),
    );
    let math_id = math
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();
    let french = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({ "classId": class_id, "subject": "French" }),
    );
    let french_id = french
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "schedule.assign",
        json!({ "classId": class_id, "day": 1, "period": "08:00", "courseId": math_id }),
    );
    assert_eq!(
        assigned.get("courseSubject").and_then(|v| v.as_str()),
        Some("Mathematics")
    );

    // Same cell again: rejected, with the occupant in the details.
    let conflict = send(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.assign",
        json!({ "classId": class_id, "day": 1, "period": "08:00", "courseId": french_id }),
    );
    assert_eq!(conflict.get("ok").and_then(|v| v.as_bool()), Some(false));
    let error = conflict.get("error").expect("error");
    assert_eq!(error.get("code").and_then(|v| v.as_str()), Some("bad_params"));
    assert_eq!(
        error
            .get("details")
            .and_then(|d| d.get("courseSubject"))
            .and_then(|v| v.as_str()),
        Some("Mathematics")
    );

    // A different period is free; day range is validated.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.assign",
        json!({ "classId": class_id, "day": 1, "period": "09:00", "courseId": french_id }),
    );
    let bad_day = send(
        &mut stdin,
        &mut reader,
        "8",
        "schedule.assign",
        json!({ "classId": class_id, "day": 6, "period": "08:00", "courseId": french_id }),
    );
    assert_eq!(bad_day.get("ok").and_then(|v| v.as_bool()), Some(false));

    // A course from another class cannot be slotted in.
    let other_class = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "classes.create",
        json!({ "name": "6e C" }),
    );
    let other_class_id = other_class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let foreign = send(
        &mut stdin,
        &mut reader,
        "10",
        "schedule.assign",
        json!({ "classId": other_class_id, "day": 1, "period": "08:00", "courseId": math_id }),
    );
    assert_eq!(
        foreign
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_found")
    );

    // Clearing frees the cell for reassignment.
    let cleared = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "schedule.clear",
        json!({ "classId": class_id, "day": 1, "period": "08:00" }),
    );
    assert_eq!(cleared.get("cleared").and_then(|v| v.as_bool()), Some(true));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "schedule.assign",
        json!({ "classId": class_id, "day": 1, "period": "08:00", "courseId": french_id }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "schedule.list",
        json!({ "classId": class_id }),
    );
    let slots = listed.get("slots").and_then(|v| v.as_array()).expect("slots");
    assert_eq!(slots.len(), 2);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
