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

fn request_ok(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn live_names_follow_renames_while_receipts_stay_frozen() {
    let workspace = temp_dir("scolaris-rename");
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
        json!({ "name": "1ere S" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let teacher = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "teachers.create",
        json!({ "lastName": "Cisse", "firstName": "Mamadou", "subject": "Physics" }),
    );
    let teacher_id = teacher
        .get("teacherId")
        .and_then(|v| v.as_str())
        .expect("teacherId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "courses.create",
        json!({ "classId": class_id, "teacherId": teacher_id, "subject": "Physics" }),
    );

    let student = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "students.create",
        json!({ "classId": class_id, "lastName": "Kane", "firstName": "Adama" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let schedule = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "feeSchedules.create",
        json!({ "classId": class_id, "yearlyAmount": 300000, "academicYear": "2026-2027" }),
    );
    let fee_schedule_id = schedule
        .get("feeScheduleId")
        .and_then(|v| v.as_str())
        .expect("feeScheduleId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "payments.record",
        json!({
            "studentId": student_id,
            "feeScheduleId": fee_schedule_id,
            "planId": "plan-full",
            "discountPercent": 0,
            "paymentMethod": "cash",
            "paymentDate": "2026-09-05",
            "academicYear": "2026-2027"
        }),
    );

    // Rename the teacher and the class.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "teachers.update",
        json!({ "teacherId": teacher_id, "patch": { "lastName": "Cisse-Diallo" } }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "classes.update",
        json!({ "classId": class_id, "patch": { "name": "1ere S1" } }),
    );

    // Course display name follows the teacher rename.
    let courses = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "courses.list",
        json!({ "classId": class_id }),
    );
    let course_rows = courses
        .get("courses")
        .and_then(|v| v.as_array())
        .expect("courses");
    assert_eq!(
        course_rows[0].get("teacherName").and_then(|v| v.as_str()),
        Some("Cisse-Diallo, Mamadou")
    );

    // The fee schedule follows the class rename...
    let schedules = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "feeSchedules.list",
        json!({ "classId": class_id }),
    );
    let schedule_rows = schedules
        .get("feeSchedules")
        .and_then(|v| v.as_array())
        .expect("feeSchedules");
    assert_eq!(
        schedule_rows[0].get("className").and_then(|v| v.as_str()),
        Some("1ere S1")
    );

    // ...while the receipt keeps the name it printed with.
    let receipts = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "receipts.listByStudent",
        json!({ "studentId": student_id }),
    );
    let receipt_rows = receipts
        .get("receipts")
        .and_then(|v| v.as_array())
        .expect("receipts");
    assert_eq!(
        receipt_rows[0].get("className").and_then(|v| v.as_str()),
        Some("1ere S")
    );
    assert_eq!(
        receipt_rows[0].get("studentName").and_then(|v| v.as_str()),
        Some("Kane, Adama")
    );

    // Deleting the teacher detaches the course but keeps the frozen name.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "teachers.delete",
        json!({ "teacherId": teacher_id }),
    );
    let courses = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "courses.list",
        json!({ "classId": class_id }),
    );
    let course_rows = courses
        .get("courses")
        .and_then(|v| v.as_array())
        .expect("courses");
    assert_eq!(course_rows[0].get("teacherId"), Some(&serde_json::Value::Null));
    assert_eq!(
        course_rows[0].get("teacherName").and_then(|v| v.as_str()),
        Some("Cisse-Diallo, Mamadou")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
