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

fn request(
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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn result_str(value: &serde_json::Value, key: &str) -> String {
    value
        .get("result")
        .and_then(|v| v.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing result.{}: {}", key, value))
        .to_string()
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("scolaris-router-smoke");
    let bundle_out = workspace.join("smoke-backup.scbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "classes.create",
        json!({ "name": "6e A", "level": "6e", "academicYear": "2026-2027" }),
    );
    let class_id = result_str(&created, "classId");
    let _ = request(&mut stdin, &mut reader, "4", "classes.list", json!({}));

    let teacher = request(
        &mut stdin,
        &mut reader,
        "5",
        "teachers.create",
        json!({ "lastName": "Ndiaye", "firstName": "Moussa", "subject": "Mathematics" }),
    );
    let teacher_id = result_str(&teacher, "teacherId");
    let _ = request(&mut stdin, &mut reader, "6", "teachers.list", json!({}));

    let student = request(
        &mut stdin,
        &mut reader,
        "7",
        "students.create",
        json!({
            "classId": class_id,
            "lastName": "Diallo",
            "firstName": "Awa",
            "active": true
        }),
    );
    let student_id = result_str(&student, "studentId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "8",
        "students.list",
        json!({ "classId": class_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "8a",
        "students.update",
        json!({ "studentId": student_id, "patch": { "firstName": "Awa Marie" } }),
    );

    let course = request(
        &mut stdin,
        &mut reader,
        "9",
        "courses.create",
        json!({
            "classId": class_id,
            "teacherId": teacher_id,
            "subject": "Mathematics",
            "weeklyHours": 4
        }),
    );
    let course_id = result_str(&course, "courseId");
    let _ = request(
        &mut stdin,
        &mut reader,
        "10",
        "courses.list",
        json!({ "classId": class_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "11",
        "schedule.assign",
        json!({ "classId": class_id, "day": 1, "period": "08:00", "courseId": course_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "12",
        "schedule.list",
        json!({ "classId": class_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "evaluations.create",
        json!({
            "studentId": student_id,
            "courseId": course_id,
            "term": 1,
            "score": 14.5,
            "date": "2026-11-20"
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "14",
        "evaluations.list",
        json!({ "studentId": student_id }),
    );

    let schedule = request(
        &mut stdin,
        &mut reader,
        "15",
        "feeSchedules.create",
        json!({
            "classId": class_id,
            "yearlyAmount": 300000,
            "registrationFee": 10000,
            "academicYear": "2026-2027"
        }),
    );
    let fee_schedule_id = result_str(&schedule, "feeScheduleId");
    let _ = request(&mut stdin, &mut reader, "16", "plans.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "17",
        "feeSchedules.list",
        json!({ "classId": class_id }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "18",
        "payments.preview",
        json!({
            "studentId": student_id,
            "feeScheduleId": fee_schedule_id,
            "planId": "plan-trimestral",
            "discountPercent": 0,
            "termNumber": 1
        }),
    );
    let recorded = request(
        &mut stdin,
        &mut reader,
        "19",
        "payments.record",
        json!({
            "studentId": student_id,
            "feeScheduleId": fee_schedule_id,
            "planId": "plan-trimestral",
            "discountPercent": 0,
            "termNumber": 1,
            "paymentMethod": "cash",
            "paymentDate": "2026-10-05",
            "academicYear": "2026-2027"
        }),
    );
    let receipt_id = recorded
        .get("result")
        .and_then(|v| v.get("receipt"))
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_str())
        .expect("receipt id")
        .to_string();

    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "receipts.listByStudent",
        json!({ "studentId": student_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "receipts.updateStatus",
        json!({ "receiptId": receipt_id, "status": "paid" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "22",
        "balances.student",
        json!({ "studentId": student_id, "academicYear": "2026-2027" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "23",
        "reports.unpaidBalances",
        json!({ "academicYear": "2026-2027" }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "settings.get",
        json!({ "section": "school" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "settings.update",
        json!({ "section": "billing", "patch": { "defaultPaymentMethod": "mobile" } }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "26",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_out.to_string_lossy()
        }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "27",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "inPath": bundle_out.to_string_lossy()
        }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "28",
        "classes.delete",
        json!({ "classId": class_id }),
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
