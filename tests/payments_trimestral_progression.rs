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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn f64_at(value: &serde_json::Value, path: &[&str]) -> f64 {
    let mut cur = value;
    for key in path {
        cur = cur
            .get(key)
            .unwrap_or_else(|| panic!("missing {}: {}", key, value));
    }
    cur.as_f64()
        .unwrap_or_else(|| panic!("not a number at {:?}: {}", path, value))
}

#[test]
fn trimestral_payments_settle_across_terms() {
    let workspace = temp_dir("scolaris-trimestral");
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
        json!({ "name": "3e B", "academicYear": "2026-2027" }),
    );
    let class_id = class
        .get("classId")
        .and_then(|v| v.as_str())
        .expect("classId")
        .to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.create",
        json!({ "classId": class_id, "lastName": "Sow", "firstName": "Ibrahima" }),
    );
    let student_id = student
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();

    // Yearly 450000 -> term amount 150000.
    let schedule = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "feeSchedules.create",
        json!({
            "classId": class_id,
            "yearlyAmount": 450000,
            "academicYear": "2026-2027"
        }),
    );
    let fee_schedule_id = schedule
        .get("feeScheduleId")
        .and_then(|v| v.as_str())
        .expect("feeScheduleId")
        .to_string();
    assert_eq!(schedule.get("termAmount").and_then(|v| v.as_f64()), Some(150000.0));

    // Term 1 in full, no discount.
    let first = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "payments.record",
        json!({
            "studentId": student_id,
            "feeScheduleId": fee_schedule_id,
            "planId": "plan-trimestral",
            "discountPercent": 0,
            "termNumber": 1,
            "paymentMethod": "cash",
            "paymentDate": "2026-10-01",
            "academicYear": "2026-2027"
        }),
    );
    assert_eq!(f64_at(&first, &["receipt", "amount"]), 150000.0);
    assert_eq!(f64_at(&first, &["receipt", "remainingBalance"]), 300000.0);
    assert_eq!(
        first.get("receipt").and_then(|r| r.get("status")).and_then(|v| v.as_str()),
        Some("paid")
    );
    assert_eq!(
        first
            .get("receipt")
            .and_then(|r| r.get("isFullPayment"))
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    let mid = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "balances.student",
        json!({ "studentId": student_id, "academicYear": "2026-2027" }),
    );
    assert_eq!(f64_at(&mid, &["summary", "totalPaid"]), 150000.0);
    assert_eq!(f64_at(&mid, &["summary", "totalDue"]), 300000.0);
    assert_eq!(
        mid.get("summary")
            .and_then(|s| s.get("isAccountSettled"))
            .and_then(|v| v.as_bool()),
        Some(false)
    );

    // The student still shows on the unpaid report.
    let unpaid = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "reports.unpaidBalances",
        json!({ "academicYear": "2026-2027" }),
    );
    let rows = unpaid.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("studentId").and_then(|v| v.as_str()),
        Some(student_id.as_str())
    );
    assert_eq!(rows[0].get("totalDue").and_then(|v| v.as_f64()), Some(300000.0));

    // Term 3 with a 10% discount on that installment only.
    let last = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "payments.record",
        json!({
            "studentId": student_id,
            "feeScheduleId": fee_schedule_id,
            "planId": "plan-trimestral",
            "discountPercent": 10,
            "termNumber": 3,
            "paymentMethod": "transfer",
            "paymentDate": "2027-04-02",
            "academicYear": "2026-2027"
        }),
    );
    assert_eq!(f64_at(&last, &["receipt", "originalAmount"]), 150000.0);
    assert_eq!(f64_at(&last, &["receipt", "finalAmount"]), 135000.0);
    assert_eq!(f64_at(&last, &["receipt", "remainingBalance"]), 0.0);
    assert_eq!(
        last.get("receipt")
            .and_then(|r| r.get("isFullPayment"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    let settled = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "balances.student",
        json!({ "studentId": student_id, "academicYear": "2026-2027" }),
    );
    assert_eq!(f64_at(&settled, &["summary", "totalDue"]), 0.0);
    assert_eq!(f64_at(&settled, &["summary", "totalPaid"]), 285000.0);
    assert_eq!(
        settled
            .get("summary")
            .and_then(|s| s.get("isAccountSettled"))
            .and_then(|v| v.as_bool()),
        Some(true)
    );

    // Settled students leave the unpaid report.
    let unpaid_after = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "reports.unpaidBalances",
        json!({ "academicYear": "2026-2027" }),
    );
    assert_eq!(
        unpaid_after
            .get("rows")
            .and_then(|v| v.as_array())
            .map(|r| r.len()),
        Some(0)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
