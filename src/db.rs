use rusqlite::Connection;
use serde_json::Value;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("scolaris.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            level TEXT,
            academic_year TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            subject TEXT,
            phone TEXT
        )",
        [],
    )?;

    // class_id is nullable: deleting a class unassigns its students rather
    // than deleting them.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            student_no TEXT,
            birth_date TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    ensure_students_sort_order(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            teacher_id TEXT,
            subject TEXT NOT NULL,
            weekly_hours REAL,
            teacher_name TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_class ON courses(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schedule_slots(
            class_id TEXT NOT NULL,
            day INTEGER NOT NULL,
            period TEXT NOT NULL,
            course_id TEXT NOT NULL,
            course_subject TEXT NOT NULL,
            PRIMARY KEY(class_id, day, period),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_schedule_slots_course ON schedule_slots(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            score REAL NOT NULL,
            out_of REAL NOT NULL DEFAULT 20,
            date TEXT,
            remark TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_student ON evaluations(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_course ON evaluations(course_id)",
        [],
    )?;

    // term_amount is derived from yearly_amount on every write; it is stored
    // so receipts and reports read a single row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fee_schedules(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            class_name TEXT NOT NULL,
            yearly_amount REAL NOT NULL,
            registration_fee REAL NOT NULL DEFAULT 0,
            term_amount REAL NOT NULL,
            academic_year TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_fee_schedules_registration_fee(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_fee_schedules_class ON fee_schedules(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_plans(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL,
            installments INTEGER NOT NULL
        )",
        [],
    )?;
    seed_payment_plans(&conn)?;

    // Financial fields are frozen at creation; only status is ever updated.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS receipts(
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL,
            receipt_number TEXT NOT NULL,
            student_id TEXT NOT NULL,
            student_name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            original_amount REAL NOT NULL,
            discount_percent REAL NOT NULL,
            final_amount REAL NOT NULL,
            amount REAL NOT NULL,
            remaining_balance REAL NOT NULL,
            payment_method TEXT NOT NULL,
            payment_date TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            term_number INTEGER,
            status TEXT NOT NULL,
            is_full_payment INTEGER NOT NULL,
            FOREIGN KEY(plan_id) REFERENCES payment_plans(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_student ON receipts(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_receipts_year ON receipts(academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

/// The three tuition plans are a fixed catalog, not user data. Stable ids so
/// exported workspaces stay interchangeable.
fn seed_payment_plans(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM payment_plans", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    let plans: [(&str, &str, &str, i64); 3] = [
        (
            "plan-full",
            "full",
            "Full yearly tuition settled in a single payment",
            1,
        ),
        (
            "plan-trimestral",
            "trimestral",
            "Tuition split across the three school terms",
            3,
        ),
        (
            "plan-flexible",
            "flexible",
            "Free-amount installments agreed with the family",
            0,
        ),
    ];
    for (id, name, description, installments) in plans {
        conn.execute(
            "INSERT INTO payment_plans(id, name, description, installments)
             VALUES(?, ?, ?, ?)",
            (id, name, description, installments),
        )?;
    }
    Ok(())
}

fn ensure_students_sort_order(conn: &Connection) -> anyhow::Result<()> {
    // If the column already exists, we're done.
    if table_has_column(conn, "students", "sort_order")? {
        return Ok(());
    }

    conn.execute(
        "ALTER TABLE students ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0",
        [],
    )?;

    // Backfill per class using existing insert order as a best-effort.
    let mut class_stmt = conn.prepare("SELECT id FROM classes ORDER BY rowid")?;
    let class_ids = class_stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stud_stmt = conn.prepare("SELECT id FROM students WHERE class_id = ? ORDER BY rowid")?;

    for cid in class_ids {
        let student_ids = stud_stmt
            .query_map([&cid], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for (i, sid) in student_ids.iter().enumerate() {
            conn.execute(
                "UPDATE students SET sort_order = ? WHERE id = ?",
                (i as i64, sid),
            )?;
        }
    }

    Ok(())
}

fn ensure_fee_schedules_registration_fee(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before registration fees were tracked.
    if table_has_column(conn, "fee_schedules", "registration_fee")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE fee_schedules ADD COLUMN registration_fee REAL NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<Value>> {
    let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
    let mut rows = stmt.query([key])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    let text: String = row.get(0)?;
    Ok(Some(serde_json::from_str(&text)?))
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, &text),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
