use rusqlite::Connection;

const TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users(
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        national_id TEXT,
        phone TEXT,
        address TEXT,
        role TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        credential TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS schools(
        id TEXT PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        active INTEGER NOT NULL DEFAULT 1
    )",
    "CREATE TABLE IF NOT EXISTS courses(
        id TEXT PRIMARY KEY,
        school_id TEXT NOT NULL,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        cost INTEGER NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(school_id) REFERENCES schools(id),
        UNIQUE(school_id, code)
    )",
    "CREATE TABLE IF NOT EXISTS subjects(
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL,
        code TEXT NOT NULL,
        name TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        FOREIGN KEY(course_id) REFERENCES courses(id),
        UNIQUE(course_id, code)
    )",
    "CREATE TABLE IF NOT EXISTS teacher_assignments(
        subject_id TEXT NOT NULL,
        teacher_id TEXT NOT NULL,
        assigned_at TEXT NOT NULL,
        PRIMARY KEY(subject_id, teacher_id),
        FOREIGN KEY(subject_id) REFERENCES subjects(id),
        FOREIGN KEY(teacher_id) REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS enrollments(
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        enrolled_at TEXT NOT NULL,
        FOREIGN KEY(student_id) REFERENCES users(id),
        FOREIGN KEY(course_id) REFERENCES courses(id),
        UNIQUE(student_id, course_id)
    )",
    "CREATE TABLE IF NOT EXISTS sequences(
        name TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS invoices(
        id TEXT PRIMARY KEY,
        number TEXT NOT NULL UNIQUE,
        enrollment_id TEXT NOT NULL UNIQUE,
        cashier_id TEXT NOT NULL,
        amount INTEGER NOT NULL CHECK(amount > 0),
        billing_mode TEXT NOT NULL,
        third_party_name TEXT,
        third_party_national_id TEXT,
        third_party_address TEXT,
        status TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        paid_at TEXT,
        notes TEXT,
        FOREIGN KEY(enrollment_id) REFERENCES enrollments(id),
        FOREIGN KEY(cashier_id) REFERENCES users(id)
    )",
    "CREATE TABLE IF NOT EXISTS grades(
        id TEXT PRIMARY KEY,
        student_id TEXT NOT NULL,
        subject_id TEXT NOT NULL,
        teacher_id TEXT NOT NULL,
        score REAL NOT NULL,
        period TEXT NOT NULL,
        notes TEXT,
        recorded_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        FOREIGN KEY(student_id) REFERENCES users(id),
        FOREIGN KEY(subject_id) REFERENCES subjects(id),
        FOREIGN KEY(teacher_id) REFERENCES users(id),
        UNIQUE(student_id, subject_id, period)
    )",
    "CREATE TABLE IF NOT EXISTS certificates(
        id TEXT PRIMARY KEY,
        number TEXT NOT NULL UNIQUE,
        student_id TEXT NOT NULL,
        course_id TEXT NOT NULL,
        registrar_id TEXT NOT NULL,
        completion_date TEXT NOT NULL,
        average REAL NOT NULL,
        notes TEXT,
        issued_at TEXT NOT NULL,
        FOREIGN KEY(student_id) REFERENCES users(id),
        FOREIGN KEY(course_id) REFERENCES courses(id),
        FOREIGN KEY(registrar_id) REFERENCES users(id),
        UNIQUE(student_id, course_id)
    )",
    "CREATE TABLE IF NOT EXISTS certificate_subjects(
        certificate_id TEXT NOT NULL,
        position INTEGER NOT NULL,
        subject_id TEXT NOT NULL,
        subject_name TEXT NOT NULL,
        period TEXT NOT NULL,
        score REAL NOT NULL,
        passed INTEGER NOT NULL,
        PRIMARY KEY(certificate_id, position),
        FOREIGN KEY(certificate_id) REFERENCES certificates(id),
        FOREIGN KEY(subject_id) REFERENCES subjects(id)
    )",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_courses_school ON courses(school_id)",
    "CREATE INDEX IF NOT EXISTS idx_subjects_course ON subjects(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON teacher_assignments(teacher_id)",
    "CREATE INDEX IF NOT EXISTS idx_enrollments_course ON enrollments(course_id)",
    "CREATE INDEX IF NOT EXISTS idx_invoices_paid ON invoices(status, paid_at)",
    "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject_id, period)",
];

/// Creates any missing tables and indexes. Safe to run on every start.
pub(super) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    for statement in TABLES.iter().chain(INDEXES) {
        conn.execute(statement, [])?;
    }
    Ok(())
}
