use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("recupero.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // Session tokens are provisioned by the external auth provider; the
    // daemon only verifies presence and expiry.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            expires_at TEXT
        )",
        [],
    )?;
    ensure_sessions_expires_at(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS school_years(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            start_date TEXT,
            end_date TEXT,
            active INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            cognome TEXT NOT NULL,
            nome TEXT NOT NULL,
            email TEXT,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_name ON teachers(cognome, nome)",
        [],
    )?;

    // One tesoretto per teacher per school year; the UNIQUE constraint is
    // what surfaces re-imports of an already budgeted teacher.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tesoretti(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            minuti_settimana REAL,
            minuti_annui REAL NOT NULL,
            moduli_annui REAL NOT NULL,
            saldo REAL NOT NULL,
            created_at TEXT,
            UNIQUE(teacher_id, school_year_id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tesoretti_teacher ON tesoretti(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tesoretti_school_year ON tesoretti(school_year_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS recovery_types(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activities(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            school_year_id TEXT NOT NULL,
            recovery_type_id TEXT,
            date TEXT,
            minutes REAL NOT NULL,
            modules REAL NOT NULL,
            note TEXT,
            created_at TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(school_year_id) REFERENCES school_years(id),
            FOREIGN KEY(recovery_type_id) REFERENCES recovery_types(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_teacher ON activities(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activities_school_year ON activities(school_year_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_sessions_expires_at(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces stored bare tokens without an expiry column.
    if table_has_column(conn, "sessions", "expires_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE sessions ADD COLUMN expires_at TEXT", [])?;
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
