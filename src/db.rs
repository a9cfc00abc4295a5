use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

const DB_PATH: &str = "data/abit.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS programs (
            key        TEXT PRIMARY KEY,
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS curricula (
            program_key TEXT PRIMARY KEY REFERENCES programs(key),
            url         TEXT NOT NULL,
            text        TEXT,
            error       TEXT,
            fetched_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Fetching ──

pub struct PageRow {
    pub key: String,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
}

pub fn save_page(conn: &Connection, row: &PageRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO programs (key, url, html, status, error, fetched_at)
         VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))",
        rusqlite::params![row.key, row.url, row.html, row.status, row.error],
    )?;
    Ok(())
}

/// Cached pages that actually have a body, in key order.
pub fn fetch_pages(conn: &Connection) -> Result<Vec<PageRow>> {
    let mut stmt = conn.prepare(
        "SELECT key, url, html, status, error FROM programs
         WHERE html IS NOT NULL ORDER BY key",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PageRow {
                key: row.get(0)?,
                url: row.get(1)?,
                html: row.get(2)?,
                status: row.get(3)?,
                error: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_curriculum(
    conn: &Connection,
    program_key: &str,
    url: &str,
    text: Option<&str>,
    error: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO curricula (program_key, url, text, error, fetched_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        rusqlite::params![program_key, url, text, error],
    )?;
    Ok(())
}

pub fn fetch_curriculum_text(conn: &Connection, program_key: &str) -> Result<Option<String>> {
    let text = conn
        .query_row(
            "SELECT text FROM curricula WHERE program_key = ?1 AND text IS NOT NULL",
            [program_key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(text)
}

// ── Stats ──

pub struct Stats {
    pub programs: usize,
    pub pages: usize,
    pub errors: usize,
    pub curricula: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let programs: usize = conn.query_row("SELECT COUNT(*) FROM programs", [], |r| r.get(0))?;
    let pages: usize = conn.query_row(
        "SELECT COUNT(*) FROM programs WHERE html IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM programs WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let curricula: usize = conn.query_row(
        "SELECT COUNT(*) FROM curricula WHERE text IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    Ok(Stats {
        programs,
        pages,
        errors,
        curricula,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn page_roundtrip() {
        let conn = memory_db();
        save_page(
            &conn,
            &PageRow {
                key: "ai".to_string(),
                url: "https://abit.itmo.ru/program/master/ai".to_string(),
                html: Some("<html></html>".to_string()),
                status: Some(200),
                error: None,
            },
        )
        .unwrap();

        let pages = fetch_pages(&conn).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].key, "ai");
        assert_eq!(pages[0].status, Some(200));
    }

    #[test]
    fn error_pages_are_not_listed_for_build() {
        let conn = memory_db();
        save_page(
            &conn,
            &PageRow {
                key: "ai".to_string(),
                url: "u".to_string(),
                html: None,
                status: Some(503),
                error: Some("HTTP 503".to_string()),
            },
        )
        .unwrap();
        assert!(fetch_pages(&conn).unwrap().is_empty());

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.programs, 1);
        assert_eq!(stats.pages, 0);
        assert_eq!(stats.errors, 1);
    }

    #[test]
    fn curriculum_text_roundtrip() {
        let conn = memory_db();
        save_page(
            &conn,
            &PageRow {
                key: "ai".to_string(),
                url: "u".to_string(),
                html: Some(String::new()),
                status: Some(200),
                error: None,
            },
        )
        .unwrap();
        save_curriculum(&conn, "ai", "https://example.com/plan.pdf", Some("план"), None).unwrap();
        assert_eq!(fetch_curriculum_text(&conn, "ai").unwrap().as_deref(), Some("план"));
        assert_eq!(fetch_curriculum_text(&conn, "ai_product").unwrap(), None);
    }

    #[test]
    fn refetch_replaces_page() {
        let conn = memory_db();
        for html in ["old", "new"] {
            save_page(
                &conn,
                &PageRow {
                    key: "ai".to_string(),
                    url: "u".to_string(),
                    html: Some(html.to_string()),
                    status: Some(200),
                    error: None,
                },
            )
            .unwrap();
        }
        let pages = fetch_pages(&conn).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].html.as_deref(), Some("new"));
    }
}
