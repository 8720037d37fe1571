use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::parser::detail::DetailData;
use crate::parser::professional::ProfessionalFields;
use crate::record::PermitRecord;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS permits (
            id            INTEGER PRIMARY KEY,
            page          TEXT NOT NULL,
            detail_url    TEXT NOT NULL,
            date          TEXT NOT NULL,
            permit_number TEXT NOT NULL,
            permit_type   TEXT NOT NULL,
            description   TEXT NOT NULL,
            address       TEXT NOT NULL,
            status        TEXT NOT NULL,
            visited       BOOLEAN NOT NULL DEFAULT 0,
            visited_at    TEXT,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(permit_number, detail_url)
        );
        CREATE INDEX IF NOT EXISTS idx_permits_visited ON permits(visited);

        CREATE TABLE IF NOT EXISTS detail_pages (
            id         INTEGER PRIMARY KEY,
            permit_id  INTEGER NOT NULL REFERENCES permits(id),
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            scraped_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_detail_pages_permit ON detail_pages(permit_id);

        CREATE TABLE IF NOT EXISTS permit_details (
            permit_id                     INTEGER PRIMARY KEY REFERENCES permits(id),
            work_location                 TEXT,
            has_professional              BOOLEAN NOT NULL DEFAULT 0,
            license_pro_business_name     TEXT NOT NULL DEFAULT '',
            license_pro_address_line      TEXT NOT NULL DEFAULT '',
            license_pro_city              TEXT NOT NULL DEFAULT '',
            license_pro_state             TEXT NOT NULL DEFAULT '',
            license_pro_zip               TEXT NOT NULL DEFAULT '',
            license_pro_business_license  TEXT NOT NULL DEFAULT '',
            license_pro_po_box            TEXT NOT NULL DEFAULT '',
            license_pro_phone_num_1       TEXT NOT NULL DEFAULT '',
            license_pro_phone_num_2       TEXT NOT NULL DEFAULT '',
            license_pro_phone_num_3       TEXT NOT NULL DEFAULT '',
            processed_at                  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Listing ──

/// Listing-page fields of one permit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermitRow {
    pub page: String,
    pub detail_url: String,
    pub date: String,
    pub permit_number: String,
    pub permit_type: String,
    pub description: String,
    pub address: String,
    pub status: String,
}

pub fn insert_permits(conn: &Connection, rows: &[PermitRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO permits
             (page, detail_url, date, permit_number, permit_type, description, address, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for r in rows {
            count += stmt.execute(rusqlite::params![
                r.page, r.detail_url, r.date, r.permit_number, r.permit_type,
                r.description, r.address, r.status,
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Permits with a detail URL that have not been fetched yet, as (id, url).
pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = format!(
        "SELECT id, detail_url FROM permits
         WHERE visited = 0 AND detail_url != ''
         ORDER BY id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Detail pages ──

pub struct DetailFetchRow {
    pub permit_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub struct DetailPage {
    pub permit_id: i64,
    pub html: String,
}

/// Successfully fetched detail pages without a parsed result yet.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<DetailPage>> {
    let sql = format!(
        "SELECT dp.permit_id, dp.html
         FROM detail_pages dp
         LEFT JOIN permit_details pd ON pd.permit_id = dp.permit_id
         WHERE dp.html IS NOT NULL AND dp.error IS NULL AND pd.permit_id IS NULL
         GROUP BY dp.permit_id
         ORDER BY dp.permit_id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(DetailPage {
                permit_id: row.get(0)?,
                html: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn save_details(conn: &Connection, rows: &[(i64, DetailData)]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO permit_details
             (permit_id, work_location, has_professional,
              license_pro_business_name, license_pro_address_line, license_pro_city,
              license_pro_state, license_pro_zip, license_pro_business_license,
              license_pro_po_box, license_pro_phone_num_1, license_pro_phone_num_2,
              license_pro_phone_num_3)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
        )?;
        for (permit_id, d) in rows {
            let p = &d.professional;
            stmt.execute(rusqlite::params![
                permit_id, d.work_location, d.has_professional,
                p.business_name, p.address_line, p.city, p.state, p.zip,
                p.business_license, p.po_box, p.phone_1, p.phone_2, p.phone_3,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Export ──

/// Every stored permit merged with its parsed detail, in insertion order.
pub fn fetch_records(conn: &Connection) -> Result<Vec<PermitRecord>> {
    let mut stmt = conn.prepare(
        "SELECT p.page, p.detail_url, p.date, p.permit_number, p.permit_type,
                p.description, p.address, p.status,
                d.permit_id, d.work_location, d.has_professional,
                d.license_pro_business_name, d.license_pro_address_line, d.license_pro_city,
                d.license_pro_state, d.license_pro_zip, d.license_pro_business_license,
                d.license_pro_po_box, d.license_pro_phone_num_1, d.license_pro_phone_num_2,
                d.license_pro_phone_num_3
         FROM permits p
         LEFT JOIN permit_details d ON d.permit_id = p.id
         ORDER BY p.id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            let listing = PermitRow {
                page: row.get(0)?,
                detail_url: row.get(1)?,
                date: row.get(2)?,
                permit_number: row.get(3)?,
                permit_type: row.get(4)?,
                description: row.get(5)?,
                address: row.get(6)?,
                status: row.get(7)?,
            };
            let detail = match row.get::<_, Option<i64>>(8)? {
                Some(_) => Some(DetailData {
                    work_location: row.get(9)?,
                    has_professional: row.get(10)?,
                    professional: ProfessionalFields {
                        business_name: row.get(11)?,
                        address_line: row.get(12)?,
                        city: row.get(13)?,
                        state: row.get(14)?,
                        zip: row.get(15)?,
                        business_license: row.get(16)?,
                        po_box: row.get(17)?,
                        phone_1: row.get(18)?,
                        phone_2: row.get(19)?,
                        phone_3: row.get(20)?,
                    },
                }),
                None => None,
            };
            Ok(PermitRecord::assemble(listing, detail))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub permits: usize,
    pub with_detail_url: usize,
    pub visited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub processed: usize,
    pub with_professional: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        permits: count("SELECT COUNT(*) FROM permits")?,
        with_detail_url: count("SELECT COUNT(*) FROM permits WHERE detail_url != ''")?,
        visited: count("SELECT COUNT(*) FROM permits WHERE visited = 1")?,
        fetched: count("SELECT COUNT(*) FROM detail_pages")?,
        errors: count("SELECT COUNT(*) FROM detail_pages WHERE error IS NOT NULL")?,
        processed: count("SELECT COUNT(*) FROM permit_details")?,
        with_professional: count("SELECT COUNT(*) FROM permit_details WHERE has_professional = 1")?,
    })
}
