use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::{Client, Url};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::db::{self, DetailFetchRow};
use crate::parser::listing::{self, FormFields};
use crate::settings::Settings;

const SEARCH_TARGET: &str = "ctl00$PlaceHolderMain$btnNewSearch";
const PAGER_TARGET: &str = "ctl00$PlaceHolderMain$dgvPermitList$gdvPermitList";
const START_DATE_FIELD: &str = "ctl00$PlaceHolderMain$generalSearchForm$txtGSStartDate";
const END_DATE_FIELD: &str = "ctl00$PlaceHolderMain$generalSearchForm$txtGSEndDate";
const PAGE_SIZE_FIELD: &str = "ctl00$PlaceHolderMain$dgvPermitList$ddlPageSize";

pub struct CrawlStats {
    pub pages: usize,
    pub permits: usize,
    pub inserted: usize,
}

pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn build_client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .user_agent(settings.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")
}

/// Submit the search form, then follow "Next >" until the last page (or
/// `max_pages`), storing listing rows as each page is parsed.
pub async fn crawl_listings(
    client: &Client,
    conn: &Connection,
    settings: &Settings,
    max_pages: Option<usize>,
) -> Result<CrawlStats> {
    let start = Url::parse(&settings.start_url).context("Invalid start_url")?;

    info!("Opening search page: {}", start);
    let html = client
        .get(start.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch search page")?;

    let mut form = listing::search_form(&html);
    if form.get("__VIEWSTATE").is_none() {
        warn!("Search page has no __VIEWSTATE field; the search postback will likely be rejected");
    }
    form.set("__EVENTTARGET", SEARCH_TARGET);
    form.set(START_DATE_FIELD, &settings.search_start_date);
    form.set(END_DATE_FIELD, &settings.end_date());
    form.set(PAGE_SIZE_FIELD, &settings.page_size.to_string());

    let mut stats = CrawlStats { pages: 0, permits: 0, inserted: 0 };
    let mut html = post_form(client, &start, &form).await?;

    loop {
        let page = listing::parse_listing(&html, &start);
        info!("Scraping page {} ({} permits)", page.page, page.rows.len());

        stats.pages += 1;
        stats.permits += page.rows.len();
        stats.inserted += db::insert_permits(conn, &page.rows)?;

        if !page.has_next {
            debug!("No next page link, stopping");
            break;
        }
        if max_pages.is_some_and(|n| stats.pages >= n) {
            info!("Reached page limit ({})", stats.pages);
            break;
        }

        info!("Next page link found, requesting page");
        let mut form = page.form;
        form.set("__EVENTTARGET", PAGER_TARGET);
        form.set("__EVENTARGUMENT", "Page$Next");
        html = post_form(client, &start, &form).await?;
    }

    Ok(stats)
}

async fn post_form(client: &Client, url: &Url, form: &FormFields) -> Result<String> {
    client
        .post(url.clone())
        .headers(postback_headers(url))
        .form(form.pairs())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("Failed to post form to {}", url))
}

fn postback_headers(referer: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let origin = referer.origin().ascii_serialization();
    if let Ok(v) = HeaderValue::from_str(&origin) {
        headers.insert(ORIGIN, v);
    }
    if let Ok(v) = HeaderValue::from_str(referer.as_str()) {
        headers.insert(REFERER, v);
    }
    headers
}

/// Fetch detail pages concurrently, saving each result to DB as it arrives.
pub async fn fetch_details_streaming(
    client: &Client,
    conn: &Connection,
    pages: Vec<(i64, String)>,
    concurrency: usize,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<DetailFetchRow>(concurrency.max(1) * 2);

    for (permit_id, url) in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetch_one(&client, permit_id, url).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    let mut insert_stmt = conn.prepare(
        "INSERT INTO detail_pages (permit_id, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut update_stmt = conn.prepare(
        "UPDATE permits SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;

    while let Some(row) = rx.recv().await {
        if let Some(e) = &row.error {
            warn!("Detail fetch failed for {}: {}", row.url, e);
            errors += 1;
        } else {
            ok += 1;
        }

        save_one(&mut insert_stmt, &mut update_stmt, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} detail pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

fn save_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    row: &DetailFetchRow,
) -> Result<()> {
    insert.execute(rusqlite::params![
        row.permit_id, row.url, row.html, row.status, row.error, row.latency_ms,
    ])?;
    update.execute(rusqlite::params![row.permit_id])?;
    Ok(())
}

/// One GET; failures become an error row instead of an Err.
async fn fetch_one(client: &Client, permit_id: i64, url: String) -> DetailFetchRow {
    let start = Instant::now();
    let result = async {
        let resp = client.get(&url).send().await?;
        let status = resp.status();
        let body = resp.error_for_status()?.text().await?;
        Ok::<_, reqwest::Error>((status.as_u16() as i32, body))
    }
    .await;
    let elapsed = start.elapsed().as_millis() as i64;

    match result {
        Ok((status, html)) => DetailFetchRow {
            permit_id,
            url,
            html: Some(html),
            status: Some(status),
            error: None,
            latency_ms: Some(elapsed),
        },
        Err(e) => DetailFetchRow {
            permit_id,
            url,
            html: None,
            status: e.status().map(|s| s.as_u16() as i32),
            error: Some(e.to_string()),
            latency_ms: Some(elapsed),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::USER_AGENT;

    #[test]
    fn postback_headers_use_origin_and_referer() {
        let url = Url::parse("https://aca-prod.accela.com/MISSOULA/Cap/CapHome.aspx?module=Building")
            .unwrap();
        let headers = postback_headers(&url);
        assert_eq!(headers[ORIGIN], "https://aca-prod.accela.com");
        assert_eq!(headers[REFERER], url.as_str());
        assert!(!headers.contains_key(USER_AGENT));
    }
}
