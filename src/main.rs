mod crawler;
mod db;
mod parser;
mod record;
mod settings;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use settings::Settings;

#[derive(Parser)]
#[command(name = "permit_scraper", about = "Missoula building permit scraper (Accela Citizen Access)")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the permit search and store every listing row
    Crawl {
        /// Stop after this many result pages
        #[arg(short = 'p', long)]
        max_pages: Option<usize>,
    },
    /// Fetch unvisited detail pages
    Scrape {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Concurrent requests (default: from settings)
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Parse fetched detail pages into work location + licensed professional
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Crawl + scrape + process in one pipeline
    Run {
        /// Stop crawling after this many result pages
        #[arg(short = 'p', long)]
        max_pages: Option<usize>,
        /// Max detail pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Write merged permit records as JSON lines
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse a saved detail page and print the result
    Parse {
        /// Path to a detail page HTML file
        file: PathBuf,
        /// The file holds only the Licensed Professional markup
        #[arg(long)]
        section: bool,
    },
    /// Show pipeline statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Crawl { max_pages } => {
            let conn = open_db(&settings)?;
            let client = crawler::build_client(&settings)?;
            let stats = crawler::crawl_listings(&client, &conn, &settings, max_pages).await?;
            println!(
                "Crawled {} pages: {} permits ({} new).",
                stats.pages, stats.permits, stats.inserted
            );
            Ok(())
        }
        Commands::Scrape { limit, concurrency } => {
            let conn = open_db(&settings)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited permits. Run 'crawl' first or all details are fetched.");
                return Ok(());
            }
            let client = crawler::build_client(&settings)?;
            let concurrency = concurrency.unwrap_or(settings.concurrency);
            println!("Fetching {} detail pages (streaming to DB)...", pages.len());
            let stats = crawler::fetch_details_streaming(&client, &conn, pages, concurrency).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = open_db(&settings)?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed detail pages. Run 'scrape' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Run { max_pages, limit } => {
            let conn = open_db(&settings)?;
            let client = crawler::build_client(&settings)?;

            // Phase 1: listing pages
            let t_crawl = Instant::now();
            let crawl = crawler::crawl_listings(&client, &conn, &settings, max_pages).await?;
            println!(
                "Crawled {} pages: {} permits ({} new) in {:.1}s",
                crawl.pages, crawl.permits, crawl.inserted, t_crawl.elapsed().as_secs_f64()
            );

            // Phase 2: detail pages
            let pages = db::fetch_unvisited(&conn, limit)?;
            if !pages.is_empty() {
                let t_fetch = Instant::now();
                println!("Fetching {} detail pages (streaming to DB)...", pages.len());
                let stats =
                    crawler::fetch_details_streaming(&client, &conn, pages, settings.concurrency)
                        .await?;
                println!(
                    "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                    stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
                );
            }

            // Phase 3: parse
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process.");
                return Ok(());
            }
            let t_process = Instant::now();
            println!("Processing {} pages...", unprocessed.len());
            let counts = process_pages(&conn, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Export { output } => {
            let conn = open_db(&settings)?;
            let records = db::fetch_records(&conn)?;
            let mut out: Box<dyn Write> = match &output {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path)
                        .with_context(|| format!("Failed to create {}", path.display()))?,
                )),
                None => Box::new(BufWriter::new(io::stdout().lock())),
            };
            for r in &records {
                serde_json::to_writer(&mut out, r)?;
                writeln!(out)?;
            }
            out.flush()?;
            info!("Exported {} records", records.len());
            Ok(())
        }
        Commands::Parse { file, section } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let json = if section {
                serde_json::to_string_pretty(&parser::professional::parse_section_html(&html))?
            } else {
                serde_json::to_string_pretty(&parser::detail::parse_detail(&html))?
            };
            println!("{}", json);
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings)?;
            let s = db::get_stats(&conn)?;
            println!("Permits:           {}", s.permits);
            println!("With detail URL:   {}", s.with_detail_url);
            println!("Visited:           {}", s.visited);
            println!("Fetched:           {}", s.fetched);
            println!("Fetch errors:      {}", s.errors);
            println!("Processed:         {}", s.processed);
            println!("With professional: {}", s.with_professional);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(settings: &Settings) -> Result<rusqlite::Connection> {
    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

struct ProcessCounts {
    pages: usize,
    with_professional: usize,
    with_work_location: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} details ({} with licensed professional, {} with work location).",
            self.pages, self.with_professional, self.with_work_location,
        );
    }
}

fn process_pages(conn: &rusqlite::Connection, pages: &[db::DetailPage]) -> Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        pages: 0,
        with_professional: 0,
        with_work_location: 0,
    };

    for chunk in pages.chunks(500) {
        let results: Vec<_> = chunk.par_iter().map(parser::process_page).collect();

        for (_, d) in &results {
            counts.pages += 1;
            counts.with_professional += d.has_professional as usize;
            counts.with_work_location += d.work_location.is_some() as usize;
        }

        db::save_details(conn, &results)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
