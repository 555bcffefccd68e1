use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

mod db;
mod models;
mod ranking;
mod report;

#[derive(Parser)]
#[command(name = "campus-feed-ranker")]
#[command(about = "Ranked profile feed for the campus match app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic sample profiles
    Seed,
    /// Import profiles from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Score and order the feed for a viewer
    Rank {
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Record that a viewer saw a candidate profile
    View {
        #[arg(long)]
        viewer: String,
        #[arg(long)]
        candidate: String,
    },
    /// Generate a markdown feed report
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Sample profiles inserted.");
        }
        Commands::Import { csv } => {
            let upserted = db::import_csv(&pool, &csv).await?;
            println!("Upserted {upserted} profiles from {}.", csv.display());
        }
        Commands::Rank { email, limit } => {
            let viewer = db::fetch_profile_by_email(&pool, &email).await?;
            let candidates = db::fetch_candidates(&pool, viewer.id).await?;
            let history = db::PgViewHistory::new(pool.clone());
            let ranked = ranking::rank_candidates(&viewer, candidates, &history, Utc::now()).await;

            if ranked.is_empty() {
                println!("No candidates available for {email}.");
                return Ok(());
            }

            println!("Feed for {} ({}):", viewer.display_name, viewer.email);
            for entry in ranked.iter().take(limit) {
                println!(
                    "- {} ({}) score {:.2}",
                    entry.profile.display_name, entry.profile.email, entry.score
                );
            }
        }
        Commands::View { viewer, candidate } => {
            let viewer = db::fetch_profile_by_email(&pool, &viewer).await?;
            let candidate = db::fetch_profile_by_email(&pool, &candidate).await?;
            let view = models::ViewRecord {
                viewer_id: viewer.id,
                profile_id: candidate.id,
                profile_name: candidate.display_name.clone(),
                viewed_at: Utc::now(),
            };
            db::record_view(&pool, &view).await?;
            println!(
                "Recorded view of {} by {}.",
                candidate.display_name, viewer.display_name
            );
        }
        Commands::Report { email, out } => {
            let viewer = db::fetch_profile_by_email(&pool, &email).await?;
            let candidates = db::fetch_candidates(&pool, viewer.id).await?;
            let history = db::PgViewHistory::new(pool.clone());
            let ranked = ranking::rank_candidates(&viewer, candidates, &history, Utc::now()).await;
            let recent_views = db::fetch_recent_views(&pool, viewer.id, 5).await?;
            let feed_report = report::build_report(&viewer, &ranked, &recent_views, Utc::now());
            std::fs::write(&out, feed_report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
