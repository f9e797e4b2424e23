use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenvy::dotenv;
use std::env;

mod commands;

#[derive(Parser)]
#[command(name = "nf-cache")]
#[command(about = "Cache administration CLI for the Newsflow Gateway", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, env = "REDIS_URL", help = "Store connection URL")]
    redis_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show per-namespace cache population and memory")]
    Stats,

    #[command(about = "Clear all caches except user data (asks for confirmation)")]
    Clear,

    #[command(about = "Clear all caches except user data without prompting")]
    Force,

    #[command(about = "Show complete statistics including hit rates and memory")]
    CompleteStats,

    #[command(about = "Delete every key and drop every index (requires typing NUCLEAR)")]
    Nuclear,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    let redis_url = cli
        .redis_url
        .or_else(|| env::var("REDIS_URL").ok())
        .unwrap_or_else(|| "redis://localhost:6379".to_string());

    match cli.command {
        Commands::Stats => commands::stats(&redis_url).await?,
        Commands::Clear => commands::clear(&redis_url, false).await?,
        Commands::Force => commands::clear(&redis_url, true).await?,
        Commands::CompleteStats => commands::complete_stats(&redis_url).await?,
        Commands::Nuclear => commands::nuclear(&redis_url).await?,
    }

    Ok(())
}
