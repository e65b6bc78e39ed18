//! Taskboard MCP Server
//!
//! Exposes project and task tracking tools to MCP clients such as Claude
//! Desktop over stdio using JSON-RPC 2.0.
//!
//! Usage:
//!   taskboard-mcp [--db-path <PATH>]

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskboard_core::Paths;
use taskboard_db::Database;
use taskboard_mcp::McpServer;

#[derive(Parser)]
#[command(name = "taskboard-mcp")]
#[command(about = "MCP server for project and task tracking")]
#[command(version)]
struct Cli {
    /// Database file (defaults to <data_dir>/taskboard/tasks.db)
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr, stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db_path.unwrap_or_else(|| Paths::new().db_file());

    info!("Starting taskboard MCP server (db: {})", db_path.display());

    let db = Database::open(&db_path)?;
    let mut server = McpServer::new(db);
    server.run().await?;

    Ok(())
}
