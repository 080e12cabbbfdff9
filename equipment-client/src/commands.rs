use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "equipment-client")]
#[command(about = "Command-line client for the equipment analytics service", long_about = None)]
pub struct Cli {
    /// Base URL of the service API
    #[arg(long, env = "EQUIPMENT_API_URL", default_value = "http://127.0.0.1:8000/api")]
    pub api_url: String,

    #[arg(long, env = "EQUIPMENT_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "EQUIPMENT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check that the service is up
    Health,
    /// Create a new account
    Register {
        #[arg(long)]
        email: Option<String>,
    },
    /// Log in and report the session status
    CheckAuth,
    /// Upload an equipment CSV file
    Upload { path: PathBuf },
    /// Show the most recent dataset's summary
    Summary,
    /// List the last five uploads
    History,
    /// Show one dataset with its rows
    Dataset {
        id: i64,
        /// Maximum number of rows to print
        #[arg(long, default_value_t = 20)]
        rows: usize,
    },
    /// Download a PDF report (latest dataset when no id is given)
    Report {
        id: Option<i64>,
        /// Output file; defaults to the name suggested by the service
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub fn requires_login(&self) -> bool {
        !matches!(self, Commands::Health | Commands::Register { .. })
    }
}
