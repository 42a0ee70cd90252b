mod commands;
mod config;
mod host;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_add, cmd_delete, cmd_goal, cmd_health, cmd_manual, cmd_photo, cmd_summary,
};
use crate::config::{Config, Overrides};
use nibble_core::models::{GoalPatch, ManualEntry};

#[derive(Parser)]
#[command(
    name = "nibble",
    version,
    about = "A food diary that estimates calories from text and photos",
    long_about = "\n\n  ┌┐┌┬┌┐ ┌┐ ┬  ┌─┐
  │││││├┴┐├┴┐│  ├┤
  ┘└┘┴└─┘└─┘┴─┘└─┘
  describe it, snap it, log it.
"
)]
struct Cli {
    /// Base URL of the nutrition service
    #[arg(long, global = true, env = "NIBBLE_API_URL")]
    api_url: Option<String>,
    /// Numeric id of the acting user
    #[arg(long, global = true, env = "NIBBLE_USER_ID")]
    user_id: Option<i64>,
    /// First name sent when registering the user
    #[arg(long, global = true, env = "NIBBLE_FIRST_NAME")]
    first_name: Option<String>,
    /// Last name of the user
    #[arg(long, global = true, env = "NIBBLE_LAST_NAME")]
    last_name: Option<String>,
    /// Username sent when registering the user
    #[arg(long, global = true, env = "NIBBLE_USERNAME")]
    username: Option<String>,
    /// Request timeout in seconds
    #[arg(long, global = true, env = "NIBBLE_TIMEOUT", value_name = "SECS")]
    timeout: Option<u64>,
    /// Log requests and state changes to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the food log and totals (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, today or yesterday)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Describe a meal in words and log the estimate
    Add {
        /// What you ate, e.g. "bowl of borscht with sour cream"
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Upload a photo of a meal and log the estimate
    Photo {
        /// Path to a .jpg, .png, .webp or .gif image
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a meal with known values (kept for this session only)
    Manual {
        /// Food name
        name: String,
        /// Calories (whole number)
        calories: String,
        /// Protein in grams
        #[arg(long)]
        protein: Option<String>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<String>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a log entry by ID
    Delete {
        /// Entry ID to delete
        entry_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show or update the daily calorie goal and body stats
    Goal {
        /// Daily calorie goal (500-10000)
        #[arg(long)]
        calories: Option<u32>,
        /// Weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Age in years
        #[arg(long)]
        age: Option<u32>,
        /// Gender
        #[arg(long)]
        gender: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the nutrition service is reachable
    Health {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(Overrides {
        api_url: cli.api_url,
        timeout_secs: cli.timeout,
        user_id: cli.user_id,
        first_name: cli.first_name,
        last_name: cli.last_name,
        username: cli.username,
    })?;

    match cli.command {
        Commands::Summary { date, json } => cmd_summary(&config, date, json).await,
        Commands::Add { text, json } => cmd_add(&config, &text, json).await,
        Commands::Photo { path, json } => cmd_photo(&config, &path, json).await,
        Commands::Manual {
            name,
            calories,
            protein,
            carbs,
            fat,
            json,
        } => {
            let manual = ManualEntry {
                name,
                calories,
                protein,
                carbs,
                fat,
            };
            cmd_manual(&config, manual, json).await
        }
        Commands::Delete { entry_id, json } => cmd_delete(&config, &entry_id, json).await,
        Commands::Goal {
            calories,
            weight,
            height,
            age,
            gender,
            json,
        } => {
            let patch = GoalPatch {
                calorie_goal: calories,
                weight,
                height,
                age,
                gender,
            };
            cmd_goal(&config, patch, json).await
        }
        Commands::Health { json } => cmd_health(&config, json).await,
    }
}
