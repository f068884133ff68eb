#![forbid(unsafe_code)]

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use story4d::config::Settings;
use story4d::server;
use story4d::stages::{Stage, StoryPipeline};

#[derive(Parser)]
#[command(name = "story4d", version, about = "User story refinement service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the stage API over HTTP
    Serve {
        /// Overrides STORY4D_BIND
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run one stage against a JSON request file
    Run {
        #[arg(long)]
        stage: Stage,
        #[arg(long)]
        request: PathBuf,
        /// Write the response here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List stages and their routes
    Stages,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            let mut settings = Settings::from_env()?;
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            server::serve(&settings).await?;
        }
        Commands::Run {
            stage,
            request,
            out,
        } => {
            let settings = Settings::from_env()?;
            let pipeline = StoryPipeline::from_settings(&settings)?;
            let input: serde_json::Value = read_json(&request)?;
            let response = pipeline.run(stage, input).await.map_err(
                |e| -> Box<dyn std::error::Error> {
                    format!("{stage} failed ({}): {}", e.status_code(), e.detail()).into()
                },
            )?;
            match out {
                Some(path) => write_json(&path, &response)?,
                None => println!("{}", serde_json::to_string_pretty(&response)?),
            }
        }
        Commands::Stages => {
            for stage in Stage::ALL {
                println!("{:<18} POST {}", stage.slug(), stage.route());
            }
        }
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
