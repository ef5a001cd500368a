//! sqlgate - a request-scoped SQL execution gateway.

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use cli::{Cli, Command, SavedCommand};
use serde::Serialize;
use sqlgate::config::Config;
use sqlgate::engine::PostgresPool;
use sqlgate::logging;
use sqlgate::metadata::ConfiguredExposure;
use sqlgate::persistence::SavedQueryStore;
use sqlgate::query::QueryService;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    match cli.command {
        Command::Query(args) => {
            let service = build_service(&config)?;
            let response = service.query(&args.to_request()).await;
            print_json(&response)?;
            if response.is_exception {
                std::process::exit(2);
            }
        }
        Command::Tables { project } => {
            let service = build_service(&config)?;
            print_json(&service.list_tables(&project).await?)?;
        }
        Command::Columns { project } => {
            let service = build_service(&config)?;
            print_json(&service.list_columns(&project).await?)?;
        }
        Command::Saved { action } => {
            let store = SavedQueryStore::open(&config.state_path()).await?;
            let outcome = run_saved(&store, action).await;
            store.close().await;
            outcome?;
        }
    }

    Ok(())
}

fn build_service(config: &Config) -> anyhow::Result<QueryService> {
    if config.projects.is_empty() {
        bail!("No projects configured. Add a [projects.<name>] section to the config file.");
    }
    let pool = PostgresPool::from_config(config).context("Failed to create engine pools")?;
    Ok(QueryService::new(Arc::new(pool))
        .with_exposure(Arc::new(ConfiguredExposure::from_config(config))))
}

async fn run_saved(store: &SavedQueryStore, action: SavedCommand) -> anyhow::Result<()> {
    match action {
        SavedCommand::Save {
            name,
            project,
            description,
            creator,
            sql,
        } => {
            let id = store
                .save_query(
                    &name,
                    project.as_deref(),
                    &sql,
                    creator.as_deref(),
                    description.as_deref(),
                )
                .await?;
            println!("{id}");
        }
        SavedCommand::List { creator } => {
            print_json(&store.list_queries(&creator).await?)?;
        }
        SavedCommand::Remove { id } => {
            if !store.remove_query(id).await? {
                bail!("Saved query {id} not found");
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
