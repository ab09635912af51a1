//! caredesk - inspect and drive a care team's cached data from the terminal.
//!
//! Every run restores the data store from the cache directory, so repeated
//! invocations within a resource's TTL are answered without network calls.

use std::io;

use anyhow::{bail, Context, Result};
use caredesk_core::cache::{
    MoodsResource, NotesResource, Resource, RoutinesResource, TasksResource, TeamDataResource,
};
use caredesk_core::models::{Note, Routine, Task, TaskStatus};
use caredesk_core::{ApiClient, Config, DataStore, ResourceKind, SnapshotFile, TeamActions};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "caredesk", version, about = "Care team data from the terminal")]
struct Cli {
    /// Team to work on; defaults to the last team used
    #[arg(short, long, global = true)]
    team: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Print one resource as JSON
    Fetch {
        resource: ResourceKind,
        /// Skip the cache
        #[arg(long)]
        force: bool,
    },
    /// Show cache age, loading and error state for every resource
    Status,
    /// Mark cached data stale, one resource or all of them
    Invalidate { resource: Option<ResourceKind> },
    /// Mark a task as done
    Done { task_id: String },
    /// Delete a task, routine or note
    Delete { resource: ResourceKind, id: String },
    /// Fetch every resource of a team at once
    Refresh {
        #[arg(long)]
        force: bool,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Fetch one resource and report the error slot if the network let us down.
async fn fetch_and_print<R: Resource>(store: &DataStore, team_id: &str, force: bool) -> Result<()> {
    let value = store.fetch::<R>(team_id, force).await;
    if let Some(error) = store.error(R::KIND, team_id) {
        eprintln!("warning: {} may be out of date: {}", R::KIND, error);
    }
    match value {
        Some(value) => print_json(&value),
        None => print_json(&Value::Null),
    }
}

struct Session {
    config: Config,
    store: DataStore,
}

impl Session {
    fn open() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };

        let mut api = ApiClient::new(config.api_base_url())?;
        if let Some(token) = config.token() {
            api.set_token(token);
        }

        let cache_dir = config.cache_dir()?;
        debug!(?cache_dir, "Cache directory configured");
        let store = DataStore::restore(api, SnapshotFile::in_dir(&cache_dir));

        Ok(Self { config, store })
    }

    /// The explicit team, else the last one used.
    fn team(&mut self, team: Option<String>) -> Result<String> {
        let team = match team.or_else(|| self.config.last_team_id.clone()) {
            Some(team) if !team.is_empty() => team,
            _ => bail!("No team given and no previous team remembered"),
        };

        if self.config.last_team_id.as_deref() != Some(team.as_str()) {
            self.config.last_team_id = Some(team.clone());
            if let Err(e) = self.config.save() {
                warn!(error = %e, "Failed to remember team");
            }
        }
        Ok(team)
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut ctx = Session::open()?;
    let team = ctx.team(cli.team)?;
    let store = &ctx.store;

    match cli.command {
        Command::Fetch { resource, force } => match resource {
            ResourceKind::TeamData => {
                fetch_and_print::<TeamDataResource>(store, &team, force).await
            }
            ResourceKind::Tasks => fetch_and_print::<TasksResource>(store, &team, force).await,
            ResourceKind::Routines => {
                fetch_and_print::<RoutinesResource>(store, &team, force).await
            }
            ResourceKind::Notes => fetch_and_print::<NotesResource>(store, &team, force).await,
            ResourceKind::Moods => fetch_and_print::<MoodsResource>(store, &team, force).await,
        },
        Command::Status => {
            for status in store.status(&team) {
                println!(
                    "{:<10} {:<12} {:<6} {}",
                    status.kind.to_string(),
                    status.age.as_deref().unwrap_or("never"),
                    if status.stale { "stale" } else { "fresh" },
                    status.error.as_deref().unwrap_or(""),
                );
            }
            Ok(())
        }
        Command::Invalidate { resource } => {
            match resource {
                Some(kind) => store.invalidate(kind, &team),
                None => store.invalidate_all(&team),
            }
            Ok(())
        }
        Command::Done { task_id } => {
            let actions = TeamActions::new(store.clone());
            actions
                .set_task_status(&team, &task_id, TaskStatus::Done)
                .await
                .with_context(|| format!("Failed to complete task {}", task_id))?;
            info!(team = %team, task_id = %task_id, "Task completed");
            Ok(())
        }
        Command::Delete { resource, id } => {
            let actions = TeamActions::new(store.clone());
            let result = match resource {
                ResourceKind::Tasks => actions.delete::<TasksResource, Task>(&team, &id).await,
                ResourceKind::Routines => {
                    actions.delete::<RoutinesResource, Routine>(&team, &id).await
                }
                ResourceKind::Notes => actions.delete::<NotesResource, Note>(&team, &id).await,
                other => bail!("{} cannot be deleted", other),
            };
            result.with_context(|| format!("Failed to delete {} {}", resource, id))
        }
        Command::Refresh { force } => {
            let bundle = store.refresh_team(&team, force).await;
            println!(
                "{}: {} tasks, {} routines, {} notes, {} moods",
                bundle
                    .team_data
                    .as_ref()
                    .map(|d| d.team.name.as_str())
                    .unwrap_or(team.as_str()),
                bundle.tasks.len(),
                bundle.routines.len(),
                bundle.notes.len(),
                bundle.moods.len(),
            );
            for status in store.status(&team) {
                if let Some(error) = status.error {
                    eprintln!("warning: {}: {}", status.kind, error);
                }
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("caredesk").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_team_flag_works_anywhere() {
        let cli = parse(&["--team", "team1", "done", "t1"]);
        assert_eq!(cli.team.as_deref(), Some("team1"));
        assert_eq!(cli.command, Command::Done { task_id: "t1".into() });

        let cli = parse(&["delete", "notes", "n1", "-t", "team2"]);
        assert_eq!(cli.team.as_deref(), Some("team2"));
        assert_eq!(
            cli.command,
            Command::Delete {
                resource: ResourceKind::Notes,
                id: "n1".into()
            }
        );
    }

    #[test]
    fn test_team_is_optional() {
        let cli = parse(&["invalidate"]);
        assert_eq!(cli.team, None);
        assert_eq!(cli.command, Command::Invalidate { resource: None });

        let cli = parse(&["invalidate", "moods"]);
        assert_eq!(
            cli.command,
            Command::Invalidate {
                resource: Some(ResourceKind::Moods)
            }
        );

        let cli = parse(&["fetch", "team", "--force"]);
        assert_eq!(
            cli.command,
            Command::Fetch {
                resource: ResourceKind::TeamData,
                force: true
            }
        );
    }
}
