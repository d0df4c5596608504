//! `list` command: enumerate and print an account's repositories.

use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use super::{format_bytes, CliError, FilterArgs, SelectionArgs};
use crate::engine::{EngineError, FetchRequest, FetchUseCase};
use crate::provider::ProviderError;

/// Output format for the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned plain-text table
    Table,
    /// JSON array
    Json,
}

/// Arguments for the `list` subcommand.
#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Account to enumerate
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Filters applied to the listing
    #[command(flatten)]
    pub filter: FilterArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Serialize)]
struct ListRow<'a> {
    name: &'a str,
    owner: &'a str,
    size: i64,
    fork: bool,
    language: Option<&'a str>,
    default_branch: &'a str,
    updated_at: String,
    clone_url: &'a str,
}

impl ListArgs {
    /// Run the command.
    pub async fn execute(&self, fetch: &FetchUseCase) -> Result<(), CliError> {
        let response = match fetch
            .execute(FetchRequest {
                owner: self.selection.owner.clone(),
                kind: self.selection.kind,
                filter: self.filter.to_filter(),
                pagination: None,
            })
            .await
        {
            Ok(response) => response,
            Err(EngineError::Provider(ProviderError::OwnerNotFound(owner))) => {
                println!("Owner '{owner}' not found or has no visible repositories.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if response.repositories.is_empty() {
            println!(
                "No repositories found for {} (fetched {}, filtered out {}).",
                self.selection.owner, response.total_fetched, response.filtered_out
            );
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => {
                let rows: Vec<ListRow<'_>> = response
                    .repositories
                    .iter()
                    .map(|repo| ListRow {
                        name: &repo.name,
                        owner: &repo.owner,
                        size: repo.size,
                        fork: repo.is_fork,
                        language: repo.language.as_deref(),
                        default_branch: &repo.default_branch,
                        updated_at: repo.updated_at.to_rfc3339(),
                        clone_url: &repo.clone_url,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows).unwrap_or_default());
            }
            OutputFormat::Table => {
                let name_width = response
                    .repositories
                    .iter()
                    .map(|r| r.name.len())
                    .max()
                    .unwrap_or(4)
                    .max(4);

                println!(
                    "{:<name_width$}  {:>10}  {:<5}  {:<12}  {}",
                    "NAME", "SIZE", "FORK", "LANGUAGE", "UPDATED"
                );
                for repo in &response.repositories {
                    println!(
                        "{:<name_width$}  {:>10}  {:<5}  {:<12}  {}",
                        repo.name,
                        format_bytes(repo.size.max(0) as u64),
                        if repo.is_fork { "yes" } else { "no" },
                        repo.language.as_deref().unwrap_or("-"),
                        repo.updated_at.format("%Y-%m-%d"),
                    );
                }
                println!(
                    "\n{} repositories ({} fetched, {} filtered out)",
                    response.repositories.len(),
                    response.total_fetched,
                    response.filtered_out
                );
            }
        }

        info!(
            owner = %self.selection.owner,
            count = response.repositories.len(),
            "listing complete"
        );

        Ok(())
    }
}
