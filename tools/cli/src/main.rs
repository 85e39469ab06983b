//! Campus Sync CLI - Command line interface for the sync service.
//!
//! Runs the HTTP service and talks to a running one: export pages,
//! import payload files, and print the attribute schema.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use campussync_common::EntityType;
use campussync_server::ServiceConfig;
use campussync_sync::{ExportQuery, ImportReport, SchemaRegistry};

#[derive(Parser)]
#[command(name = "campussync")]
#[command(about = "Campus Sync - College, course, exam and stream synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve {
        /// Configuration file.
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Write a starter configuration with a generated edit token.
    InitConfig {
        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,

        /// Directory for the local store.
        #[arg(short, long, default_value = "./campussync-data")]
        data_dir: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Fetch one export page from a running service.
    Export {
        /// Service base URL including the namespace.
        #[arg(short, long)]
        url: String,

        /// Bearer token.
        #[arg(short, long)]
        token: String,

        /// Comma-separated types.
        #[arg(long)]
        types: Option<String>,

        /// Status filter.
        #[arg(long)]
        status: Option<String>,

        /// Page number.
        #[arg(long)]
        page: Option<u32>,

        /// Page size.
        #[arg(long)]
        per_page: Option<u32>,

        /// Only entities modified after this ISO-8601 timestamp.
        #[arg(long)]
        since: Option<String>,
    },

    /// Post a payload file to a running service.
    Import {
        /// Service base URL including the namespace.
        #[arg(short, long)]
        url: String,

        /// Bearer token.
        #[arg(short, long)]
        token: String,

        /// Payload file: a request object or a bare array of items.
        #[arg(short, long)]
        file: PathBuf,

        /// Classify items without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the attribute reference.
    Schema {
        /// Only this type.
        #[arg(short = 't', long = "type")]
        entity_type: Option<EntityType>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins over --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { config } => cmd_serve(&config).await,

        Commands::InitConfig {
            output,
            data_dir,
            force,
        } => cmd_init_config(&output, &data_dir, force),

        Commands::Export {
            url,
            token,
            types,
            status,
            page,
            per_page,
            since,
        } => {
            let query = ExportQuery {
                types,
                status,
                page: page.map(|p| p.to_string()),
                per_page: per_page.map(|p| p.to_string()),
                since,
            };
            cmd_export(&url, &token, &query).await
        }

        Commands::Import {
            url,
            token,
            file,
            dry_run,
        } => cmd_import(&url, &token, &file, dry_run).await,

        Commands::Schema { entity_type } => cmd_schema(entity_type),
    }
}

/// Join a service base URL and a route.
fn endpoint(base: &str, route: &str) -> Result<url::Url> {
    let base = url::Url::parse(base).with_context(|| format!("Invalid service URL: {}", base))?;
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), route);
    url::Url::parse(&joined).context("Invalid endpoint URL")
}

/// Turn an error response into a readable failure.
async fn check_response(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("Service returned a non-JSON response ({})", status))?;

    if !status.is_success() {
        anyhow::bail!(
            "Service rejected the request ({}): {} [{}]",
            status,
            body["message"].as_str().unwrap_or("unknown error"),
            body["code"].as_str().unwrap_or("unknown")
        );
    }
    Ok(body)
}

/// Run the service.
async fn cmd_serve(config_path: &Path) -> Result<()> {
    let config = ServiceConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    info!("Starting service (store backend: {})", config.store.backend);
    campussync_server::serve(config)
        .await
        .context("Service stopped")?;

    Ok(())
}

/// Write a starter configuration.
fn cmd_init_config(output: &Path, data_dir: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    let config = ServiceConfig::starter(data_dir);
    let json = config.to_json().context("Failed to serialize configuration")?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Configuration written to {}", output.display());
    println!("  Listen: {}{}", config.server.bind_addr, config.server.namespace);
    println!("  Data: {}", data_dir.display());
    for token in &config.server.tokens {
        println!("  Token ({:?}, {}): {}", token.role, token.label, token.token);
    }

    Ok(())
}

/// Fetch and print one export page.
async fn cmd_export(base: &str, token: &str, query: &ExportQuery) -> Result<()> {
    let url = endpoint(base, "sync/export")?;
    debug!("GET {}", url);

    let response = reqwest::Client::new()
        .get(url)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .query(query)
        .send()
        .await
        .context("Export request failed")?;

    let body = check_response(response).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}

/// Read a payload file into a request body.
fn load_payload(file: &Path, dry_run: bool) -> Result<Value> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let mut payload = match parsed {
        Value::Array(items) => serde_json::json!({ "items": items }),
        Value::Object(_) => parsed,
        _ => anyhow::bail!("{} must hold an object or an array of items", file.display()),
    };
    if dry_run {
        payload["dry_run"] = Value::Bool(true);
    }

    Ok(payload)
}

/// Post a payload file and print the report.
async fn cmd_import(base: &str, token: &str, file: &Path, dry_run: bool) -> Result<()> {
    let payload = load_payload(file, dry_run)?;
    let url = endpoint(base, "sync/import")?;
    info!("Importing {} into {}", file.display(), url);

    let response = reqwest::Client::new()
        .post(url)
        .header(AUTHORIZATION, format!("Bearer {}", token))
        .json(&payload)
        .send()
        .await
        .context("Import request failed")?;

    let body = check_response(response).await?;
    let report: ImportReport =
        serde_json::from_value(body).context("Unexpected import response")?;

    println!(
        "{}Imported: {} created, {} updated, {} deleted, {} skipped",
        if dry_run { "[dry run] " } else { "" },
        report.created,
        report.updated,
        report.deleted,
        report.skipped
    );
    for item in &report.items {
        println!("  {:?} {} '{}' ({})", item.action, item.post_type, item.slug, item.id);
    }
    if !report.errors.is_empty() {
        println!("Errors:");
        for error in &report.errors {
            println!("  - {}", error);
        }
    }

    Ok(())
}

/// Print the attribute reference.
fn cmd_schema(only: Option<EntityType>) -> Result<()> {
    let schema = SchemaRegistry::standard();

    for entity_type in EntityType::ALL {
        if only.is_some_and(|t| t != entity_type) {
            continue;
        }

        println!("{}:", entity_type);
        for field in schema.fields(entity_type) {
            let mut notes = Vec::new();
            if field.attachment {
                notes.push("media".to_string());
            }
            if let Some(relation) = &field.relation {
                notes.push(format!(
                    "relation '{}' -> {}.{}",
                    relation.payload_key, relation.related, relation.reciprocal_key
                ));
            }

            if notes.is_empty() {
                println!("  {:<40} {}", field.key, field.field_type);
            } else {
                println!(
                    "  {:<40} {} ({})",
                    field.key,
                    field.field_type,
                    notes.join(", ")
                );
            }
        }
        for taxonomy in schema.taxonomies(entity_type) {
            println!("  taxonomy: {}", taxonomy);
        }
        println!();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let url = endpoint("http://127.0.0.1:8080/campus/v1/", "sync/export").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/campus/v1/sync/export");

        assert!(endpoint("not a url", "sync/export").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "campussync",
            "-v",
            "export",
            "--url",
            "http://localhost:8080/campus/v1",
            "--token",
            "abc",
            "--types",
            "college,exam",
            "--per-page",
            "5",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Export { per_page: Some(5), .. }
        ));

        let cli = Cli::try_parse_from(["campussync", "schema", "--type", "stream"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Schema {
                entity_type: Some(EntityType::Stream)
            }
        ));
    }
}
