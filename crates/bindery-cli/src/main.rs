mod output;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bindery_client::{HttpSyncRunner, ReqwestProber};
use bindery_core::{
    AppError, CanonicalField, DiscoverySource, OnboardingService, PollPolicy, ResourceConfig,
    SyncCoordinator, SyncTarget, TriggerOutcome, validate,
};

use output::Format;

#[derive(Parser)]
#[command(name = "bindery", version, about = "Onboard JSON APIs into a book catalog")]
struct Cli {
    /// Allow probing private/reserved addresses (localhost, 10/8, ...)
    #[arg(long, global = true, env = "BINDERY_ALLOW_PRIVATE_URLS", default_value_t = false)]
    allow_private_urls: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one test request to an endpoint and print the JSON body
    Probe {
        /// Resource config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Endpoint path (defaults to the config's default endpoint)
        #[arg(short, long)]
        endpoint: Option<String>,
    },

    /// List candidate record collections in a response
    Collections {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Rank candidate paths for a canonical field inside a collection
    Fields {
        #[command(flatten)]
        source: SourceArgs,

        /// Collection path, e.g. "items" or "response.docs"
        #[arg(long)]
        collection: String,

        /// Canonical field (title, authors, subject, isbn, issn, thumbnail)
        #[arg(long, value_parser = parse_field)]
        field: CanonicalField,

        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Propose a collection and field map, printed as an endpoint definition
    Suggest {
        #[command(flatten)]
        source: SourceArgs,

        /// Label for the proposed endpoint
        #[arg(long, default_value = "Suggested endpoint")]
        label: String,

        /// Path for the proposed endpoint (defaults to --endpoint or "/")
        #[arg(long)]
        path: Option<String>,
    },

    /// Check a resource config and report every problem
    Validate {
        /// Resource config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },

    /// Trigger and observe syncs on the external job runner
    Sync {
        #[command(subcommand)]
        command: SyncCommands,

        /// Job runner base URL
        #[arg(long, global = true, env = "BINDERY_RUNNER_URL")]
        runner_url: Option<String>,

        /// Bearer token for the job runner
        #[arg(long, global = true, env = "BINDERY_RUNNER_TOKEN", hide_env_values = true)]
        runner_token: Option<String>,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Dispatch a sync job
    Trigger {
        #[arg(value_enum)]
        kind: TargetKind,
        id: String,
    },

    /// Read the current status once
    Status {
        #[arg(value_enum)]
        kind: TargetKind,
        id: String,
    },

    /// Poll status until interrupted (2-3s while syncing, 30s otherwise)
    Watch {
        #[arg(value_enum)]
        kind: TargetKind,
        id: String,

        /// Stop once a sync that was observed running is no longer running
        #[arg(long, default_value_t = false)]
        until_done: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetKind {
    Resource,
    Endpoint,
}

impl TargetKind {
    fn target(self, id: String) -> SyncTarget {
        match self {
            TargetKind::Resource => SyncTarget::Resource(id),
            TargetKind::Endpoint => SyncTarget::Endpoint(id),
        }
    }
}

/// Where discovery reads its document from.
#[derive(Args)]
struct SourceArgs {
    /// Previously saved response body (JSON file, "-" for stdin)
    #[arg(short, long, conflicts_with = "config", required_unless_present = "config")]
    input: Option<PathBuf>,

    /// Resource config file; the endpoint is probed first
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint path to probe (defaults to the config's default endpoint)
    #[arg(short, long, requires = "config")]
    endpoint: Option<String>,
}

impl SourceArgs {
    fn into_source(self) -> Result<DiscoverySource> {
        match (self.input, self.config) {
            (Some(input), _) => Ok(DiscoverySource::Document(read_document(&input)?)),
            (None, Some(config)) => Ok(DiscoverySource::Probe {
                config: Box::new(load_config(&config)?),
                endpoint_path: self.endpoint,
            }),
            (None, None) => bail!("Either --input or --config is required"),
        }
    }
}

fn parse_field(raw: &str) -> Result<CanonicalField, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bindery=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Probe { config, endpoint } => {
            let service = onboarding(cli.allow_private_urls)?;
            let config = load_config(&config)?;
            let result = service
                .probe(&config, endpoint.as_deref())
                .await
                .map_err(describe)?;
            tracing::info!(status = result.status, elapsed_ms = result.elapsed_ms, "Probe complete");
            output::json(&mut stdout, &result.body)?;
        }
        Commands::Collections { source, format } => {
            let service = onboarding(cli.allow_private_urls)?;
            let candidates = service
                .collections(source.into_source()?)
                .await
                .map_err(describe)?;
            output::collections(&mut stdout, &candidates, format)?;
        }
        Commands::Fields {
            source,
            collection,
            field,
            format,
        } => {
            let service = onboarding(cli.allow_private_urls)?;
            let discovery = service
                .fields(source.into_source()?, &collection, field)
                .await
                .map_err(describe)?;
            output::fields(&mut stdout, &discovery, format)?;
        }
        Commands::Suggest {
            source,
            label,
            path,
        } => {
            let path = path
                .or_else(|| source.endpoint.clone())
                .unwrap_or_else(|| "/".to_string());
            let service = onboarding(cli.allow_private_urls)?;
            let suggestion = service
                .suggest(source.into_source()?)
                .await
                .map_err(describe)?;
            match suggestion.into_endpoint(&label, &path) {
                Some(endpoint) => output::json(&mut stdout, &endpoint)?,
                None => bail!("No collection found in the response; nothing to suggest"),
            }
        }
        Commands::Validate { config, format } => {
            cmd_validate(&mut stdout, &config, format)?;
        }
        Commands::Sync {
            command,
            runner_url,
            runner_token,
        } => {
            let runner_url = runner_url
                .context("Job runner URL not set. Pass --runner-url or set BINDERY_RUNNER_URL.")?;
            let runner = HttpSyncRunner::new(&runner_url, runner_token).map_err(describe)?;
            let coordinator = SyncCoordinator::new(runner, PollPolicy::from_env()?);
            cmd_sync(&mut stdout, &coordinator, command).await?;
        }
    }

    Ok(())
}

fn onboarding(allow_private_urls: bool) -> Result<OnboardingService<ReqwestProber>> {
    let mut prober = ReqwestProber::new().context("Failed to create HTTP client")?;
    if allow_private_urls {
        prober = prober.allow_private_urls();
    }
    Ok(OnboardingService::new(prober))
}

fn load_config(path: &Path) -> Result<ResourceConfig> {
    Ok(ResourceConfig::from_path(path)?)
}

fn read_document(path: &Path) -> Result<serde_json::Value> {
    let raw = if path == Path::new("-") {
        io::read_to_string(io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file: {}", path.display()))?
    };
    serde_json::from_str(&raw).context("Response file is not valid JSON")
}

/// Attach the probe failure kind to the error chain.
fn describe(error: AppError) -> anyhow::Error {
    match &error {
        AppError::Probe(probe) => {
            let kind = format!("{:?}", probe.kind());
            anyhow::Error::new(error).context(format!("Probe failed ({kind})"))
        }
        _ => anyhow::Error::new(error),
    }
}

fn cmd_validate(out: &mut impl Write, path: &Path, format: Format) -> Result<()> {
    let config = load_config(path)?;
    match validate(&config) {
        Ok(()) => {
            if format == Format::Json {
                output::json(out, &Vec::<bindery_core::ValidationError>::new())?;
            } else {
                writeln!(out, "{}: OK", path.display())?;
            }
            Ok(())
        }
        Err(errors) => {
            output::validation(out, &errors, format)?;
            bail!("{} is invalid ({} problem(s))", path.display(), errors.len())
        }
    }
}

async fn cmd_sync(
    out: &mut impl Write,
    coordinator: &SyncCoordinator<HttpSyncRunner>,
    command: SyncCommands,
) -> Result<()> {
    match command {
        SyncCommands::Trigger { kind, id } => {
            let target = kind.target(id);
            match coordinator.trigger(&target).await? {
                TriggerOutcome::Dispatched => writeln!(out, "Sync dispatched for {target}")?,
                TriggerOutcome::Suppressed => {
                    writeln!(out, "A trigger for {target} is already outstanding")?
                }
            }
        }
        SyncCommands::Status { kind, id } => {
            let snapshot = coordinator.read_now(&kind.target(id)).await?;
            writeln!(out, "{}", output::snapshot_line(&snapshot))?;
        }
        SyncCommands::Watch {
            kind,
            id,
            until_done,
        } => {
            let mut subscription = coordinator.subscribe(kind.target(id))?;
            let mut seen_syncing = false;
            loop {
                tokio::select! {
                    snapshot = subscription.next() => {
                        let Some(snapshot) = snapshot else { break };
                        writeln!(out, "{}", output::snapshot_line(&snapshot))?;
                        out.flush()?;
                        if snapshot.is_syncing() {
                            seen_syncing = true;
                        } else if until_done && seen_syncing {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted, stopping watch");
                        break;
                    }
                }
            }
            subscription.unsubscribe();
            coordinator.shutdown();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_discovery_commands() {
        let cli = Cli::try_parse_from([
            "bindery", "fields", "--input", "resp.json", "--collection", "items", "--field", "title",
        ])
        .unwrap();
        match cli.command {
            Commands::Fields { field, collection, .. } => {
                assert_eq!(field, CanonicalField::Title);
                assert_eq!(collection, "items");
            }
            _ => panic!("expected fields command"),
        }
    }

    #[test]
    fn test_cli_requires_a_source() {
        assert!(Cli::try_parse_from(["bindery", "collections"]).is_err());
        assert!(
            Cli::try_parse_from([
                "bindery", "collections", "--input", "a.json", "--config", "b.json"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_cli_rejects_unknown_field() {
        assert!(
            Cli::try_parse_from([
                "bindery", "fields", "--input", "a.json", "--collection", "items", "--field", "price",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_cli_parses_sync_watch() {
        let cli = Cli::try_parse_from([
            "bindery", "sync", "watch", "endpoint", "e1", "--until-done", "--runner-url",
            "http://localhost:9000",
        ])
        .unwrap();
        match cli.command {
            Commands::Sync {
                command: SyncCommands::Watch { id, until_done, .. },
                runner_url,
                ..
            } => {
                assert_eq!(id, "e1");
                assert!(until_done);
                assert_eq!(runner_url.as_deref(), Some("http://localhost:9000"));
            }
            _ => panic!("expected sync watch"),
        }
    }

    #[test]
    fn test_validate_command_reports_problems() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "base_url": "ftp://example.com",
                "default_endpoint": "/volumes",
                "rate_limit": {"requests_per_minute": 60, "burst_limit": 90},
                "endpoints": []
            }"#,
        )
        .unwrap();

        let mut out = Vec::new();
        let err = cmd_validate(&mut out, &path, Format::Csv).unwrap_err();
        assert!(err.to_string().contains("is invalid"));

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("path,message\n"));
        assert!(text.contains("rate_limit.burst_limit"));
        assert!(text.contains("base_url"));
        assert!(text.contains("endpoints"));
    }

    #[test]
    fn test_read_document_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("resp.json");
        std::fs::write(&path, r#"{"items": [1]}"#).unwrap();
        let doc = read_document(&path).unwrap();
        assert_eq!(doc["items"][0], 1);

        std::fs::write(&path, "not json").unwrap();
        assert!(read_document(&path).is_err());
    }
}
