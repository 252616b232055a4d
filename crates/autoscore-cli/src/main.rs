mod server;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use autoscore_core::{
    DeductionPolicy, ERRORS_FIELD, FieldNames, SCORE_FIELD, SCORE_TARGET, Scorer, WebhookEvent,
    dispatch,
};
use autoscore_sync::{LabelStudioClient, LabelStudioConfig};
use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tracing::info;

use crate::server::App;

#[derive(Parser, Debug)]
#[command(name = "autoscore", version, about = "Deduction scoring for Label Studio review annotations")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Settings {
    /// Label Studio base URL (no trailing slash needed)
    #[arg(long, env = "LS_URL", default_value = "", global = true)]
    ls_url: String,

    /// Label Studio API token
    #[arg(long, env = "LS_API_KEY", default_value = "", hide_env_values = true, global = true)]
    ls_api_key: String,

    /// JSON file mapping error category to deduction points; replaces the built-in table
    #[arg(long, env = "AUTOSCORE_DEDUCTIONS", global = true)]
    deductions: Option<PathBuf>,

    /// Choices control holding the selected error categories
    #[arg(long, default_value = ERRORS_FIELD, global = true)]
    errors_field: String,

    /// Number control the score is written to
    #[arg(long, default_value = SCORE_FIELD, global = true)]
    score_field: String,

    /// Object the score entry points at
    #[arg(long, default_value = SCORE_TARGET, global = true)]
    score_target: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the webhook server
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, env = "PORT", default_value_t = 8000)]
        port: u16,
    },
    /// Print whether write-back is configured
    Health,
    /// Score one webhook event read from a file or stdin
    Score {
        /// Event JSON file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
        /// Write the score back to Label Studio instead of only printing it
        #[arg(long)]
        write: bool,
    },
    /// Print the active deduction table
    Policy,
}

impl Settings {
    fn label_studio(&self) -> LabelStudioConfig {
        LabelStudioConfig::new(self.ls_url.as_str(), self.ls_api_key.as_str())
    }

    fn scorer(&self) -> anyhow::Result<Scorer> {
        let policy = match &self.deductions {
            Some(path) => DeductionPolicy::load(path)?,
            None => DeductionPolicy::standard().clone(),
        };
        let fields = FieldNames {
            errors_field: self.errors_field.clone(),
            score_field: self.score_field.clone(),
            score_target: self.score_target.clone(),
        };
        Ok(Scorer::new(Arc::new(policy), fields))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let settings = &cli.settings;

    match &cli.command {
        Command::Serve { host, port } => {
            let ls = settings.label_studio();
            let health = ls.health();
            if !health.ok {
                tracing::warn!(?health, "Label Studio not configured; write-backs will fail");
            }
            let app = Arc::new(App {
                scorer: settings.scorer()?,
                writer: Box::new(LabelStudioClient::new(ls)?),
                health,
            });
            info!(
                "autoscore v{} ({} deduction categories)",
                env!("CARGO_PKG_VERSION"),
                app.scorer.policy().len()
            );

            let listener = TcpListener::bind((host.as_str(), *port))
                .await
                .with_context(|| format!("binding {host}:{port}"))?;
            tokio::select! {
                result = server::run(listener, app) => result?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
        }
        Command::Health => {
            let report = settings.label_studio().health();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.ok {
                bail!("Label Studio URL or API key missing");
            }
        }
        Command::Score { event, write } => {
            let event = read_event(event)?;
            let scorer = settings.scorer()?;
            if *write {
                let client = LabelStudioClient::new(settings.label_studio())?;
                let outcome = dispatch(&event, &scorer, &client).await;
                println!("{}", serde_json::to_string_pretty(&outcome.body())?);
                if !outcome.is_success() {
                    bail!("event not processed (status {})", outcome.status());
                }
            } else {
                let report = dry_run_report(&event, &scorer);
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
        }
        Command::Policy => {
            let scorer = settings.scorer()?;
            for line in policy_lines(scorer.policy()) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

/// What `score` prints when not writing back.
fn dry_run_report(event: &WebhookEvent, scorer: &Scorer) -> Value {
    let scored = scorer.score(&event.annotation.result);
    json!({
        "action": event.action,
        "annotation_id": event.annotation.annotation_id(),
        "selected": scored.selected,
        "score": scored.score,
        "result": scored.result,
    })
}

/// One line per category, largest deduction first.
fn policy_lines(policy: &DeductionPolicy) -> Vec<String> {
    policy
        .categories()
        .into_iter()
        .map(|(category, points)| format!("{points:>4}  {category}"))
        .collect()
}

fn read_event(source: &str) -> anyhow::Result<WebhookEvent> {
    let body = if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("reading event from stdin")?;
        buf
    } else {
        std::fs::read(source).with_context(|| format!("reading event file {source}"))?
    };
    WebhookEvent::from_slice(&body).with_context(|| format!("parsing event from {source}"))
}
