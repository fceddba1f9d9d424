use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use colored::Colorize;
use logsync_log::{MemoryAggregator, MemoryLog};
use logsync_store::InMemoryDocumentStore;
use logsync_sync::{SyncConfig, SyncedStore};
use logsync_types::{Document, LogId};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cli::*;

/// Identity of the plain, non-replica log fed into every demo run.
const PLAIN_LOG_HEX: &str = "ab12";

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Demo(args) => cmd_demo(args, config, &cli.format).await,
        Command::Config => cmd_config(&config),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    match &cli.config {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(SyncConfig::default()),
    }
}

fn cmd_config(config: &SyncConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ReplicaReport {
    pub name: String,
    pub owned_log: String,
    pub followed_logs: usize,
    pub documents: Vec<Document>,
}

/// Run the demo: `replicas` stores, each owning one log of a shared
/// aggregate, each writing one document, plus one plain log with a single
/// `{"hello": "goodbye"}` entry. Returns once every store holds every
/// document, after tearing all stores down.
pub async fn run_demo(
    replicas: usize,
    config: SyncConfig,
    timeout: Duration,
) -> anyhow::Result<Vec<ReplicaReport>> {
    if replicas == 0 {
        bail!("demo needs at least one replica");
    }

    let aggregator = Arc::new(MemoryAggregator::new(config.log.clone()));
    let plain = Arc::new(MemoryLog::read_only(
        LogId::from_hex(PLAIN_LOG_HEX)?,
        config.log.clone(),
    ));
    plain.ingest(serde_json::to_vec(&json!({"hello": "goodbye"}))?)?;
    aggregator.add_log(plain)?;

    let mut stores = Vec::with_capacity(replicas);
    for i in 0..replicas {
        let name = format!("replica-{i}");
        let synced = SyncedStore::new(Arc::new(InMemoryDocumentStore::new()), config.clone());
        let owned = aggregator.writer(&name)?;
        synced.set_owned_log(owned).await?;
        synced.follow_aggregate(aggregator.clone())?;
        stores.push((name, synced));
    }

    for (i, (name, synced)) in stores.iter().enumerate() {
        let doc = Document::from_value(
            format!("greeting-{i}"),
            json!({"hello": "goodbye", "from": name}),
        )?;
        synced.bulk_write(vec![doc]).await?;
    }

    // One document per replica plus the plain log's entry.
    let expected = replicas + 1;
    let converged = tokio::time::timeout(timeout, async {
        for (name, synced) in &stores {
            loop {
                let count = synced.all_docs().await?.len();
                if count >= expected {
                    info!(replica = %name, count, "replica converged");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        anyhow::Ok(())
    })
    .await;
    match converged {
        Ok(result) => result?,
        Err(_) => bail!("replicas did not converge within {timeout:?}"),
    }

    let mut reports = Vec::with_capacity(stores.len());
    for (name, synced) in &stores {
        reports.push(ReplicaReport {
            name: name.clone(),
            owned_log: synced
                .owned_log_id()
                .map(|id| id.to_hex())
                .unwrap_or_default(),
            followed_logs: synced.followed_logs().len(),
            documents: synced.all_docs().await?,
        });
    }
    for (_, synced) in &stores {
        synced.destroy().await?;
    }
    Ok(reports)
}

async fn cmd_demo(args: DemoArgs, config: SyncConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let reports = run_demo(args.logs, config, Duration::from_secs(args.timeout)).await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!(
            "{} {} (owns {}, follows {} logs)",
            "✓".green().bold(),
            report.name.bold(),
            short_hex(&report.owned_log).cyan(),
            report.followed_logs,
        );
        for doc in &report.documents {
            let rev = doc.rev.as_ref().map(ToString::to_string).unwrap_or_default();
            println!(
                "    {}  {}  {}",
                doc.key.as_str().yellow(),
                rev.dimmed(),
                serde_json::Value::Object(doc.body.clone()),
            );
        }
    }
    let plain_key = format!("{PLAIN_LOG_HEX}@0");
    println!(
        "\n{} every replica holds {} and {} greetings",
        "Converged:".green().bold(),
        plain_key.yellow(),
        reports.len(),
    );
    Ok(())
}

fn short_hex(hex: &str) -> &str {
    hex.get(..8).unwrap_or(hex)
}
