use anyhow::{Context, Result, anyhow};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use crate::answer::AnswerResponse;
use crate::config::Config;
use crate::registry::NamespaceSummary;
use crate::service::{DocumentQa, ReconcileReport, ServiceStatus};

async fn open_service(config: &Config) -> Result<DocumentQa> {
    DocumentQa::from_config(config)
        .await
        .context("Failed to open document stores")
}

/// Ingest files into a new namespace owned by `owner`
#[inline]
pub async fn ingest_files(config: &Config, files: Vec<PathBuf>, owner: &str) -> Result<()> {
    let service = open_service(config).await?;
    info!("Ingesting {} files for {}", files.len(), owner);

    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Ingesting {} files", files.len()));
    bar.enable_steady_tick(Duration::from_millis(120));

    let result = service.ingest(&files, owner).await;
    bar.finish_and_clear();

    match result {
        Ok(outcome) => {
            println!("✅ Ingestion complete");
            println!("   Namespace: {}", style(&outcome.namespace).cyan());
            println!("   Chunks: {}", outcome.chunk_count);
            Ok(())
        }
        Err(e) => {
            error!("Ingestion failed: {}", e);
            Err(e.into())
        }
    }
}

/// Ask a question against one namespace
#[inline]
pub async fn ask(
    config: &Config,
    namespace: &str,
    question: &str,
    owner: &str,
    k: Option<usize>,
    json: bool,
) -> Result<()> {
    let service = open_service(config).await?;
    let response = service.answer(question, namespace, owner, k).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", format_answer(&response));
    }

    match response.error {
        Some(error) => Err(anyhow!(error.message)),
        None => Ok(()),
    }
}

/// List namespaces owned by `owner`, newest first
#[inline]
pub async fn list_namespaces(config: &Config, owner: &str, json: bool) -> Result<()> {
    let service = open_service(config).await?;
    let namespaces = service.list_namespaces(owner).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&namespaces)?);
        return Ok(());
    }

    if namespaces.is_empty() {
        println!("No namespaces found for {}.", owner);
        println!("Use 'docs-qa ingest <FILES>... --owner {}' to add documents.", owner);
        return Ok(());
    }

    println!("Namespaces for {} ({} total):", owner, namespaces.len());
    println!();
    for summary in &namespaces {
        print!("{}", format_summary(summary));
        println!();
    }

    Ok(())
}

/// Delete a namespace and its vectors
#[inline]
pub async fn delete_namespace(config: &Config, namespace: &str, owner: &str) -> Result<()> {
    let service = open_service(config).await?;
    service.delete_namespace(namespace, owner).await?;

    println!("✓ Namespace {} deleted", namespace);
    Ok(())
}

/// Show backend reachability and store locations
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    let service = open_service(config).await?;
    let status = service.status().await;

    println!("📊 Docs-QA Status Report");
    println!("{}", "=".repeat(50));
    println!();
    print!("{}", format_status(&status));
    println!();
    println!("🗄️  Stores:");
    println!("   Registry: {}", config.database_path().display());
    println!("   Vectors: {}", config.vector_database_path().display());

    if status.is_ready() {
        Ok(())
    } else {
        Err(anyhow!("One or more model backends are unavailable"))
    }
}

/// Remove vectors left behind by failed ingestions or deletions
#[inline]
pub async fn reconcile(config: &Config) -> Result<()> {
    let service = open_service(config).await?;
    let report = service.reconcile().await?;

    print!("{}", format_reconcile(&report));
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(anyhow!(
            "{} orphaned namespaces could not be removed",
            report.failed.len()
        ))
    }
}

fn format_answer(response: &AnswerResponse) -> String {
    let mut out = String::new();

    if let Some(error) = &response.error {
        let _ = writeln!(out, "❌ {}", error.message);
        return out;
    }

    let _ = writeln!(out, "{}", response.answer.as_deref().unwrap_or_default());
    if !response.sources.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Sources:");
    }
    for (i, source) in response.sources.iter().enumerate() {
        let origin = match (source.metadata.get("source"), source.metadata.get("page")) {
            (Some(file), Some(page)) => format!("{file} (page {page})"),
            (Some(file), None) => file.clone(),
            _ => "unknown source".to_string(),
        };
        let _ = writeln!(out, "  [{}] {} (score {:.3})", i + 1, origin, source.score);
        let _ = writeln!(out, "      {}", source.text.replace('\n', " "));
    }
    out
}

fn format_summary(summary: &NamespaceSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "📚 {}", summary.namespace);
    let _ = writeln!(out, "   Files: {}", summary.file_names.join(", "));
    let _ = writeln!(out, "   Chunks: {}", summary.chunk_count);
    let _ = writeln!(out, "   Status: {}", summary.status);
    let _ = writeln!(
        out,
        "   Created: {}",
        summary.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    out
}

fn format_status(status: &ServiceStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🤖 Model Backends:");
    for (label, backend) in [
        ("Embedding", &status.embedding),
        ("Generation", &status.generation),
    ] {
        match &backend.error {
            None => {
                let _ = writeln!(out, "   ✅ {}: {}", label, backend.model);
            }
            Some(e) => {
                let _ = writeln!(out, "   ❌ {}: {} - {}", label, backend.model, e);
            }
        }
    }
    let _ = writeln!(
        out,
        "   🔢 Collection: {} ({} dimensions)",
        status.collection, status.dimension
    );
    out
}

fn format_reconcile(report: &ReconcileReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🔍 Vector Index Consistency:");
    let _ = writeln!(out, "   📊 Indexed namespaces: {}", report.indexed_namespaces);
    let _ = writeln!(
        out,
        "   📊 Registered namespaces: {}",
        report.registered_namespaces
    );
    if report.is_consistent() {
        let _ = writeln!(out, "   ✅ Vector index is consistent");
    }
    for namespace in &report.removed {
        let _ = writeln!(out, "   👻 Removed orphaned namespace {}", namespace);
    }
    for namespace in &report.failed {
        let _ = writeln!(out, "   ⚠️  Could not remove {}", namespace);
    }
    out
}
