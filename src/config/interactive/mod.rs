
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::time::Duration;

use super::{Config, ConfigError, OllamaConfig};
use crate::backends::OllamaClient;

#[inline]
pub fn run_interactive_config(base_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Docs QA Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(base_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used for embeddings and answer generation.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Pipeline Settings").bold().yellow());
    configure_pipeline(&mut config)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    let check = check_ollama(&config.ollama);
    if !check.reachable {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before ingesting.");
    } else if check.missing_models.is_empty() {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Connected, but some models are not pulled:").yellow()
        );
        for model in &check.missing_models {
            eprintln!("  ollama pull {}", style(model).cyan());
        }
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(base_dir: &Path) -> Result<()> {
    let config = Config::load(base_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {} ({} dimensions)",
        style(&config.ollama.embedding_model).cyan(),
        style(config.ollama.embedding_dimension).cyan()
    );
    eprintln!(
        "  Generation Model: {}",
        style(&config.ollama.generation_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!("  Temperature: {}", style(config.ollama.temperature).cyan());

    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Ingestion:").bold().yellow());
    eprintln!(
        "  Write Batch Size: {}",
        style(config.ingestion.write_batch_size).cyan()
    );
    eprintln!(
        "  Request Timeout: {}s",
        style(config.ingestion.request_timeout_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Retrieval:").bold().yellow());
    eprintln!(
        "  k: {} (max {})",
        style(config.retrieval.default_k).cyan(),
        style(config.retrieval.max_k).cyan()
    );
    eprintln!(
        "  Snippet Length: {}",
        style(config.retrieval.snippet_length).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(base_dir: &Path) -> Result<Config> {
    if !base_dir.join("config.toml").exists() {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
        return Ok(Config::with_base_dir(base_dir));
    }

    Config::load(base_dir).map_or_else(
        |e| {
            eprintln!(
                "{}",
                style(format!("Existing configuration is invalid ({e:#}). Using defaults."))
                    .yellow()
            );
            Ok(Config::with_base_dir(base_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty_model)
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let generation_model: String = Input::new()
        .with_prompt("Generation model")
        .default(ollama.generation_model.clone())
        .validate_with(non_empty_model)
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_embedding_dimension(embedding_dimension)?;
    ollama.set_generation_model(generation_model)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

#[allow(clippy::ptr_arg, reason = "dialoguer validators receive &String")]
fn non_empty_model(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

/// Prompts for the settings that shape ingestion and answering
fn configure_pipeline(config: &mut Config) -> Result<()> {
    let write_batch_size: usize = Input::new()
        .with_prompt("Chunks per concurrent index write")
        .default(config.ingestion.write_batch_size)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            let mut candidate = config.clone();
            candidate.ingestion.write_batch_size = *input;
            candidate.validate()
        })
        .interact_text()?;

    let request_timeout_secs: u64 = Input::new()
        .with_prompt("Timeout per backend call (seconds)")
        .default(config.ingestion.request_timeout_secs)
        .validate_with(|input: &u64| -> Result<(), ConfigError> {
            let mut candidate = config.clone();
            candidate.ingestion.request_timeout_secs = *input;
            candidate.validate()
        })
        .interact_text()?;

    let default_k: usize = Input::new()
        .with_prompt(format!(
            "Passages retrieved per question (1-{})",
            config.retrieval.max_k
        ))
        .default(config.retrieval.default_k)
        .validate_with(|input: &usize| -> Result<(), ConfigError> {
            let mut candidate = config.clone();
            candidate.retrieval.default_k = *input;
            candidate.validate()
        })
        .interact_text()?;

    config.ingestion.write_batch_size = write_batch_size;
    config.ingestion.request_timeout_secs = request_timeout_secs;
    config.retrieval.default_k = default_k;
    config.validate()?;

    Ok(())
}

/// Result of probing the configured Ollama instance
#[derive(Debug, Clone, PartialEq, Eq)]
struct ConnectionCheck {
    reachable: bool,
    /// Configured models the instance has not pulled
    missing_models: Vec<String>,
}

fn check_ollama(ollama: &OllamaConfig) -> ConnectionCheck {
    let unreachable = ConnectionCheck {
        reachable: false,
        missing_models: Vec::new(),
    };

    let Ok(client) = OllamaClient::new(ollama) else {
        return unreachable;
    };
    let client = client
        .with_timeout(Duration::from_secs(5))
        .with_retry_attempts(1);

    let Ok(models) = client.list_models() else {
        return unreachable;
    };

    let missing_models = [&ollama.embedding_model, &ollama.generation_model]
        .into_iter()
        .filter(|wanted| {
            !models.iter().any(|model| {
                model.name == **wanted || model.name == format!("{wanted}:latest")
            })
        })
        .cloned()
        .collect();

    ConnectionCheck {
        reachable: true,
        missing_models,
    }
}
