//! Command implementations.

use crate::cli::{ConfigArgs, PresetArg, ProcessArgs};
use crate::config::Config;
use crate::error::{CliError, Result};
use crate::output::Formatter;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tender_domain::{Portal, SourceSpan, UnifiedDocument};
use tender_extractor::{EngineConfig, ProcessingRequest, TenderEngine};
use tender_llm::{OllamaProvider, RateBudget};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Execute the process command.
pub async fn execute_process(
    args: ProcessArgs,
    config: &Config,
    formatter: &Formatter,
) -> Result<()> {
    let document = read_document(&args.files)?;

    let endpoint = args.endpoint.as_deref().unwrap_or(&config.provider.endpoint);
    let model = args.model.as_deref().unwrap_or(&config.provider.model);
    let provider = OllamaProvider::with_timeout(
        endpoint,
        model,
        Duration::from_secs(config.provider.timeout_secs),
    )?
    .with_temperature(config.provider.temperature);
    info!("Using model {} at {}", model, endpoint);

    let budget = Arc::new(RateBudget::new(config.engine.budget.clone()));
    let engine = TenderEngine::new(provider, budget, config.engine.clone())?;

    let mut request = ProcessingRequest::new(document);
    if let Some(portal) = args.portal {
        request = request.with_portal(Portal::from(portal));
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; stopping after the current stage");
            on_interrupt.cancel();
        }
    });

    let result = engine.process(request, &cancel).await;
    watcher.abort();
    let stats = engine.gateway().stats();
    info!(
        "Gateway: {} attempts admitted, {} tokens, {} retries, {} failures",
        stats.admitted, stats.tokens, stats.retries, stats.failures
    );
    let outcome = result?;

    let rendered = formatter.format_outcome(&outcome)?;
    match args.output {
        Some(path) => {
            fs::write(&path, rendered)?;
            eprintln!("{}", formatter.success(&format!("Wrote {}", path.display())));
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Execute the config command.
pub fn execute_config(args: ConfigArgs, config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if let Some(preset) = args.preset {
        shown.engine = match preset {
            PresetArg::Default => EngineConfig::default(),
            PresetArg::Aggressive => EngineConfig::aggressive(),
            PresetArg::Lenient => EngineConfig::lenient(),
        };
    }
    println!("{}", shown.to_toml()?);
    Ok(())
}

/// Read text files into a unified document, labelled by file name.
pub fn read_document(files: &[impl AsRef<Path>]) -> Result<UnifiedDocument> {
    let mut spans = Vec::with_capacity(files.len());
    for file in files {
        let path = file.as_ref();
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::InvalidInput(format!("Not a file: {}", path.display())))?;
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            warn!("{} contains no text", label);
        }
        spans.push(SourceSpan::new(label, text));
    }
    Ok(UnifiedDocument::new(spans)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_document_keeps_file_order() {
        let dir = tempdir().unwrap();
        let nit = dir.path().join("nit.txt");
        let corrigendum = dir.path().join("corrigendum.txt");
        fs::write(&nit, "Tender No: ABC/2025/17").unwrap();
        fs::write(&corrigendum, "Bid End Date: 20-03-2025").unwrap();

        let document = read_document(&[&nit, &corrigendum]).unwrap();
        let labels: Vec<&str> = document.spans().iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["nit.txt", "corrigendum.txt"]);
        assert!(document.text().find("ABC/2025/17") < document.text().find("20-03-2025"));
    }

    #[test]
    fn test_duplicate_file_names_are_rejected() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a");
        std::fs::create_dir(&first).unwrap();
        let second = dir.path().join("b");
        std::fs::create_dir(&second).unwrap();
        fs::write(first.join("nit.txt"), "one").unwrap();
        fs::write(second.join("nit.txt"), "two").unwrap();

        let result = read_document(&[first.join("nit.txt"), second.join("nit.txt")]);
        assert!(matches!(result, Err(CliError::Document(_))));
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = read_document(&[dir.path().join("absent.txt")]);
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
