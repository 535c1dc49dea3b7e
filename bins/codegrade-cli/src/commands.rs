// CLI commands for managing the language table and running evaluations
use anyhow::{anyhow, bail, Context, Result};
use codegrade_common::config::{Provider, Settings};
use codegrade_common::languages::{LanguageConfig, LanguageTable, LanguagesJson};
use codegrade_common::types::{Language, SubmissionRequest};
use codegrade_engine::Evaluator;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::info;

/// Load languages configuration; a missing file is an empty table
fn load_languages_config(path: &Path) -> Result<LanguagesJson> {
    if !path.exists() {
        return Ok(LanguagesJson::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Save languages configuration
fn save_languages_config(path: &Path, config: &LanguagesJson) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json_content =
        serde_json::to_string_pretty(config).context("Failed to serialize languages.json")?;

    fs::write(path, json_content + "\n")
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Append an entry, rejecting anything the table loader would reject
fn add_entry(config: &mut LanguagesJson, entry: LanguageConfig) -> Result<()> {
    if config.languages.iter().any(|l| l.name == entry.name) {
        bail!("Language '{}' already exists in config", entry.name);
    }

    let mut candidate = config.languages.clone();
    candidate.push(entry);
    LanguageTable::from_entries(candidate.clone())?;

    config.languages = candidate;
    Ok(())
}

fn remove_entry(config: &mut LanguagesJson, name: &str) -> Result<LanguageConfig> {
    let index = config
        .languages
        .iter()
        .position(|l| l.name == name)
        .ok_or_else(|| anyhow!("Language '{}' not found in config", name))?;
    Ok(config.languages.remove(index))
}

/// Add a new language
pub fn add_language(
    path: &Path,
    name: &str,
    version: &str,
    aliases: Vec<String>,
    file_name: Option<&str>,
    judge0_id: Option<u32>,
) -> Result<()> {
    let name = Language::new(name);
    println!("🚀 Adding language: {}", name);

    if name.is_empty() || version.trim().is_empty() {
        bail!("Language name and version cannot be empty");
    }

    let mut languages_json = load_languages_config(path)?;

    let default_file = format!("main.{}", name);
    let mut entry = LanguageConfig::new(
        name.as_str(),
        version.trim(),
        file_name.unwrap_or(&default_file),
    );
    entry.aliases = aliases.iter().map(|a| Language::new(a).to_string()).collect();
    entry.judge0_id = judge0_id;

    add_entry(&mut languages_json, entry)?;

    println!("📝 Updating {}...", path.display());
    save_languages_config(path, &languages_json)?;
    info!(language = %name, version = version, "Language added");

    println!("✅ Language '{}' added successfully!", name);
    Ok(())
}

/// Remove a language
pub fn remove_language(path: &Path, name: &str, yes: bool) -> Result<()> {
    println!("🗑️  Removing language: {}", name);

    let mut languages_json = load_languages_config(path)?;

    if !yes {
        println!("⚠️  This will remove '{}' from {}", name, path.display());
        print!("\nContinue? (y/N): ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("❌ Aborted");
            return Ok(());
        }
    }

    let removed = remove_entry(&mut languages_json, name)?;
    save_languages_config(path, &languages_json)?;
    info!(language = %removed.name, "Language removed");

    println!("✅ Language '{}' removed successfully!", name);
    Ok(())
}

/// List all configured languages
pub fn list_languages(path: &Path) -> Result<()> {
    let languages_json = load_languages_config(path)?;

    if languages_json.languages.is_empty() {
        println!("No languages configured.");
        println!("\n💡 Add a language with: codegrade-cli add-lang --name <name> --version <version>");
        return Ok(());
    }

    println!("📋 Configured Languages:\n");
    println!(
        "{:<12} {:<10} {:<14} {:<10} {:<20}",
        "Name", "Version", "File", "Judge0", "Aliases"
    );
    println!("{}", "─".repeat(70));

    for lang in &languages_json.languages {
        println!(
            "{:<12} {:<10} {:<14} {:<10} {:<20}",
            lang.name,
            lang.version,
            lang.file_name,
            lang.judge0_id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            lang.aliases.join(", ")
        );
    }

    println!("\n✅ Total: {} language(s)", languages_json.languages.len());

    Ok(())
}

fn build_evaluator(
    config: &Path,
    provider: Option<Provider>,
    url: Option<&str>,
) -> Result<Evaluator> {
    let mut settings = Settings::from_env().context("Invalid configuration")?;
    settings.languages_path = config.to_path_buf();
    if let Some(provider) = provider {
        settings.provider = provider;
    }
    if let Some(url) = url {
        settings.execution_url = url.trim_end_matches('/').to_string();
    }
    Evaluator::from_settings(&settings)
}

fn read_request(path: &Path) -> Result<SubmissionRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse submission request {}", path.display()))
}

/// Evaluate a submission request file and print the result as JSON
pub async fn evaluate(
    config: &Path,
    request_path: &Path,
    provider: Option<Provider>,
    url: Option<&str>,
) -> Result<()> {
    let request = read_request(request_path)?;
    let evaluator = build_evaluator(config, provider, url)?;

    let result = evaluator.evaluate(&request).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Run a source file once and print the raw outcome
pub async fn run(
    config: &Path,
    language: &str,
    version: Option<&str>,
    source: &Path,
    stdin: Option<&Path>,
) -> Result<()> {
    let source_code = fs::read_to_string(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;
    let stdin = match stdin {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => String::new(),
    };

    let evaluator = build_evaluator(config, None, None)?;
    let outcome = evaluator
        .execute_once(&Language::new(language), version, &source_code, &stdin)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
