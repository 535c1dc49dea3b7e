// Language/version table
// Maps caller-facing language identifiers to the runtime version used when a
// submission does not pin one. Adding a language only touches languages.json.

use crate::types::Language;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const DEFAULT_LANGUAGES_PATH: &str = "config/languages.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// File name the source is uploaded as, for providers that take files
    pub file_name: String,
    /// Numeric language id for Judge0-compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge0_id: Option<u32>,
}

impl LanguageConfig {
    pub fn new(name: &str, version: &str, file_name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            aliases: Vec::new(),
            file_name: file_name.to_string(),
            judge0_id: None,
        }
    }

    fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    fn with_judge0_id(mut self, id: u32) -> Self {
        self.judge0_id = Some(id);
        self
    }
}

/// On-disk shape of languages.json
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LanguagesJson {
    pub languages: Vec<LanguageConfig>,
}

/// Resolved language table
#[derive(Debug, Clone)]
pub struct LanguageTable {
    configs: HashMap<String, LanguageConfig>,
    aliases: HashMap<String, String>,
}

impl LanguageTable {
    /// Build a table, rejecting empty names/versions and clashing identifiers
    pub fn from_entries(entries: Vec<LanguageConfig>) -> Result<Self> {
        let mut configs = HashMap::new();
        let mut aliases = HashMap::new();

        for entry in entries {
            let name = Language::new(&entry.name);
            if name.is_empty() {
                bail!("Language entry with empty name");
            }
            if entry.version.trim().is_empty() {
                bail!("Language '{}' has no default version", name);
            }
            for alias in &entry.aliases {
                let alias = Language::new(alias);
                if alias.is_empty() || alias == name {
                    continue;
                }
                if aliases.insert(alias.to_string(), name.to_string()).is_some() {
                    bail!("Alias '{}' is declared twice", alias);
                }
            }
            if configs.insert(name.to_string(), entry).is_some() {
                bail!("Language '{}' is declared twice", name);
            }
        }

        if let Some(alias) = aliases.keys().find(|a| configs.contains_key(*a)) {
            bail!("Alias '{}' shadows a configured language", alias);
        }

        Ok(Self { configs, aliases })
    }

    /// Load language configurations from a languages.json file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Language config file not found: {}", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let languages_json: LanguagesJson = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if languages_json.languages.is_empty() {
            bail!("No languages configured in {}", path.display());
        }

        Self::from_entries(languages_json.languages)
    }

    /// Load from `path`, falling back to the built-in table when the file is absent
    pub fn load_or_builtin(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "Language config not found, using built-in table");
            Ok(Self::builtin())
        }
    }

    /// Runtime versions of the reference execution provider
    pub fn builtin() -> Self {
        let entries = vec![
            LanguageConfig::new("c", "10.2.0", "main.c").with_judge0_id(50),
            LanguageConfig::new("cpp", "10.2.0", "main.cpp")
                .with_aliases(&["c++"])
                .with_judge0_id(54),
            LanguageConfig::new("java", "15.0.2", "Main.java").with_judge0_id(62),
            LanguageConfig::new("python", "3.10.0", "main.py")
                .with_aliases(&["py", "python3"])
                .with_judge0_id(71),
            LanguageConfig::new("javascript", "18.15.0", "main.js")
                .with_aliases(&["js", "node"])
                .with_judge0_id(63),
        ];

        let mut configs = HashMap::new();
        let mut aliases = HashMap::new();
        for entry in entries {
            for alias in &entry.aliases {
                aliases.insert(alias.clone(), entry.name.clone());
            }
            configs.insert(entry.name.clone(), entry);
        }
        Self { configs, aliases }
    }

    /// Get configuration for a language or one of its aliases
    pub fn get_config(&self, language: &Language) -> Option<&LanguageConfig> {
        let key = language.as_str();
        self.configs.get(key).or_else(|| {
            self.aliases
                .get(key)
                .and_then(|canonical| self.configs.get(canonical))
        })
    }

    /// Default runtime version for a language
    pub fn default_version(&self, language: &Language) -> Option<&str> {
        self.get_config(language).map(|c| c.version.as_str())
    }

    pub fn is_supported(&self, language: &Language) -> bool {
        self.get_config(language).is_some()
    }

    /// All configured languages, sorted by name
    pub fn list_languages(&self) -> Vec<&LanguageConfig> {
        let mut languages: Vec<_> = self.configs.values().collect();
        languages.sort_by(|a, b| a.name.cmp(&b.name));
        languages
    }
}
