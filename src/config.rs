use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/docqa.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            allowed_extensions: default_allowed_extensions(),
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_string(), "txt".to_string()]
}
fn default_max_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisConfig {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    #[serde(default)]
    pub canned: Vec<CannedAnswer>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            fallback: default_fallback(),
            excerpt_chars: default_excerpt_chars(),
            canned: Vec::new(),
        }
    }
}

/// A keyword → answer pair for the `lookup` fallback.
#[derive(Debug, Deserialize, Clone)]
pub struct CannedAnswer {
    pub keyword: String,
    pub answer: String,
}

fn default_threshold() -> f32 {
    0.5
}
fn default_fallback() -> String {
    "similarity".to_string()
}
fn default_excerpt_chars() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: None,
            url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_max_tokens() -> u32 {
    200
}
fn default_generation_timeout() -> u64 {
    120
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

impl UploadsConfig {
    /// Case-insensitive check of a file's final extension against the allow-list.
    pub fn is_allowed(&self, filename: &str) -> bool {
        match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => self
                .allowed_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.analysis.threshold) {
        anyhow::bail!("analysis.threshold must be in [0.0, 1.0]");
    }

    if config.uploads.allowed_extensions.is_empty() {
        anyhow::bail!("uploads.allowed_extensions must not be empty");
    }
    if config.uploads.max_bytes == 0 {
        anyhow::bail!("uploads.max_bytes must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" | "local" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, local, ollama, or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if matches!(config.embedding.provider.as_str(), "ollama" | "openai")
        && config.embedding.model.is_none()
    {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    match config.generation.provider.as_str() {
        "disabled" | "ollama" | "openai" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be disabled, ollama, or openai.",
            other
        ),
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        );
    }

    match config.analysis.fallback.as_str() {
        "generate" => {
            if !config.generation.is_enabled() {
                anyhow::bail!("analysis.fallback = 'generate' requires a [generation] provider");
            }
        }
        "regex" | "lookup" | "similarity" => {}
        other => anyhow::bail!(
            "Unknown analysis fallback: '{}'. Must be generate, regex, lookup, or similarity.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.analysis.threshold, 0.5);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.uploads.allowed_extensions, vec!["pdf", "txt"]);
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let uploads = UploadsConfig::default();
        assert!(uploads.is_allowed("Report.PDF"));
        assert!(uploads.is_allowed("notes.txt"));
        assert!(!uploads.is_allowed("image.png"));
        assert!(!uploads.is_allowed("no_extension"));
        assert!(!uploads.is_allowed("archive.pdf.exe"));
    }

    #[test]
    fn pdf_only_allow_list_rejects_text() {
        let config: Config = toml::from_str(
            r#"
            [uploads]
            allowed_extensions = ["pdf"]
            "#,
        )
        .unwrap();
        assert!(!config.uploads.is_allowed("notes.txt"));
        assert!(config.uploads.is_allowed("paper.pdf"));
    }

    #[test]
    fn generate_fallback_requires_generation_provider() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            fallback = "generate"
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("requires a [generation] provider"));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            threshold = 1.5
            "#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_embedding_provider_is_rejected() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "word2vec"
            "#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config/docqa.example.toml")).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.embedding.model.as_deref(), Some("all-minilm-l6-v2"));
        assert_eq!(config.analysis.canned.len(), 2);
        assert_eq!(config.analysis.canned[0].keyword, "deadline");
    }
}
