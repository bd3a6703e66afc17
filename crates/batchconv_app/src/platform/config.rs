//! Settings read from `batchconv.ron` in the workspace root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use batchconv_core::LanguagePair;
use batchconv_engine::{
    EngineConfig, GenerationSettings, Generator, OllamaGenerator, OpenAiGenerator, PromptTemplate,
};
use batchconv_logging::{conv_debug, conv_info, conv_warn};
use serde::{Deserialize, Serialize};

use super::AppError;

pub(crate) const CONFIG_FILENAME: &str = "batchconv.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Provider {
    Ollama,
    #[value(name = "openrouter")]
    OpenRouter,
    #[value(name = "openai")]
    OpenAi,
}

impl Provider {
    fn default_base_url(self) -> &'static str {
        match self {
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct AppConfig {
    pub provider: Provider,
    /// Falls back to the provider's public endpoint.
    pub base_url: Option<String>,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
    pub source_ext: String,
    pub target_ext: String,
    pub language_tag: String,
    pub backup_suffix: String,
    pub start_marker: Option<String>,
    /// Must contain `{source}`; `{target}` and `{tag}` are optional.
    pub prompt_template: Option<String>,
    pub chunk_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: None,
            model: "deepseek-r1:8b".to_string(),
            api_key_env: None,
            source_ext: "java".to_string(),
            target_ext: "kt".to_string(),
            language_tag: "kotlin".to_string(),
            backup_suffix: ".bak".to_string(),
            start_marker: None,
            prompt_template: None,
            chunk_timeout_secs: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Reads `batchconv.ron` under `root`; a missing file yields defaults.
    pub(crate) fn load(root: &Path) -> Result<Self, AppError> {
        let path = root.join(CONFIG_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                conv_debug!("No {} in {}; using defaults", CONFIG_FILENAME, root.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(AppError::Config(format!("{}: {}", path.display(), err))),
        };

        let config: Self = ron::from_str(&content)
            .map_err(|err| AppError::Config(format!("{}: {}", path.display(), err)))?;
        conv_info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    pub(crate) fn languages(&self) -> Result<LanguagePair, AppError> {
        LanguagePair::new(
            &self.source_ext,
            &self.target_ext,
            &self.language_tag,
            &self.backup_suffix,
        )
        .map_err(|err| AppError::Config(err.to_string()))
    }

    pub(crate) fn engine_config(&self) -> Result<EngineConfig, AppError> {
        Ok(EngineConfig {
            languages: self.languages()?,
            start_marker: self.start_marker.clone(),
            chunk_timeout: self.chunk_timeout_secs.map(Duration::from_secs),
        })
    }

    pub(crate) fn generation_settings(&self) -> Result<GenerationSettings, AppError> {
        let languages = self.languages()?;
        let prompt = match &self.prompt_template {
            Some(template) if !template.contains("{source}") => {
                return Err(AppError::Config(
                    "prompt_template must contain {source}".to_string(),
                ));
            }
            Some(template) => PromptTemplate::new(template, &languages),
            None => PromptTemplate::for_languages(&languages),
        };

        let base_url = self
            .base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string());
        let mut settings = GenerationSettings::new(base_url, self.model.clone(), prompt);
        settings.api_key = self.api_key();
        Ok(settings)
    }

    pub(crate) fn generator(&self) -> Result<Arc<dyn Generator>, AppError> {
        let settings = self.generation_settings()?;
        conv_info!(
            "Using {:?} at {} with model {}",
            self.provider,
            settings.base_url,
            settings.model
        );
        Ok(match self.provider {
            Provider::Ollama => Arc::new(OllamaGenerator::new(settings)),
            Provider::OpenRouter | Provider::OpenAi => Arc::new(OpenAiGenerator::new(settings)),
        })
    }

    fn api_key(&self) -> Option<String> {
        let name = self.api_key_env.as_deref()?;
        match std::env::var(name) {
            Ok(key) if !key.is_empty() => Some(key),
            _ => {
                conv_warn!("Environment variable {} is not set; sending no API key", name);
                None
            }
        }
    }
}
