//! Runtime Settings
//!
//! Layers built-in defaults, an optional `scholas.toml` in the working
//! directory, and plain environment variables (`TOP_K`, `MIN_SCORE`, ...).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::context::prompt::{FallbackPolicy, PromptAssembler, MAX_CONTEXT_CHARS};
use crate::documents::chunker::Chunker;
use crate::documents::index::DistanceMetric;
use crate::generation::{GenerationMode, GenerationOptions};

/// Optional settings file, resolved against the working directory
pub const CONFIG_FILE: &str = "scholas.toml";

/// Environment variables read into `Settings` (matched case-insensitively)
const ENV_KEYS: &[&str] = &[
    "CHROMA_URL",
    "CHROMA_COLLECTION",
    "CHROMA_SPACE",
    "EMBED_MODEL",
    "OLLAMA_URL",
    "LLM_MODEL",
    "TOP_K",
    "NUM_PREDICT",
    "TEMPERATURE",
    "MIN_SCORE",
    "ANSWER_TIMEOUT",
    "CHUNK_SIZE",
    "CHUNK_OVERLAP",
    "BATCH_SIZE",
    "STREAM_OUTPUT",
    "LOW_CONFIDENCE_FALLBACK",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Chroma server address
    pub chroma_url: String,
    /// Collection holding the chunks
    pub chroma_collection: String,
    /// Distance space used when the collection is first created
    pub chroma_space: String,
    pub embed_model: String,
    pub ollama_url: String,
    pub llm_model: String,
    pub top_k: usize,
    /// Maximum generated tokens
    pub num_predict: u32,
    pub temperature: f32,
    pub min_score: f32,
    /// Generation request timeout in seconds
    pub answer_timeout: u64,
    /// Window size in whitespace tokens
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub batch_size: usize,
    pub stream_output: bool,
    /// Fall back to the top two hits when none clear `min_score`
    pub low_confidence_fallback: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chroma_url: "http://localhost:8000".to_string(),
            chroma_collection: "docs".to_string(),
            chroma_space: "l2".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            llm_model: "gemma:2b".to_string(),
            top_k: 4,
            num_predict: 350,
            temperature: 0.5,
            min_score: 0.25,
            answer_timeout: 600,
            chunk_size: 400,
            chunk_overlap: 150,
            batch_size: 8,
            stream_output: true,
            low_confidence_fallback: true,
        }
    }
}

impl Settings {
    /// Provider chain: defaults, then `scholas.toml`, then the environment.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = Self::figment().extract()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("CHUNK_SIZE must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("TOP_K must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("BATCH_SIZE must be positive".to_string()));
        }
        self.distance_metric()?;
        Ok(())
    }

    pub fn distance_metric(&self) -> Result<DistanceMetric, ConfigError> {
        DistanceMetric::from_space(&self.chroma_space).ok_or_else(|| {
            ConfigError::Invalid(format!("Unknown CHROMA_SPACE: {}", self.chroma_space))
        })
    }

    pub fn chunker(&self) -> Result<Chunker, ConfigError> {
        Chunker::new(self.chunk_size, self.chunk_overlap)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn fallback_policy(&self) -> FallbackPolicy {
        if self.low_confidence_fallback {
            FallbackPolicy::default()
        } else {
            FallbackPolicy::Disabled
        }
    }

    pub fn prompt_assembler(&self) -> PromptAssembler {
        PromptAssembler {
            min_score: self.min_score,
            fallback: self.fallback_policy(),
            max_context_chars: MAX_CONTEXT_CHARS,
        }
    }

    pub fn generation_mode(&self) -> GenerationMode {
        if self.stream_output {
            GenerationMode::Streaming
        } else {
            GenerationMode::Blocking
        }
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_secs(self.answer_timeout)
    }

    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
            timeout: self.answer_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.top_k, 4);
        assert_eq!(settings.min_score, 0.25);
        assert_eq!(settings.chunk_size, 400);
        assert_eq!(settings.chunk_overlap, 150);
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.answer_timeout(), Duration::from_secs(600));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.set_env("TOP_K", "7");
            jail.set_env("MIN_SCORE", "0.4");
            jail.set_env("STREAM_OUTPUT", "false");
            jail.set_env("LLM_MODEL", "llama3");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.top_k, 7);
            assert_eq!(settings.min_score, 0.4);
            assert!(!settings.stream_output);
            assert_eq!(settings.llm_model, "llama3");
            assert_eq!(settings.generation_mode(), GenerationMode::Blocking);
            Ok(())
        });
    }

    #[test]
    fn test_file_then_environment_precedence() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "top_k = 6\nchroma_collection = \"papers\"")?;
            jail.set_env("TOP_K", "9");

            let settings = Settings::load().map_err(|e| e.to_string())?;
            assert_eq!(settings.top_k, 9);
            assert_eq!(settings.chroma_collection, "papers");
            Ok(())
        });
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        let settings = Settings {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_space() {
        let settings = Settings {
            chroma_space: "manhattan".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_fallback_flag_selects_policy() {
        let settings = Settings {
            low_confidence_fallback: false,
            ..Settings::default()
        };
        assert_eq!(settings.fallback_policy(), FallbackPolicy::Disabled);
        assert_eq!(Settings::default().fallback_policy(), FallbackPolicy::TopScoring(2));
    }
}
