use crate::chatctx::inference::parse_provider_alias;
use crate::error::ChatCtxError;
use crate::transcript::context::FormatOptions;
use crate::transcript::message::SpeakerLabels;
use crate::transcript::patterns::{PatternRegistry, PatternSpec};
use crate::transcript::timestamp::TimestampNormalizer;
use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are answering questions about a chat conversation.\n\
Use only the transcript below. If the answer is not in it, say so.\n\n\
Transcript:\n{context}\n\nQuestion: {question}\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub budget_units: usize,
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            budget_units: crate::transcript::chunker::DEFAULT_BUDGET_UNITS,
            max_chunks: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub time_zone: String,
    pub self_label: String,
    pub contact_label: String,
}

impl Default for FormatConfig {
    fn default() -> Self {
        let labels = SpeakerLabels::default();
        Self {
            time_zone: "UTC".to_string(),
            self_label: labels.self_label,
            contact_label: labels.contact_label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatternsConfig {
    pub extra: Vec<PatternSpec>,
    /// Stop using the `sender: body` fallback after the first dated header.
    pub retire_untimed_after_dated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Empty means pick from whichever API key is present.
    pub provider: String,
    pub model: String,
    pub prompt_template: String,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            model: String::new(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            timeout_secs: 45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: String,
    pub limit: usize,
    pub timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            limit: 100,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChatCtxConfig {
    pub chunking: ChunkingConfig,
    pub format: FormatConfig,
    pub patterns: PatternsConfig,
    pub inference: InferenceConfig,
    pub bridge: BridgeConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialChatCtxConfig {
    chunking: Option<ChunkingConfig>,
    format: Option<FormatConfig>,
    patterns: Option<PatternsConfig>,
    inference: Option<InferenceConfig>,
    bridge: Option<BridgeConfig>,
    store: Option<StoreConfig>,
}

impl ChatCtxConfig {
    pub fn time_zone(&self) -> Result<Tz, ChatCtxError> {
        self.format.time_zone.trim().parse::<Tz>().map_err(|_| {
            ChatCtxError::InvalidConfig(format!(
                "unknown time zone `{}`",
                self.format.time_zone
            ))
        })
    }

    pub fn labels(&self) -> SpeakerLabels {
        SpeakerLabels {
            self_label: self.format.self_label.clone(),
            contact_label: self.format.contact_label.clone(),
        }
    }

    pub fn registry(&self) -> Result<PatternRegistry, ChatCtxError> {
        Ok(PatternRegistry::with_extra(&self.patterns.extra)?
            .retiring_untimed_after_dated(self.patterns.retire_untimed_after_dated))
    }

    pub fn normalizer(&self) -> Result<TimestampNormalizer, ChatCtxError> {
        Ok(TimestampNormalizer::new(self.time_zone()?))
    }

    pub fn format_options(&self) -> Result<FormatOptions, ChatCtxError> {
        Ok(FormatOptions {
            tz: self.time_zone()?,
            labels: self.labels(),
        })
    }
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

pub fn validate(cfg: &ChatCtxConfig) -> Result<(), ChatCtxError> {
    let invalid = |msg: &str| -> Result<(), ChatCtxError> {
        Err(ChatCtxError::InvalidConfig(msg.to_string()))
    };
    if cfg.chunking.budget_units == 0 {
        return invalid("chunking.budget_units must be >= 1");
    }
    if cfg.chunking.max_chunks == 0 {
        return invalid("chunking.max_chunks must be >= 1");
    }
    cfg.time_zone()?;
    if cfg.format.self_label.trim().is_empty() || cfg.format.contact_label.trim().is_empty() {
        return invalid("format labels cannot be empty");
    }
    for placeholder in ["{context}", "{question}"] {
        if !cfg.inference.prompt_template.contains(placeholder) {
            return Err(ChatCtxError::InvalidConfig(format!(
                "inference.prompt_template must contain {placeholder}"
            )));
        }
    }
    let provider = cfg.inference.provider.trim();
    if !provider.is_empty() && parse_provider_alias(provider).is_none() {
        return Err(ChatCtxError::InvalidConfig(format!(
            "unknown inference provider `{provider}`"
        )));
    }
    if cfg.inference.timeout_secs == 0 || cfg.bridge.timeout_secs == 0 {
        return invalid("timeouts must be >= 1 second");
    }
    if cfg.bridge.limit == 0 {
        return invalid("bridge.limit must be >= 1");
    }
    if cfg.store.ttl_secs == 0 {
        return invalid("store.ttl_secs must be >= 1");
    }
    cfg.registry()?;
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CHATCTX_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(home) = env::var("CHATCTX_HOME") {
        let trimmed = home.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed).join("config.toml"));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".chatctx").join("config.toml"))
}

fn merge_file_config(base: &mut ChatCtxConfig, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialChatCtxConfig = toml::from_str(&raw).map_err(|err| {
        ChatCtxError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(chunking) = parsed.chunking {
        base.chunking = chunking;
    }
    if let Some(format) = parsed.format {
        base.format = format;
    }
    if let Some(patterns) = parsed.patterns {
        base.patterns = patterns;
    }
    if let Some(inference) = parsed.inference {
        base.inference = inference;
    }
    if let Some(bridge) = parsed.bridge {
        base.bridge = bridge;
    }
    if let Some(store) = parsed.store {
        base.store = store;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut ChatCtxConfig) {
    cfg.chunking.budget_units = env_or_usize("CHATCTX_BUDGET_UNITS", cfg.chunking.budget_units);
    cfg.chunking.max_chunks = env_or_usize("CHATCTX_MAX_CHUNKS", cfg.chunking.max_chunks);
    cfg.format.time_zone = env_or_string("CHATCTX_TIME_ZONE", &cfg.format.time_zone);
    cfg.format.self_label = env_or_string("CHATCTX_SELF_LABEL", &cfg.format.self_label);
    cfg.format.contact_label = env_or_string("CHATCTX_CONTACT_LABEL", &cfg.format.contact_label);
    cfg.inference.provider = env_or_string("CHATCTX_INFERENCE_PROVIDER", &cfg.inference.provider);
    cfg.inference.model = env_or_string("CHATCTX_INFERENCE_MODEL", &cfg.inference.model);
    cfg.inference.timeout_secs =
        env_or_u64("CHATCTX_INFERENCE_TIMEOUT_SECS", cfg.inference.timeout_secs);
    cfg.bridge.base_url = env_or_string("CHATCTX_BRIDGE_URL", &cfg.bridge.base_url);
    cfg.bridge.limit = env_or_usize("CHATCTX_BRIDGE_LIMIT", cfg.bridge.limit);
    cfg.bridge.timeout_secs = env_or_u64("CHATCTX_BRIDGE_TIMEOUT_SECS", cfg.bridge.timeout_secs);
    cfg.store.ttl_secs = env_or_u64("CHATCTX_SESSION_TTL_SECS", cfg.store.ttl_secs);
}

/// Defaults, then the TOML file if present, then `CHATCTX_*` overrides.
pub fn load_config() -> Result<ChatCtxConfig> {
    let mut cfg = ChatCtxConfig::default();
    if let Some(path) = resolve_config_path()
        && path.exists()
    {
        merge_file_config(&mut cfg, &path)?;
        tracing::debug!(path = %path.display(), "loaded config file");
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
