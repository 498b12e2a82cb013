//! Configuration loading, environment overlay, and validation.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Persona used when `vision.persona` is not set.
pub const DEFAULT_PERSONA: &str = "You are Sir David Attenborough. Describe and narrate this image as if it is a nature documentary. Make it snarky and funny. Don't repeat yourself. Make it short and snappy. If there is a human in the image that does anything remotely interesting, make a big deal about it!";

const DEFAULT_PORT: u16 = 8765;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_VISION_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_VISION_MAX_TOKENS: u32 = 300;
const DEFAULT_TTS_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";
const DEFAULT_TTS_OUTPUT_FORMAT: &str = "mp3_44100_128";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_LOG_FILE: &str = "narrator.log";

/// Top-level Narrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<VisionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<TtsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Largest accepted WebSocket message (a base64 photo), in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_payload_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            tls: None,
            max_payload_bytes: None,
            rate_limit: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// TLS configuration for the gateway.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM).
    pub cert_path: String,
    /// Path to the TLS private key file (PEM).
    pub key_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max concurrent sessions per client IP (default: 4).
    #[serde(default = "default_max_sessions_per_ip")]
    pub max_sessions_per_ip: u32,
}

fn default_max_sessions_per_ip() -> u32 {
    4
}

/// Vision model (OpenAI-compatible chat completions) configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// API base including the version segment (default: "https://api.openai.com/v1").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// System instruction steering the narration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

impl VisionConfig {
    /// Resolve the API key: `api_key` first, then `api_key_env`, then `OPENAI_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| resolve_secret_field(&None, &Some("OPENAI_API_KEY".into())))
    }
}

/// Text-to-speech (TTS) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Voice ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Model ID (default: "eleven_multilingual_v2").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Output format (default: "mp3_44100_128").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,

    /// Text prepended to every narration before synthesis, e.g. "-- --" for a short pause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_in: Option<String>,

    /// Remove `[...]` stage directions before synthesis.
    #[serde(default = "default_true")]
    pub strip_stage_directions: bool,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            base_url: None,
            voice: None,
            model: None,
            output_format: None,
            lead_in: None,
            strip_stage_directions: true,
        }
    }
}

impl TtsConfig {
    /// Resolve the API key: `api_key` first, then `api_key_env`, then `ELEVENLABS_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
            .or_else(|| resolve_secret_field(&None, &Some("ELEVENLABS_API_KEY".into())))
    }
}

fn default_true() -> bool {
    true
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// GCS bucket name. Without it only the local store is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    /// Path to the service account JSON key used to upload to the bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_json: Option<String>,

    /// Local artifact directory (default: ~/.narrator/artifacts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<String>,

    /// Base of the public artifact URLs (default: "https://storage.googleapis.com/<bucket>").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
}

/// What to do with an inbound text frame that is neither a ping nor a PNG.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedInputPolicy {
    /// Drop it without telling the client.
    #[default]
    Ignore,
    /// Reply with a short notice.
    Notify,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for each vision/speech call, in seconds (0 disables).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_timeout_secs: Option<u64>,

    /// Prior narrations of the same session passed to the vision model (default: 0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_turns: Option<usize>,

    #[serde(default)]
    pub malformed_input: MalformedInputPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "narrator_gateway=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default), "stdout", or "file".
    #[serde(default = "default_log_output")]
    pub output: String,

    /// Log file path when `output` is "file" (default: "narrator.log").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

impl LoggingConfig {
    pub fn file_path(&self) -> PathBuf {
        PathBuf::from(self.file.as_deref().unwrap_or(DEFAULT_LOG_FILE))
    }
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

static ENV_REF: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env reference pattern"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::NarratorError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Load from `path` and overlay the `NARRATOR_*` environment.
    pub fn load_with_env(path: &Path) -> crate::error::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env()?;
        Ok(config)
    }

    /// Overlay environment variables onto the loaded file config.
    ///
    /// Environment always wins over the file. Read once at startup.
    pub fn apply_env(&mut self) -> crate::error::Result<()> {
        if let Some(port) = env_value("NARRATOR_PORT") {
            let port = port.parse::<u16>().map_err(|e| {
                crate::error::NarratorError::Config(format!("NARRATOR_PORT '{port}': {e}"))
            })?;
            self.gateway.get_or_insert_with(GatewayConfig::default).port = port;
        }
        if let Some(bind) = env_value("NARRATOR_BIND") {
            self.gateway.get_or_insert_with(GatewayConfig::default).bind = Some(bind);
        }

        let cert = env_value("NARRATOR_TLS_CERT");
        let key = env_value("NARRATOR_TLS_KEY");
        if cert.is_some() || key.is_some() {
            let gateway = self.gateway.get_or_insert_with(GatewayConfig::default);
            let tls = gateway.tls.get_or_insert_with(TlsConfig::default);
            if let Some(cert) = cert {
                tls.cert_path = cert;
            }
            if let Some(key) = key {
                tls.key_path = key;
            }
        }

        if let Some(base) = env_value("NARRATOR_API_BASE") {
            self.vision.get_or_insert_with(VisionConfig::default).base_url = Some(base);
        }
        if let Some(voice) = env_value("NARRATOR_VOICE") {
            self.tts.get_or_insert_with(TtsConfig::default).voice = Some(voice);
        }

        if let Some(bucket) = env_value("NARRATOR_BUCKET") {
            self.storage.get_or_insert_with(StorageConfig::default).bucket = Some(bucket);
        }
        if let Some(sa) = env_value("NARRATOR_SERVICE_ACCOUNT_JSON") {
            self.storage
                .get_or_insert_with(StorageConfig::default)
                .service_account_json = Some(sa);
        }
        if let Some(dir) = env_value("NARRATOR_LOCAL_DIR") {
            self.storage.get_or_insert_with(StorageConfig::default).local_dir = Some(dir);
        }
        if let Some(url) = env_value("NARRATOR_PUBLIC_BASE_URL") {
            self.storage
                .get_or_insert_with(StorageConfig::default)
                .public_base_url = Some(url);
        }

        Ok(())
    }

    /// Resolve the default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(DEFAULT_PORT)
    }

    /// Gateway bind address.
    pub fn gateway_bind(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|g| g.bind.clone())
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    pub fn tls(&self) -> Option<&TlsConfig> {
        self.gateway.as_ref().and_then(|g| g.tls.as_ref())
    }

    pub fn max_payload_bytes(&self) -> usize {
        self.gateway
            .as_ref()
            .and_then(|g| g.max_payload_bytes)
            .unwrap_or(DEFAULT_MAX_PAYLOAD_BYTES)
    }

    pub fn vision_base_url(&self) -> String {
        self.vision
            .as_ref()
            .and_then(|v| v.base_url.clone())
            .unwrap_or_else(|| DEFAULT_VISION_BASE_URL.to_string())
    }

    pub fn vision_model(&self) -> String {
        self.vision
            .as_ref()
            .and_then(|v| v.model.clone())
            .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string())
    }

    pub fn vision_max_tokens(&self) -> u32 {
        self.vision
            .as_ref()
            .and_then(|v| v.max_tokens)
            .unwrap_or(DEFAULT_VISION_MAX_TOKENS)
    }

    pub fn persona(&self) -> String {
        self.vision
            .as_ref()
            .and_then(|v| v.persona.clone())
            .unwrap_or_else(|| DEFAULT_PERSONA.to_string())
    }

    pub fn tts_base_url(&self) -> String {
        self.tts
            .as_ref()
            .and_then(|t| t.base_url.clone())
            .unwrap_or_else(|| DEFAULT_TTS_BASE_URL.to_string())
    }

    pub fn tts_model(&self) -> String {
        self.tts
            .as_ref()
            .and_then(|t| t.model.clone())
            .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string())
    }

    pub fn tts_output_format(&self) -> String {
        self.tts
            .as_ref()
            .and_then(|t| t.output_format.clone())
            .unwrap_or_else(|| DEFAULT_TTS_OUTPUT_FORMAT.to_string())
    }

    pub fn voice(&self) -> Option<String> {
        self.tts.as_ref().and_then(|t| t.voice.clone())
    }

    pub fn strip_stage_directions(&self) -> bool {
        self.tts
            .as_ref()
            .map(|t| t.strip_stage_directions)
            .unwrap_or(true)
    }

    pub fn bucket(&self) -> Option<&str> {
        self.storage.as_ref().and_then(|s| s.bucket.as_deref())
    }

    /// Resolve the local artifact directory.
    pub fn local_dir(&self) -> PathBuf {
        self.storage
            .as_ref()
            .and_then(|s| s.local_dir.as_ref())
            .map(|d| {
                let expanded = shellexpand::tilde(d);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| data_dir().join("artifacts"))
    }

    /// Base of public artifact URLs, without a trailing slash.
    pub fn public_base_url(&self) -> String {
        let explicit = self
            .storage
            .as_ref()
            .and_then(|s| s.public_base_url.as_deref());
        match (explicit, self.bucket()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(bucket)) => format!("https://storage.googleapis.com/{bucket}"),
            (None, None) => format!("file://{}", self.local_dir().display()),
        }
    }

    /// Remote call timeout. `None` when disabled with 0.
    pub fn remote_timeout(&self) -> Option<std::time::Duration> {
        let secs = self
            .pipeline
            .as_ref()
            .and_then(|p| p.remote_timeout_secs)
            .unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS);
        (secs > 0).then(|| std::time::Duration::from_secs(secs))
    }

    pub fn history_turns(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.history_turns)
            .unwrap_or(0)
    }

    pub fn malformed_input(&self) -> MalformedInputPolicy {
        self.pipeline
            .as_ref()
            .map(|p| p.malformed_input)
            .unwrap_or_default()
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if self
            .vision
            .as_ref()
            .and_then(|v| v.resolve_api_key())
            .or_else(|| VisionConfig::default().resolve_api_key())
            .is_none()
        {
            warnings.push("Vision model has no API key configured".to_string());
        }

        if self
            .tts
            .as_ref()
            .and_then(|t| t.resolve_api_key())
            .or_else(|| TtsConfig::default().resolve_api_key())
            .is_none()
        {
            warnings.push("TTS has no API key configured".to_string());
        }

        if self.voice().is_none() {
            warnings.push(
                "TTS voice not set (tts.voice or NARRATOR_VOICE); using the default voice"
                    .to_string(),
            );
        }

        match (
            self.bucket(),
            self.storage
                .as_ref()
                .and_then(|s| s.service_account_json.as_deref()),
        ) {
            (None, _) => warnings.push(
                "No storage bucket configured; artifacts are kept on local disk only".to_string(),
            ),
            (Some(_), None) => {
                errors.push("Storage bucket set but no service account JSON key".to_string())
            }
            (Some(_), Some(sa)) => {
                if !Path::new(sa).exists() {
                    errors.push(format!("Service account key file not found: {sa}"));
                }
            }
        }

        if let Some(tls) = self.tls() {
            if tls.cert_path.is_empty() || tls.key_path.is_empty() {
                errors.push("TLS needs both a certificate and a key path".to_string());
            } else {
                if !Path::new(&tls.cert_path).exists() {
                    errors.push(format!("TLS certificate file not found: {}", tls.cert_path));
                }
                if !Path::new(&tls.key_path).exists() {
                    errors.push(format!("TLS key file not found: {}", tls.key_path));
                }
            }
        } else {
            warnings.push("TLS not configured; serving plain ws://".to_string());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }
}

/// Base directory for Narrator data: `~/.narrator/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".narrator")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, unique variable name
        unsafe { std::env::set_var("TEST_NARRATOR_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_NARRATOR_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_NARRATOR_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_NARRATOR_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gateway_port(), 8765);
        assert_eq!(config.gateway_bind(), "0.0.0.0");
        assert_eq!(config.vision_model(), "gpt-4o");
        assert_eq!(config.vision_max_tokens(), 300);
        assert_eq!(config.tts_model(), "eleven_multilingual_v2");
        assert_eq!(config.history_turns(), 0);
        assert_eq!(config.malformed_input(), MalformedInputPolicy::Ignore);
        assert_eq!(
            config.remote_timeout(),
            Some(std::time::Duration::from_secs(120))
        );
        assert!(config.strip_stage_directions());
        assert!(config.persona().contains("nature documentary"));
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/narrator/config.json")).unwrap();
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 9443 },
                storage: { bucket: "narrations" },
                pipeline: { history_turns: 3, malformed_input: "notify" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway_port(), 9443);
        assert_eq!(config.bucket(), Some("narrations"));
        assert_eq!(config.history_turns(), 3);
        assert_eq!(config.malformed_input(), MalformedInputPolicy::Notify);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ gateway: ").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    fn test_public_base_url() {
        let mut config = Config {
            storage: Some(StorageConfig {
                bucket: Some("davidattenborough".into()),
                ..StorageConfig::default()
            }),
            ..Config::default()
        };
        assert_eq!(
            config.public_base_url(),
            "https://storage.googleapis.com/davidattenborough"
        );

        config.storage.as_mut().unwrap().public_base_url =
            Some("https://cdn.example.com/a/".into());
        assert_eq!(config.public_base_url(), "https://cdn.example.com/a");
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config {
            pipeline: Some(PipelineConfig {
                remote_timeout_secs: Some(0),
                ..PipelineConfig::default()
            }),
            ..Config::default()
        };
        assert!(config.remote_timeout().is_none());
    }

    #[test]
    fn test_vision_resolve_api_key() {
        // SAFETY: test-only, unique variable name
        unsafe { std::env::set_var("TEST_NARRATOR_VISION_KEY", "from-env") };
        let vision = VisionConfig {
            api_key_env: Some("TEST_NARRATOR_VISION_KEY".into()),
            ..VisionConfig::default()
        };
        assert_eq!(vision.resolve_api_key(), Some("from-env".into()));

        let vision2 = VisionConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_NARRATOR_VISION_KEY".into()),
            ..VisionConfig::default()
        };
        // Direct key takes priority
        assert_eq!(vision2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_NARRATOR_VISION_KEY") };
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
        assert_eq!(logging.file_path(), PathBuf::from("narrator.log"));
    }

    #[test]
    fn test_logging_config_filters() {
        let json_str = r#"{
            "logging": {
                "format": "json",
                "output": "file",
                "file": "/var/log/narrator.log",
                "filters": ["narrator_gateway=debug", "narrator_storage=trace"]
            }
        }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "json");
        assert_eq!(logging.filters.len(), 2);
        assert_eq!(logging.file_path(), PathBuf::from("/var/log/narrator.log"));
    }

    #[test]
    fn test_validate_bad_tls_errors() {
        let config = Config {
            gateway: Some(GatewayConfig {
                tls: Some(TlsConfig {
                    cert_path: "/nonexistent/path/cert.pem".into(),
                    key_path: "/nonexistent/path/key.pem".into(),
                }),
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("certificate")),
            "Expected an error about cert file, got: {errors:?}"
        );
    }

    #[test]
    fn test_validate_half_tls_errors() {
        let config = Config {
            gateway: Some(GatewayConfig {
                tls: Some(TlsConfig {
                    cert_path: "/etc/cert.pem".into(),
                    key_path: String::new(),
                }),
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("both")), "{errors:?}");
    }

    #[test]
    fn test_validate_bucket_without_service_account() {
        let config = Config {
            storage: Some(StorageConfig {
                bucket: Some("b".into()),
                ..StorageConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("service account")), "{errors:?}");
    }

    #[test]
    fn test_validate_no_bucket_warns() {
        let (warnings, _errors) = Config::default().validate();
        assert!(warnings.iter().any(|w| w.contains("local disk")), "{warnings:?}");
    }

    #[test]
    fn test_apply_env_overlays() {
        // SAFETY: test-only; these variables are only touched by this test
        unsafe {
            std::env::set_var("NARRATOR_PORT", "9001");
            std::env::set_var("NARRATOR_BUCKET", "env-bucket");
            std::env::set_var("NARRATOR_TLS_CERT", "/tmp/cert.pem");
            std::env::set_var("NARRATOR_TLS_KEY", "/tmp/key.pem");
            std::env::set_var("NARRATOR_VOICE", "voice-123");
        }

        let mut config = Config {
            gateway: Some(GatewayConfig {
                port: 1234,
                ..GatewayConfig::default()
            }),
            ..Config::default()
        };
        let result = config.apply_env();

        unsafe {
            std::env::remove_var("NARRATOR_PORT");
            std::env::remove_var("NARRATOR_BUCKET");
            std::env::remove_var("NARRATOR_TLS_CERT");
            std::env::remove_var("NARRATOR_TLS_KEY");
            std::env::remove_var("NARRATOR_VOICE");
        }

        result.unwrap();
        assert_eq!(config.gateway_port(), 9001);
        assert_eq!(config.bucket(), Some("env-bucket"));
        assert_eq!(config.voice().as_deref(), Some("voice-123"));
        let tls = config.tls().unwrap();
        assert_eq!(tls.cert_path, "/tmp/cert.pem");
        assert_eq!(tls.key_path, "/tmp/key.pem");
    }
}
