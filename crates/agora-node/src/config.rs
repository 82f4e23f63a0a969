use agora_types::AgoraError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub api: ApiConfig,
    pub registry: RegistryConfig,
    pub storage: StorageConfig,
    pub payment: PaymentConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Registry gateway location plus the deployed contract addresses it
/// fronts. Both addresses are required; there is no usable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub gateway_url: String,
    pub identity_registry: String,
    pub reputation_registry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bridge_url: String,
    pub gateway_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    pub facilitator_url: Option<String>,
    /// Hex seed for the payment signer. When absent an ephemeral key is
    /// generated at startup.
    pub signer_seed_hex: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "agora-node".to_string(),
            },
            api: ApiConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
            },
            registry: RegistryConfig {
                gateway_url: "http://localhost:8545".to_string(),
                identity_registry: String::new(),
                reputation_registry: String::new(),
            },
            storage: StorageConfig {
                bridge_url: "http://localhost:3000".to_string(),
                gateway_url: "https://gateway.lighthouse.storage".to_string(),
            },
            payment: PaymentConfig {
                facilitator_url: None,
                signer_seed_hex: None,
            },
            http: HttpConfig {
                timeout_secs: 30,
                max_upload_bytes: 50 * 1024 * 1024,
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        // Env overrides are applied by the caller so precedence stays
        // file < environment < CLI flags
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("API_HOST") {
            self.api.host = host;
        }
        if let Ok(port) = env::var("API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
        if let Ok(url) = env::var("REGISTRY_GATEWAY_URL") {
            self.registry.gateway_url = url;
        }
        if let Ok(addr) = env::var("IDENTITY_REGISTRY_ADDRESS") {
            self.registry.identity_registry = addr;
        }
        if let Ok(addr) = env::var("REPUTATION_REGISTRY_ADDRESS") {
            self.registry.reputation_registry = addr;
        }
        if let Ok(url) = env::var("STORAGE_BRIDGE_URL") {
            self.storage.bridge_url = url;
        }
        if let Ok(url) = env::var("STORAGE_GATEWAY_URL") {
            self.storage.gateway_url = url;
        }
        if let Ok(url) = env::var("FACILITATOR_URL") {
            self.payment.facilitator_url = Some(url);
        }
        if let Ok(seed) = env::var("AGENT_PRIVATE_KEY") {
            self.payment.signer_seed_hex = Some(seed);
        }
        if let Ok(secs) = env::var("HTTP_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse() {
                self.http.timeout_secs = secs;
            }
        }
    }

    /// Fail fast on settings the pipeline cannot run without.
    pub fn validate(&self) -> std::result::Result<(), AgoraError> {
        if self.registry.gateway_url.is_empty() {
            return Err(AgoraError::ConfigurationMissing(
                "registry.gateway_url".to_string(),
            ));
        }
        if self.registry.identity_registry.is_empty() {
            return Err(AgoraError::ConfigurationMissing(
                "registry.identity_registry (IDENTITY_REGISTRY_ADDRESS)".to_string(),
            ));
        }
        if self.registry.reputation_registry.is_empty() {
            return Err(AgoraError::ConfigurationMissing(
                "registry.reputation_registry (REPUTATION_REGISTRY_ADDRESS)".to_string(),
            ));
        }
        if self.storage.bridge_url.is_empty() {
            return Err(AgoraError::ConfigurationMissing(
                "storage.bridge_url".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(AgoraError::ConfigurationMissing(
                "http.timeout_secs must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
