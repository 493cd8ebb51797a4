//! IBM Quantum credentials management
//!
//! Handles API token retrieval, validation and account storage.
//! Tokens are never compiled into the binary.
//!
//! ## Token Sources (in priority order)
//! 1. Explicit token passed to [`CredentialsManager::resolve`]
//! 2. Environment variable `IBM_QUANTUM_TOKEN`
//! 3. `.env` file
//! 4. Config file `~/.qiskit/qiskit-ibm.json`

use crate::error::{ChshError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Account name used by Qiskit for the default IBM Quantum channel
pub const DEFAULT_ACCOUNT_NAME: &str = "default-ibm-quantum";

/// IBM Quantum credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// API token
    token: String,

    /// Instance (hub/group/project)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance: Option<String>,

    /// Channel (ibm_quantum or ibm_cloud)
    #[serde(default = "default_channel")]
    channel: String,

    /// Service CRN, required on the ibm_cloud channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service_crn: Option<String>,
}

fn default_channel() -> String {
    "ibm_quantum".to_string()
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***REDACTED***")
            .field("instance", &self.instance)
            .field("channel", &self.channel)
            .field("service_crn", &self.service_crn)
            .finish()
    }
}

impl Credentials {
    /// Create credentials with token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            instance: None,
            channel: default_channel(),
            service_crn: None,
        }
    }

    /// Create credentials with token and instance
    pub fn with_instance(token: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            instance: Some(instance.into()),
            ..Self::new(token)
        }
    }

    /// Create IBM Cloud credentials with a service CRN
    pub fn with_crn(token: impl Into<String>, crn: impl Into<String>) -> Self {
        Self {
            channel: "ibm_cloud".to_string(),
            service_crn: Some(crn.into()),
            ..Self::new(token)
        }
    }

    /// Get API token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Get instance
    pub fn instance(&self) -> Option<&str> {
        self.instance.as_deref()
    }

    /// Get channel
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Get service CRN
    pub fn service_crn(&self) -> Option<&str> {
        self.service_crn.as_deref()
    }

    /// Set channel
    pub fn set_channel(&mut self, channel: impl Into<String>) {
        self.channel = channel.into();
    }

    /// Validate token format (basic check)
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(ChshError::InvalidToken("Token is empty".into()));
        }

        if self.token.len() < 32 {
            return Err(ChshError::InvalidToken("Token too short".into()));
        }

        if self.token.chars().any(char::is_whitespace) {
            return Err(ChshError::InvalidToken("Token contains whitespace".into()));
        }

        Ok(())
    }

    /// Create authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Credentials manager for loading and storing credentials
pub struct CredentialsManager;

impl CredentialsManager {
    /// Load credentials from the environment, `.env` or the Qiskit config file
    pub fn load() -> Result<Credentials> {
        Self::resolve(None)
    }

    /// Resolve credentials, trying each source in turn
    ///
    /// Priority:
    /// 1. `explicit`, if given
    /// 2. Environment variable `IBM_QUANTUM_TOKEN`
    /// 3. `.env` file
    /// 4. Qiskit config file
    pub fn resolve(explicit: Option<&str>) -> Result<Credentials> {
        if let Some(token) = explicit {
            let creds = Credentials::new(token);
            creds.validate()?;
            debug!("credentials taken from explicit token");
            return Ok(creds);
        }

        // A missing .env file is not an error
        let _ = dotenvy::dotenv();

        if let Some(creds) = Self::load_from_env()? {
            debug!(channel = creds.channel(), "credentials loaded from environment");
            return Ok(creds);
        }

        let config_path = Self::qiskit_config_path()?;
        if let Some(creds) = Self::load_from_file(&config_path)? {
            debug!(path = %config_path.display(), "credentials loaded from qiskit config");
            return Ok(creds);
        }

        Err(ChshError::TokenNotFound)
    }

    fn load_from_env() -> Result<Option<Credentials>> {
        let token = match env::var("IBM_QUANTUM_TOKEN") {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };

        let mut creds = match env::var("IBM_QUANTUM_CRN") {
            Ok(crn) => Credentials::with_crn(token, crn),
            Err(_) => Credentials::new(token),
        };
        if let Ok(instance) = env::var("IBM_QUANTUM_INSTANCE") {
            creds.instance = Some(instance);
        }
        if let Ok(channel) = env::var("IBM_QUANTUM_CHANNEL") {
            creds.set_channel(channel);
        }

        creds.validate()?;
        Ok(Some(creds))
    }

    /// Load from a Qiskit account file
    ///
    /// The file maps account names to account records. The default account
    /// name is preferred; otherwise the first record carrying a token wins.
    pub fn load_from_file(path: &Path) -> Result<Option<Credentials>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let config: serde_json::Value = serde_json::from_str(&content)?;

        // Legacy flat format
        if let Some(token) = config.get("token").and_then(|v| v.as_str()) {
            let creds = Credentials::new(token);
            creds.validate()?;
            return Ok(Some(creds));
        }

        let accounts = match config.as_object() {
            Some(accounts) => accounts,
            None => return Ok(None),
        };

        let record = accounts
            .get(DEFAULT_ACCOUNT_NAME)
            .filter(|r| r.get("token").is_some())
            .or_else(|| accounts.values().find(|r| r.get("token").is_some()));

        match record {
            Some(record) => {
                let creds: Credentials = serde_json::from_value(record.clone())?;
                creds.validate()?;
                Ok(Some(creds))
            }
            None => Ok(None),
        }
    }

    /// Store an account record in a Qiskit account file
    ///
    /// An existing record under `name` is only replaced when `overwrite` is
    /// set; other records in the file are preserved.
    pub fn save_account(
        path: &Path,
        name: &str,
        creds: &Credentials,
        overwrite: bool,
    ) -> Result<()> {
        creds.validate()?;

        let mut accounts = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<serde_json::Value>(&content)? {
                serde_json::Value::Object(map) => map,
                _ => {
                    return Err(ChshError::InvalidConfig(format!(
                        "{} is not an account map",
                        path.display()
                    )))
                }
            }
        } else {
            serde_json::Map::new()
        };

        if accounts.contains_key(name) && !overwrite {
            return Err(ChshError::AccountExists(name.to_string()));
        }

        accounts.insert(name.to_string(), serde_json::to_value(creds)?);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&accounts)?)?;
        info!(account = name, path = %path.display(), "account saved");

        Ok(())
    }

    /// Get Qiskit config file path
    pub fn qiskit_config_path() -> Result<PathBuf> {
        let home = env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .map_err(|_| ChshError::InvalidConfig("Could not determine home directory".into()))?;

        Ok(PathBuf::from(home).join(".qiskit").join("qiskit-ibm.json"))
    }
}
