//! Typed client for the external model registrar.
//!
//! The registrar is a command-line tool (by default a node script) that
//! records a model fingerprint on-chain and prints a JSON result. This module
//! builds its positional arguments, runs it through a [`ProcessInvoker`], and
//! decodes the success payload into a receipt.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use artifact_integrity_core::Digest;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RegistrarError, Result};
use crate::outcome::Success;
use crate::process::{InvokerConfig, ProcessInvoker, DEFAULT_TIMEOUT_SECS};

/// Path of the registration script.
pub const ENV_REGISTER_CLI: &str = "REGISTER_MODEL_CLI";
/// Path of the rental script.
pub const ENV_RENT_CLI: &str = "RENT_MODEL_CLI";
/// Interpreter for both scripts; empty runs them directly.
pub const ENV_NODE: &str = "REGISTRAR_NODE";
/// Per-call deadline in seconds.
pub const ENV_TIMEOUT_SECS: &str = "REGISTRAR_TIMEOUT_SECS";

pub const DEFAULT_NODE: &str = "node";
pub const DEFAULT_REGISTER_SCRIPT: &str = "blockchain/clients/register_model.js";
pub const DEFAULT_RENT_SCRIPT: &str = "blockchain/clients/rent_model.js";

/// How to reach the registrar tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarConfig {
    /// Interpreter used to run the scripts. `None` runs the scripts directly.
    pub interpreter: Option<PathBuf>,
    pub register_script: PathBuf,
    pub rent_script: PathBuf,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            interpreter: Some(PathBuf::from(DEFAULT_NODE)),
            register_script: PathBuf::from(DEFAULT_REGISTER_SCRIPT),
            rent_script: PathBuf::from(DEFAULT_RENT_SCRIPT),
            working_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RegistrarConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, so callers and tests can supply
    /// their own variable source.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(path) = non_empty(lookup(ENV_REGISTER_CLI)) {
            config.register_script = PathBuf::from(path);
        }
        if let Some(path) = non_empty(lookup(ENV_RENT_CLI)) {
            config.rent_script = PathBuf::from(path);
        }
        if let Some(node) = lookup(ENV_NODE) {
            // Set but empty means "run the scripts directly".
            config.interpreter = non_empty(Some(node)).map(PathBuf::from);
        }
        if let Some(raw) = non_empty(lookup(ENV_TIMEOUT_SECS)) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                RegistrarError::Config(format!(
                    "{} is not a number of seconds: {:?}",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
            if secs == 0 {
                return Err(RegistrarError::Config(format!(
                    "{} must be positive",
                    ENV_TIMEOUT_SECS
                )));
            }
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Set the interpreter; `None` runs the scripts directly.
    pub fn interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    /// Set the registration script.
    pub fn register_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.register_script = path.into();
        self
    }

    /// Set the rental script.
    pub fn rent_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.rent_script = path.into();
        self
    }

    /// Run the scripts in `dir`.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set the per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn invoker_for(&self, script: &Path) -> ProcessInvoker {
        let mut config = match self.interpreter {
            Some(ref interpreter) => InvokerConfig::new(interpreter).arg(script),
            None => InvokerConfig::new(script),
        }
        .timeout(self.timeout);
        if let Some(ref dir) = self.working_dir {
            config = config.working_dir(dir);
        }
        ProcessInvoker::new(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Request to record a fingerprint on the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub fingerprint: Digest,
    pub storage_locator: String,
    /// Price in the registry's smallest unit.
    pub price: u64,
    pub signing_key_path: Option<PathBuf>,
}

impl RegistrationRequest {
    /// Create a request with no signing key.
    pub fn new(fingerprint: Digest, storage_locator: impl Into<String>, price: u64) -> Self {
        Self {
            fingerprint,
            storage_locator: storage_locator.into(),
            price,
            signing_key_path: None,
        }
    }

    /// Sign with the key file at `path`.
    pub fn signing_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.signing_key_path = Some(path.into());
        self
    }

    /// Positional arguments: fingerprint hex, locator, price, optional key.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(self.fingerprint.to_hex()),
            OsString::from(&self.storage_locator),
            OsString::from(self.price.to_string()),
        ];
        if let Some(ref key) = self.signing_key_path {
            args.push(key.clone().into_os_string());
        }
        args
    }
}

/// Request to rent a registered model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RentalRequest {
    pub fingerprint: Digest,
    pub renter_key_path: Option<PathBuf>,
}

impl RentalRequest {
    /// Create a request with no renter key.
    pub fn new(fingerprint: Digest) -> Self {
        Self {
            fingerprint,
            renter_key_path: None,
        }
    }

    /// Rent with the key file at `path`.
    pub fn renter_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.renter_key_path = Some(path.into());
        self
    }

    /// Positional arguments: fingerprint hex, optional key.
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![OsString::from(self.fingerprint.to_hex())];
        if let Some(ref key) = self.renter_key_path {
            args.push(key.clone().into_os_string());
        }
        args
    }
}

/// Decoded result of a successful registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    pub txid: String,
    #[serde(rename = "model_pda")]
    pub model_address: String,
    #[serde(default)]
    pub program_id: Option<String>,
    #[serde(default)]
    pub wallet: Option<String>,
    /// Full payload as printed by the tool.
    #[serde(skip)]
    pub payload: Map<String, Value>,
}

/// Decoded result of a successful rental.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RentalReceipt {
    pub txid: String,
    #[serde(default, rename = "model_pda")]
    pub model_address: Option<String>,
    #[serde(default)]
    pub renter: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(skip)]
    pub payload: Map<String, Value>,
}

/// Runs the registrar tooling. Holds no state between calls.
#[derive(Debug, Clone)]
pub struct RegistrarClient {
    config: RegistrarConfig,
}

impl RegistrarClient {
    /// Create a client from its configuration.
    pub fn new(config: RegistrarConfig) -> Self {
        Self { config }
    }

    /// Get the client configuration.
    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// Record a fingerprint. Blocks for up to the configured timeout.
    pub fn register(&self, request: &RegistrationRequest) -> Result<RegistrationReceipt> {
        tracing::debug!(
            fingerprint = %request.fingerprint,
            locator = %request.storage_locator,
            "registering model"
        );
        let success = self
            .config
            .invoker_for(&self.config.register_script)
            .invoke(request.args())
            .into_result()?;

        let mut receipt: RegistrationReceipt = decode(&success)?;
        receipt.payload = success.payload;
        tracing::debug!(txid = %receipt.txid, model = %receipt.model_address, "model registered");
        Ok(receipt)
    }

    /// Rent a registered model.
    pub fn rent(&self, request: &RentalRequest) -> Result<RentalReceipt> {
        tracing::debug!(fingerprint = %request.fingerprint, "renting model");
        let success = self
            .config
            .invoker_for(&self.config.rent_script)
            .invoke(request.args())
            .into_result()?;

        let mut receipt: RentalReceipt = decode(&success)?;
        receipt.payload = success.payload;
        tracing::debug!(txid = %receipt.txid, "model rented");
        Ok(receipt)
    }
}

fn decode<T: for<'de> Deserialize<'de>>(success: &Success) -> Result<T> {
    serde_json::from_value(Value::Object(success.payload.clone()))
        .map_err(|e| RegistrarError::Decode(e.to_string()))
}
