//! IBM Quantum Runtime service handle
//!
//! Provides functionality to:
//! - List available backends
//! - Select the least busy device matching a filter
//! - Fetch a device's target description (basis gates, coupling map)

use crate::credentials::Credentials;
use crate::error::{ChshError, Result};
use crate::transpiler::Target;
use crate::{IBM_QUANTUM_API_URL, MIN_NUM_QUBITS};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Explicit handle to the Runtime API
pub struct RuntimeService {
    /// HTTP client
    client: Client,

    /// Credentials
    credentials: Credentials,

    /// API base URL, without trailing slash
    base_url: String,
}

/// Backend status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    /// Backend is online and accepting jobs
    Online,

    /// Backend is offline for maintenance
    Offline,

    /// Backend is paused
    Paused,

    /// Backend status is unknown
    #[default]
    Unknown,
}

impl BackendStatus {
    /// Read a `/backends/{name}/status` document
    ///
    /// `state: false` takes the device offline whatever its status string says.
    pub fn from_status(status: &serde_json::Value) -> Self {
        let name = match status.get("status") {
            Some(serde_json::Value::String(s)) => s.as_str(),
            Some(v) => v.get("name").and_then(|n| n.as_str()).unwrap_or(""),
            None => "",
        };
        let parsed = match name.to_ascii_lowercase().as_str() {
            "online" | "active" => BackendStatus::Online,
            "offline" | "internal" | "maintenance" => BackendStatus::Offline,
            "paused" => BackendStatus::Paused,
            _ => BackendStatus::Unknown,
        };

        match status.get("state").and_then(|v| v.as_bool()) {
            Some(false) if parsed != BackendStatus::Paused => BackendStatus::Offline,
            _ => parsed,
        }
    }
}

/// Backend information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Backend name
    pub name: String,

    /// Number of qubits
    pub n_qubits: usize,

    /// Backend status
    #[serde(default)]
    pub status: BackendStatus,

    /// Pending jobs in queue
    #[serde(default)]
    pub pending_jobs: usize,

    /// Is simulator
    #[serde(default)]
    pub simulator: bool,
}

impl BackendInfo {
    /// Check if backend accepts jobs
    pub fn is_operational(&self) -> bool {
        self.status == BackendStatus::Online
    }
}

/// Criteria for automatic device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendFilter {
    /// Only devices currently accepting jobs
    pub operational: bool,

    /// Simulators instead of hardware
    pub simulator: bool,

    /// Minimum device width
    pub min_num_qubits: usize,
}

impl Default for BackendFilter {
    fn default() -> Self {
        Self {
            operational: true,
            simulator: false,
            min_num_qubits: MIN_NUM_QUBITS,
        }
    }
}

impl BackendFilter {
    /// Check a single backend against the filter
    pub fn matches(&self, info: &BackendInfo) -> bool {
        (!self.operational || info.is_operational())
            && info.simulator == self.simulator
            && info.n_qubits >= self.min_num_qubits
    }
}

/// Pick the matching backend with the fewest pending jobs
///
/// Ties keep listing order.
pub fn select_least_busy(backends: Vec<BackendInfo>, filter: &BackendFilter) -> Result<BackendInfo> {
    backends
        .into_iter()
        .filter(|b| filter.matches(b))
        .min_by_key(|b| b.pending_jobs)
        .ok_or_else(|| {
            ChshError::BackendNotFound(format!(
                "no {} backend with at least {} qubits{}",
                if filter.simulator { "simulator" } else { "hardware" },
                filter.min_num_qubits,
                if filter.operational { " is operational" } else { "" }
            ))
        })
}

/// Build a target from a backend configuration document
pub fn target_from_configuration(name: &str, config: &serde_json::Value) -> Result<Target> {
    let num_qubits = config
        .get("n_qubits")
        .or_else(|| config.get("num_qubits"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ChshError::InvalidResponse(format!("No qubit count for '{}'", name)))?
        as usize;

    let basis_gates: Vec<String> = config
        .get("basis_gates")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ChshError::InvalidResponse(format!("No basis gates for '{}'", name)))?
        .iter()
        .filter_map(|g| g.as_str().map(str::to_string))
        .collect();

    let mut coupling_map = Vec::new();
    if let Some(edges) = config.get("coupling_map").and_then(|v| v.as_array()) {
        for edge in edges {
            let pair = edge
                .as_array()
                .filter(|p| p.len() == 2)
                .and_then(|p| Some((p[0].as_u64()? as usize, p[1].as_u64()? as usize)))
                .ok_or_else(|| {
                    ChshError::InvalidResponse(format!("Malformed coupling edge {}", edge))
                })?;
            if pair.0 >= num_qubits || pair.1 >= num_qubits {
                return Err(ChshError::InvalidResponse(format!(
                    "Coupling edge {:?} outside {}-qubit device",
                    pair, num_qubits
                )));
            }
            coupling_map.push(pair);
        }
    }

    Ok(Target {
        name: name.to_string(),
        num_qubits,
        basis_gates,
        coupling_map,
    })
}

/// Backend list response from API
#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceEntry {
    Name(String),
    Named {
        #[serde(alias = "backend_name")]
        name: String,
    },
}

/// Parse a `/backends` body into device names
pub fn parse_device_names(body: &str) -> Result<Vec<String>> {
    let list: DeviceList = serde_json::from_str(body)?;
    Ok(list
        .devices
        .into_iter()
        .map(|entry| match entry {
            DeviceEntry::Name(name) | DeviceEntry::Named { name } => name,
        })
        .collect())
}

/// Combine a backend's configuration and status documents
pub fn backend_info_from(
    name: &str,
    configuration: &serde_json::Value,
    status: &serde_json::Value,
) -> Result<BackendInfo> {
    let n_qubits = configuration
        .get("n_qubits")
        .or_else(|| configuration.get("num_qubits"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| ChshError::InvalidResponse(format!("No qubit count for '{}'", name)))?
        as usize;

    Ok(BackendInfo {
        name: name.to_string(),
        n_qubits,
        status: BackendStatus::from_status(status),
        pending_jobs: status
            .get("length_queue")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
        simulator: configuration
            .get("simulator")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    })
}

impl RuntimeService {
    /// Create a service handle against the default API URL
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_base_url(credentials, IBM_QUANTUM_API_URL)
    }

    /// Create a service handle against a specific API URL
    pub fn with_base_url(credentials: Credentials, base_url: impl Into<String>) -> Result<Self> {
        credentials.validate()?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            credentials,
            base_url,
        })
    }

    /// Build an authenticated request for an API path
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Authorization", self.credentials.auth_header())
            .header("Accept", "application/json");

        if let Some(crn) = self.credentials.service_crn() {
            req = req.header("Service-CRN", crn);
        }

        req
    }

    /// Turn a non-success response into an API error
    pub(crate) async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let code = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(ChshError::ApiError { code, message })
    }

    /// GET a JSON document describing one backend
    async fn backend_document(&self, name: &str, document: &str) -> Result<serde_json::Value> {
        let path = format!("/backends/{}/{}", name, document);
        let response = self.request(Method::GET, &path).send().await?;

        if response.status().as_u16() == 404 {
            return Err(ChshError::BackendNotFound(name.to_string()));
        }

        Ok(Self::check(response).await?.json().await?)
    }

    /// List the device names visible to these credentials
    pub async fn device_names(&self) -> Result<Vec<String>> {
        let response = Self::check(self.request(Method::GET, "/backends").send().await?).await?;
        let names = parse_device_names(&response.text().await?)?;
        debug!(count = names.len(), "devices listed");
        Ok(names)
    }

    /// Width, kind, status and queue length of one backend
    pub async fn backend_info(&self, name: &str) -> Result<BackendInfo> {
        let (configuration, status) = tokio::try_join!(
            self.backend_document(name, "configuration"),
            self.backend_document(name, "status"),
        )?;
        backend_info_from(name, &configuration, &status)
    }

    /// List available backends with their status
    pub async fn backends(&self) -> Result<Vec<BackendInfo>> {
        let mut backends = Vec::new();
        for name in self.device_names().await? {
            match self.backend_info(&name).await {
                Ok(info) => backends.push(info),
                // A device can disappear between listing and lookup
                Err(ChshError::BackendNotFound(_)) => debug!(backend = %name, "device vanished"),
                Err(err) => return Err(err),
            }
        }
        Ok(backends)
    }

    /// Look up an operational backend by name
    pub async fn backend(&self, name: &str) -> Result<BackendInfo> {
        let info = self.backend_info(name).await?;

        if !info.is_operational() {
            return Err(ChshError::BackendUnavailable(
                name.to_string(),
                format!("Status: {:?}", info.status),
            ));
        }

        Ok(info)
    }

    /// Least busy backend matching the filter
    pub async fn least_busy(&self, filter: &BackendFilter) -> Result<BackendInfo> {
        let best = select_least_busy(self.backends().await?, filter)?;
        info!(
            backend = %best.name,
            qubits = best.n_qubits,
            pending_jobs = best.pending_jobs,
            "selected least busy backend"
        );
        Ok(best)
    }

    /// Fetch the target description of a backend
    pub async fn target(&self, name: &str) -> Result<Target> {
        let config = self.backend_document(name, "configuration").await?;
        let target = target_from_configuration(name, &config)?;
        debug!(
            backend = name,
            qubits = target.num_qubits,
            basis = ?target.basis_gates,
            edges = target.coupling_map.len(),
            "target fetched"
        );
        Ok(target)
    }

    /// Get credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// API base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Device targets for offline testing
#[cfg(feature = "mock")]
pub mod mock {
    use crate::transpiler::Target;

    fn linear_chain(n: usize, bidirectional: bool) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for q in 0..n.saturating_sub(1) {
            edges.push((q, q + 1));
            if bidirectional {
                edges.push((q + 1, q));
            }
        }
        edges
    }

    /// Heron-style target: `cz` native, symmetric coupling
    pub fn heron_target(num_qubits: usize) -> Target {
        Target {
            name: "fake_heron".to_string(),
            num_qubits,
            basis_gates: ["cz", "id", "rz", "sx", "x"].map(String::from).to_vec(),
            coupling_map: linear_chain(num_qubits, true),
        }
    }

    /// Eagle-style target: `ecr` native, directed coupling
    pub fn eagle_target(num_qubits: usize) -> Target {
        Target {
            name: "fake_eagle".to_string(),
            num_qubits,
            basis_gates: ["ecr", "id", "rz", "sx", "x"].map(String::from).to_vec(),
            coupling_map: linear_chain(num_qubits, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, n_qubits: usize, status: BackendStatus, pending: usize) -> BackendInfo {
        BackendInfo {
            name: name.into(),
            n_qubits,
            status,
            pending_jobs: pending,
            simulator: false,
        }
    }

    #[test]
    fn test_filter_default() {
        let filter = BackendFilter::default();
        assert!(filter.operational);
        assert!(!filter.simulator);
        assert_eq!(filter.min_num_qubits, 127);
    }

    #[test]
    fn test_select_least_busy() {
        let backends = vec![
            info("ibm_busy", 127, BackendStatus::Online, 40),
            info("ibm_small", 27, BackendStatus::Online, 0),
            info("ibm_down", 156, BackendStatus::Offline, 0),
            info("ibm_quiet", 156, BackendStatus::Online, 3),
        ];

        let best = select_least_busy(backends, &BackendFilter::default()).unwrap();
        assert_eq!(best.name, "ibm_quiet");
    }

    #[test]
    fn test_select_least_busy_none_match() {
        let backends = vec![info("ibm_down", 156, BackendStatus::Paused, 0)];
        let err = select_least_busy(backends, &BackendFilter::default()).unwrap_err();
        assert!(matches!(err, ChshError::BackendNotFound(_)));
        assert_eq!(err.category(), crate::error::ErrorCategory::RemoteService);
    }

    #[test]
    fn test_parse_device_names() {
        let body = r#"{"devices": ["ibm_brisbane","ibm_kyiv","ibm_sherbrooke"]}"#;
        assert_eq!(
            parse_device_names(body).unwrap(),
            vec!["ibm_brisbane", "ibm_kyiv", "ibm_sherbrooke"]
        );

        let body = r#"{"devices": [{"name": "ibm_torino"}, {"backend_name": "ibm_fez"}]}"#;
        assert_eq!(parse_device_names(body).unwrap(), vec!["ibm_torino", "ibm_fez"]);

        assert!(parse_device_names(r#"{"backends": []}"#).is_err());
    }

    #[test]
    fn test_backend_info_from_documents() {
        let configuration = serde_json::json!({
            "backend_name": "ibm_brisbane",
            "n_qubits": 127,
            "simulator": false,
            "basis_gates": ["ecr", "id", "rz", "sx", "x"]
        });
        let status = serde_json::json!({
            "state": true,
            "status": "active",
            "message": "available",
            "length_queue": 12,
            "backend_version": "1.1.33"
        });

        let info = backend_info_from("ibm_brisbane", &configuration, &status).unwrap();
        assert_eq!(info.name, "ibm_brisbane");
        assert_eq!(info.n_qubits, 127);
        assert_eq!(info.pending_jobs, 12);
        assert!(!info.simulator);
        assert!(info.is_operational());
        assert!(BackendFilter::default().matches(&info));

        assert!(backend_info_from("ibm_brisbane", &serde_json::json!({}), &status).is_err());
    }

    #[test]
    fn test_status_documents() {
        let parse = |v: serde_json::Value| BackendStatus::from_status(&v);

        assert_eq!(parse(serde_json::json!({"state": true, "status": "active"})), BackendStatus::Online);
        assert_eq!(parse(serde_json::json!({"state": false, "status": "active"})), BackendStatus::Offline);
        assert_eq!(parse(serde_json::json!({"state": false, "status": "paused"})), BackendStatus::Paused);
        assert_eq!(parse(serde_json::json!({"status": {"name": "online"}})), BackendStatus::Online);
        assert_eq!(parse(serde_json::json!({"state": true, "status": "internal"})), BackendStatus::Offline);
        assert_eq!(parse(serde_json::json!({})), BackendStatus::Unknown);
    }

    #[test]
    fn test_target_from_configuration() {
        let config = serde_json::json!({
            "n_qubits": 4,
            "basis_gates": ["cz", "id", "rz", "sx", "x"],
            "coupling_map": [[0, 1], [1, 0], [1, 2], [2, 1]]
        });

        let target = target_from_configuration("ibm_test", &config).unwrap();
        assert_eq!(target.num_qubits, 4);
        assert!(target.supports("cz"));
        assert!(target.is_coupled(2, 1));
        assert!(!target.is_coupled(0, 3));
    }

    #[test]
    fn test_target_rejects_bad_edges() {
        let config = serde_json::json!({
            "n_qubits": 2,
            "basis_gates": ["cx"],
            "coupling_map": [[0, 5]]
        });
        assert!(target_from_configuration("ibm_test", &config).is_err());

        let config = serde_json::json!({"basis_gates": ["cx"]});
        assert!(target_from_configuration("ibm_test", &config).is_err());
    }

    #[test]
    fn test_service_trims_base_url() {
        let creds = Credentials::new("t".repeat(44));
        let service = RuntimeService::with_base_url(creds, "https://example.test/api/").unwrap();
        assert_eq!(service.base_url(), "https://example.test/api");
    }

    #[test]
    fn test_service_rejects_invalid_token() {
        assert!(RuntimeService::new(Credentials::new("short")).is_err());
    }
}
