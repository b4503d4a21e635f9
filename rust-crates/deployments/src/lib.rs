//! Known guess-the-number contract deployments, one JSON history per network under
//! `.deployments/<network>/deployments.json`.

use anyhow::{
    Context,
    Result,
    bail,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    fs,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const HISTORY_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Paseo,
    Local,
}

impl DeploymentEnv {
    pub const ALL: [DeploymentEnv; 2] = [DeploymentEnv::Paseo, DeploymentEnv::Local];

    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Paseo => "paseo",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentEnv::Paseo => "Pop Network (Paseo)",
            DeploymentEnv::Local => "Local",
        })
    }
}

/// Where the contract was found or deployed on one endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub network_url: String,
}

impl DeploymentRecord {
    /// Endpoints compare equal regardless of a trailing slash.
    pub fn is_on_network(&self, url: &str) -> bool {
        self.network_url.trim_end_matches('/') == url.trim_end_matches('/')
    }
}

/// The file may hold a bare record from older clients.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredHistory {
    Many(Vec<DeploymentRecord>),
    One(DeploymentRecord),
}

#[derive(Debug)]
pub struct DeploymentStore {
    env: DeploymentEnv,
    file: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        Self::at(DEPLOYMENTS_ROOT, env)
    }

    pub fn at(root: impl AsRef<Path>, env: DeploymentEnv) -> Result<Self> {
        let dir = root.as_ref().join(env.dir_name());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create deployments directory {}", dir.display()))?;
        let file = dir.join(HISTORY_FILE);
        if !file.exists() {
            fs::write(&file, b"[]")
                .with_context(|| format!("Failed to create {env} deployment history"))?;
        }
        Ok(Self { env, file })
    }

    pub fn env(&self) -> DeploymentEnv {
        self.env
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    /// All records, oldest first.
    pub fn history(&self) -> Result<Vec<DeploymentRecord>> {
        let raw = fs::read_to_string(&self.file)
            .with_context(|| format!("Failed to read {} deployment history", self.env))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<StoredHistory>(&raw) {
            Ok(StoredHistory::Many(records)) => Ok(records),
            Ok(StoredHistory::One(record)) => Ok(vec![record]),
            Err(err) => bail!(
                "{} is not a deployment history: {err}",
                self.file.display()
            ),
        }
    }

    /// Most recent record for `network_url`.
    pub fn latest_for(&self, network_url: &str) -> Result<Option<DeploymentRecord>> {
        let history = self.history()?;
        Ok(history
            .into_iter()
            .rev()
            .find(|record| record.is_on_network(network_url)))
    }

    pub fn append(&self, record: DeploymentRecord) -> Result<()> {
        let mut history = self.history()?;
        history.push(record);
        let json = serde_json::to_string_pretty(&history)
            .context("Failed to serialize deployment history")?;
        fs::write(&self.file, json)
            .with_context(|| format!("Failed to write {} deployment history", self.env))
    }
}

/// Create the store for every network under the working directory.
pub fn ensure_structure() -> Result<()> {
    for env in DeploymentEnv::ALL {
        DeploymentStore::new(env)?;
    }
    Ok(())
}

pub fn record_deployment(
    store: &DeploymentStore,
    contract_address: impl AsRef<str>,
    network_url: impl AsRef<str>,
) -> Result<DeploymentRecord> {
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        contract_address: contract_address.as_ref().to_owned(),
        network_url: network_url.as_ref().to_owned(),
    };
    store.append(record.clone())?;
    Ok(record)
}
