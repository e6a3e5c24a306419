use crate::{
    CoordinationDomain, DerivativesDomain, EngineSnapshot, InsuranceDomain, MarketsDomain,
    SNAPSHOT_VERSION, StateError,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

/// Persistent state directory: one JSON file per domain, written
/// temp-then-rename so a crash mid-write never corrupts the last good
/// copy. Absent or unreadable files load as fresh empty stores.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
    /// When false, saves are no-ops (PERSIST_STATE=off)
    persist: bool,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, persist: bool) -> Result<Self, StateError> {
        let dir = dir.into();
        if persist {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { dir, persist })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn domain_path(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{domain}.json"))
    }

    /// Atomically persist one domain file.
    pub fn save<T: Serialize>(&self, domain: &str, value: &T) -> Result<(), StateError> {
        if !self.persist {
            return Ok(());
        }

        let bytes = serde_json::to_vec_pretty(value)?;
        let path = self.domain_path(domain);
        let tmp = self.dir.join(format!(".{domain}.json.tmp"));
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load one domain file; a missing or corrupt file yields the default.
    pub fn load<T: DeserializeOwned + Default>(&self, domain: &str) -> T {
        let path = self.domain_path(domain);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
            Err(e) => {
                tracing::warn!("failed to read {}: {e}; starting fresh", path.display());
                return T::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("corrupt state file {}: {e}; starting fresh", path.display());
                T::default()
            }
        }
    }

    /// Persist a full snapshot across the per-domain files.
    pub fn save_snapshot(&self, snapshot: &EngineSnapshot) -> Result<(), StateError> {
        self.save("markets", &snapshot.markets)?;
        self.save("derivatives", &snapshot.derivatives)?;
        self.save("insurance", &snapshot.insurance)?;
        self.save("coordination", &snapshot.coordination)?;
        Ok(())
    }

    /// Reassemble a snapshot from the per-domain files.
    pub fn load_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            markets: self.load::<MarketsDomain>("markets"),
            derivatives: self.load::<DerivativesDomain>("derivatives"),
            insurance: self.load::<InsuranceDomain>("insurance"),
            coordination: self.load::<CoordinationDomain>("coordination"),
        }
    }
}
