//! Profile store
//!
//! Validates and persists profiles as one JSON file per profile. Built-in
//! profiles seed the directory at startup but never overwrite user edits.
//! After load, the in-memory cache is the authoritative read source.

use nettune_core::fsutil;
use nettune_core::{NettuneError, Profile, ProfileMeta, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Built-in profiles embedded in the binary, seeded into the profile
/// directory when no file of the same name exists.
const BUILTIN_PROFILES: &[(&str, &str)] = &[
    ("bbr-throughput.json", include_str!("builtin/bbr-throughput.json")),
    ("low-latency.json", include_str!("builtin/low-latency.json")),
    ("cake-bufferbloat.json", include_str!("builtin/cake-bufferbloat.json")),
    ("balanced-default.json", include_str!("builtin/balanced-default.json")),
];

const VALID_QDISC_TYPES: &[&str] = &["fq", "fq_codel", "cake", "pfifo_fast"];

fn profile_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]*[a-z0-9]$").unwrap())
}

fn sysctl_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_.]*[a-z0-9]$").unwrap())
}

/// Directory-backed profile store with an in-memory cache.
pub struct ProfileStore {
    dir: PathBuf,
    cache: RwLock<HashMap<String, Profile>>,
}

impl ProfileStore {
    /// Open (creating if needed) the profile directory, seed built-ins and
    /// load everything.
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fsutil::ensure_dir(&dir)?;

        let store = Self {
            dir,
            cache: RwLock::new(HashMap::new()),
        };
        store.seed_builtins();
        store.reload().await?;
        Ok(store)
    }

    /// Copy each embedded built-in profile into the directory unless a file
    /// of that name already exists, so user edits survive upgrades.
    fn seed_builtins(&self) {
        for &(filename, content) in BUILTIN_PROFILES {
            let target = self.dir.join(filename);
            if target.exists() {
                debug!(file = filename, "builtin profile already present, keeping user copy");
                continue;
            }
            if let Err(e) = fsutil::atomic_write(&target, content.as_bytes(), 0o644) {
                warn!(file = filename, error = %e, "failed to seed builtin profile");
            } else {
                info!(file = filename, "seeded builtin profile");
            }
        }
    }

    /// All profile metadata, sorted by id.
    pub async fn list(&self) -> Vec<ProfileMeta> {
        let cache = self.cache.read().await;
        let mut metas: Vec<ProfileMeta> = cache.values().map(Profile::to_meta).collect();
        metas.sort_by(|a, b| a.id.cmp(&b.id));
        metas
    }

    pub async fn get(&self, id: &str) -> Result<Profile> {
        let cache = self.cache.read().await;
        cache
            .get(id)
            .cloned()
            .ok_or_else(|| NettuneError::profile_not_found(id))
    }

    /// Validate then atomically persist a profile and update the cache.
    pub async fn save(&self, profile: &Profile) -> Result<()> {
        validate(profile)?;

        let data = serde_json::to_string_pretty(profile)?;
        let path = self.dir.join(format!("{}.json", profile.id));
        fsutil::atomic_write(&path, data.as_bytes(), 0o644)?;

        let mut cache = self.cache.write().await;
        cache.insert(profile.id.clone(), profile.clone());
        info!(id = %profile.id, "saved profile");
        Ok(())
    }

    /// Reload every .json file from disk, logging and skipping files that
    /// fail to parse. A broken file must not take the whole store down.
    pub async fn reload(&self) -> Result<()> {
        let files = fsutil::list_files(&self.dir, ".json")?;

        let mut fresh = HashMap::new();
        for file in files {
            let data = match std::fs::read_to_string(&file) {
                Ok(d) => d,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to read profile file");
                    continue;
                }
            };
            let profile: Profile = match serde_json::from_str(&data) {
                Ok(p) => p,
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to parse profile file");
                    continue;
                }
            };
            if profile.id.is_empty() {
                warn!(file = %file.display(), "profile missing id");
                continue;
            }
            debug!(id = %profile.id, file = %file.display(), "loaded profile");
            fresh.insert(profile.id.clone(), profile);
        }

        let count = fresh.len();
        *self.cache.write().await = fresh;
        info!(count, "loaded profiles");
        Ok(())
    }

    /// Union of sysctl keys across all loaded profiles. This is the tracked
    /// key set snapshots capture: anything a known profile could touch.
    pub async fn tracked_sysctl_keys(&self) -> Vec<String> {
        let cache = self.cache.read().await;
        let keys: BTreeSet<String> = cache
            .values()
            .flat_map(|p| p.sysctl.keys().cloned())
            .collect();
        keys.into_iter().collect()
    }
}

/// Validate a profile, collecting every problem before rejecting the profile
/// as a whole.
pub fn validate(profile: &Profile) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    if profile.id.len() < 2 || !profile_id_regex().is_match(&profile.id) {
        errors.push(
            "invalid profile id (must be lowercase alphanumeric with hyphens, length >= 2)"
                .to_string(),
        );
    }

    if profile.name.is_empty() {
        errors.push("name is required".to_string());
    }

    if !matches!(profile.risk_level.as_str(), "low" | "medium" | "high") {
        errors.push("risk_level must be 'low', 'medium', or 'high'".to_string());
    }

    for key in profile.sysctl.keys() {
        if !sysctl_key_regex().is_match(key) {
            errors.push(format!(
                "invalid sysctl key '{key}': must look like 'net.core.rmem_max'"
            ));
        }
    }

    if let Some(qdisc) = &profile.qdisc {
        if !VALID_QDISC_TYPES.contains(&qdisc.kind.as_str()) {
            errors.push(format!(
                "invalid qdisc type '{}': must be one of {VALID_QDISC_TYPES:?}",
                qdisc.kind
            ));
        }
        if qdisc.interfaces != "default-route" && qdisc.interfaces != "all" {
            errors.push("qdisc interfaces must be 'default-route' or 'all'".to_string());
        }
        if !qdisc.params.is_empty() && VALID_QDISC_TYPES.contains(&qdisc.kind.as_str()) {
            let rendered = qdisc
                .params
                .iter()
                .map(|(k, v)| (k.clone(), v.render()))
                .collect();
            match nettune_adapter::qdisc::validate_params(&qdisc.kind, &rendered) {
                Err(NettuneError::Validation { message }) => errors.push(message),
                Err(e) => errors.push(e.to_string()),
                Ok(()) => {}
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(NettuneError::validation(errors.join("; ")))
    }
}
