//! Profile-namespaced key-value persistence
//!
//! Keys follow `prompt_fold:<profile>:<field>`. Profiles are discovered by
//! scanning keys, so there is no separate registry to keep in sync.
//! Corrupt values never fail a load: each field falls back to its default.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::profile::{FoldingMode, ProfileConfig, default_dividers};
use crate::constants::storage;
use crate::error::FoldError;

/// Flat string storage, the shape of a browser's local storage
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), FoldError>;
    fn keys(&self) -> Vec<String>;
}

/// In-memory store (tests and embedding)
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), FoldError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// JSON object on disk, written through on every mutation
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FileStore {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(crate::constants::config::APP_DIR);
        path.push(crate::constants::config::FILENAME);
        path
    }

    /// Open the store at the platform config location
    pub fn open_default() -> Self {
        Self::open(Self::default_path())
    }

    /// Open (or lazily create) a store file. An unreadable or malformed file
    /// is moved aside to `<name>.bak` and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
                Ok(values) => {
                    info!(path = %path.display(), keys = values.len(), "Loaded storage file");
                    values
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Storage file is malformed, starting empty");
                    set_aside(&path);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No storage file yet, starting empty");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read storage file, starting empty");
                set_aside(&path);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    /// Where an unusable storage file is kept
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".bak");
        path.with_file_name(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), FoldError> {
        let write_err = |source| FoldError::StoreWrite {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = serde_json::to_string_pretty(&self.values).map_err(|e| write_err(e.into()))?;
        fs::write(&self.path, contents).map_err(write_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), FoldError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

fn set_aside(path: &Path) {
    let backup = FileStore::backup_path(path);
    match fs::rename(path, &backup) {
        Ok(()) => warn!(backup = %backup.display(), "Kept unusable storage file as backup"),
        Err(e) => error!(path = %path.display(), error = %e, "Failed to back up unusable storage file"),
    }
}

/// Build the persisted key for one profile field
pub fn storage_key(profile: &str, field: &str) -> String {
    format!(
        "{prefix}{sep}{profile}{sep}{field}",
        prefix = storage::PREFIX,
        sep = storage::SEPARATOR
    )
}

/// Split a persisted key into `(profile, field)`.
/// The field is taken from the right so profile ids may contain the separator.
pub fn parse_storage_key(key: &str) -> Option<(&str, &str)> {
    let rest = key
        .strip_prefix(storage::PREFIX)?
        .strip_prefix(storage::SEPARATOR)?;
    let (profile, field) = rest.rsplit_once(storage::SEPARATOR)?;
    if profile.is_empty() || !storage::FIELDS.contains(&field) {
        return None;
    }
    Some((profile, field))
}

/// Typed access to profile configuration over a [`KeyValueStore`]
#[derive(Debug)]
pub struct ProfileStore<S> {
    store: S,
}

impl<S: KeyValueStore> ProfileStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Load a profile. Missing or undecodable fields take their defaults.
    pub fn load(&self, profile: &str) -> ProfileConfig {
        let config = ProfileConfig {
            dividers: self
                .load_json(profile, storage::DIVIDERS)
                .unwrap_or_else(default_dividers),
            case_sensitive: self.load_bool(profile, storage::CASE_SENSITIVE).unwrap_or(false),
            folding_mode: self.load_mode(profile).unwrap_or_default(),
            manual_headers: self
                .load_json::<Vec<String>>(profile, storage::MANUAL_HEADERS)
                .map(|ids| ids.into_iter().collect())
                .unwrap_or_default(),
            open_states: self.load_open_states(profile),
            name_cache: self
                .load_json::<Vec<(String, String)>>(profile, storage::NAME_CACHE)
                .map(|pairs| pairs.into_iter().collect())
                .unwrap_or_default(),
            feature_enabled: self.load_bool(profile, storage::FEATURE_ENABLED).unwrap_or(true),
            debug: self.load_bool(profile, storage::DEBUG).unwrap_or(false),
        };
        info!(
            profile = %profile,
            mode = %config.folding_mode,
            dividers = config.dividers.len(),
            manual_headers = config.manual_headers.len(),
            "Loaded profile configuration"
        );
        config
    }

    /// Persist every field of a profile
    pub fn save(&mut self, profile: &str, config: &ProfileConfig) -> Result<(), FoldError> {
        self.save_settings(profile, config)?;
        self.save_manual_headers(profile, &config.manual_headers)?;
        self.save_open_states(profile, &config.open_states)?;
        self.save_name_cache(profile, &config.name_cache)?;
        self.save_feature_enabled(profile, config.feature_enabled)?;
        self.save_debug(profile, config.debug)
    }

    /// Every profile with at least one persisted field
    pub fn list_profiles(&self) -> BTreeSet<String> {
        self.store
            .keys()
            .iter()
            .filter_map(|key| parse_storage_key(key).map(|(profile, _)| profile.to_string()))
            .collect()
    }

    /// Re-read just the open map (other writers may have touched it)
    pub fn load_open_states(&self, profile: &str) -> BTreeMap<String, bool> {
        self.load_json(profile, storage::OPEN_STATES).unwrap_or_default()
    }

    /// Divider list, case sensitivity and mode
    pub fn save_settings(&mut self, profile: &str, config: &ProfileConfig) -> Result<(), FoldError> {
        self.save_json(profile, storage::DIVIDERS, &config.dividers)?;
        self.save_bool(profile, storage::CASE_SENSITIVE, config.case_sensitive)?;
        self.store.set(
            &storage_key(profile, storage::FOLDING_MODE),
            config.folding_mode.as_str().to_string(),
        )
    }

    /// Put dividers, case sensitivity and mode back to their defaults.
    /// Open states, the name cache and manual headers survive.
    pub fn reset_profile(&mut self, profile: &str) -> Result<(), FoldError> {
        let mut config = self.load(profile);
        config.reset_settings();
        info!(profile = %profile, "Resetting grouping settings to defaults");
        self.save_settings(profile, &config)
    }

    pub fn save_manual_headers(
        &mut self,
        profile: &str,
        headers: &BTreeSet<String>,
    ) -> Result<(), FoldError> {
        let ids: Vec<&String> = headers.iter().collect();
        self.save_json(profile, storage::MANUAL_HEADERS, &ids)
    }

    pub fn save_open_states(
        &mut self,
        profile: &str,
        open_states: &BTreeMap<String, bool>,
    ) -> Result<(), FoldError> {
        self.save_json(profile, storage::OPEN_STATES, open_states)
    }

    pub fn save_name_cache(
        &mut self,
        profile: &str,
        cache: &BTreeMap<String, String>,
    ) -> Result<(), FoldError> {
        let pairs: Vec<(&String, &String)> = cache.iter().collect();
        self.save_json(profile, storage::NAME_CACHE, &pairs)
    }

    pub fn save_feature_enabled(&mut self, profile: &str, enabled: bool) -> Result<(), FoldError> {
        self.save_bool(profile, storage::FEATURE_ENABLED, enabled)
    }

    pub fn save_debug(&mut self, profile: &str, debug: bool) -> Result<(), FoldError> {
        self.save_bool(profile, storage::DEBUG, debug)
    }

    fn load_json<T: DeserializeOwned>(&self, profile: &str, field: &'static str) -> Option<T> {
        let raw = self.store.get(&storage_key(profile, field))?;
        serde_json::from_str(&raw)
            .inspect_err(|e| {
                warn!(profile = %profile, field = field, error = %e, "Malformed persisted value, using default")
            })
            .ok()
    }

    fn load_bool(&self, profile: &str, field: &'static str) -> Option<bool> {
        let raw = self.store.get(&storage_key(profile, field))?;
        match raw.trim() {
            "true" => Some(true),
            "false" => Some(false),
            other => {
                warn!(profile = %profile, field = field, value = %other, "Malformed persisted flag, using default");
                None
            }
        }
    }

    fn load_mode(&self, profile: &str) -> Option<FoldingMode> {
        let raw = self.store.get(&storage_key(profile, storage::FOLDING_MODE))?;
        raw.parse()
            .inspect_err(|e| warn!(profile = %profile, error = %e, "Unknown persisted folding mode, using default"))
            .ok()
    }

    fn save_json<T: Serialize + ?Sized>(
        &mut self,
        profile: &str,
        field: &'static str,
        value: &T,
    ) -> Result<(), FoldError> {
        let json = serde_json::to_string(value).map_err(|source| FoldError::Encode {
            profile: profile.to_string(),
            field,
            source,
        })?;
        self.store.set(&storage_key(profile, field), json)
    }

    fn save_bool(&mut self, profile: &str, field: &'static str, value: bool) -> Result<(), FoldError> {
        self.store.set(&storage_key(profile, field), value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ProfileStore<MemoryStore> {
        ProfileStore::new(MemoryStore::new())
    }

    #[test]
    fn test_storage_key_roundtrip() {
        let key = storage_key("alice", storage::DIVIDERS);
        assert_eq!(key, "prompt_fold:alice:dividers");
        assert_eq!(parse_storage_key(&key), Some(("alice", "dividers")));
    }

    #[test]
    fn test_parse_storage_key_profile_with_separator() {
        let key = storage_key("team:alpha", storage::NAME_CACHE);
        assert_eq!(parse_storage_key(&key), Some(("team:alpha", "name_cache")));
    }

    #[test]
    fn test_parse_storage_key_rejects_foreign_keys() {
        assert_eq!(parse_storage_key("other_ext:alice:dividers"), None);
        assert_eq!(parse_storage_key("prompt_fold:alice:unknown_field"), None);
        assert_eq!(parse_storage_key("prompt_fold::dividers"), None);
        assert_eq!(parse_storage_key("prompt_fold"), None);
    }

    #[test]
    fn test_load_missing_profile_yields_defaults() {
        let store = store();
        assert_eq!(store.load("nobody"), ProfileConfig::default());
    }

    #[test]
    fn test_save_then_load_profile() {
        let mut store = store();
        let mut config = ProfileConfig {
            dividers: vec!["##".to_string()],
            case_sensitive: true,
            folding_mode: FoldingMode::Sandwich,
            feature_enabled: false,
            debug: true,
            ..ProfileConfig::default()
        };
        config.manual_headers.insert("p-1".to_string());
        config.open_states.insert("g-1".to_string(), false);
        config.name_cache.insert("p-1".to_string(), "=Intro".to_string());

        store.save("alice", &config).unwrap();

        assert_eq!(store.load("alice"), config);
    }

    #[test]
    fn test_name_cache_persists_as_pairs() {
        let mut store = store();
        let mut cache = BTreeMap::new();
        cache.insert("a".to_string(), "Alpha".to_string());
        store.save_name_cache("p", &cache).unwrap();

        let raw = store.inner().get("prompt_fold:p:name_cache").unwrap();
        assert_eq!(raw, r#"[["a","Alpha"]]"#);
    }

    #[test]
    fn test_malformed_field_falls_back_without_losing_others() {
        let mut store = store();
        store
            .inner_mut()
            .set("prompt_fold:bob:dividers", "{not json".to_string())
            .unwrap();
        store
            .inner_mut()
            .set("prompt_fold:bob:folding_mode", "sandwich".to_string())
            .unwrap();
        store
            .inner_mut()
            .set("prompt_fold:bob:feature_enabled", "maybe".to_string())
            .unwrap();

        let config = store.load("bob");
        assert_eq!(config.dividers, default_dividers());
        assert_eq!(config.folding_mode, FoldingMode::Sandwich);
        assert!(config.feature_enabled);
    }

    #[test]
    fn test_list_profiles_scans_keys() {
        let mut store = store();
        store.save_debug("alice", true).unwrap();
        store.save("team:beta", &ProfileConfig::default()).unwrap();
        store
            .inner_mut()
            .set("unrelated_key", "1".to_string())
            .unwrap();

        let profiles = store.list_profiles();
        assert_eq!(
            profiles.into_iter().collect::<Vec<_>>(),
            vec!["alice".to_string(), "team:beta".to_string()]
        );
    }

    #[test]
    fn test_profiles_do_not_share_manual_headers() {
        let mut store = store();
        let mut alice = ProfileConfig::default();
        alice.manual_headers.insert("alice-only".to_string());
        store.save("alice", &alice).unwrap();
        store.save("bob", &ProfileConfig::default()).unwrap();

        assert!(store.load("bob").manual_headers.is_empty());
        assert!(store.load("alice").manual_headers.contains("alice-only"));
    }

    #[test]
    fn test_reset_profile_keeps_open_states_and_names() {
        let mut store = store();
        let mut config = ProfileConfig {
            dividers: vec!["##".to_string()],
            case_sensitive: true,
            folding_mode: FoldingMode::Manual,
            ..ProfileConfig::default()
        };
        config.open_states.insert("g".to_string(), false);
        config.name_cache.insert("g".to_string(), "## G".to_string());
        store.save("alice", &config).unwrap();

        store.reset_profile("alice").unwrap();

        let reset = store.load("alice");
        assert_eq!(reset.dividers, default_dividers());
        assert!(!reset.case_sensitive);
        assert_eq!(reset.folding_mode, FoldingMode::Standard);
        assert_eq!(reset.open_states, config.open_states);
        assert_eq!(reset.name_cache, config.name_cache);
    }

    #[test]
    fn test_file_store_writes_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let mut file_store = FileStore::open(&path);
        file_store
            .set("prompt_fold:alice:debug", "true".to_string())
            .unwrap();

        let reopened = FileStore::open(&path);
        assert_eq!(reopened.get("prompt_fold:alice:debug"), Some("true".to_string()));
    }

    #[test]
    fn test_file_store_malformed_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "not json at all").unwrap();

        let file_store = FileStore::open(&path);
        assert!(file_store.keys().is_empty());
    }

    #[test]
    fn test_file_store_keeps_malformed_file_as_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        fs::write(&path, "{\"prompt_fold:bob:debug\": tru").unwrap();

        let mut file_store = FileStore::open(&path);
        file_store
            .set("prompt_fold:alice:debug", "true".to_string())
            .unwrap();

        let backup = dir.path().join("storage.json.bak");
        assert_eq!(FileStore::backup_path(&path), backup);
        assert_eq!(
            fs::read_to_string(&backup).unwrap(),
            "{\"prompt_fold:bob:debug\": tru"
        );
        assert_eq!(
            FileStore::open(&path).get("prompt_fold:alice:debug"),
            Some("true".to_string())
        );
    }

    #[test]
    fn test_file_store_missing_file_leaves_no_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");

        let file_store = FileStore::open(&path);

        assert!(file_store.keys().is_empty());
        assert!(!FileStore::backup_path(&path).exists());
    }
}
