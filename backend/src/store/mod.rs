//! Document Store - Persist form schemas, output paths and saved scenes
//!
//! Everything lives as pretty-printed JSON under one root directory:
//!
//! ```text
//! .trialforge/
//! ├── forms/
//! │   ├── scene.json     { kind, entries, outputPath?, updatedAt }
//! │   ├── object.json
//! │   └── config.json
//! └── scenes.json        [ { id, savedAt, scene }, ... ]
//! ```
//!
//! A form kind without a file falls back to the built-in schema, so a fresh
//! directory works out of the box. Schemas are validated before they replace
//! the active one.
//!
//! Clones of a store share one lock, held across every read-modify-write.
//! Files are replaced by renaming a fully written temporary file, so readers
//! never see a partial document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::api::logs::{log_info, log_success};
use crate::error::{StoreError, StoreResult};
use crate::models::{FormSchema, SceneRecord};
use crate::validation::{load_schema, parse_schema};

/// Directory used when `TRIALFORGE_HOME` is not set (relative to current dir)
pub const DEFAULT_STORE_DIR: &str = ".trialforge";

/// Environment variable overriding the store directory
pub const HOME_ENV: &str = "TRIALFORGE_HOME";

const DEFAULT_SCENE_SCHEMA: &str = include_str!("../../schemas/scene.json");
const DEFAULT_OBJECT_SCHEMA: &str = include_str!("../../schemas/object.json");
const DEFAULT_CONFIG_SCHEMA: &str = include_str!("../../schemas/config.json");

// =============================================================================
// Form Kinds
// =============================================================================

/// The three schema-driven forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Scene,
    Object,
    Config,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [FormKind::Scene, FormKind::Object, FormKind::Config];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormKind::Scene => "scene",
            FormKind::Object => "object",
            FormKind::Config => "config",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            FormKind::Scene => DEFAULT_SCENE_SCHEMA,
            FormKind::Object => DEFAULT_OBJECT_SCHEMA,
            FormKind::Config => DEFAULT_CONFIG_SCHEMA,
        }
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FormKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StoreError::UnknownKind(s.to_string()))
    }
}

/// Built-in schema for a form kind.
pub fn default_schema(kind: FormKind) -> StoreResult<FormSchema> {
    Ok(load_schema(kind.builtin())?)
}

// =============================================================================
// Stored Documents
// =============================================================================

/// A form schema with its remembered output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredForm {
    pub kind: FormKind,
    pub entries: FormSchema,
    /// Last directory generated files were written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// RFC 3339; absent for the built-in schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A scene kept for later trial assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedScene {
    /// Unique identifier (uuid v4)
    pub id: String,
    /// RFC 3339 timestamp
    pub saved_at: String,
    pub scene: SceneRecord,
}

impl SavedScene {
    fn new(scene: SceneRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            saved_at: chrono::Utc::now().to_rfc3339(),
            scene,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// File-backed store for schemas, output paths and scenes
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DocumentStore {
    /// Open the store at `$TRIALFORGE_HOME`, or `.trialforge` when unset
    pub fn new() -> Self {
        let dir = std::env::var(HOME_ENV).unwrap_or_else(|_| DEFAULT_STORE_DIR.to_string());
        Self::with_dir(dir)
    }

    /// Open a store with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            root: PathBuf::from(dir.as_ref()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn form_path(&self, kind: FormKind) -> PathBuf {
        self.root.join("forms").join(format!("{}.json", kind))
    }

    fn scenes_path(&self) -> PathBuf {
        self.root.join("scenes.json")
    }

    fn locked(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Forms
    // -------------------------------------------------------------------------

    /// Load a form document, falling back to the built-in schema
    pub fn load_form(&self, kind: FormKind) -> StoreResult<StoredForm> {
        let path = self.form_path(kind);
        if !path.exists() {
            return Ok(StoredForm {
                kind,
                entries: default_schema(kind)?,
                output_path: None,
                updated_at: None,
            });
        }

        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Active schema for a form kind
    pub fn load_schema(&self, kind: FormKind) -> StoreResult<FormSchema> {
        Ok(self.load_form(kind)?.entries)
    }

    /// Validate a schema document and make it the active one.
    ///
    /// A rejected document leaves the stored schema untouched. The output
    /// path is kept.
    pub fn store_schema(&self, kind: FormKind, doc: &Value) -> StoreResult<FormSchema> {
        let schema = parse_schema(doc)?;
        self.replace_schema(kind, schema)
    }

    /// Import a schema from a JSON file
    pub fn import_schema(&self, kind: FormKind, path: &Path) -> StoreResult<FormSchema> {
        let content = fs::read_to_string(path)?;
        let schema = load_schema(&content)?;
        log_info(format!("Importing {} schema from {}", kind, path.display()));
        self.replace_schema(kind, schema)
    }

    fn replace_schema(&self, kind: FormKind, schema: FormSchema) -> StoreResult<FormSchema> {
        let _guard = self.locked();
        let mut form = self.load_form(kind)?;
        form.entries = schema;
        self.write_form(&mut form)?;
        log_success(format!("Stored {} schema ({} entries)", kind, form.entries.len()));
        Ok(form.entries)
    }

    /// Remembered output directory for a form kind
    pub fn output_path(&self, kind: FormKind) -> StoreResult<Option<String>> {
        Ok(self.load_form(kind)?.output_path)
    }

    pub fn set_output_path(&self, kind: FormKind, path: &str) -> StoreResult<()> {
        let _guard = self.locked();
        let mut form = self.load_form(kind)?;
        form.output_path = Some(path.to_string());
        self.write_form(&mut form)
    }

    /// Drop the stored document; the built-in schema becomes active again
    pub fn reset(&self, kind: FormKind) -> StoreResult<FormSchema> {
        let _guard = self.locked();
        let path = self.form_path(kind);
        if path.exists() {
            fs::remove_file(&path)?;
            log_info(format!("Reset {} schema to default", kind));
        }
        default_schema(kind)
    }

    fn write_form(&self, form: &mut StoredForm) -> StoreResult<()> {
        let path = self.form_path(form.kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        form.updated_at = Some(chrono::Utc::now().to_rfc3339());
        write_atomic(&path, &serde_json::to_string_pretty(form)?)
    }

    // -------------------------------------------------------------------------
    // Scenes
    // -------------------------------------------------------------------------

    /// All saved scenes, oldest first
    pub fn list_scenes(&self) -> StoreResult<Vec<SavedScene>> {
        let path = self.scenes_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn add_scene(&self, scene: SceneRecord) -> StoreResult<SavedScene> {
        let saved = SavedScene::new(scene);
        let _guard = self.locked();
        let mut all = self.list_scenes()?;
        all.push(saved.clone());
        self.write_scenes(&all)?;
        Ok(saved)
    }

    /// Save several scenes in one write
    pub fn add_scenes(&self, scenes: Vec<SceneRecord>) -> StoreResult<Vec<SavedScene>> {
        let _guard = self.locked();
        let mut all = self.list_scenes()?;
        let added: Vec<SavedScene> = scenes.into_iter().map(SavedScene::new).collect();

        all.extend(added.iter().cloned());
        self.write_scenes(&all)?;
        log_success(format!("Saved {} scene(s)", added.len()));
        Ok(added)
    }

    /// Remove a saved scene, returning it
    pub fn delete_scene(&self, id: &str) -> StoreResult<SavedScene> {
        let _guard = self.locked();
        let mut all = self.list_scenes()?;
        let pos = all
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| StoreError::SceneNotFound(id.to_string()))?;
        let removed = all.remove(pos);
        self.write_scenes(&all)?;
        Ok(removed)
    }

    /// Scenes for the given ids, in the order requested
    pub fn get_scenes(&self, ids: &[String]) -> StoreResult<Vec<SceneRecord>> {
        let all = self.list_scenes()?;
        ids.iter()
            .map(|id| {
                all.iter()
                    .find(|s| &s.id == id)
                    .map(|s| s.scene.clone())
                    .ok_or_else(|| StoreError::SceneNotFound(id.clone()))
            })
            .collect()
    }

    fn write_scenes(&self, scenes: &[SavedScene]) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        write_atomic(&self.scenes_path(), &serde_json::to_string_pretty(scenes)?)
    }
}

/// Write `content` next to `path`, then rename it into place.
fn write_atomic(path: &Path, content: &str) -> StoreResult<()> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchemaError;
    use serde_json::json;
    use tempfile::tempdir;

    fn scene(name: &str) -> SceneRecord {
        serde_json::from_value(json!({ "sceneName": name, "objects": [] })).unwrap()
    }

    #[test]
    fn test_builtin_schemas_are_valid() {
        for kind in FormKind::ALL {
            let schema = default_schema(kind).unwrap();
            assert!(!schema.is_empty(), "{} schema is empty", kind);
        }
        assert!(default_schema(FormKind::Scene).unwrap().get("numObjects").is_some());
    }

    #[test]
    fn test_form_kind_parsing() {
        assert_eq!("scene".parse::<FormKind>().unwrap(), FormKind::Scene);
        assert_eq!(" Config ".parse::<FormKind>().unwrap(), FormKind::Config);
        assert!(matches!("trial".parse::<FormKind>(), Err(StoreError::UnknownKind(_))));
    }

    #[test]
    fn test_fresh_store_serves_defaults() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());

        let form = store.load_form(FormKind::Object).unwrap();
        assert_eq!(form.entries.keys()[0], "objType");
        assert!(form.updated_at.is_none());
        assert!(store.output_path(FormKind::Config).unwrap().is_none());
    }

    #[test]
    fn test_store_schema_replaces_active() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());

        store
            .store_schema(
                FormKind::Config,
                &json!([{ "key": "subjNum", "label": "Subject", "type": "number" }]),
            )
            .unwrap();

        let form = store.load_form(FormKind::Config).unwrap();
        assert_eq!(form.entries.len(), 1);
        assert!(form.updated_at.is_some());
    }

    #[test]
    fn test_rejected_schema_keeps_previous() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());
        let before = store.load_schema(FormKind::Scene).unwrap();

        let err = store
            .store_schema(FormKind::Scene, &json!([{ "key": "x", "label": "X", "type": "color" }]))
            .unwrap_err();

        assert!(matches!(err, StoreError::Schema(SchemaError::InvalidEntries(_))));
        assert_eq!(store.load_schema(FormKind::Scene).unwrap(), before);
    }

    #[test]
    fn test_output_path_survives_schema_update() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());

        store.set_output_path(FormKind::Config, "/tmp/configs").unwrap();
        store
            .store_schema(FormKind::Config, &json!([{ "key": "a", "label": "A", "type": "switch" }]))
            .unwrap();

        assert_eq!(
            store.output_path(FormKind::Config).unwrap().as_deref(),
            Some("/tmp/configs")
        );
    }

    #[test]
    fn test_import_and_reset() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path().join("store"));
        let file = dir.path().join("object.json");
        fs::write(&file, r#"[{ "key": "size", "label": "Size", "type": "number" }]"#).unwrap();

        let imported = store.import_schema(FormKind::Object, &file).unwrap();
        assert_eq!(imported.keys(), vec!["size"]);

        let reset = store.reset(FormKind::Object).unwrap();
        assert_eq!(reset, default_schema(FormKind::Object).unwrap());
        assert_eq!(store.load_schema(FormKind::Object).unwrap(), reset);
    }

    #[test]
    fn test_scene_lifecycle() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());
        assert!(store.list_scenes().unwrap().is_empty());

        let a = store.add_scene(scene("a")).unwrap();
        let saved = store.add_scenes(vec![scene("b"), scene("c")]).unwrap();
        assert_eq!(store.list_scenes().unwrap().len(), 3);
        assert_ne!(a.id, saved[0].id);

        let ids = vec![saved[1].id.clone(), a.id.clone()];
        let scenes = store.get_scenes(&ids).unwrap();
        assert_eq!(scenes[0].fields["sceneName"], "c");
        assert_eq!(scenes[1].fields["sceneName"], "a");

        store.delete_scene(&a.id).unwrap();
        assert_eq!(store.list_scenes().unwrap().len(), 2);
        assert!(matches!(store.get_scenes(&[a.id.clone()]), Err(StoreError::SceneNotFound(_))));
        assert!(matches!(store.delete_scene(&a.id), Err(StoreError::SceneNotFound(_))));
    }

    #[test]
    fn test_concurrent_adds_keep_every_scene() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());

        std::thread::scope(|s| {
            for t in 0..16 {
                let store = store.clone();
                s.spawn(move || {
                    for i in 0..10 {
                        store.add_scene(scene(&format!("t{}-{}", t, i))).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.list_scenes().unwrap().len(), 160);
    }

    #[test]
    fn test_writes_leave_no_temporary_files() {
        let dir = tempdir().unwrap();
        let store = DocumentStore::with_dir(dir.path());

        store.add_scene(scene("a")).unwrap();
        store.set_output_path(FormKind::Scene, "/tmp/trials").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .chain(fs::read_dir(dir.path().join("forms")).unwrap())
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{:?}", names);
        assert!(names.contains(&"scenes.json".to_string()));
    }
}
