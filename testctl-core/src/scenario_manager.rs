//! Scenario CRUD, named collections, and template-based generation (C2).
//!
//! Scenarios are held in memory and persisted as flat JSON under a
//! directory: one file per scenario plus one `collection_{name}.json` per
//! named collection, mirroring the origin's filesystem-backed store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

use crate::contracts::{
    AiQualitySpec, ApiTestSpec, JsonSchemaSubset, QualityMetric, ScenarioCollection,
    ScenarioError, TestConfig, TestScenario, TestType, UiTestSpec, ViewportSize,
};

#[derive(Debug, Error)]
pub enum ScenarioManagerError {
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error("scenario {0} not found")]
    NotFound(Uuid),
    #[error("collection {0} not found")]
    CollectionNotFound(String),
    #[error("unknown template {0}")]
    UnknownTemplate(String),
    #[error("failed to persist {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to (de)serialize {path}: {source}")]
    Serde {
        source: serde_json::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, ScenarioManagerError>;

pub struct ScenarioManager {
    storage_dir: PathBuf,
    scenarios: Mutex<HashMap<Uuid, TestScenario>>,
    collections: Mutex<HashMap<String, ScenarioCollection>>,
}

impl ScenarioManager {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            scenarios: Mutex::new(HashMap::new()),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Loads every `*.json` scenario file and `collection_*.json` file
    /// already present under the storage directory, if any.
    pub fn load_from_disk(&self) -> Result<()> {
        if !self.storage_dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&self.storage_dir).map_err(|source| {
            ScenarioManagerError::Io {
                source,
                path: self.storage_dir.clone(),
            }
        })? {
            let entry = entry.map_err(|source| ScenarioManagerError::Io {
                source,
                path: self.storage_dir.clone(),
            })?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(name) = file_name
                .strip_prefix("collection_")
                .and_then(|rest| rest.strip_suffix(".json"))
            {
                let collection = self.read_json::<ScenarioCollection>(&path)?;
                self.collections
                    .lock()
                    .expect("collections lock poisoned")
                    .insert(name.to_string(), collection);
            } else if file_name.ends_with(".json") {
                let scenario = self.read_json::<TestScenario>(&path)?;
                self.scenarios
                    .lock()
                    .expect("scenarios lock poisoned")
                    .insert(scenario.id, scenario);
            }
        }
        Ok(())
    }

    pub fn create(&self, scenario: TestScenario) -> Result<TestScenario> {
        scenario.validate()?;
        self.persist_scenario(&scenario)?;
        self.scenarios
            .lock()
            .expect("scenarios lock poisoned")
            .insert(scenario.id, scenario.clone());
        Ok(scenario)
    }

    pub fn get(&self, id: Uuid) -> Result<TestScenario> {
        self.scenarios
            .lock()
            .expect("scenarios lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(ScenarioManagerError::NotFound(id))
    }

    pub fn list(&self) -> Vec<TestScenario> {
        self.scenarios
            .lock()
            .expect("scenarios lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn update(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut TestScenario),
    ) -> Result<TestScenario> {
        let current = self.get(id)?;
        let revised = current.revise(mutate)?;
        self.persist_scenario(&revised)?;
        self.scenarios
            .lock()
            .expect("scenarios lock poisoned")
            .insert(revised.id, revised.clone());
        Ok(revised)
    }

    pub fn delete(&self, id: Uuid) -> Result<()> {
        self.scenarios
            .lock()
            .expect("scenarios lock poisoned")
            .remove(&id)
            .ok_or(ScenarioManagerError::NotFound(id))?;
        let path = self.scenario_path(id);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|source| ScenarioManagerError::Io {
                source,
                path,
            })?;
        }
        Ok(())
    }

    pub fn create_collection(&self, name: impl Into<String>, scenario_ids: Vec<Uuid>) -> Result<ScenarioCollection> {
        let collection = ScenarioCollection {
            name: name.into(),
            scenario_ids,
            description: String::new(),
            created_at: chrono::Utc::now(),
        };
        self.persist_collection(&collection)?;
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .insert(collection.name.clone(), collection.clone());
        Ok(collection)
    }

    pub fn get_collection(&self, name: &str) -> Result<ScenarioCollection> {
        self.collections
            .lock()
            .expect("collections lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| ScenarioManagerError::CollectionNotFound(name.to_string()))
    }

    /// Resolves a collection's scenario ids to the scenarios themselves,
    /// in the collection's recorded order.
    pub fn resolve_collection(&self, name: &str) -> Result<Vec<TestScenario>> {
        let collection = self.get_collection(name)?;
        collection
            .scenario_ids
            .into_iter()
            .map(|id| self.get(id))
            .collect()
    }

    /// Deterministically builds a scenario from a named template — no
    /// model call, no randomness beyond a fresh identity.
    pub fn generate_from_template(&self, template: &str, name: impl Into<String>) -> Result<TestScenario> {
        let mut scenario = match template {
            "smoke_api" => TestScenario::new(
                name.into(),
                TestType::Api,
                TestConfig::Api(ApiTestSpec {
                    endpoint: "/health".into(),
                    method: crate::contracts::HttpMethod::Get,
                    headers: HashMap::new(),
                    query_params: HashMap::new(),
                    path_params: HashMap::new(),
                    request_body: None,
                    expected_status: 200,
                    expected_response_schema: None,
                    response_time_threshold_ms: 2000,
                }),
            )?,
            "smoke_ui" => TestScenario::new(
                name.into(),
                TestType::Ui,
                TestConfig::Ui(UiTestSpec {
                    page_url: "/".into(),
                    viewport_size: ViewportSize {
                        width: 1280,
                        height: 720,
                    },
                    device_type: None,
                    browser: crate::contracts::BrowserKind::Chromium,
                    actions: Vec::new(),
                    assertions: Vec::new(),
                    screenshot_comparison: false,
                    visual_threshold: 0.1,
                    performance_metrics: false,
                    accessibility_standards: Vec::new(),
                    responsive_suite: false,
                }),
            )?,
            "quality_baseline" => TestScenario::new(
                name.into(),
                TestType::AiQuality,
                TestConfig::AiQuality(AiQualitySpec {
                    input_prompt: "Summarize the attached document in three sentences.".into(),
                    context_data: None,
                    assessment_models: vec!["primary-judge".into()],
                    quality_metrics: vec![QualityMetric::Coherence, QualityMetric::Accuracy],
                    reference_outputs: None,
                    baseline_scores: None,
                    temperature: 0.7,
                    max_tokens: 1000,
                }),
            )?,
            other => return Err(ScenarioManagerError::UnknownTemplate(other.to_string())),
        };
        scenario.description = format!("generated from template '{template}'");
        Ok(scenario)
    }

    fn scenario_path(&self, id: Uuid) -> PathBuf {
        self.storage_dir.join(format!("{id}.json"))
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.storage_dir.join(format!("collection_{name}.json"))
    }

    fn persist_scenario(&self, scenario: &TestScenario) -> Result<()> {
        self.write_json(&self.scenario_path(scenario.id), scenario)
    }

    fn persist_collection(&self, collection: &ScenarioCollection) -> Result<()> {
        self.write_json(&self.collection_path(&collection.name), collection)
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        std::fs::create_dir_all(&self.storage_dir).map_err(|source| ScenarioManagerError::Io {
            source,
            path: self.storage_dir.clone(),
        })?;
        let body = serde_json::to_vec_pretty(value).map_err(|source| ScenarioManagerError::Serde {
            source,
            path: path.to_path_buf(),
        })?;
        std::fs::write(path, body).map_err(|source| ScenarioManagerError::Io {
            source,
            path: path.to_path_buf(),
        })
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let raw = std::fs::read_to_string(path).map_err(|source| ScenarioManagerError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        serde_json::from_str(&raw).map_err(|source| ScenarioManagerError::Serde {
            source,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_known_templates() {
        let manager = ScenarioManager::new(std::env::temp_dir().join("testctl-scenario-test"));
        let scenario = manager.generate_from_template("smoke_api", "smoke").unwrap();
        assert_eq!(scenario.test_type, TestType::Api);
    }

    #[test]
    fn unknown_template_is_rejected() {
        let manager = ScenarioManager::new(std::env::temp_dir().join("testctl-scenario-test-2"));
        assert!(manager.generate_from_template("bogus", "x").is_err());
    }

    #[test]
    fn create_get_update_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ScenarioManager::new(dir.path());
        let scenario = manager
            .generate_from_template("smoke_api", "smoke")
            .unwrap();
        let created = manager.create(scenario).unwrap();
        assert_eq!(manager.get(created.id).unwrap().id, created.id);

        let updated = manager
            .update(created.id, |s| s.priority = 9)
            .unwrap();
        assert_eq!(updated.priority, 9);
        assert!(updated.updated_at >= created.updated_at);

        manager.delete(created.id).unwrap();
        assert!(manager.get(created.id).is_err());
    }

    #[test]
    fn collection_resolves_in_recorded_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ScenarioManager::new(dir.path());
        let a = manager
            .create(manager.generate_from_template("smoke_api", "a").unwrap())
            .unwrap();
        let b = manager
            .create(manager.generate_from_template("smoke_ui", "b").unwrap())
            .unwrap();
        manager
            .create_collection("nightly", vec![b.id, a.id])
            .unwrap();
        let resolved = manager.resolve_collection("nightly").unwrap();
        assert_eq!(resolved[0].id, b.id);
        assert_eq!(resolved[1].id, a.id);
    }
}
