//! Story category catalog, loaded from YAML files at init time.
//! Read-only; no mutation at runtime.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StoryCategory {
    pub name: String,
    #[serde(default)]
    pub settings: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub plot_twists: Vec<String>,
    #[serde(default)]
    pub sensory_details: SensoryDetailsConfig,
    #[serde(default)]
    pub protagonist_description_candidates: Vec<String>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SensoryDetailsConfig {
    #[serde(default)]
    pub visuals: Vec<String>,
    #[serde(default)]
    pub sounds: Vec<String>,
    #[serde(default)]
    pub smells: Vec<String>,
}

pub struct StoryCatalog {
    categories: HashMap<String, StoryCategory>,
}

impl StoryCatalog {
    /// Load every `*.yaml` file in `dir`, each decoded as UTF-8 and keyed by
    /// the category's file stem.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ContentError> {
        let mut categories = HashMap::new();
        for entry in std::fs::read_dir(dir).map_err(ContentError::Io)? {
            let entry = entry.map_err(ContentError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let raw = std::fs::read_to_string(&path).map_err(ContentError::Io)?;
            let category: StoryCategory = serde_yaml::from_str(&raw).map_err(ContentError::Yaml)?;
            let key = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(&category.name)
                .to_lowercase();
            categories.insert(key, category);
        }
        Ok(StoryCatalog { categories })
    }

    pub fn get(&self, story_category: &str) -> Option<&StoryCategory> {
        self.categories.get(&story_category.trim().to_lowercase())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("failed to read content directory: {0}")]
    Io(std::io::Error),

    #[error("failed to parse YAML story category: {0}")]
    Yaml(serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_lookup_is_case_insensitive() {
        let mut categories = HashMap::new();
        categories.insert(
            "starfall".to_string(),
            StoryCategory {
                name: "Starfall".to_string(),
                settings: vec!["a drifting sky-city".to_string()],
                themes: vec!["wonder".to_string()],
                plot_twists: vec![],
                sensory_details: SensoryDetailsConfig::default(),
                protagonist_description_candidates: vec!["a young cartographer".to_string()],
            },
        );
        let catalog = StoryCatalog { categories };
        assert!(catalog.get("STARFALL").is_some());
        assert!(catalog.get("  starfall  ").is_some());
        assert!(catalog.get("unknown").is_none());
    }
}
