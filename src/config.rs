use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::schema::{EntityDef, Schema};
use crate::{Error, Result};

/// Declaration of one entity type in `rowmap.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct EntityConfig {
    pub columns: Vec<String>,
    pub parents: Vec<String>,
    pub children: BTreeMap<String, String>,
    pub siblings: BTreeMap<String, String>,
    pub timestamps: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RowmapConfig {
    pub database: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, EntityConfig>,
}

impl RowmapConfig {
    /// Build the schema registry from the declared entities
    pub fn schema(&self) -> Result<Schema> {
        let mut builder = Schema::builder();
        for (name, entity) in &self.entities {
            let mut def = EntityDef::new(name.as_str())
                .columns(entity.columns.iter().cloned());
            for parent in &entity.parents {
                def = def.parent(parent.as_str());
            }
            for (relation, target) in &entity.children {
                def = def.child(relation.as_str(), target.as_str());
            }
            for (relation, target) in &entity.siblings {
                def = def.sibling(relation.as_str(), target.as_str());
            }
            if entity.timestamps {
                def = def.timestamps();
            }
            builder = builder.entity(def);
        }
        builder.build()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("rowmap.toml")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<RowmapConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RowmapConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RowmapConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Configuration(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents =
        toml::to_string_pretty(config).map_err(|e| Error::Configuration(e.to_string()))?;
    std::fs::write(path, contents)?;
    Ok(())
}
