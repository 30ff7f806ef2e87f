//! Configuration du système

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};
use kmlgeo::LayerKind;

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Couleurs attribuées en rotation aux fichiers ingérés
    pub palette: Vec<String>,

    /// Taille maximale d'un fichier soumis (octets)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Schéma PostgreSQL des affectations
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Styles d'affichage par catégorie
    pub styles: LayerStyles,
}

/// Style d'un calque (noms de propriétés Leaflet)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerStyle {
    pub color: String,
    pub weight: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    pub fill_opacity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash_array: Option<String>,
}

impl LayerStyle {
    /// Même style avec une autre couleur
    pub fn with_color(&self, color: &str) -> Self {
        Self {
            color: color.to_string(),
            ..self.clone()
        }
    }
}

/// Styles par catégorie de feature
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LayerStyles {
    /// Fichier sans rapprochement (la couleur du job remplace `color`)
    pub file: LayerStyle,
    pub selected: LayerStyle,
    pub block_with_id: LayerStyle,
    pub block_new: LayerStyle,
    pub zone: LayerStyle,
    pub unassigned: LayerStyle,
}

impl LayerStyles {
    pub fn get(&self, kind: LayerKind) -> &LayerStyle {
        match kind {
            LayerKind::Selected => &self.selected,
            LayerKind::BlockWithId => &self.block_with_id,
            LayerKind::BlockNew => &self.block_new,
            LayerKind::Zone => &self.zone,
            LayerKind::Unassigned => &self.unassigned,
        }
    }
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_schema() -> String {
    "planning".to_string()
}

fn default_opacity() -> f64 {
    1.0
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default", preset),
        }
    }

    /// Preset embarqué ou chemin vers un fichier JSON
    pub fn resolve(name: &str) -> Result<Self> {
        let path = Path::new(name);
        if name.ends_with(".json") || path.exists() {
            Self::load(path)
        } else {
            Self::from_preset(name)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse embedded config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.palette.is_empty() {
            anyhow::bail!("Config palette must contain at least one color");
        }
        if self.schema.is_empty()
            || !self
                .schema
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            anyhow::bail!("Invalid schema name: {:?}", self.schema);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset() {
        let config = Config::from_preset("default").unwrap();
        assert_eq!(config.palette.len(), 8);
        assert_eq!(config.palette[0], "#3498db");
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.schema, "planning");

        let selected = config.styles.get(LayerKind::Selected);
        assert_eq!(selected.color, "#c0392b");
        assert_eq!(selected.dash_array.as_deref(), Some("10, 5"));
        assert_eq!(config.styles.get(LayerKind::Unassigned).weight, 3.0);
    }

    #[test]
    fn test_unknown_preset() {
        assert!(Config::from_preset("full").is_err());
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let json = include_str!("presets/default.json").replace("\"planning\"", "\"bad;drop\"");
        assert!(Config::load_embedded(&json).is_err());
    }

    #[test]
    fn test_with_color() {
        let config = Config::from_preset("default").unwrap();
        let style = config.styles.file.with_color("#000000");
        assert_eq!(style.color, "#000000");
        assert_eq!(style.weight, config.styles.file.weight);
    }
}
