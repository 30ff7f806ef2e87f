//! Stockage des affectations dans un fichier JSON
//!
//! Le format reprend les champs de l'API de planification :
//!
//! ```json
//! {"project_id": "p1", "zones": [{"zone_id": "z1", "ten_phan_khu": "Phân khu A",
//!   "geom": {"type": "LineString", "coordinates": [[105.8, 21.0], [105.9, 21.1]]},
//!   "blocks": [{"block_id": "b1", "block_name": "Lô A", "geom": null}]}]}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use kmlgeo::{from_wkt, AssignedBlock, AssignedZone, PendingWkb};

use super::{PlanningAreaStore, SaveBlock, SaveZoneGeometry};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Snapshot {
    /// Projet décrit par le fichier (aucune vérification si absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub zones: Vec<ZoneRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ZoneRecord {
    pub zone_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ten_phan_khu: Option<String>,
    #[serde(default)]
    pub geom: Option<geojson::Geometry>,
    #[serde(default)]
    pub blocks: Vec<BlockRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BlockRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ten_block: Option<String>,
    #[serde(default)]
    pub geom: Option<geojson::Geometry>,
}

fn to_geo(geom: &Option<geojson::Geometry>, owner: &str) -> Option<geo::Geometry> {
    let geom = geom.as_ref()?;
    match geo::Geometry::<f64>::try_from(geom.clone()) {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(owner = owner, error = %e, "Ignoring unreadable geometry");
            None
        }
    }
}

fn to_geojson(wkt: &PendingWkb) -> Result<geojson::Geometry> {
    let geometry = from_wkt(wkt.as_str())?;
    Ok(geojson::Geometry::new(geojson::Value::from(&geometry)))
}

impl ZoneRecord {
    fn to_assigned(&self) -> AssignedZone {
        AssignedZone {
            id: self.zone_id.clone(),
            name: self.ten_phan_khu.clone(),
            geometry: to_geo(&self.geom, &self.zone_id),
            blocks: self.blocks.iter().map(BlockRecord::to_assigned).collect(),
        }
    }
}

impl BlockRecord {
    fn to_assigned(&self) -> AssignedBlock {
        let name = self
            .block_name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| self.ten_block.clone());
        AssignedBlock {
            id: self.block_id.clone(),
            name,
            geometry: to_geo(&self.geom, self.block_id.as_deref().unwrap_or("new")),
        }
    }
}

impl Snapshot {
    fn zone_mut(&mut self, zone_id: &str) -> &mut ZoneRecord {
        match self.zones.iter().position(|z| z.zone_id == zone_id) {
            Some(pos) => &mut self.zones[pos],
            None => {
                self.zones.push(ZoneRecord {
                    zone_id: zone_id.to_string(),
                    ..Default::default()
                });
                let last = self.zones.len() - 1;
                &mut self.zones[last]
            }
        }
    }
}

/// Snapshot JSON, réécrit après chaque modification
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    snapshot: Mutex<Snapshot>,
}

impl SnapshotStore {
    /// Ouvre un snapshot, vide si le fichier n'existe pas encore
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?
        } else {
            debug!(path = %path.display(), "Snapshot not found, starting empty");
            Snapshot::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            snapshot: Mutex::new(snapshot),
        })
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Snapshot>> {
        self.snapshot
            .lock()
            .map_err(|_| anyhow::anyhow!("Snapshot lock poisoned"))
    }

    fn check_project(snapshot: &Snapshot, project_id: &str) -> Result<()> {
        match &snapshot.project_id {
            Some(id) if id != project_id => {
                anyhow::bail!("Snapshot belongs to project {}, not {}", id, project_id)
            }
            _ => Ok(()),
        }
    }

    /// Applique une modification puis réécrit le fichier
    fn update<T>(&self, project_id: &str, f: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut snapshot = self.lock()?;
        Self::check_project(&snapshot, project_id)?;

        let mut updated = snapshot.clone();
        if updated.project_id.is_none() {
            updated.project_id = Some(project_id.to_string());
        }
        let value = f(&mut updated)?;

        let json = serde_json::to_string_pretty(&updated)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write snapshot: {}", self.path.display()))?;

        *snapshot = updated;
        Ok(value)
    }
}

/// Identifiant d'un nouveau block : empreinte du contenu
fn new_block_id(request: &SaveBlock) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(request.project_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.zone_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.block_name.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.geometry.as_str().as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("blk-{}", &hex[..12])
}

impl PlanningAreaStore for SnapshotStore {
    async fn planning_area(&self, project_id: &str) -> Result<Vec<AssignedZone>> {
        let snapshot = self.lock()?;
        Self::check_project(&snapshot, project_id)?;
        Ok(snapshot.zones.iter().map(ZoneRecord::to_assigned).collect())
    }

    async fn save_block(&self, request: SaveBlock) -> Result<String> {
        let geom = to_geojson(&request.geometry)?;
        let id = request
            .block_id
            .clone()
            .unwrap_or_else(|| new_block_id(&request));

        self.update(&request.project_id, |snapshot| {
            // Un block existant change éventuellement de zone
            for zone in snapshot.zones.iter_mut() {
                zone.blocks.retain(|b| b.block_id.as_deref() != Some(id.as_str()));
            }

            snapshot.zone_mut(&request.zone_id).blocks.push(BlockRecord {
                block_id: Some(id.clone()),
                block_name: Some(request.block_name.clone()),
                ten_block: None,
                geom: Some(geom),
            });
            Ok(id.clone())
        })
    }

    async fn save_zone_geometry(&self, request: SaveZoneGeometry) -> Result<()> {
        let geom = to_geojson(&request.geometry)?;
        self.update(&request.project_id, |snapshot| {
            let zone = snapshot.zone_mut(&request.zone_id);
            zone.geom = Some(geom);
            if request.zone_name.is_some() {
                zone.ten_phan_khu = request.zone_name.clone();
            }
            Ok(())
        })
    }

    async fn delete_zone(&self, project_id: &str, zone_id: &str) -> Result<bool> {
        self.update(project_id, |snapshot| {
            let before = snapshot.zones.len();
            snapshot.zones.retain(|z| z.zone_id != zone_id);
            Ok(snapshot.zones.len() != before)
        })
    }

    async fn delete_block(&self, project_id: &str, block_id: &str) -> Result<bool> {
        self.update(project_id, |snapshot| {
            let mut removed = false;
            for zone in snapshot.zones.iter_mut() {
                let before = zone.blocks.len();
                zone.blocks.retain(|b| b.block_id.as_deref() != Some(block_id));
                removed |= zone.blocks.len() != before;
            }
            Ok(removed)
        })
    }
}
