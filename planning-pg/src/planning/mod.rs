//! Persistance des affectations zone / block d'un projet
//!
//! Le stockage est abstrait par [`PlanningAreaStore`] : PostGIS en
//! production, snapshot JSON pour travailler hors ligne. Les erreurs sont
//! remontées telles quelles à l'appelant, sans nouvel essai.

pub mod postgres;
pub mod snapshot;

use anyhow::{Context, Result};
use tracing::{info, warn};

use kmlgeo::{
    to_line_string_wkt, to_wkb_placeholder, AssignedBlock, AssignedZone, AssignmentIndex,
    MatchResult, ParsedFeature, PendingWkb,
};

pub use postgres::PgPlanningAreaStore;
pub use snapshot::SnapshotStore;

/// Enregistrement d'un block (nouveau si `block_id` est absent)
#[derive(Debug, Clone)]
pub struct SaveBlock {
    pub project_id: String,
    pub zone_id: String,
    pub block_id: Option<String>,
    pub block_name: String,
    pub geometry: PendingWkb,
}

/// Rattachement d'une géométrie à une zone
#[derive(Debug, Clone)]
pub struct SaveZoneGeometry {
    pub project_id: String,
    pub zone_id: String,
    /// Nom affiché ; `None` conserve le nom existant
    pub zone_name: Option<String>,
    pub geometry: PendingWkb,
}

/// Accès aux affectations d'un projet
#[allow(async_fn_in_trait)]
pub trait PlanningAreaStore {
    /// Toutes les zones du projet avec leurs blocks
    async fn planning_area(&self, project_id: &str) -> Result<Vec<AssignedZone>>;

    /// Retourne l'identifiant du block enregistré
    async fn save_block(&self, request: SaveBlock) -> Result<String>;

    async fn save_zone_geometry(&self, request: SaveZoneGeometry) -> Result<()>;

    /// Vrai si une zone a été supprimée
    async fn delete_zone(&self, project_id: &str, zone_id: &str) -> Result<bool>;

    /// Vrai si un block a été supprimé
    async fn delete_block(&self, project_id: &str, block_id: &str) -> Result<bool>;
}

/// Stockage choisi à l'exécution
pub enum Backend {
    Postgres(PgPlanningAreaStore),
    Snapshot(SnapshotStore),
}

impl PlanningAreaStore for Backend {
    async fn planning_area(&self, project_id: &str) -> Result<Vec<AssignedZone>> {
        match self {
            Self::Postgres(s) => s.planning_area(project_id).await,
            Self::Snapshot(s) => s.planning_area(project_id).await,
        }
    }

    async fn save_block(&self, request: SaveBlock) -> Result<String> {
        match self {
            Self::Postgres(s) => s.save_block(request).await,
            Self::Snapshot(s) => s.save_block(request).await,
        }
    }

    async fn save_zone_geometry(&self, request: SaveZoneGeometry) -> Result<()> {
        match self {
            Self::Postgres(s) => s.save_zone_geometry(request).await,
            Self::Snapshot(s) => s.save_zone_geometry(request).await,
        }
    }

    async fn delete_zone(&self, project_id: &str, zone_id: &str) -> Result<bool> {
        match self {
            Self::Postgres(s) => s.delete_zone(project_id, zone_id).await,
            Self::Snapshot(s) => s.delete_zone(project_id, zone_id).await,
        }
    }

    async fn delete_block(&self, project_id: &str, block_id: &str) -> Result<bool> {
        match self {
            Self::Postgres(s) => s.delete_block(project_id, block_id).await,
            Self::Snapshot(s) => s.delete_block(project_id, block_id).await,
        }
    }
}

/// Charge les affectations d'un projet dans un index de rapprochement
pub async fn load_index<S: PlanningAreaStore>(store: &S, project_id: &str) -> Result<AssignmentIndex> {
    let zones = store
        .planning_area(project_id)
        .await
        .with_context(|| format!("Failed to load planning area for project {}", project_id))?;
    Ok(AssignmentIndex::new(zones))
}

/// WKT `LINESTRING` d'une feature, prêt à être persisté
pub fn feature_geometry(feature: &ParsedFeature) -> Result<PendingWkb> {
    let geometry = feature
        .geometry
        .as_ref()
        .context("Feature has no geometry")?;
    let wkt = to_line_string_wkt(geometry)?;
    Ok(to_wkb_placeholder(wkt))
}

fn ensure_unassigned(index: &mut AssignmentIndex, feature: &ParsedFeature) -> Result<()> {
    match index.find_assignment(feature) {
        None => Ok(()),
        Some(MatchResult::Zone { id, name }) => {
            anyhow::bail!("Feature already assigned to zone {} ({})", name, id)
        }
        Some(MatchResult::Block { id, name, .. }) => {
            anyhow::bail!("Feature already assigned to block {} ({})", name, id)
        }
    }
}

/// Recharge l'index après une écriture réussie.
///
/// Si la relecture échoue, l'écriture est reportée localement dans l'index
/// pour qu'il reste cohérent avec ce qui a été enregistré.
async fn refresh_index<S: PlanningAreaStore>(
    store: &S,
    index: &mut AssignmentIndex,
    project_id: &str,
    apply_locally: impl FnOnce(&mut Vec<AssignedZone>),
) {
    match store.planning_area(project_id).await {
        Ok(zones) => index.replace_zones(zones),
        Err(e) => {
            warn!(
                project = project_id,
                error = %e,
                "Assignment saved but planning area reload failed, updating index locally"
            );
            index.update_zones(apply_locally);
        }
    }
}

fn zone_entry<'a>(zones: &'a mut Vec<AssignedZone>, zone_id: &str) -> &'a mut AssignedZone {
    match zones.iter().position(|z| z.id == zone_id) {
        Some(pos) => &mut zones[pos],
        None => {
            zones.push(AssignedZone {
                id: zone_id.to_string(),
                ..Default::default()
            });
            let last = zones.len() - 1;
            &mut zones[last]
        }
    }
}

/// Rattache la géométrie d'une feature à une zone.
///
/// La conversion est faite avant tout appel au stockage : une géométrie non
/// convertible interrompt l'opération.
pub async fn assign_zone<S: PlanningAreaStore>(
    store: &S,
    index: &mut AssignmentIndex,
    project_id: &str,
    zone_id: &str,
    zone_name: Option<&str>,
    feature: &ParsedFeature,
) -> Result<()> {
    let geometry = feature_geometry(feature)?;
    ensure_unassigned(index, feature)?;

    let zone_name = zone_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    store
        .save_zone_geometry(SaveZoneGeometry {
            project_id: project_id.to_string(),
            zone_id: zone_id.to_string(),
            zone_name: zone_name.clone(),
            geometry,
        })
        .await
        .with_context(|| format!("Failed to save geometry of zone {}", zone_id))?;

    info!(project = project_id, zone = zone_id, "Zone geometry saved");
    refresh_index(store, index, project_id, |zones| {
        let zone = zone_entry(zones, zone_id);
        zone.geometry = feature.geometry.clone();
        if zone_name.is_some() {
            zone.name = zone_name;
        }
    })
    .await;
    Ok(())
}

/// Crée ou met à jour un block avec la géométrie d'une feature
pub async fn assign_block<S: PlanningAreaStore>(
    store: &S,
    index: &mut AssignmentIndex,
    project_id: &str,
    zone_id: &str,
    block_id: Option<&str>,
    block_name: &str,
    feature: &ParsedFeature,
) -> Result<String> {
    if block_name.trim().is_empty() {
        anyhow::bail!("Block name must not be empty");
    }
    let geometry = feature_geometry(feature)?;
    ensure_unassigned(index, feature)?;

    let id = store
        .save_block(SaveBlock {
            project_id: project_id.to_string(),
            zone_id: zone_id.to_string(),
            block_id: block_id.filter(|id| !id.trim().is_empty()).map(str::to_string),
            block_name: block_name.to_string(),
            geometry,
        })
        .await
        .with_context(|| format!("Failed to save block {}", block_name))?;

    info!(project = project_id, zone = zone_id, block = %id, "Block saved");
    refresh_index(store, index, project_id, |zones| {
        for zone in zones.iter_mut() {
            zone.blocks.retain(|b| b.id.as_deref() != Some(id.as_str()));
        }
        zone_entry(zones, zone_id).blocks.push(AssignedBlock {
            id: Some(id.clone()),
            name: Some(block_name.to_string()),
            geometry: feature.geometry.clone(),
        });
    })
    .await;
    Ok(id)
}
