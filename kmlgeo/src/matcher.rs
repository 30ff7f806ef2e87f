//! Rapprochement des features parsées avec les zones / blocks déjà affectés
//!
//! La comparaison par défaut n'est pas spatiale : les deux géométries sont
//! converties en `LINESTRING(...)` puis les listes de coordonnées sont
//! comparées caractère par caractère. Une précision, un ordre ou un
//! espacement différents donnent donc « pas de correspondance ».

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::convert::to_line_string_wkt;
use crate::types::{AssignedZone, ParsedFeature};

/// Stratégie de comparaison entre deux WKT `LINESTRING`
pub trait GeometryMatcher {
    fn overlaps(&self, candidate: &str, assigned: &str) -> bool;
}

/// Égalité exacte des coordonnées, sans tolérance
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactWktMatcher;

impl ExactWktMatcher {
    fn coordinates(wkt: &str) -> &str {
        let body = wkt.strip_prefix("LINESTRING(").unwrap_or(wkt);
        body.strip_suffix(')').unwrap_or(body)
    }
}

impl GeometryMatcher for ExactWktMatcher {
    fn overlaps(&self, candidate: &str, assigned: &str) -> bool {
        Self::coordinates(candidate) == Self::coordinates(assigned)
    }
}

/// Entité correspondant à une feature
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchResult {
    Zone {
        id: String,
        name: String,
    },
    Block {
        /// `"new"` tant que le block n'a pas d'identifiant
        id: String,
        name: String,
        has_confirmed_id: bool,
    },
}

/// Catégorie d'affichage d'une feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Selected,
    BlockWithId,
    BlockNew,
    Zone,
    Unassigned,
}

impl LayerKind {
    pub const ALL: [LayerKind; 5] = [
        LayerKind::Selected,
        LayerKind::BlockWithId,
        LayerKind::BlockNew,
        LayerKind::Zone,
        LayerKind::Unassigned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selected => "selected",
            Self::BlockWithId => "block_with_id",
            Self::BlockNew => "block_new",
            Self::Zone => "zone",
            Self::Unassigned => "unassigned",
        }
    }
}

/// Feature classée
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedFeature {
    /// `feature-{index}`
    pub id: String,
    pub index: usize,
    pub kind: LayerKind,
    pub assignment: Option<MatchResult>,
}

/// Features regroupées par catégorie, dans l'ordre des features
#[derive(Debug, Clone, Default, Serialize)]
pub struct LayerBuckets {
    pub selected: Vec<ClassifiedFeature>,
    pub block_with_id: Vec<ClassifiedFeature>,
    pub block_new: Vec<ClassifiedFeature>,
    pub zone: Vec<ClassifiedFeature>,
    pub unassigned: Vec<ClassifiedFeature>,
}

impl LayerBuckets {
    pub fn get(&self, kind: LayerKind) -> &[ClassifiedFeature] {
        match kind {
            LayerKind::Selected => &self.selected,
            LayerKind::BlockWithId => &self.block_with_id,
            LayerKind::BlockNew => &self.block_new,
            LayerKind::Zone => &self.zone,
            LayerKind::Unassigned => &self.unassigned,
        }
    }

    fn push(&mut self, feature: ClassifiedFeature) {
        let bucket = match feature.kind {
            LayerKind::Selected => &mut self.selected,
            LayerKind::BlockWithId => &mut self.block_with_id,
            LayerKind::BlockNew => &mut self.block_new,
            LayerKind::Zone => &mut self.zone,
            LayerKind::Unassigned => &mut self.unassigned,
        };
        bucket.push(feature);
    }

    pub fn len(&self) -> usize {
        LayerKind::ALL.iter().map(|k| self.get(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type CacheKey = [u8; 32];

/// Index des affectations d'un projet, avec cache de comparaisons
pub struct AssignmentIndex<M = ExactWktMatcher> {
    zones: Vec<AssignedZone>,
    matcher: M,
    cache: HashMap<CacheKey, bool>,
}

impl AssignmentIndex<ExactWktMatcher> {
    pub fn new(zones: Vec<AssignedZone>) -> Self {
        Self::with_matcher(zones, ExactWktMatcher)
    }
}

impl<M: GeometryMatcher> AssignmentIndex<M> {
    pub fn with_matcher(zones: Vec<AssignedZone>, matcher: M) -> Self {
        Self {
            zones,
            matcher,
            cache: HashMap::new(),
        }
    }

    pub fn zones(&self) -> &[AssignedZone] {
        &self.zones
    }

    /// Remplace la liste des affectations (invalide le cache)
    pub fn replace_zones(&mut self, zones: Vec<AssignedZone>) {
        self.zones = zones;
        self.clear_cache();
    }

    /// Modifie la liste des affectations en place (invalide le cache)
    pub fn update_zones(&mut self, f: impl FnOnce(&mut Vec<AssignedZone>)) {
        f(&mut self.zones);
        self.clear_cache();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_comparisons(&self) -> usize {
        self.cache.len()
    }

    /// Cherche la zone ou le block correspondant à la feature.
    ///
    /// Zones dans l'ordre fourni, la géométrie de la zone avant celles de
    /// ses blocks. La première correspondance l'emporte.
    pub fn find_assignment(&mut self, feature: &ParsedFeature) -> Option<MatchResult> {
        let geometry = feature.geometry.as_ref()?;
        let candidate = match to_line_string_wkt(geometry) {
            Ok(wkt) => wkt,
            Err(e) => {
                debug!(error = %e, "Feature not comparable");
                return None;
            }
        };

        for zone in &self.zones {
            if let Some(zone_geometry) = zone.geometry.as_ref().filter(|_| !zone.id.is_empty()) {
                match to_line_string_wkt(zone_geometry) {
                    Ok(assigned) => {
                        if cached_overlaps(&self.matcher, &mut self.cache, &candidate, &assigned) {
                            return Some(MatchResult::Zone {
                                id: zone.id.clone(),
                                name: zone.display_name().to_string(),
                            });
                        }
                    }
                    Err(e) => warn!(zone = %zone.id, error = %e, "Error comparing zone geometry"),
                }
            }

            for block in &zone.blocks {
                let Some(block_geometry) = block.geometry.as_ref() else {
                    continue;
                };
                match to_line_string_wkt(block_geometry) {
                    Ok(assigned) => {
                        if cached_overlaps(&self.matcher, &mut self.cache, &candidate, &assigned) {
                            return Some(MatchResult::Block {
                                id: block
                                    .id
                                    .clone()
                                    .filter(|id| !id.is_empty())
                                    .unwrap_or_else(|| "new".to_string()),
                                name: block.display_name().to_string(),
                                has_confirmed_id: block.has_confirmed_id(),
                            });
                        }
                    }
                    Err(e) => warn!(
                        zone = %zone.id,
                        block = block.id.as_deref().unwrap_or("new"),
                        error = %e,
                        "Error comparing block geometry"
                    ),
                }
            }
        }

        None
    }

    /// Classe chaque feature pour l'affichage.
    ///
    /// La feature sélectionnée est classée `Selected` quelle que soit son
    /// affectation.
    pub fn categorize(&mut self, features: &[ParsedFeature], selected: Option<usize>) -> LayerBuckets {
        let mut buckets = LayerBuckets::default();

        for (index, feature) in features.iter().enumerate() {
            let assignment = self.find_assignment(feature);
            let kind = match (&assignment, selected == Some(index)) {
                (_, true) => LayerKind::Selected,
                (Some(MatchResult::Zone { .. }), _) => LayerKind::Zone,
                (Some(MatchResult::Block { has_confirmed_id: true, .. }), _) => LayerKind::BlockWithId,
                (Some(MatchResult::Block { .. }), _) => LayerKind::BlockNew,
                (None, _) => LayerKind::Unassigned,
            };

            buckets.push(ClassifiedFeature {
                id: format!("feature-{}", index),
                index,
                kind,
                assignment,
            });
        }

        buckets
    }
}

fn cached_overlaps<M: GeometryMatcher>(
    matcher: &M,
    cache: &mut HashMap<CacheKey, bool>,
    candidate: &str,
    assigned: &str,
) -> bool {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(candidate.len() as u64).to_le_bytes());
    hasher.update(candidate.as_bytes());
    hasher.update(assigned.as_bytes());
    let key: CacheKey = *hasher.finalize().as_bytes();

    *cache
        .entry(key)
        .or_insert_with(|| matcher.overlaps(candidate, assigned))
}
