//! Suivi des fichiers soumis à l'ingestion
//!
//! Chaque fichier devient un job : `Pending -> Parsing -> Success | Error`.
//! Aucun état terminal n'est quitté, un job en erreur doit être resoumis.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bounds::{compute_bounds, Bounds};
use crate::parser;
use crate::stats::{compute_statistics, FileStatistics};
use crate::types::{ParsedFileResult, SourceFile};
use crate::KmlError;

/// Palette par défaut, attribuée en rotation
pub const DEFAULT_PALETTE: [&str; 8] = [
    "#3498db", "#e74c3c", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c", "#e67e22", "#34495e",
];

/// Identifiant opaque d'un job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(u64);

impl JobId {
    /// Numéro séquentiel, à partir de 1
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Parsing,
    Success,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Un fichier dans le pipeline
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub id: JobId,
    pub name: String,
    pub size_bytes: u64,
    pub status: JobStatus,
    /// Présent uniquement en `Success`
    pub result: Option<ParsedFileResult>,
    pub statistics: Option<FileStatistics>,
    /// Présent uniquement en `Error`
    pub error_message: Option<String>,
    pub visible: bool,
    pub color: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Conteneur des jobs, dans l'ordre de soumission
#[derive(Debug)]
pub struct IngestionStore {
    jobs: Vec<IngestionJob>,
    palette: Vec<String>,
    next_id: u64,
}

impl Default for IngestionStore {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect())
    }
}

impl IngestionStore {
    /// Une palette vide retombe sur la palette par défaut
    pub fn new(palette: Vec<String>) -> Self {
        let palette = if palette.is_empty() {
            DEFAULT_PALETTE.iter().map(|c| c.to_string()).collect()
        } else {
            palette
        };
        Self {
            jobs: Vec::new(),
            palette,
            next_id: 1,
        }
    }

    /// Soumet un fichier et le parse jusqu'au bout
    pub fn submit(&mut self, file: &SourceFile) -> JobId {
        let id = self.enqueue(&file.name, file.size());

        // Le job vient d'être créé : les transitions ne peuvent pas échouer
        if let Err(e) = self.start_parsing(id) {
            warn!(error = %e, "Unexpected store state");
            return id;
        }

        let outcome = parser::parse_by_extension(&file.name, &file.bytes);
        if let Err(e) = self.complete(id, outcome) {
            warn!(error = %e, "Unexpected store state");
        }
        id
    }

    /// Crée un job `Pending` avec la couleur suivante de la palette
    pub fn enqueue(&mut self, name: &str, size_bytes: u64) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;

        let color = self.palette[self.jobs.len() % self.palette.len()].clone();
        debug!(job = %id, file = name, color = %color, "Job created");

        self.jobs.push(IngestionJob {
            id,
            name: name.to_string(),
            size_bytes,
            status: JobStatus::Pending,
            result: None,
            statistics: None,
            error_message: None,
            visible: true,
            color,
        });
        id
    }

    pub fn start_parsing(&mut self, id: JobId) -> Result<(), StoreError> {
        let job = self.job_mut(id)?;
        if job.status != JobStatus::Pending {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to: JobStatus::Parsing,
            });
        }
        job.status = JobStatus::Parsing;
        Ok(())
    }

    /// Termine un job `Parsing`.
    ///
    /// Un résultat sans géométrie exploitable est traité comme une erreur.
    pub fn complete(
        &mut self,
        id: JobId,
        outcome: Result<ParsedFileResult, KmlError>,
    ) -> Result<JobStatus, StoreError> {
        let job = self.job_mut(id)?;
        if job.status != JobStatus::Parsing {
            let to = if outcome.is_ok() { JobStatus::Success } else { JobStatus::Error };
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        let outcome = outcome.and_then(|result| {
            if parser::validate(Some(&result)) {
                Ok(result)
            } else {
                Err(KmlError::EmptyOrInvalidGeometry)
            }
        });

        match outcome {
            Ok(result) => {
                let statistics = compute_statistics(&result);
                info!(
                    job = %id,
                    file = %job.name,
                    features = statistics.total_features,
                    "File parsed"
                );
                job.statistics = Some(statistics);
                job.result = Some(result);
                job.status = JobStatus::Success;
            }
            Err(e) => {
                warn!(job = %id, file = %job.name, error = %e, "File rejected");
                job.error_message = Some(e.to_string());
                job.status = JobStatus::Error;
            }
        }
        Ok(job.status)
    }

    /// Supprime un job quel que soit son statut
    pub fn remove(&mut self, id: JobId) -> Option<IngestionJob> {
        let pos = self.jobs.iter().position(|j| j.id == id)?;
        Some(self.jobs.remove(pos))
    }

    /// Inverse la visibilité, retourne le nouvel état
    pub fn toggle_visibility(&mut self, id: JobId) -> Result<bool, StoreError> {
        let job = self.job_mut(id)?;
        job.visible = !job.visible;
        Ok(job.visible)
    }

    pub fn set_color(&mut self, id: JobId, color: impl Into<String>) -> Result<(), StoreError> {
        self.job_mut(id)?.color = color.into();
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.jobs.clear();
    }

    pub fn jobs(&self) -> &[IngestionJob] {
        &self.jobs
    }

    pub fn get(&self, id: JobId) -> Option<&IngestionJob> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Résultats des jobs réussis et visibles, dans l'ordre de soumission
    pub fn visible_feature_collections(&self) -> Vec<&ParsedFileResult> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Success && j.visible)
            .filter_map(|j| j.result.as_ref())
            .collect()
    }

    /// Emprise cumulée des collections visibles
    pub fn visible_bounds(&self) -> Option<Bounds> {
        self.visible_feature_collections()
            .into_iter()
            .filter_map(compute_bounds)
            .reduce(|acc, b| acc.union(&b))
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut IngestionJob, StoreError> {
        self.jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::UnknownJob(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLYGON_AND_POINT: &str = r#"<kml><Document>
        <Placemark><name>Lot 1</name><Polygon><outerBoundaryIs><LinearRing>
            <coordinates>105.80,21.00 105.81,21.00 105.81,21.01 105.80,21.00</coordinates>
        </LinearRing></outerBoundaryIs></Polygon></Placemark>
        <Placemark><name>Gate</name><Point><coordinates>105.805,21.005</coordinates></Point></Placemark>
    </Document></kml>"#;

    fn kml(name: &str, body: &str) -> SourceFile {
        SourceFile::new(name, body.as_bytes())
    }

    #[test]
    fn test_submit_success() {
        let mut store = IngestionStore::default();
        let id = store.submit(&kml("site.kml", POLYGON_AND_POINT));

        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Success);
        assert!(job.visible);
        assert_eq!(job.color, "#3498db");
        assert_eq!(job.size_bytes, POLYGON_AND_POINT.len() as u64);
        assert_eq!(
            job.statistics,
            Some(FileStatistics {
                total_features: 2,
                points: 1,
                lines: 0,
                polygons: 1,
                multi_polygons: 0,
            })
        );
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_step_transitions() {
        let mut store = IngestionStore::default();
        let id = store.enqueue("site.kml", 10);
        assert_eq!(store.get(id).unwrap().status, JobStatus::Pending);

        store.start_parsing(id).unwrap();
        assert_eq!(store.get(id).unwrap().status, JobStatus::Parsing);

        let result = parser::parse_kml(POLYGON_AND_POINT).unwrap();
        assert_eq!(store.complete(id, Ok(result)), Ok(JobStatus::Success));

        assert_eq!(
            store.complete(id, Err(KmlError::NoKmlEntryFound)),
            Err(StoreError::InvalidTransition {
                id,
                from: JobStatus::Success,
                to: JobStatus::Error,
            })
        );
        assert!(matches!(
            store.start_parsing(id),
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_empty_result_is_error() {
        let mut store = IngestionStore::default();
        let id = store.submit(&kml("empty.kml", "<kml><Document/></kml>"));
        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error_message.as_deref(),
            Some("Invalid KML/KMZ file or no valid geometries found")
        );
        assert!(job.result.is_none());
    }

    #[test]
    fn test_unsupported_file() {
        let mut store = IngestionStore::default();
        let id = store.submit(&SourceFile::new("plan.shp", vec![0u8; 4]));
        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.as_deref().unwrap().contains("plan.shp"));
    }

    #[test]
    fn test_palette_rotation() {
        let mut store = IngestionStore::new(vec!["#111".into(), "#222".into()]);
        let a = store.enqueue("a.kml", 0);
        let b = store.enqueue("b.kml", 0);
        let c = store.enqueue("c.kml", 0);
        assert_eq!(store.get(a).unwrap().color, "#111");
        assert_eq!(store.get(b).unwrap().color, "#222");
        assert_eq!(store.get(c).unwrap().color, "#111");

        store.set_color(b, "#ff0000").unwrap();
        assert_eq!(store.get(b).unwrap().color, "#ff0000");
    }

    #[test]
    fn test_visibility_toggle_preserves_order() {
        let mut store = IngestionStore::default();
        let first = store.submit(&kml("a.kml", POLYGON_AND_POINT));
        let second = store.submit(&kml(
            "b.kml",
            "<kml><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></kml>",
        ));
        assert_eq!(store.visible_feature_collections().len(), 2);

        assert_eq!(store.toggle_visibility(first), Ok(false));
        assert_eq!(store.get(first).unwrap().status, JobStatus::Success);
        let visible = store.visible_feature_collections();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0], store.get(second).unwrap().result.as_ref().unwrap());

        assert_eq!(store.toggle_visibility(first), Ok(true));
        let visible = store.visible_feature_collections();
        assert_eq!(visible.len(), 2);
        assert_eq!(visible[0].len(), 2);
        assert_eq!(visible[1].len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = IngestionStore::default();
        let a = store.submit(&kml("a.kml", POLYGON_AND_POINT));
        let b = store.enqueue("b.kml", 0);

        assert!(store.remove(b).is_some());
        assert!(store.remove(b).is_none());
        assert_eq!(store.toggle_visibility(b), Err(StoreError::UnknownJob(b)));
        assert_eq!(store.len(), 1);

        store.clear_all();
        assert!(store.is_empty());
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_visible_bounds() {
        let mut store = IngestionStore::default();
        assert_eq!(store.visible_bounds(), None);

        store.submit(&kml("a.kml", POLYGON_AND_POINT));
        let far = store.submit(&kml(
            "b.kml",
            "<kml><Placemark><Point><coordinates>106.0,20.0</coordinates></Point></Placemark></kml>",
        ));
        let bounds = store.visible_bounds().unwrap();
        assert_eq!(bounds.corners(), [[20.0, 105.80], [21.01, 106.0]]);

        store.toggle_visibility(far).unwrap();
        let bounds = store.visible_bounds().unwrap();
        assert_eq!(bounds.corners(), [[21.00, 105.80], [21.01, 105.81]]);
    }
}
