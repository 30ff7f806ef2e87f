//! Rapport d'ingestion
//!
//! Collecte les résultats par fichier (statut, statistiques, emprise) pour
//! affichage console ou sauvegarde JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use kmlgeo::{compute_bounds, Bounds, FileStatistics, IngestionJob, JobStatus};

/// Statut global de l'ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestStatus {
    /// Tous les fichiers ont été parsés
    Success,
    /// Certains fichiers en erreur ou ignorés
    PartialSuccess,
    /// Aucun fichier exploitable
    Failed,
}

/// Résultat d'un fichier
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size_bytes: u64,
    pub status: JobStatus,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<FileStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fichier écarté avant parsing
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub duration_secs: f64,
    pub status: IngestStatus,
    pub files_processed: usize,
    pub files_failed: usize,
    /// Cumul sur les fichiers réussis
    pub totals: FileStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    pub files: Vec<FileEntry>,
    pub skipped: Vec<SkippedFile>,
}

impl Default for IngestReport {
    fn default() -> Self {
        Self {
            duration_secs: 0.0,
            status: IngestStatus::Success,
            files_processed: 0,
            files_failed: 0,
            totals: FileStatistics::default(),
            bounds: None,
            files: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl IngestReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enregistre un job terminé
    pub fn record_job(&mut self, job: &IngestionJob) {
        self.files_processed += 1;

        let bounds = job.result.as_ref().and_then(compute_bounds);
        if job.status == JobStatus::Success {
            if let Some(stats) = &job.statistics {
                self.totals.merge(stats);
            }
            if let Some(b) = &bounds {
                self.bounds = Some(match &self.bounds {
                    Some(acc) => acc.union(b),
                    None => *b,
                });
            }
        } else {
            self.files_failed += 1;
        }

        self.files.push(FileEntry {
            name: job.name.clone(),
            size_bytes: job.size_bytes,
            status: job.status,
            color: job.color.clone(),
            statistics: job.statistics,
            bounds,
            error: job.error_message.clone(),
        });
    }

    /// Enregistre un fichier écarté (taille, extension)
    pub fn record_skipped(&mut self, name: &str, reason: &str) {
        self.skipped.push(SkippedFile {
            name: name.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        let succeeded = self.files_processed - self.files_failed;
        let has_problems = self.files_failed > 0 || !self.skipped.is_empty();

        self.status = if succeeded == 0 {
            IngestStatus::Failed
        } else if has_problems {
            IngestStatus::PartialSuccess
        } else {
            IngestStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("INGEST REPORT");
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Files: {} processed, {} failed, {} skipped",
            self.files_processed,
            self.files_failed,
            self.skipped.len()
        );
        println!(
            "Features: {} ({} points, {} lines, {} polygons, {} multi-polygons)",
            self.totals.total_features,
            self.totals.points,
            self.totals.lines,
            self.totals.polygons,
            self.totals.multi_polygons
        );
        if let Some(b) = &self.bounds {
            println!(
                "Bounds: [{}, {}] - [{}, {}]",
                b.min_lat, b.min_lng, b.max_lat, b.max_lng
            );
        }

        if !self.files.is_empty() {
            println!("\n--- FILES ---");
            for f in &self.files {
                match (&f.statistics, &f.error) {
                    (Some(s), _) => println!(
                        "  {} [{}] {}: {} features",
                        f.name, f.color, f.status, s.total_features
                    ),
                    (None, Some(e)) => println!("  {} [{}] {}: {}", f.name, f.color, f.status, e),
                    (None, None) => println!("  {} [{}] {}", f.name, f.color, f.status),
                }
            }
        }

        if !self.skipped.is_empty() {
            println!("\n--- SKIPPED ({}) ---", self.skipped.len());
            for s in self.skipped.iter().take(20) {
                println!("  {}: {}", s.name, s.reason);
            }
            if self.skipped.len() > 20 {
                println!("  ... and {} more", self.skipped.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{} files: {} features, {} failed, {} skipped",
            self.files_processed,
            self.totals.total_features,
            self.files_failed,
            self.skipped.len()
        )
    }
}
