//! Ingestion concurrente d'un lot de fichiers KML/KMZ
//!
//! Les jobs sont créés dans l'ordre des chemins, puis parsés en parallèle
//! (`spawn_blocking`) ; chaque tâche ne touche que son propre job.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::stream;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kmlgeo::{IngestionStore, JobId, KmlError};

use crate::config::Config;
use crate::report::IngestReport;

/// Store rempli et rapport associé
pub struct IngestOutcome {
    pub store: IngestionStore,
    pub report: IngestReport,
}

/// Collecte récursivement les fichiers `.kml` / `.kmz` (ordre alphabétique)
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if path.is_file() {
        if is_supported(path) {
            files.push(path.to_path_buf());
        }
        return Ok(files);
    }

    let entries = std::fs::read_dir(path)
        .with_context(|| format!("Cannot read directory {}", path.display()))?;
    for entry in entries {
        let entry_path = entry?.path();

        if entry_path.is_dir() {
            files.extend(collect_files(&entry_path)?);
        } else if is_supported(&entry_path) {
            files.push(entry_path);
        }
    }

    files.sort();
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map_or(false, kmlgeo::is_supported_file)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Ingère les fichiers avec au plus `jobs` parsings simultanés.
///
/// Les fichiers dépassant `max_size` sont écartés avant la création du job.
pub async fn ingest_files(
    paths: Vec<PathBuf>,
    config: &Config,
    max_size: u64,
    jobs: usize,
) -> Result<IngestOutcome> {
    let started = Instant::now();
    let mut store = IngestionStore::new(config.palette.clone());
    let mut report = IngestReport::new();

    let mut queued: Vec<(JobId, PathBuf)> = Vec::with_capacity(paths.len());
    for path in paths {
        let name = file_name(&path);
        let size = match std::fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                warn!(file = %name, error = %e, "Cannot stat file");
                report.record_skipped(&name, &e.to_string());
                continue;
            }
        };

        if size > max_size {
            warn!(file = %name, size, max_size, "File too large, skipped");
            report.record_skipped(&name, &format!("File exceeds {} bytes", max_size));
            continue;
        }

        let id = store.enqueue(&name, size);
        queued.push((id, path));
    }

    info!(files = queued.len(), jobs, "Parsing files");

    let store = Arc::new(Mutex::new(store));

    stream::iter(queued)
        .for_each_concurrent(jobs.max(1), |(id, path)| {
            let store = Arc::clone(&store);

            async move {
                if let Err(e) = store.lock().await.start_parsing(id) {
                    warn!(job = %id, error = %e, "Cannot start parsing");
                    return;
                }

                let parse = tokio::task::spawn_blocking({
                    let path = path.clone();
                    move || kmlgeo::parser::parse_path(&path)
                })
                .await;

                let outcome = match parse {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(file = %path.display(), error = %e, "Parse task failed");
                        Err(KmlError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            e.to_string(),
                        )))
                    }
                };

                match store.lock().await.complete(id, outcome) {
                    Ok(status) => debug!(job = %id, status = %status, "Job finished"),
                    Err(e) => warn!(job = %id, error = %e, "Cannot complete job"),
                }
            }
        })
        .await;

    let store = Arc::try_unwrap(store)
        .map_err(|_| anyhow::anyhow!("Ingestion tasks still hold the store"))?
        .into_inner();

    for job in store.jobs() {
        report.record_job(job);
    }
    report.set_duration(started.elapsed());
    report.finalize();

    Ok(IngestOutcome { store, report })
}
