//! Définition et implémentation des commandes CLI
//!
//! - `inspect` : ingestion d'un lot de fichiers et rapport
//! - `to-geojson` : export GeoJSON stylé (sans DB, ou classé par projet)
//! - `match` : rapprochement avec les affectations d'un projet
//! - `assign-zone` / `assign-block` / `unassign` : édition des affectations
//! - `init-schema` : création des tables PostGIS

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use rayon::prelude::*;
use tracing::{info, warn};

use kmlgeo::{AssignmentIndex, IngestionJob, JobStatus, LayerKind, MatchResult, ParsedFeature};

use planning_pg::config::{Config, LayerStyle};
use planning_pg::export::geojson::{export_to_geojson, StyledFeature};
use planning_pg::export::pool::{create_pool, test_connection, DatabaseConfig};
use planning_pg::ingest::{collect_files, ingest_files, IngestOutcome};
use planning_pg::planning::{self, Backend, PgPlanningAreaStore, PlanningAreaStore, SnapshotStore};

#[derive(Subcommand)]
pub enum Commands {
    /// Parse KML/KMZ files and print an ingestion report
    Inspect {
        #[command(flatten)]
        input: InputArgs,

        /// Save the report as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Export parsed features to styled GeoJSON (one file per input)
    ToGeojson {
        #[command(flatten)]
        input: InputArgs,

        /// Output directory for GeoJSON files
        #[arg(short, long)]
        output: PathBuf,

        /// Style features by their assignment in this project
        #[arg(long)]
        project: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Match features against the zones and blocks of a project
    Match {
        #[command(flatten)]
        input: InputArgs,

        /// Project identifier
        #[arg(long)]
        project: String,

        /// Index of the selected feature
        #[arg(long)]
        selected: Option<usize>,

        /// Save the classification as JSON
        #[arg(long)]
        json: Option<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Attach the geometry of a feature to a zone
    AssignZone {
        #[command(flatten)]
        target: FeatureArgs,

        /// Zone identifier
        #[arg(long)]
        zone: String,

        /// Zone display name (existing name kept when omitted)
        #[arg(long)]
        zone_name: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Create or update a block with the geometry of a feature
    AssignBlock {
        #[command(flatten)]
        target: FeatureArgs,

        /// Zone the block belongs to
        #[arg(long)]
        zone: String,

        /// Existing block identifier (new block when omitted)
        #[arg(long)]
        block_id: Option<String>,

        /// Block name
        #[arg(long)]
        block_name: String,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete a zone or a block assignment
    Unassign {
        /// Project identifier
        #[arg(long)]
        project: String,

        /// Zone identifier
        #[arg(long, conflicts_with = "block", required_unless_present = "block")]
        zone: Option<String>,

        /// Block identifier
        #[arg(long)]
        block: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Create the planning schema and tables in PostGIS
    InitSchema {
        /// Drop the existing schema first
        #[arg(long)]
        drop: bool,

        #[command(flatten)]
        db: DbArgs,
    },
}

/// Fichiers à ingérer
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// KML/KMZ file or directory
    #[arg(short, long)]
    pub path: PathBuf,

    /// Maximum file size in bytes (défaut : config, 10 MiB)
    #[arg(long)]
    pub max_size: Option<u64>,

    /// Maximum number of files parsed concurrently
    #[arg(long, alias = "threads")]
    pub jobs: Option<usize>,
}

/// Feature ciblée par une affectation
#[derive(Args, Debug, Clone)]
pub struct FeatureArgs {
    /// KML/KMZ file
    #[arg(short, long)]
    pub path: PathBuf,

    /// Feature index in document order (`feature-N`)
    #[arg(long)]
    pub feature: usize,

    /// Project identifier
    #[arg(long)]
    pub project: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DbArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / planning)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,

    /// Target PostgreSQL schema (défaut : config)
    #[arg(long)]
    pub schema: Option<String>,
}

/// Stockage des affectations : PostGIS, ou snapshot JSON avec `--snapshot`
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Use a JSON snapshot file instead of PostGIS
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    #[command(flatten)]
    pub db: DbArgs,
}

fn apply_database_overrides(config: &mut DatabaseConfig, args: &DbArgs) {
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(database) = &args.database {
        config.dbname = database.clone();
    }
    if let Some(user) = &args.user {
        config.user = user.clone();
    }
    if let Some(password) = &args.password {
        config.password = Some(password.clone());
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(ssl) = &args.ssl {
        match ssl.parse() {
            Ok(mode) => config.ssl_mode = mode,
            Err(e) => warn!("Ignoring --ssl {}: {}", ssl, e),
        }
    }
}

async fn connect(args: &DbArgs, config: &Config) -> Result<PgPlanningAreaStore> {
    let mut db_config = DatabaseConfig::from_env();
    apply_database_overrides(&mut db_config, args);
    let schema = args.schema.clone().unwrap_or_else(|| config.schema.clone());

    info!(database = %db_config.target(), schema = %schema, "Connecting to PostgreSQL");
    let pool = create_pool(&db_config)?;
    test_connection(&pool).await?;

    Ok(PgPlanningAreaStore::new(pool, schema))
}

async fn open_backend(args: &StoreArgs, config: &Config) -> Result<Backend> {
    match &args.snapshot {
        Some(path) => {
            info!(snapshot = %path.display(), "Using snapshot store");
            Ok(Backend::Snapshot(SnapshotStore::open(path)?))
        }
        None => Ok(Backend::Postgres(connect(&args.db, config).await?)),
    }
}

async fn ingest(input: &InputArgs, config: &Config) -> Result<IngestOutcome> {
    let files = collect_files(&input.path)?;
    if files.is_empty() {
        anyhow::bail!("No KML/KMZ files found in {}", input.path.display());
    }

    let max_size = input.max_size.unwrap_or(config.max_file_size);
    let jobs = input.jobs.unwrap_or_else(rayon::current_num_threads).max(1);
    info!(files = files.len(), max_size, jobs, "Ingesting files");

    ingest_files(files, config, max_size, jobs).await
}

/// Jobs exploitables (parsés et visibles)
fn parsed_jobs(outcome: &IngestOutcome) -> impl Iterator<Item = &IngestionJob> {
    outcome
        .store
        .jobs()
        .iter()
        .filter(|job| job.status == JobStatus::Success && job.visible)
}

pub async fn cmd_inspect(input: &InputArgs, report_path: Option<&Path>, config: &Config) -> Result<()> {
    let outcome = ingest(input, config).await?;

    outcome.report.display();
    if let Some(path) = report_path {
        outcome.report.save_to_file(path)?;
        info!("Report saved to {}", path.display());
    }

    Ok(())
}

pub async fn cmd_to_geojson(
    input: &InputArgs,
    output: &Path,
    project: Option<&str>,
    store: &StoreArgs,
    config: &Config,
) -> Result<()> {
    let outcome = ingest(input, config).await?;
    std::fs::create_dir_all(output)?;

    // Le classement a besoin de l'index (mutable) : fait avant l'export parallèle
    let mut index = match project {
        Some(project) => {
            let backend = open_backend(store, config).await?;
            Some(planning::load_index(&backend, project).await?)
        }
        None => None,
    };

    let exports: Vec<(&IngestionJob, Option<Vec<LayerKind>>)> = parsed_jobs(&outcome)
        .map(|job| {
            let kinds = index
                .as_mut()
                .zip(job.result.as_ref())
                .map(|(index, result)| layer_kinds(index, &result.features));
            (job, kinds)
        })
        .collect();

    let success_count = AtomicUsize::new(0);
    let feature_count = AtomicUsize::new(0);

    exports.par_iter().for_each(|(job, kinds)| {
        match export_job(job, kinds.as_deref(), output, config) {
            Ok(count) => {
                success_count.fetch_add(1, Ordering::Relaxed);
                feature_count.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => warn!("Failed to export {}: {}", job.name, e),
        }
    });

    println!(
        "Export complete: {}/{} files, {} features to {}",
        success_count.load(Ordering::Relaxed),
        exports.len(),
        feature_count.load(Ordering::Relaxed),
        output.display()
    );
    if outcome.report.files_failed > 0 || !outcome.report.skipped.is_empty() {
        warn!("{}", outcome.report.summary());
    }

    Ok(())
}

fn layer_kinds(index: &mut AssignmentIndex, features: &[ParsedFeature]) -> Vec<LayerKind> {
    let buckets = index.categorize(features, None);
    let mut kinds = vec![LayerKind::Unassigned; features.len()];
    for kind in LayerKind::ALL {
        for classified in buckets.get(kind) {
            kinds[classified.index] = kind;
        }
    }
    kinds
}

fn export_job(
    job: &IngestionJob,
    kinds: Option<&[LayerKind]>,
    output: &Path,
    config: &Config,
) -> Result<usize> {
    let Some(result) = &job.result else {
        return Ok(0);
    };

    let file_style: LayerStyle = config.styles.file.with_color(&job.color);
    let features: Vec<StyledFeature> = result
        .features
        .iter()
        .enumerate()
        .map(|(i, feature)| {
            let layer = kinds.map(|k| k[i]);
            StyledFeature {
                id: format!("feature-{}", i),
                feature,
                style: layer.map_or(&file_style, |kind| config.styles.get(kind)),
                layer,
            }
        })
        .collect();

    let output_file = output.join(output_name(job));
    export_to_geojson(&features, &output_file)
        .with_context(|| format!("Failed to write {}", output_file.display()))?;

    info!("Exported {} features to {}", features.len(), output_file.display());
    Ok(features.len())
}

/// `{stem}-{n}.geojson` : deux fichiers de même nom ne s'écrasent pas
fn output_name(job: &IngestionJob) -> String {
    format!("{}-{}.geojson", file_stem(&job.name), job.id.get())
}

fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

pub async fn cmd_match(
    input: &InputArgs,
    project: &str,
    selected: Option<usize>,
    json: Option<&Path>,
    store: &StoreArgs,
    config: &Config,
) -> Result<()> {
    let backend = open_backend(store, config).await?;
    let mut index = planning::load_index(&backend, project).await?;
    info!(project = project, zones = index.zones().len(), "Planning area loaded");
    let outcome = ingest(input, config).await?;

    let mut classified = Vec::new();
    for job in parsed_jobs(&outcome) {
        let Some(result) = &job.result else { continue };
        let buckets = index.categorize(&result.features, selected);

        println!("\n{} ({} features)", job.name, result.len());
        for kind in LayerKind::ALL {
            for feature in buckets.get(kind) {
                println!(
                    "  {:<12} {:<14} {}",
                    feature.id,
                    kind.as_str(),
                    describe(feature.assignment.as_ref())
                );
            }
        }

        classified.push(serde_json::json!({ "file": job.name, "layers": buckets }));
    }

    info!(comparisons = index.cached_comparisons(), "Matching done");

    if let Some(path) = json {
        std::fs::write(path, serde_json::to_string_pretty(&classified)?)?;
        info!("Classification saved to {}", path.display());
    }

    Ok(())
}

fn describe(assignment: Option<&MatchResult>) -> String {
    match assignment {
        None => "-".to_string(),
        Some(MatchResult::Zone { id, name }) => format!("zone {} ({})", name, id),
        Some(MatchResult::Block { id, name, .. }) => format!("block {} ({})", name, id),
    }
}

/// Feature `index` d'un fichier, après validation
fn load_feature(path: &Path, index: usize) -> Result<ParsedFeature> {
    let result = kmlgeo::load_path(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let count = result.len();
    result
        .features
        .into_iter()
        .nth(index)
        .with_context(|| format!("Feature {} not found ({} features)", index, count))
}

pub async fn cmd_assign_zone(
    target: &FeatureArgs,
    zone: &str,
    zone_name: Option<&str>,
    store: &StoreArgs,
    config: &Config,
) -> Result<()> {
    let feature = load_feature(&target.path, target.feature)?;
    let backend = open_backend(store, config).await?;
    let mut index = planning::load_index(&backend, &target.project).await?;

    planning::assign_zone(&backend, &mut index, &target.project, zone, zone_name, &feature).await?;

    println!("Feature {} assigned to zone {}", target.feature, zone);
    Ok(())
}

pub async fn cmd_assign_block(
    target: &FeatureArgs,
    zone: &str,
    block_id: Option<&str>,
    block_name: &str,
    store: &StoreArgs,
    config: &Config,
) -> Result<()> {
    let feature = load_feature(&target.path, target.feature)?;
    let backend = open_backend(store, config).await?;
    let mut index = planning::load_index(&backend, &target.project).await?;

    let id = planning::assign_block(
        &backend,
        &mut index,
        &target.project,
        zone,
        block_id,
        block_name,
        &feature,
    )
    .await?;

    println!("Feature {} saved as block {} ({}) in zone {}", target.feature, block_name, id, zone);
    Ok(())
}

pub async fn cmd_unassign(
    project: &str,
    zone: Option<&str>,
    block: Option<&str>,
    store: &StoreArgs,
    config: &Config,
) -> Result<()> {
    let backend = open_backend(store, config).await?;

    let (kind, id, deleted) = match (zone, block) {
        (Some(zone), _) => ("zone", zone, backend.delete_zone(project, zone).await?),
        (None, Some(block)) => ("block", block, backend.delete_block(project, block).await?),
        (None, None) => anyhow::bail!("Either --zone or --block is required"),
    };

    if deleted {
        println!("Deleted {} {}", kind, id);
    } else {
        warn!(project = project, "No {} {} to delete", kind, id);
    }
    Ok(())
}

pub async fn cmd_init_schema(db: &DbArgs, drop: bool, config: &Config) -> Result<()> {
    let store = connect(db, config).await?;
    store.create_schema(drop).await?;
    println!("Schema {} ready", store.schema());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::line_string;
    use kmlgeo::{AssignedBlock, AssignedZone, IngestionStore, Properties, SourceFile};

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("site.kmz"), "site");
        assert_eq!(file_stem("plan.v2.kml"), "plan.v2");
        assert_eq!(file_stem("noextension"), "noextension");
    }

    #[test]
    fn test_same_stem_exports_to_distinct_files() {
        const ONE: &str = "<kml><Placemark><Point><coordinates>1,2</coordinates></Point></Placemark></kml>";
        const TWO: &str = "<kml><Document>\
            <Placemark><Point><coordinates>1,2</coordinates></Point></Placemark>\
            <Placemark><Point><coordinates>3,4</coordinates></Point></Placemark>\
            </Document></kml>";

        let mut store = IngestionStore::default();
        store.submit(&SourceFile::new("site.kml", ONE));
        store.submit(&SourceFile::new("site.kml", TWO));

        let output = std::env::temp_dir().join(format!("planning_pg_export_{}", std::process::id()));
        std::fs::remove_dir_all(&output).ok();
        std::fs::create_dir_all(&output).unwrap();

        let config = Config::from_preset("default").unwrap();
        let counts: Vec<usize> = store
            .jobs()
            .iter()
            .map(|job| export_job(job, None, &output, &config).unwrap())
            .collect();
        assert_eq!(counts, vec![1, 2]);

        let mut files: Vec<String> = std::fs::read_dir(&output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["site-1.geojson", "site-2.geojson"]);

        std::fs::remove_dir_all(output).ok();
    }

    #[test]
    fn test_apply_database_overrides() {
        let mut config = DatabaseConfig::default();
        let args = DbArgs {
            host: Some("db.local".into()),
            port: Some(6543),
            ssl: Some("require".into()),
            ..Default::default()
        };
        apply_database_overrides(&mut config, &args);

        assert_eq!(config.target(), "postgres@db.local:6543/planning");
        assert_eq!(config.ssl_mode, planning_pg::export::pool::SslMode::Require);
        assert!(config.password.is_none());
    }

    #[test]
    fn test_layer_kinds_in_feature_order() {
        let line = geo::Geometry::LineString(line_string![(x: 1.0, y: 2.0), (x: 3.0, y: 4.0)]);
        let other = geo::Geometry::LineString(line_string![(x: 5.0, y: 6.0), (x: 7.0, y: 8.0)]);
        let mut index = AssignmentIndex::new(vec![AssignedZone {
            id: "Z1".into(),
            name: Some("Zone 1".into()),
            geometry: None,
            blocks: vec![AssignedBlock {
                id: Some("B1".into()),
                name: Some("Block 1".into()),
                geometry: Some(line.clone()),
            }],
        }]);

        let features = vec![
            ParsedFeature::new(Some(other), Properties::new()),
            ParsedFeature::new(Some(line), Properties::new()),
        ];

        assert_eq!(
            layer_kinds(&mut index, &features),
            vec![LayerKind::Unassigned, LayerKind::BlockWithId]
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(None), "-");
        let zone = MatchResult::Zone {
            id: "Z1".into(),
            name: "Zone 1".into(),
        };
        assert_eq!(describe(Some(&zone)), "zone Zone 1 (Z1)");
    }
}
