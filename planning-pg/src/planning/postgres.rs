//! Affectations stockées dans PostgreSQL/PostGIS
//!
//! Les géométries sont envoyées en WKT (`ST_GeomFromText`, SRID 4326) et
//! relues en GeoJSON (`ST_AsGeoJSON`).

use anyhow::{Context, Result};
use deadpool_postgres::Pool;
use geozero::geojson::GeoJson;
use geozero::ToGeo;
use tracing::{debug, info, warn};

use kmlgeo::{AssignedBlock, AssignedZone};

use super::{PlanningAreaStore, SaveBlock, SaveZoneGeometry};

/// Précision de `ST_AsGeoJSON` : suffisante pour relire les coordonnées
/// exactement comme elles ont été écrites
const GEOJSON_DIGITS: i32 = 15;

pub struct PgPlanningAreaStore {
    pool: Pool,
    schema: String,
}

impl PgPlanningAreaStore {
    pub fn new(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Crée le schéma et les tables d'affectation
    pub async fn create_schema(&self, drop_existing: bool) -> Result<()> {
        let client = self.pool.get().await?;
        let schema = &self.schema;

        if drop_existing {
            client
                .execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema), &[])
                .await
                .context("Failed to drop schema")?;
        }

        client
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema), &[])
            .await
            .context("Failed to create schema")?;

        // L'extension peut exister sans que l'utilisateur puisse la (re)créer
        if let Err(e) = client
            .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
            .await
        {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow::anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
        }

        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {schema}.zone_geometries (
                project_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                ten_phan_khu TEXT,
                geom geometry(Geometry, 4326),
                updated_at TIMESTAMPTZ DEFAULT NOW(),
                PRIMARY KEY (project_id, zone_id)
            );

            CREATE TABLE IF NOT EXISTS {schema}.block_geometries (
                block_id TEXT PRIMARY KEY DEFAULT md5(random()::text || clock_timestamp()::text),
                project_id TEXT NOT NULL,
                zone_id TEXT NOT NULL,
                block_name TEXT NOT NULL,
                geom geometry(Geometry, 4326),
                created_at TIMESTAMPTZ DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS block_geometries_project_idx
                ON {schema}.block_geometries (project_id, zone_id);
            "#,
            schema = schema
        );

        client
            .batch_execute(&sql)
            .await
            .context("Failed to create planning tables")?;

        info!(schema = %schema, "Planning schema ready");
        Ok(())
    }
}

/// GeoJSON renvoyé par PostGIS vers `geo`
fn read_geometry(text: Option<String>, owner: &str) -> Option<geo::Geometry> {
    let text = text?;
    match GeoJson(&text).to_geo() {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(owner = owner, error = %e, "Ignoring unreadable geometry");
            None
        }
    }
}

impl PlanningAreaStore for PgPlanningAreaStore {
    async fn planning_area(&self, project_id: &str) -> Result<Vec<AssignedZone>> {
        let client = self.pool.get().await?;

        let zone_rows = client
            .query(
                &format!(
                    "SELECT zone_id, ten_phan_khu, ST_AsGeoJSON(geom, {digits}) \
                     FROM {schema}.zone_geometries WHERE project_id = $1 ORDER BY zone_id",
                    digits = GEOJSON_DIGITS,
                    schema = self.schema
                ),
                &[&project_id],
            )
            .await
            .context("Failed to query zone geometries")?;

        let mut zones: Vec<AssignedZone> = zone_rows
            .iter()
            .map(|row| {
                let id: String = row.get(0);
                let geometry = read_geometry(row.get(2), &id);
                AssignedZone {
                    name: row.get(1),
                    geometry,
                    id,
                    blocks: Vec::new(),
                }
            })
            .collect();

        let block_rows = client
            .query(
                &format!(
                    "SELECT block_id, zone_id, block_name, ST_AsGeoJSON(geom, {digits}) \
                     FROM {schema}.block_geometries WHERE project_id = $1 \
                     ORDER BY created_at, block_id",
                    digits = GEOJSON_DIGITS,
                    schema = self.schema
                ),
                &[&project_id],
            )
            .await
            .context("Failed to query block geometries")?;

        for row in &block_rows {
            let block_id: String = row.get(0);
            let zone_id: String = row.get(1);
            let block = AssignedBlock {
                geometry: read_geometry(row.get(3), &block_id),
                id: Some(block_id),
                name: row.get(2),
            };

            // Zone sans géométrie enregistrée : créée à la volée
            match zones.iter_mut().find(|z| z.id == zone_id) {
                Some(zone) => zone.blocks.push(block),
                None => zones.push(AssignedZone {
                    id: zone_id,
                    blocks: vec![block],
                    ..Default::default()
                }),
            }
        }

        debug!(
            project = project_id,
            zones = zones.len(),
            blocks = block_rows.len(),
            "Planning area loaded"
        );
        Ok(zones)
    }

    async fn save_block(&self, request: SaveBlock) -> Result<String> {
        let client = self.pool.get().await?;
        let wkt = request.geometry.as_str();

        let row = match &request.block_id {
            // Un block d'un autre projet n'est jamais écrasé
            Some(block_id) => client
                .query_opt(
                    &format!(
                        "INSERT INTO {}.block_geometries (block_id, project_id, zone_id, block_name, geom) \
                         VALUES ($1, $2, $3, $4, ST_GeomFromText($5, 4326)) \
                         ON CONFLICT (block_id) DO UPDATE SET \
                         zone_id = EXCLUDED.zone_id, block_name = EXCLUDED.block_name, geom = EXCLUDED.geom \
                         WHERE block_geometries.project_id = EXCLUDED.project_id \
                         RETURNING block_id",
                        self.schema
                    ),
                    &[block_id, &request.project_id, &request.zone_id, &request.block_name, &wkt],
                )
                .await
                .context("Failed to save block geometry")?
                .with_context(|| {
                    format!(
                        "Block {} belongs to another project than {}",
                        block_id, request.project_id
                    )
                })?,
            None => client
                .query_one(
                    &format!(
                        "INSERT INTO {}.block_geometries (project_id, zone_id, block_name, geom) \
                         VALUES ($1, $2, $3, ST_GeomFromText($4, 4326)) RETURNING block_id",
                        self.schema
                    ),
                    &[&request.project_id, &request.zone_id, &request.block_name, &wkt],
                )
                .await
                .context("Failed to save block geometry")?,
        };

        Ok(row.get(0))
    }

    async fn save_zone_geometry(&self, request: SaveZoneGeometry) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                &format!(
                    "INSERT INTO {}.zone_geometries (project_id, zone_id, ten_phan_khu, geom) \
                     VALUES ($1, $2, $3, ST_GeomFromText($4, 4326)) \
                     ON CONFLICT (project_id, zone_id) DO UPDATE SET \
                     ten_phan_khu = COALESCE(EXCLUDED.ten_phan_khu, zone_geometries.ten_phan_khu), \
                     geom = EXCLUDED.geom, updated_at = NOW()",
                    self.schema
                ),
                &[
                    &request.project_id,
                    &request.zone_id,
                    &request.zone_name,
                    &request.geometry.as_str(),
                ],
            )
            .await
            .context("Failed to save zone geometry")?;
        Ok(())
    }

    async fn delete_zone(&self, project_id: &str, zone_id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                &format!(
                    "DELETE FROM {}.zone_geometries WHERE project_id = $1 AND zone_id = $2",
                    self.schema
                ),
                &[&project_id, &zone_id],
            )
            .await
            .context("Failed to delete zone")?;
        Ok(deleted > 0)
    }

    async fn delete_block(&self, project_id: &str, block_id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute(
                &format!(
                    "DELETE FROM {}.block_geometries WHERE project_id = $1 AND block_id = $2",
                    self.schema
                ),
                &[&project_id, &block_id],
            )
            .await
            .context("Failed to delete block")?;
        Ok(deleted > 0)
    }
}
