//! Schema Introspection Module
//!
//! Runs the catalog queries against a live MySQL pool and hands back
//! frames and snapshots. All name resolution happens later, in the
//! normalizer.

use super::frame::MetadataFrame;
use super::normalizer::MetadataFrames;
use super::queries;
use crate::snapshot::SchemaSnapshot;
use sqlx::MySqlPool;
use tracing::{debug, warn};

pub struct MySqlIntrospector;

impl MySqlIntrospector {
    /// Run a single-parameter catalog query for one schema
    pub async fn fetch_frame(
        pool: &MySqlPool,
        sql: &str,
        schema: &str,
    ) -> Result<MetadataFrame, sqlx::Error> {
        let rows = sqlx::query(sql).bind(schema).fetch_all(pool).await?;
        Ok(MetadataFrame::from_mysql(&rows))
    }

    /// Fetch column, key, index and (optionally) row-count frames for every
    /// schema, tagging each row with its schema before concatenation
    pub async fn fetch_frames(
        pool: &MySqlPool,
        schemas: &[String],
        include_row_counts: bool,
    ) -> Result<MetadataFrames, sqlx::Error> {
        let mut frames = MetadataFrames::default();

        for schema in schemas {
            let mut columns = Self::fetch_frame(pool, queries::COLUMNS, schema).await?;
            let mut pks = Self::fetch_frame(pool, queries::PRIMARY_KEYS, schema).await?;
            let mut fks = Self::fetch_frame(pool, queries::FOREIGN_KEYS, schema).await?;
            let mut idx = Self::fetch_frame(pool, queries::INDEXES, schema).await?;
            let mut rc = if include_row_counts {
                Self::fetch_frame(pool, queries::ROW_COUNTS, schema).await?
            } else {
                MetadataFrame::default()
            };

            for frame in [&mut columns, &mut pks, &mut idx, &mut rc] {
                if !frame.is_empty() {
                    frame.set_constant("schema", schema);
                }
            }
            if !fks.is_empty() {
                fks.set_constant("child_schema", schema);
            }

            debug!(
                "Fetched metadata for {}: {} columns, {} pk rows, {} fk rows, {} indexes",
                schema,
                columns.len(),
                pks.len(),
                fks.len(),
                idx.len()
            );

            frames.columns.append(columns);
            frames.primary_keys.append(pks);
            frames.foreign_keys.append(fks);
            frames.indexes.append(idx);
            frames.row_counts.append(rc);
        }

        Ok(frames)
    }

    /// Load one schema's snapshot. Any failure degrades to an empty
    /// snapshot, so zero tables may also mean the load failed.
    pub async fn load_schema_snapshot(pool: &MySqlPool, schema: &str) -> SchemaSnapshot {
        match Self::try_load_snapshot(pool, schema).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load metadata for schema {}: {}", schema, e);
                SchemaSnapshot::empty(schema)
            }
        }
    }

    async fn try_load_snapshot(pool: &MySqlPool, schema: &str) -> Result<SchemaSnapshot, sqlx::Error> {
        let stats = Self::fetch_frame(pool, queries::TABLE_STATS, schema).await?;

        if stats.is_empty() {
            // Statistics can be hidden by privileges; fall back to bare names
            let rows = sqlx::query(&queries::show_tables(schema)).fetch_all(pool).await;
            return Ok(match rows {
                Ok(rows) => {
                    let frame = MetadataFrame::from_mysql(&rows);
                    let tables = (0..frame.len())
                        .filter_map(|r| frame.cell(r, 0).as_text())
                        .collect();
                    SchemaSnapshot::new(schema, tables, Default::default())
                }
                Err(e) => {
                    debug!("SHOW TABLES fallback failed for {}: {}", schema, e);
                    SchemaSnapshot::empty(schema)
                }
            });
        }

        let columns = Self::fetch_frame(pool, queries::TABLE_COLUMNS, schema).await?;
        Ok(SchemaSnapshot::from_frames(schema, &stats, &columns))
    }

    /// User schemas, sorted, with system schemas removed
    pub async fn list_schemas(pool: &MySqlPool) -> Result<Vec<String>, sqlx::Error> {
        let rows = sqlx::query(queries::SHOW_DATABASES).fetch_all(pool).await?;
        let frame = MetadataFrame::from_mysql(&rows);
        let mut schemas: Vec<String> = (0..frame.len())
            .filter_map(|r| frame.cell(r, 0).as_text())
            .filter(|s| !queries::is_system_schema(s))
            .collect();
        schemas.sort();
        Ok(schemas)
    }
}
