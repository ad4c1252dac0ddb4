//! SQLite implementation of IBlockStore
//!
//! Blocks are immutable: `add` ignores addresses already present. Stored
//! rows are re-verified against their address on read, so a corrupted row
//! surfaces as [`CacheError::CorruptBlock`] instead of being pushed to the
//! remote. The underlying `DomainError` stays reachable through the error's
//! source chain.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use filesync_core::domain::{Block, Cid};
use filesync_core::ports::IBlockStore;

use crate::CacheError;

/// SQLite bind-variable headroom per `IN (...)` query
const LOOKUP_CHUNK: usize = 500;

/// SQLite-backed local block store
pub struct SqliteBlockStore {
    pool: SqlitePool,
}

impl SqliteBlockStore {
    /// Creates a new block store using the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Number of stored blocks
    pub async fn count(&self) -> Result<u64, CacheError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as u64)
    }
}

fn parse_cid(s: &str) -> Result<Cid, CacheError> {
    s.parse::<Cid>()
        .map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn block_from_row(row: &SqliteRow) -> Result<Block, CacheError> {
    let cid = parse_cid(&row.get::<String, _>("cid"))?;
    let links_json: String = row.get("links");
    let data: Vec<u8> = row.get("data");

    let links: Vec<String> = serde_json::from_str(&links_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to parse links of {}: {}", cid, e))
    })?;
    let links = links
        .iter()
        .map(|l| parse_cid(l))
        .collect::<Result<Vec<_>, _>>()?;

    Block::from_parts(cid, links, data).map_err(|source| CacheError::CorruptBlock {
        cid: cid.to_string(),
        source,
    })
}

#[async_trait::async_trait]
impl IBlockStore for SqliteBlockStore {
    async fn get(&self, cid: &Cid) -> anyhow::Result<Option<Block>> {
        let row = sqlx::query("SELECT cid, links, data FROM blocks WHERE cid = ?")
            .bind(cid.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(block_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn add(&self, blocks: &[Block]) -> anyhow::Result<()> {
        if blocks.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for block in blocks {
            let links: Vec<String> = block.links().iter().map(Cid::to_string).collect();
            let links_json = serde_json::to_string(&links)?;
            sqlx::query(
                "INSERT OR IGNORE INTO blocks (cid, links, data, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(block.cid().to_string())
            .bind(links_json)
            .bind(block.data())
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::trace!(count = blocks.len(), "Stored blocks");
        Ok(())
    }

    async fn delete(&self, cid: &Cid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM blocks WHERE cid = ?")
            .bind(cid.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists_cids(&self, cids: &[Cid]) -> anyhow::Result<Vec<Cid>> {
        let mut present = std::collections::HashSet::with_capacity(cids.len());

        for chunk in cids.chunks(LOOKUP_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT cid FROM blocks WHERE cid IN (");
            let mut separated = query.separated(", ");
            for cid in chunk {
                separated.push_bind(cid.to_string());
            }
            separated.push_unseparated(")");

            let found: Vec<String> = query
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await?;
            for s in found {
                present.insert(parse_cid(&s)?);
            }
        }

        Ok(cids.iter().filter(|c| present.contains(*c)).copied().collect())
    }
}
