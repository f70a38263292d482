//! SQLite-backed [`VectorStore`].
//!
//! Embeddings are stored as little-endian f32 BLOBs in the `chunks` table
//! (see [`crate::migrate`]). Similarity search loads the category-filtered
//! rows and scores them in process with cosine similarity; the category
//! predicate is part of the SQL so out-of-scope rows are never read.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{rank, Scored, SearchFilter, VectorStore};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::{Chunk, ChunkMetadata, ChunkRecord};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn delete_by_filepath(&self, filepath: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE filepath = ?")
            .bind(filepath)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_batch(&self, records: &[ChunkRecord]) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO chunks (content, filepath, filename, category, page_no,
                                    embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.content)
            .bind(&record.metadata.filepath)
            .bind(&record.metadata.filename)
            .bind(&record.metadata.category)
            .bind(record.metadata.page_no as i64)
            .bind(vec_to_blob(&record.embedding))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(records.len())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<Chunk>> {
        if filter.categories.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; filter.categories.len()].join(", ");
        let sql = format!(
            "SELECT id, content, filepath, filename, category, page_no, embedding \
             FROM chunks WHERE category IN ({})",
            placeholders
        );
        let mut q = sqlx::query(&sql);
        for category in &filter.categories {
            q = q.bind(category);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let scored = rows
            .iter()
            .filter_map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let score = cosine_similarity(query, &blob_to_vec(&blob)) as f64;
                if score < threshold {
                    return None;
                }
                let page_no: i64 = row.get("page_no");
                Some(Scored {
                    id: row.get("id"),
                    chunk: Chunk {
                        content: row.get("content"),
                        metadata: ChunkMetadata {
                            filepath: row.get("filepath"),
                            filename: row.get("filename"),
                            category: row.get("category"),
                            page_no: page_no.max(1) as u32,
                        },
                        score,
                    },
                })
            })
            .collect();

        Ok(rank(scored, limit))
    }

    async fn count_by_filepath(&self, filepath: &str) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE filepath = ?")
            .bind(filepath)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    fn record(filepath: &str, category: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            content: format!("policy text from {}", filepath),
            metadata: ChunkMetadata {
                filepath: filepath.into(),
                filename: "doc.txt".into(),
                category: category.into(),
                page_no: 2,
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_insert_search_delete() {
        let store = SqliteStore::new(memory_pool().await);
        store
            .insert_batch(&[
                record("downloads/HR/doc.txt", "HR", vec![1.0, 0.0, 0.0]),
                record("downloads/General/doc.txt", "General", vec![0.9, 0.1, 0.0]),
                record("downloads/Finance/doc.txt", "Finance", vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let filter = SearchFilter::categories(["HR", "General"]);
        let results = store
            .similarity_search(&[1.0, 0.0, 0.0], &filter, 4, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].metadata.category, "HR");
        assert_eq!(results[0].metadata.page_no, 2);
        assert!(results.iter().all(|c| c.metadata.category != "Finance"));

        assert_eq!(
            store
                .delete_by_filepath("downloads/HR/doc.txt")
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_threshold_excludes_weak_matches() {
        let store = SqliteStore::new(memory_pool().await);
        store
            .insert_batch(&[record("a.txt", "HR", vec![0.0, 1.0, 0.0])])
            .await
            .unwrap();
        let results = store
            .similarity_search(&[1.0, 0.0, 0.0], &SearchFilter::categories(["HR"]), 4, 0.5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
