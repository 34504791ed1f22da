//! LanceDB Vector Store - 외부 인덱스 백엔드
//!
//! 저장과 검색을 LanceDB 테이블에 위임합니다. URI는 로컬 디렉토리 또는
//! LanceDB 원격 URI(`db://...`)를 받을 수 있습니다.
//! 검색은 코사인 거리로 수행하고 `1 - distance`로 유사도로 변환합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use crate::document::{Chunk, IndexedRecord, Metadata};
use crate::error::{RagError, Result};

use super::vector::{rank_records, ScoredRecord, VectorStore};

const BACKEND_NAME: &str = "lancedb";

/// LanceDB 에러를 저장소 에러로 변환
fn store_err<E: std::fmt::Display>(action: &'static str) -> impl FnOnce(E) -> RagError {
    move |e| RagError::store(BACKEND_NAME, format!("{}: {}", action, e))
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 테이블 이름이 곧 인덱스 이름입니다. 테이블은 첫 삽입 시 벡터 차원에 맞춰 생성됩니다.
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
    max_concurrency: usize,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `uri` - .lance 디렉토리 경로 또는 원격 URI
    /// * `table_name` - 인덱스(테이블) 이름
    /// * `max_concurrency` - 동시 임베딩 배치 수
    pub async fn open(uri: &str, table_name: &str, max_concurrency: usize) -> Result<Self> {
        // 로컬 경로면 부모 디렉토리 생성
        if !uri.contains("://") {
            if let Some(parent) = Path::new(uri).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(store_err("Failed to create LanceDB directory"))?;
                }
            }
        }

        let db = lancedb::connect(uri)
            .execute()
            .await
            .map_err(store_err("Failed to connect to LanceDB"))?;

        tracing::debug!(uri, table = table_name, "opened lancedb index");

        Ok(Self {
            db,
            table_name: table_name.to_string(),
            max_concurrency: max_concurrency.max(1),
        })
    }

    /// 레코드 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("seq", DataType::Int64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[IndexedRecord]) -> Result<RecordBatch> {
        let dimension = records
            .first()
            .map(|r| r.vector.len())
            .ok_or_else(|| RagError::store(BACKEND_NAME, "Cannot create batch from empty records"))?;
        let dimension = i32::try_from(dimension).map_err(store_err("Vector dimension too large"))?;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let seqs: Vec<i64> = records.iter().map(|r| r.seq as i64).collect();
        let contents: Vec<&str> = records.iter().map(|r| r.chunk.content()).collect();
        let metadata: Vec<String> = records
            .iter()
            .map(|r| serde_json::to_string(r.chunk.metadata()))
            .collect::<std::result::Result<_, _>>()
            .map_err(store_err("Failed to serialize metadata"))?;

        let vectors_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.vector.iter().copied())
            .collect();

        let values = Float32Array::from(vectors_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(store_err("Failed to create vector array"))?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int64Array::from(seqs)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(vectors),
            ],
        )
        .map_err(store_err("Failed to create RecordBatch"))
    }

    /// RecordBatch에서 검색 결과 추출
    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<ScoredRecord>> {
        let missing = |name: &str| RagError::store(BACKEND_NAME, format!("Missing {} column", name));

        let ids = batch
            .column_by_name("id")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| missing("id"))?;
        let seqs = batch
            .column_by_name("seq")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .ok_or_else(|| missing("seq"))?;
        let contents = batch
            .column_by_name("content")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| missing("content"))?;
        let metadata = batch
            .column_by_name("metadata")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| missing("metadata"))?;
        let vectors = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| missing("vector"))?;
        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| missing("_distance"))?;

        let mut results = Vec::with_capacity(batch.num_rows());
        for i in 0..batch.num_rows() {
            let vector_values = vectors.value(i);
            let vector = vector_values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| missing("vector item"))?
                .values()
                .to_vec();
            let chunk_metadata: Metadata = serde_json::from_str(metadata.value(i))
                .map_err(store_err("Failed to parse metadata"))?;

            results.push(ScoredRecord {
                record: IndexedRecord {
                    id: ids.value(i).to_string(),
                    seq: seqs.value(i) as u64,
                    vector,
                    chunk: Chunk::new(contents.value(i), chunk_metadata),
                },
                // 코사인 거리 -> 코사인 유사도
                score: 1.0 - distances.value(i),
            });
        }

        Ok(results)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(store_err("Failed to list tables"))?;
        Ok(names.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(store_err("Failed to open table"))
    }

    /// 코사인 거리 기준 가장 가까운 `fetch`개 행 조회
    async fn nearest(
        table: &lancedb::table::Table,
        query_embedding: &[f32],
        fetch: usize,
    ) -> Result<Vec<ScoredRecord>> {
        let stream = table
            .vector_search(query_embedding.to_vec())
            .map_err(store_err("Failed to create vector search"))?
            .distance_type(DistanceType::Cosine)
            .limit(fetch)
            .execute()
            .await
            .map_err(store_err("Failed to execute vector search"))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(store_err("Failed to read search results"))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(Self::batch_to_results(batch)?);
        }
        Ok(results)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, records: Vec<IndexedRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let batch = Self::records_to_batch(&records)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await? {
            // 기존 테이블에 추가
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .map_err(store_err("Failed to add records to table"))?;
        } else {
            // 새 테이블 생성
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .map_err(store_err("Failed to create table"))?;
        }

        tracing::debug!(table = %self.table_name, inserted = records.len(), "lancedb insert");
        Ok(records.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        if limit == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        // k번째 점수와 같은 행이 잘리지 않도록, 마지막 행이 k번째보다
        // 확실히 낮아지거나 테이블이 소진될 때까지 더 가져온다
        let mut fetch = limit.saturating_add(1);
        loop {
            let mut results = Self::nearest(&table, query_embedding, fetch).await?;
            rank_records(&mut results);

            let exhausted = results.len() < fetch;
            let settled = results.len() > limit
                && results[results.len() - 1].score < results[limit - 1].score;

            if exhausted || settled {
                tracing::debug!(
                    table = %self.table_name,
                    fetched = results.len(),
                    limit,
                    "lancedb vector search"
                );
                results.truncate(limit);
                return Ok(results);
            }

            fetch = fetch.saturating_mul(2);
        }
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(store_err("Failed to count rows"))
    }

    async fn clear(&self) -> Result<()> {
        if self.table_exists().await? {
            self.db
                .drop_table(&self.table_name)
                .await
                .map_err(store_err("Failed to drop table"))?;
            tracing::debug!(table = %self.table_name, "dropped lancedb table");
        }
        Ok(())
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    fn name(&self) -> &str {
        BACKEND_NAME
    }
}

// ============================================================================
// Tests
// ============================================================================
