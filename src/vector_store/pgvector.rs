//! Postgres + pgvector backed [`VectorStore`].

use async_trait::async_trait;
use pgvector::Vector;
use tokio::sync::{Mutex, OnceCell};
use tokio_postgres::types::Json;
use tokio_postgres::{Client, NoTls, Row, Transaction};

use super::{validate_chunk, VectorStore};
use crate::embeddings::{RunbookChunk, ScoredChunk};
use crate::error::{Error, Result};

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        if schema.trim().is_empty() {
            return Err(Error::validation("schema name is required"));
        }
        if table.trim().is_empty() {
            return Err(Error::validation("table name is required"));
        }
        Ok(Self { schema, table })
    }

    /// Parses `schema.table`, or a bare table in `public`.
    pub fn parse(input: &str) -> Result<Self> {
        match input.split_once('.') {
            Some((schema, table)) => Self::new(schema, table),
            None => Self::new("public", input),
        }
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Unquoted `schema.table`, suitable for `to_regclass`.
    pub fn display(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    fn source_index_name(&self) -> String {
        quote_ident(&format!(
            "{}_{}_source_path_idx",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table)
        ))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// Store backed by a single pgvector table.
///
/// The table is created on first write, sized to the first chunk's embedding.
pub struct PgVectorStore {
    client: Mutex<Client>,
    table: TableName,
    prepared: OnceCell<usize>,
}

impl PgVectorStore {
    /// Connects and spawns the connection driver onto the current runtime.
    pub async fn connect(database_url: &str, table: TableName) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });
        Ok(Self::from_client(client, table))
    }

    /// Wraps an already connected client.
    pub fn from_client(client: Client, table: TableName) -> Self {
        Self {
            client: Mutex::new(client),
            table,
            prepared: OnceCell::new(),
        }
    }

    /// Table this store reads and writes.
    pub fn table(&self) -> &TableName {
        &self.table
    }

    async fn ensure_table(&self, dims: usize) -> Result<()> {
        let ready = self
            .prepared
            .get_or_try_init(|| async {
                let client = self.client.lock().await;
                client
                    .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
                    .await?;
                client.execute(&create_table_sql(&self.table, dims), &[]).await?;
                client.execute(&create_index_sql(&self.table), &[]).await?;
                tracing::info!(table = %self.table.display(), dims, "pgvector table ready");
                Ok::<usize, Error>(dims)
            })
            .await?;
        if *ready != dims {
            return Err(Error::Store(format!(
                "embedding has {dims} dimensions but {} expects {}",
                self.table.display(),
                ready
            )));
        }
        Ok(())
    }

    async fn upsert_all(
        &self,
        transaction: &Transaction<'_>,
        chunks: &[RunbookChunk],
    ) -> Result<()> {
        let statement = transaction.prepare(&upsert_sql(&self.table)).await?;
        for chunk in chunks {
            let tags: Vec<&String> = chunk.tags.iter().collect();
            transaction
                .execute(
                    &statement,
                    &[
                        &chunk.id,
                        &chunk.source_path,
                        &chunk.section_title,
                        &chunk.content,
                        &Json(&tags),
                        &Json(&chunk.applicable_shape_patterns),
                        &Vector::from(chunk.embedding.clone()),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn table_exists(&self, client: &Client) -> Result<bool> {
        if self.prepared.initialized() {
            return Ok(true);
        }
        let row = client
            .query_one(
                "SELECT to_regclass($1) IS NOT NULL",
                &[&self.table.display()],
            )
            .await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn store_batch(&self, chunks: Vec<RunbookChunk>) -> Result<()> {
        let Some(first) = chunks.first() else {
            return Ok(());
        };
        for chunk in &chunks {
            validate_chunk(chunk)?;
        }
        self.ensure_table(first.embedding.len()).await?;

        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        self.upsert_all(&transaction, &chunks).await?;
        transaction.commit().await?;
        tracing::debug!(count = chunks.len(), "stored chunks");
        Ok(())
    }

    async fn replace(&self, source_path: &str, chunks: Vec<RunbookChunk>) -> Result<usize> {
        for chunk in &chunks {
            validate_chunk(chunk)?;
        }
        match chunks.first() {
            Some(first) => self.ensure_table(first.embedding.len()).await?,
            None => return self.delete(source_path).await,
        }

        let mut client = self.client.lock().await;
        let transaction = client.transaction().await?;
        let removed = transaction
            .execute(&delete_sql(&self.table), &[&source_path])
            .await?;
        self.upsert_all(&transaction, &chunks).await?;
        transaction.commit().await?;
        tracing::debug!(source_path, removed, stored = chunks.len(), "replaced chunks");
        Ok(removed as usize)
    }

    async fn delete(&self, source_path: &str) -> Result<usize> {
        let client = self.client.lock().await;
        if !self.table_exists(&client).await? {
            return Ok(0);
        }
        let removed = client
            .execute(&delete_sql(&self.table), &[&source_path])
            .await?;
        Ok(removed as usize)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let client = self.client.lock().await;
        if !self.table_exists(&client).await? {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(top_k)
            .map_err(|_| Error::validation(format!("top_k {top_k} exceeds i64 range")))?;
        let vector = Vector::from(query.to_vec());
        let rows = client
            .query(&search_sql(&self.table), &[&vector, &limit])
            .await?;
        rows.iter().map(row_to_scored).collect()
    }

    async fn count(&self) -> Result<usize> {
        let client = self.client.lock().await;
        if !self.table_exists(&client).await? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", self.table.qualified());
        let row = client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as usize)
    }
}

fn row_to_scored(row: &Row) -> Result<ScoredChunk> {
    let Json(tags): Json<Vec<String>> = row.try_get("tags")?;
    let Json(shapes): Json<Vec<String>> = row.try_get("applicable_shapes")?;
    let embedding: Vector = row.try_get("embedding")?;
    let similarity: Option<f64> = row.try_get("similarity")?;
    let similarity = similarity.filter(|value| value.is_finite()).unwrap_or(0.0);
    Ok(ScoredChunk {
        chunk: RunbookChunk {
            id: row.try_get("id")?,
            source_path: row.try_get("source_path")?,
            section_title: row.try_get("section_title")?,
            content: row.try_get("content")?,
            tags: tags.into_iter().collect(),
            applicable_shape_patterns: shapes,
            embedding: embedding.to_vec(),
        },
        similarity_score: similarity as f32,
    })
}

fn create_table_sql(table: &TableName, dims: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            section_title TEXT NOT NULL,
            content TEXT NOT NULL,
            tags JSONB NOT NULL,
            applicable_shapes JSONB NOT NULL,
            embedding VECTOR({dims}) NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        table.qualified()
    )
}

fn create_index_sql(table: &TableName) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} (source_path)",
        table.source_index_name(),
        table.qualified()
    )
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (id, source_path, section_title, content, tags, applicable_shapes, embedding) \
            VALUES ($1, $2, $3, $4, $5, $6, $7) \
            ON CONFLICT (id) DO UPDATE SET \
                source_path = EXCLUDED.source_path, \
                section_title = EXCLUDED.section_title, \
                content = EXCLUDED.content, \
                tags = EXCLUDED.tags, \
                applicable_shapes = EXCLUDED.applicable_shapes, \
                embedding = EXCLUDED.embedding, \
                updated_at = now()",
        table.qualified()
    )
}

fn delete_sql(table: &TableName) -> String {
    format!("DELETE FROM {} WHERE source_path = $1", table.qualified())
}

fn search_sql(table: &TableName) -> String {
    format!(
        "SELECT id, source_path, section_title, content, tags, applicable_shapes, embedding, \
            (1 - (embedding <=> $1))::float8 AS similarity \
         FROM {} \
         ORDER BY embedding <=> $1 \
         LIMIT $2",
        table.qualified()
    )
}
