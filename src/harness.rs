//! Wires configuration into a ready-to-use pipeline and retriever backed by
//! the SQLite database.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use hr_harness_core::pipeline::IngestionPipeline;
use hr_harness_core::retriever::Retriever;
use hr_harness_core::store::{MetadataStore, VectorIndex};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sqlite_store::{SqliteIndex, SqliteMetadataStore};

pub struct Harness {
    pub pipeline: IngestionPipeline,
    pub retriever: Retriever,
    pub index: Arc<SqliteIndex>,
    pub metadata: Arc<SqliteMetadataStore>,
}

impl Harness {
    /// Connect, ensure the schema exists and build the components.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let retry = config.embedding.retry_policy();
        let index = Arc::new(SqliteIndex::new(pool.clone(), embedder.dims()));
        if let Err(e) = index.check_dims().await {
            pool.close().await;
            return Err(anyhow::Error::new(e).context(format!(
                "Cannot open index for embedder {} ({} dims)",
                embedder.model_name(),
                embedder.dims()
            )));
        }
        let metadata = Arc::new(SqliteMetadataStore::new(pool));

        let pipeline = IngestionPipeline::new(embedder.clone(), index.clone(), metadata.clone())
            .with_masker(config.masker()?)
            .with_chunking(config.chunk_config()?)
            .with_retry(retry);
        let retriever = Retriever::new(embedder.clone(), index.clone())
            .with_policy(config.access_policy())
            .with_config(config.retriever_config())
            .with_retry(retry);

        debug!(
            provider = %config.embedding.provider,
            model = embedder.model_name(),
            dims = embedder.dims(),
            "harness ready"
        );

        Ok(Self {
            pipeline,
            retriever,
            index,
            metadata,
        })
    }

    pub async fn close(&self) -> Result<()> {
        self.index.close().await?;
        self.metadata.close().await?;
        Ok(())
    }
}
