//! Index statistics and health overview.
//!
//! Used by `hrx stats` to show what is indexed: the embedding model and its
//! dimensionality, vector counts, and document counts by status and by
//! department.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::harness::Harness;

struct GroupCount {
    label: String,
    documents: i64,
    chunks: i64,
}

async fn documents_by(pool: &SqlitePool, column: &str) -> Result<Vec<GroupCount>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT COALESCE({col}, '(none)') AS label,
               COUNT(*) AS documents,
               COALESCE(SUM(chunk_count), 0) AS chunks
        FROM documents
        GROUP BY label
        ORDER BY documents DESC, label ASC
        "#,
        col = column
    ))
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(GroupCount {
            label: row.try_get("label")?,
            documents: row.try_get("documents")?,
            chunks: row.try_get("chunks")?,
        });
    }
    Ok(out)
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let harness = Harness::open(config).await?;
    let pool = harness.index.pool().clone();

    let summary = async {
        let stats = harness.retriever.stats().await?;
        let by_status = documents_by(&pool, "status").await?;
        let by_department = documents_by(&pool, "department").await?;
        let unmasked: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE pii_unmasked = 1")
                .fetch_one(&pool)
                .await?;
        anyhow::Ok((stats, by_status, by_department, unmasked))
    }
    .await;
    harness.close().await?;
    let (stats, by_status, by_department, unmasked) = summary?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("HR Harness: Index Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Model:       {} ({} dims)", stats.model, stats.dims);
    println!("  Vectors:     {}", stats.vector_count);
    if unmasked > 0 {
        println!("  Unmasked:    {} document(s) indexed without PII masking", unmasked);
    }

    print_groups("By status", &by_status);
    print_groups("By department", &by_department);
    Ok(())
}

fn print_groups(title: &str, groups: &[GroupCount]) {
    if groups.is_empty() {
        return;
    }
    println!();
    println!("  {}:", title);
    for g in groups {
        println!("    {:<16} {:>5} docs {:>7} chunks", g.label, g.documents, g.chunks);
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
