use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexcards (
            id TEXT PRIMARY KEY,
            source_label TEXT NOT NULL,
            source_identifier TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            deleted_at INTEGER,
            UNIQUE(source_label, source_identifier)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS latest_descriptions (
            card_id TEXT PRIMARY KEY,
            focus_iri TEXT NOT NULL,
            serialized TEXT NOT NULL,
            checksum_iri TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            expires_on TEXT,
            FOREIGN KEY (card_id) REFERENCES indexcards(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS archived_descriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id TEXT NOT NULL,
            focus_iri TEXT NOT NULL,
            serialized TEXT NOT NULL,
            checksum_iri TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            FOREIGN KEY (card_id) REFERENCES indexcards(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS supplementary_descriptions (
            card_id TEXT NOT NULL,
            supplement_label TEXT NOT NULL,
            focus_iri TEXT NOT NULL,
            serialized TEXT NOT NULL,
            checksum_iri TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            expires_on TEXT,
            PRIMARY KEY (card_id, supplement_label),
            FOREIGN KEY (card_id) REFERENCES indexcards(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS derived_records (
            card_id TEXT NOT NULL,
            deriver_iri TEXT NOT NULL,
            text TEXT NOT NULL,
            checksum_iri TEXT NOT NULL,
            modified_at INTEGER NOT NULL,
            PRIMARY KEY (card_id, deriver_iri),
            FOREIGN KEY (card_id) REFERENCES indexcards(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_indexcards_source ON indexcards(source_label)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexcards_modified_at ON indexcards(modified_at DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_archived_card_id ON archived_descriptions(card_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_derived_deriver ON derived_records(deriver_iri)")
        .execute(pool)
        .await?;

    Ok(())
}
