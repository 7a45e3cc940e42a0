//! SQLite connection and the database-backed description store.

use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::rdf::Tripledict;
use crate::store::{DerivedRecord, DescriptionStore, Indexcard, ResourceDescription};

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteStore { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn timestamp(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

fn from_timestamp(seconds: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| anyhow!("timestamp out of range: {seconds}"))
}

fn card_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Indexcard> {
    let id: String = row.try_get("id")?;
    let deleted_at: Option<i64> = row.try_get("deleted_at")?;
    Ok(Indexcard {
        id: Uuid::parse_str(&id).context("malformed card id")?,
        source_label: row.try_get("source_label")?,
        source_identifier: row.try_get("source_identifier")?,
        created_at: from_timestamp(row.try_get("created_at")?)?,
        modified_at: from_timestamp(row.try_get("modified_at")?)?,
        deleted_at: deleted_at.map(from_timestamp).transpose()?,
    })
}

fn description_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ResourceDescription> {
    let expires_on: Option<String> = row.try_get("expires_on").unwrap_or(None);
    Ok(ResourceDescription {
        focus_iri: row.try_get("focus_iri")?,
        serialized: row.try_get("serialized")?,
        checksum_iri: row.try_get("checksum_iri")?,
        modified_at: from_timestamp(row.try_get("modified_at")?)?,
        expires_on: expires_on
            .map(|text| NaiveDate::parse_from_str(&text, "%Y-%m-%d"))
            .transpose()
            .context("malformed expiration date")?,
    })
}

#[async_trait]
impl DescriptionStore for SqliteStore {
    async fn upsert_record(
        &self,
        source_label: &str,
        source_identifier: &str,
        focus_iri: &str,
        rdfdoc: &Tripledict,
    ) -> Result<Indexcard> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;

        let existing_id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM indexcards WHERE source_label = ? AND source_identifier = ?",
        )
        .bind(source_label)
        .bind(source_identifier)
        .fetch_optional(&mut *tx)
        .await?;
        let card_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            r#"
            INSERT INTO indexcards (id, source_label, source_identifier, created_at, modified_at, deleted_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(source_label, source_identifier) DO UPDATE SET
                modified_at = excluded.modified_at,
                deleted_at = NULL
            "#,
        )
        .bind(&card_id)
        .bind(source_label)
        .bind(source_identifier)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let serialized = rdfdoc.canonical_json();
        let checksum = rdfdoc.checksum_iri();
        let previous_checksum: Option<String> = sqlx::query_scalar(
            "SELECT checksum_iri FROM latest_descriptions WHERE card_id = ?",
        )
        .bind(&card_id)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO latest_descriptions (card_id, focus_iri, serialized, checksum_iri, modified_at, expires_on)
            VALUES (?, ?, ?, ?, ?, NULL)
            ON CONFLICT(card_id) DO UPDATE SET
                focus_iri = excluded.focus_iri,
                serialized = excluded.serialized,
                checksum_iri = excluded.checksum_iri,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(&card_id)
        .bind(focus_iri)
        .bind(&serialized)
        .bind(&checksum)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if previous_checksum.as_deref() != Some(checksum.as_str()) {
            sqlx::query(
                r#"
                INSERT INTO archived_descriptions (card_id, focus_iri, serialized, checksum_iri, modified_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&card_id)
            .bind(focus_iri)
            .bind(&serialized)
            .bind(&checksum)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.find_card(source_label, source_identifier)
            .await?
            .ok_or_else(|| anyhow!("card vanished after upsert"))
    }

    async fn upsert_supplement(
        &self,
        card_id: Uuid,
        supplement_label: &str,
        rdfdoc: &Tripledict,
        expires_on: Option<NaiveDate>,
    ) -> Result<()> {
        let focus_iri: Option<String> =
            sqlx::query_scalar("SELECT focus_iri FROM latest_descriptions WHERE card_id = ?")
                .bind(card_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        let focus_iri =
            focus_iri.ok_or_else(|| anyhow!("no latest description for card {card_id}"))?;
        sqlx::query(
            r#"
            INSERT INTO supplementary_descriptions
                (card_id, supplement_label, focus_iri, serialized, checksum_iri, modified_at, expires_on)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(card_id, supplement_label) DO UPDATE SET
                focus_iri = excluded.focus_iri,
                serialized = excluded.serialized,
                checksum_iri = excluded.checksum_iri,
                modified_at = excluded.modified_at,
                expires_on = excluded.expires_on
            "#,
        )
        .bind(card_id.to_string())
        .bind(supplement_label)
        .bind(&focus_iri)
        .bind(rdfdoc.canonical_json())
        .bind(rdfdoc.checksum_iri())
        .bind(timestamp(Utc::now()))
        .bind(expires_on.map(|date| date.format("%Y-%m-%d").to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_card(
        &self,
        source_label: &str,
        source_identifier: &str,
    ) -> Result<Option<Indexcard>> {
        let row = sqlx::query(
            "SELECT * FROM indexcards WHERE source_label = ? AND source_identifier = ?",
        )
        .bind(source_label)
        .bind(source_identifier)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(card_from_row).transpose()
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Indexcard>> {
        let row = sqlx::query("SELECT * FROM indexcards WHERE id = ?")
            .bind(card_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(card_from_row).transpose()
    }

    async fn list_cards(&self) -> Result<Vec<Indexcard>> {
        let rows = sqlx::query("SELECT * FROM indexcards ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(card_from_row).collect()
    }

    async fn mark_deleted(&self, card_id: Uuid) -> Result<()> {
        let now = timestamp(Utc::now());
        let mut tx = self.pool.begin().await?;
        let updated =
            sqlx::query("UPDATE indexcards SET deleted_at = ?, modified_at = ? WHERE id = ?")
                .bind(now)
                .bind(now)
                .bind(card_id.to_string())
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() == 0 {
            return Err(anyhow!("no card {card_id}"));
        }
        sqlx::query("DELETE FROM latest_descriptions WHERE card_id = ?")
            .bind(card_id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn latest_description(&self, card_id: Uuid) -> Result<Option<ResourceDescription>> {
        let row = sqlx::query("SELECT * FROM latest_descriptions WHERE card_id = ?")
            .bind(card_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(description_from_row).transpose()
    }

    async fn supplementary_descriptions(
        &self,
        card_id: Uuid,
    ) -> Result<Vec<ResourceDescription>> {
        let rows = sqlx::query(
            "SELECT * FROM supplementary_descriptions WHERE card_id = ? ORDER BY supplement_label",
        )
        .bind(card_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(description_from_row).collect()
    }

    async fn archived_descriptions(&self, card_id: Uuid) -> Result<Vec<ResourceDescription>> {
        let rows = sqlx::query("SELECT * FROM archived_descriptions WHERE card_id = ? ORDER BY id")
            .bind(card_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(description_from_row).collect()
    }

    async fn save_derived(&self, card_id: Uuid, deriver_iri: &str, text: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO derived_records (card_id, deriver_iri, text, checksum_iri, modified_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(card_id, deriver_iri) DO UPDATE SET
                text = excluded.text,
                checksum_iri = excluded.checksum_iri,
                modified_at = excluded.modified_at
            "#,
        )
        .bind(card_id.to_string())
        .bind(deriver_iri)
        .bind(text)
        .bind(crate::rdf::checksum_iri(text.as_bytes()))
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_derived(&self, card_id: Uuid, deriver_iri: &str) -> Result<()> {
        sqlx::query("DELETE FROM derived_records WHERE card_id = ? AND deriver_iri = ?")
            .bind(card_id.to_string())
            .bind(deriver_iri)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_derived(
        &self,
        card_id: Uuid,
        deriver_iri: &str,
    ) -> Result<Option<DerivedRecord>> {
        let row = sqlx::query(
            "SELECT * FROM derived_records WHERE card_id = ? AND deriver_iri = ?",
        )
        .bind(card_id.to_string())
        .bind(deriver_iri)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<DerivedRecord> {
            Ok(DerivedRecord {
                deriver_iri: row.try_get("deriver_iri")?,
                text: row.try_get("text")?,
                checksum_iri: row.try_get("checksum_iri")?,
                modified_at: from_timestamp(row.try_get("modified_at")?)?,
            })
        })
        .transpose()
    }
}
