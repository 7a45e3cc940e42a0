//! Resource-description storage.
//!
//! An [`Indexcard`] is the unit of identity: one per (source, record),
//! stable across re-harvests, soft-deleted rather than dropped. Each card
//! carries resource descriptions in three variants:
//!
//! * latest — at most one, replaced wholesale on re-harvest
//! * archived — append-only history of every distinct version
//! * supplementary — one per supplementing source, merged in at read time
//!
//! Derivers and indexers only ever consume the merged view from
//! [`rdfdoc_with_supplements`]; expired supplements are filtered there, not
//! eagerly garbage-collected.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::rdf::Tripledict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indexcard {
    pub id: Uuid,
    pub source_label: String,
    pub source_identifier: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Indexcard {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescription {
    pub focus_iri: String,
    /// Canonical serialization of the graph (see [`Tripledict::canonical_json`]).
    pub serialized: String,
    pub checksum_iri: String,
    pub modified_at: DateTime<Utc>,
    pub expires_on: Option<NaiveDate>,
}

impl ResourceDescription {
    pub fn new(
        focus_iri: impl Into<String>,
        rdfdoc: &Tripledict,
        modified_at: DateTime<Utc>,
        expires_on: Option<NaiveDate>,
    ) -> Self {
        ResourceDescription {
            focus_iri: focus_iri.into(),
            serialized: rdfdoc.canonical_json(),
            checksum_iri: rdfdoc.checksum_iri(),
            modified_at,
            expires_on,
        }
    }

    pub fn as_rdf_tripledict(&self) -> Result<Tripledict> {
        Tripledict::from_canonical_json(&self.serialized)
            .map_err(|err| anyhow!("stored description failed to parse: {err}"))
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        matches!(self.expires_on, Some(expiry) if expiry <= today)
    }
}

/// A derived rendition of a card, keyed by the deriver that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRecord {
    pub deriver_iri: String,
    pub text: String,
    pub checksum_iri: String,
    pub modified_at: DateTime<Utc>,
}

#[async_trait]
pub trait DescriptionStore: Send + Sync {
    /// Create or refresh the card for a harvested record, replacing its
    /// latest description and archiving the version when it changed.
    async fn upsert_record(
        &self,
        source_label: &str,
        source_identifier: &str,
        focus_iri: &str,
        rdfdoc: &Tripledict,
    ) -> Result<Indexcard>;

    /// Attach or replace the supplementary description from one
    /// supplementing source.
    async fn upsert_supplement(
        &self,
        card_id: Uuid,
        supplement_label: &str,
        rdfdoc: &Tripledict,
        expires_on: Option<NaiveDate>,
    ) -> Result<()>;

    async fn find_card(
        &self,
        source_label: &str,
        source_identifier: &str,
    ) -> Result<Option<Indexcard>>;

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Indexcard>>;

    /// All cards, deleted ones included, ordered by id.
    async fn list_cards(&self) -> Result<Vec<Indexcard>>;

    /// Soft-delete: the card keeps its identity and archive, loses its
    /// latest description.
    async fn mark_deleted(&self, card_id: Uuid) -> Result<()>;

    async fn latest_description(&self, card_id: Uuid) -> Result<Option<ResourceDescription>>;

    async fn supplementary_descriptions(&self, card_id: Uuid)
        -> Result<Vec<ResourceDescription>>;

    async fn archived_descriptions(&self, card_id: Uuid) -> Result<Vec<ResourceDescription>>;

    async fn save_derived(&self, card_id: Uuid, deriver_iri: &str, text: &str) -> Result<()>;

    async fn delete_derived(&self, card_id: Uuid, deriver_iri: &str) -> Result<()>;

    async fn get_derived(&self, card_id: Uuid, deriver_iri: &str)
        -> Result<Option<DerivedRecord>>;
}

/// The merged graph a deriver or indexer should see: the latest
/// description plus every current (non-expired) supplement.
pub async fn rdfdoc_with_supplements(
    store: &dyn DescriptionStore,
    card_id: Uuid,
    today: NaiveDate,
) -> Result<Option<(String, Tripledict)>> {
    let Some(latest) = store.latest_description(card_id).await? else {
        return Ok(None);
    };
    if latest.is_expired(today) {
        return Ok(None);
    }
    let mut rdfdoc = latest.as_rdf_tripledict()?;
    for supplement in store.supplementary_descriptions(card_id).await? {
        if !supplement.is_expired(today) {
            rdfdoc.merge(supplement.as_rdf_tripledict()?);
        }
    }
    Ok(Some((latest.focus_iri, rdfdoc)))
}

#[derive(Default)]
struct MemoryStoreInner {
    cards: HashMap<Uuid, Indexcard>,
    card_ids_by_source: HashMap<(String, String), Uuid>,
    latest: HashMap<Uuid, ResourceDescription>,
    archived: HashMap<Uuid, Vec<ResourceDescription>>,
    supplements: HashMap<Uuid, HashMap<String, ResourceDescription>>,
    derived: HashMap<(Uuid, String), DerivedRecord>,
}

/// In-memory store, the test double for the SQLite-backed one.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DescriptionStore for MemoryStore {
    async fn upsert_record(
        &self,
        source_label: &str,
        source_identifier: &str,
        focus_iri: &str,
        rdfdoc: &Tripledict,
    ) -> Result<Indexcard> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let key = (source_label.to_string(), source_identifier.to_string());
        let card_id = *inner
            .card_ids_by_source
            .entry(key)
            .or_insert_with(Uuid::new_v4);
        let card = inner
            .cards
            .entry(card_id)
            .or_insert_with(|| Indexcard {
                id: card_id,
                source_label: source_label.to_string(),
                source_identifier: source_identifier.to_string(),
                created_at: now,
                modified_at: now,
                deleted_at: None,
            });
        card.modified_at = now;
        card.deleted_at = None;
        let card = card.clone();

        let description = ResourceDescription::new(focus_iri, rdfdoc, now, None);
        let changed = inner
            .latest
            .get(&card_id)
            .map_or(true, |existing| existing.checksum_iri != description.checksum_iri);
        if changed {
            inner
                .archived
                .entry(card_id)
                .or_default()
                .push(description.clone());
        }
        inner.latest.insert(card_id, description);
        Ok(card)
    }

    async fn upsert_supplement(
        &self,
        card_id: Uuid,
        supplement_label: &str,
        rdfdoc: &Tripledict,
        expires_on: Option<NaiveDate>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let focus_iri = inner
            .latest
            .get(&card_id)
            .map(|latest| latest.focus_iri.clone())
            .ok_or_else(|| anyhow!("no latest description for card {card_id}"))?;
        let description = ResourceDescription::new(focus_iri, rdfdoc, Utc::now(), expires_on);
        inner
            .supplements
            .entry(card_id)
            .or_default()
            .insert(supplement_label.to_string(), description);
        Ok(())
    }

    async fn find_card(
        &self,
        source_label: &str,
        source_identifier: &str,
    ) -> Result<Option<Indexcard>> {
        let inner = self.inner.read().await;
        let key = (source_label.to_string(), source_identifier.to_string());
        Ok(inner
            .card_ids_by_source
            .get(&key)
            .and_then(|card_id| inner.cards.get(card_id))
            .cloned())
    }

    async fn get_card(&self, card_id: Uuid) -> Result<Option<Indexcard>> {
        let inner = self.inner.read().await;
        Ok(inner.cards.get(&card_id).cloned())
    }

    async fn list_cards(&self) -> Result<Vec<Indexcard>> {
        let inner = self.inner.read().await;
        let mut cards: Vec<Indexcard> = inner.cards.values().cloned().collect();
        cards.sort_by_key(|card| card.id);
        Ok(cards)
    }

    async fn mark_deleted(&self, card_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        let card = inner
            .cards
            .get_mut(&card_id)
            .ok_or_else(|| anyhow!("no card {card_id}"))?;
        card.deleted_at = Some(Utc::now());
        card.modified_at = Utc::now();
        inner.latest.remove(&card_id);
        Ok(())
    }

    async fn latest_description(&self, card_id: Uuid) -> Result<Option<ResourceDescription>> {
        let inner = self.inner.read().await;
        Ok(inner.latest.get(&card_id).cloned())
    }

    async fn supplementary_descriptions(
        &self,
        card_id: Uuid,
    ) -> Result<Vec<ResourceDescription>> {
        let inner = self.inner.read().await;
        let mut supplements: Vec<(String, ResourceDescription)> = inner
            .supplements
            .get(&card_id)
            .map(|by_label| {
                by_label
                    .iter()
                    .map(|(label, desc)| (label.clone(), desc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        supplements.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(supplements.into_iter().map(|(_, desc)| desc).collect())
    }

    async fn archived_descriptions(&self, card_id: Uuid) -> Result<Vec<ResourceDescription>> {
        let inner = self.inner.read().await;
        Ok(inner.archived.get(&card_id).cloned().unwrap_or_default())
    }

    async fn save_derived(&self, card_id: Uuid, deriver_iri: &str, text: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.derived.insert(
            (card_id, deriver_iri.to_string()),
            DerivedRecord {
                deriver_iri: deriver_iri.to_string(),
                text: text.to_string(),
                checksum_iri: crate::rdf::checksum_iri(text.as_bytes()),
                modified_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_derived(&self, card_id: Uuid, deriver_iri: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.derived.remove(&(card_id, deriver_iri.to_string()));
        Ok(())
    }

    async fn get_derived(
        &self,
        card_id: Uuid,
        deriver_iri: &str,
    ) -> Result<Option<DerivedRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.derived.get(&(card_id, deriver_iri.to_string())).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::RdfObject;
    use crate::vocab::dcterms;

    fn doc(title: &str) -> Tripledict {
        let mut rdfdoc = Tripledict::new();
        rdfdoc.add(
            "https://example.org/w1",
            dcterms("title"),
            RdfObject::literal(title),
        );
        rdfdoc
    }

    #[tokio::test]
    async fn test_upsert_keeps_card_identity() {
        let store = MemoryStore::new();
        let first = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("one"))
            .await
            .unwrap();
        let second = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("two"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        let archived = store.archived_descriptions(first.id).await.unwrap();
        assert_eq!(archived.len(), 2);
    }

    #[tokio::test]
    async fn test_unchanged_content_not_rearchived() {
        let store = MemoryStore::new();
        let card = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("same"))
            .await
            .unwrap();
        store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("same"))
            .await
            .unwrap();
        let archived = store.archived_descriptions(card.id).await.unwrap();
        assert_eq!(archived.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_deleted_removes_latest_keeps_archive() {
        let store = MemoryStore::new();
        let card = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("one"))
            .await
            .unwrap();
        store.mark_deleted(card.id).await.unwrap();
        assert!(store.latest_description(card.id).await.unwrap().is_none());
        assert_eq!(store.archived_descriptions(card.id).await.unwrap().len(), 1);
        let reloaded = store.get_card(card.id).await.unwrap().unwrap();
        assert!(reloaded.is_deleted());
    }

    #[tokio::test]
    async fn test_merged_view_includes_current_supplements_only() {
        let store = MemoryStore::new();
        let card = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("one"))
            .await
            .unwrap();
        let mut supplement = Tripledict::new();
        supplement.add(
            "https://example.org/w1",
            dcterms("available"),
            RdfObject::literal("2024-01-01"),
        );
        store
            .upsert_supplement(card.id, "supp.src", &supplement, None)
            .await
            .unwrap();
        let mut expired = Tripledict::new();
        expired.add(
            "https://example.org/w1",
            dcterms("dateCopyrighted"),
            RdfObject::literal("2020-01-01"),
        );
        store
            .upsert_supplement(
                card.id,
                "expired.src",
                &expired,
                NaiveDate::from_ymd_opt(2024, 1, 1),
            )
            .await
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let (focus, merged) = rdfdoc_with_supplements(&store, card.id, today)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(focus, "https://example.org/w1");
        assert!(merged
            .q_one("https://example.org/w1", &dcterms("available"))
            .is_some());
        assert!(merged
            .q_one("https://example.org/w1", &dcterms("dateCopyrighted"))
            .is_none());
    }

    #[tokio::test]
    async fn test_derived_upsert_and_delete() {
        let store = MemoryStore::new();
        let card = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &doc("one"))
            .await
            .unwrap();
        store
            .save_derived(card.id, "https://example.org/derive/x", "<xml/>")
            .await
            .unwrap();
        assert!(store
            .get_derived(card.id, "https://example.org/derive/x")
            .await
            .unwrap()
            .is_some());
        store
            .delete_derived(card.id, "https://example.org/derive/x")
            .await
            .unwrap();
        assert!(store
            .get_derived(card.id, "https://example.org/derive/x")
            .await
            .unwrap()
            .is_none());
    }
}
