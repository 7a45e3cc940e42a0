//! Ingestion pipeline orchestration.
//!
//! Coordinates the full flow: harvest → chain transform → description
//! store → derivers → search index. Each stage commits per record, so a
//! failure in one document never rolls back its neighbors, and re-running
//! the derive and index stages is idempotent.

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chain::{ChainContext, TransformOutcome, Transformer};
use crate::derive::{derive_all_for_card, DeriveOutcome};
use crate::harvest::{run_harvest, Harvester, HarvestWindow};
use crate::index_strategy::{InMemoryIndexStrategy, IndexActionset, SourcedocBuilder};
use crate::store::{rdfdoc_with_supplements, DescriptionStore, Indexcard};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub derived: usize,
    pub derived_deleted: usize,
    pub indexed: usize,
    pub index_deleted: usize,
}

pub async fn run_ingest(
    store: &dyn DescriptionStore,
    index: &InMemoryIndexStrategy,
    harvester: &dyn Harvester,
    transformer: &dyn Transformer,
    window: HarvestWindow,
) -> Result<IngestStats> {
    let source_label = harvester.source_label().to_string();
    let results = run_harvest(harvester, window).await?;
    let mut stats = IngestStats {
        fetched: results.len(),
        ..Default::default()
    };
    info!(source = %source_label, fetched = results.len(), "harvest complete");

    for result in results {
        let mut ctx = ChainContext::new(source_label.as_str());
        let outcome = match transformer.transform(&result.datum, &mut ctx) {
            Ok(outcome) => outcome,
            Err(err) => {
                // one bad document never blocks the batch
                warn!(
                    source = %source_label,
                    identifier = %result.identifier,
                    error = %err,
                    "transform failed"
                );
                stats.failed += 1;
                continue;
            }
        };
        match outcome {
            TransformOutcome::Skip(reason) => {
                debug!(
                    source = %source_label,
                    identifier = %result.identifier,
                    reason = %reason,
                    "transform skipped"
                );
                stats.skipped += 1;
                if let Some(card) = store.find_card(&source_label, &result.identifier).await? {
                    store.mark_deleted(card.id).await?;
                    index.apply_actionset(IndexActionset::Delete(card.id)).await?;
                    stats.index_deleted += 1;
                }
            }
            TransformOutcome::Graph { focus_iri, rdfdoc } => {
                let card = store
                    .upsert_record(&source_label, &result.identifier, &focus_iri, &rdfdoc)
                    .await?;
                stats.stored += 1;
                let outcomes = derive_all_for_card(store, &card).await?;
                for (_, outcome) in &outcomes {
                    match outcome {
                        DeriveOutcome::Derived => stats.derived += 1,
                        DeriveOutcome::Skipped => stats.derived_deleted += 1,
                    }
                }
                if index_card(store, index, &card).await? {
                    stats.indexed += 1;
                } else {
                    stats.index_deleted += 1;
                }
            }
        }
    }
    info!(
        source = %source_label,
        stored = stats.stored,
        skipped = stats.skipped,
        failed = stats.failed,
        "ingest complete"
    );
    Ok(stats)
}

/// Rebuild the index documents for one card from its merged description.
/// Returns true when the card is indexed, false when it was deleted from
/// the index (no description, or nothing namelike to surface).
pub async fn index_card(
    store: &dyn DescriptionStore,
    index: &InMemoryIndexStrategy,
    card: &Indexcard,
) -> Result<bool> {
    let today = Utc::now().date_naive();
    let actionset = match rdfdoc_with_supplements(store, card.id, today).await? {
        Some((focus_iri, rdfdoc)) => SourcedocBuilder::build_actionset(card, &focus_iri, &rdfdoc),
        None => IndexActionset::Delete(card.id),
    };
    let indexed = matches!(actionset, IndexActionset::Index(_));
    index.apply_actionset(actionset).await?;
    Ok(indexed)
}

/// Re-run every deriver against every card. Idempotent.
pub async fn derive_all(store: &dyn DescriptionStore) -> Result<(usize, usize)> {
    let mut derived = 0;
    let mut deleted = 0;
    for card in store.list_cards().await? {
        for (_, outcome) in derive_all_for_card(store, &card).await? {
            match outcome {
                DeriveOutcome::Derived => derived += 1,
                DeriveOutcome::Skipped => deleted += 1,
            }
        }
    }
    Ok((derived, deleted))
}

/// Rebuild the whole search index from the store. Idempotent.
pub async fn reindex_all(
    store: &dyn DescriptionStore,
    index: &InMemoryIndexStrategy,
) -> Result<(usize, usize)> {
    let mut indexed = 0;
    let mut deleted = 0;
    for card in store.list_cards().await? {
        if index_card(store, index, &card).await? {
            indexed += 1;
        } else {
            deleted += 1;
        }
    }
    Ok((indexed, deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChainError;
    use crate::harvest::FetchResult;
    use crate::rdf::{RdfObject, Tripledict};
    use crate::store::MemoryStore;
    use crate::vocab;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedHarvester {
        results: Vec<FetchResult>,
    }

    #[async_trait]
    impl Harvester for FixedHarvester {
        fn source_label(&self) -> &str {
            "test.source"
        }

        async fn fetch(&self, _window: &HarvestWindow) -> Result<Vec<FetchResult>> {
            Ok(self.results.clone())
        }
    }

    /// Parses `title|...` datums; empty title means skip, "!" means fail.
    struct PipeTransformer;

    impl Transformer for PipeTransformer {
        fn transformer_label(&self) -> &str {
            "pipe"
        }

        fn transform(
            &self,
            raw: &[u8],
            _ctx: &mut ChainContext,
        ) -> Result<TransformOutcome, ChainError> {
            let text = String::from_utf8_lossy(raw);
            let title = text.split('|').next().unwrap_or_default();
            if title == "!" {
                return Err(ChainError::InvalidIri(text.to_string()));
            }
            if title.is_empty() {
                return Ok(TransformOutcome::Skip("no title".to_string()));
            }
            let focus = "https://example.org/w";
            let mut rdfdoc = Tripledict::new();
            rdfdoc.add(
                focus,
                vocab::rdf("type"),
                RdfObject::iri(vocab::sharev2("CreativeWork")),
            );
            rdfdoc.add(focus, vocab::dcterms("title"), RdfObject::literal(title));
            Ok(TransformOutcome::Graph {
                focus_iri: focus.to_string(),
                rdfdoc,
            })
        }
    }

    fn window() -> HarvestWindow {
        let end = Utc::now();
        HarvestWindow {
            start: end - Duration::days(1),
            end,
        }
    }

    fn result(identifier: &str, datum: &str) -> FetchResult {
        FetchResult::from_string(identifier, datum, None)
    }

    #[tokio::test]
    async fn test_ingest_stores_derives_and_indexes() {
        let store = MemoryStore::new();
        let index = InMemoryIndexStrategy::new();
        let harvester = FixedHarvester {
            results: vec![result("rec-1", "A Title|rest")],
        };
        let stats = run_ingest(&store, &index, &harvester, &PipeTransformer, window())
            .await
            .unwrap();
        assert_eq!(stats.fetched, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(stats.derived, 3);
        assert_eq!(stats.indexed, 1);
        let card = store.find_card("test.source", "rec-1").await.unwrap().unwrap();
        assert!(store
            .get_derived(card.id, vocab::OAI_DC)
            .await
            .unwrap()
            .is_some());
        assert_eq!(index.indexed_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_transform_does_not_block_batch() {
        let store = MemoryStore::new();
        let index = InMemoryIndexStrategy::new();
        let harvester = FixedHarvester {
            results: vec![result("bad", "!|x"), result("good", "Fine|x")],
        };
        let stats = run_ingest(&store, &index, &harvester, &PipeTransformer, window())
            .await
            .unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.stored, 1);
    }

    #[tokio::test]
    async fn test_skip_deletes_existing_card() {
        let store = MemoryStore::new();
        let index = InMemoryIndexStrategy::new();
        let harvester = FixedHarvester {
            results: vec![result("rec-1", "A Title|x")],
        };
        run_ingest(&store, &index, &harvester, &PipeTransformer, window())
            .await
            .unwrap();
        assert_eq!(index.indexed_count().await, 1);

        // the same record comes back unrepresentable
        let harvester = FixedHarvester {
            results: vec![result("rec-1", "|x")],
        };
        let stats = run_ingest(&store, &index, &harvester, &PipeTransformer, window())
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);
        let card = store.find_card("test.source", "rec-1").await.unwrap().unwrap();
        assert!(card.is_deleted());
        assert_eq!(index.indexed_count().await, 0);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let store = MemoryStore::new();
        let index = InMemoryIndexStrategy::new();
        let harvester = FixedHarvester {
            results: vec![result("rec-1", "A Title|x"), result("rec-2", "Another|x")],
        };
        run_ingest(&store, &index, &harvester, &PipeTransformer, window())
            .await
            .unwrap();
        let (indexed_a, _) = reindex_all(&store, &index).await.unwrap();
        let (indexed_b, _) = reindex_all(&store, &index).await.unwrap();
        assert_eq!(indexed_a, 2);
        assert_eq!(indexed_b, 2);
        assert_eq!(index.indexed_count().await, 2);
    }
}
