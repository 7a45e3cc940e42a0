//! Deriver contract: rendering a stored resource description into some
//! other serialization (flat JSON, OAI-DC XML, nested JSON-LD).
//!
//! Derivers are looked up by IRI in an explicit registry. Running a deriver
//! against a card either saves the derived text or, when the deriver
//! declines the card, deletes any previously derived text so downstream
//! consumers never see stale output.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::Utc;

use crate::rdf::Tripledict;
use crate::store::{rdfdoc_with_supplements, DescriptionStore, Indexcard};
use crate::vocab;

/// Everything a deriver may read: the card's bookkeeping metadata plus the
/// merged resource description it points at.
pub struct DeriveInput<'a> {
    pub card: &'a Indexcard,
    pub focus_iri: &'a str,
    pub rdfdoc: &'a Tripledict,
}

pub trait Deriver: Send + Sync {
    /// Stable IRI identifying this deriver (and keying its stored output).
    fn deriver_iri(&self) -> String;

    /// Datatype IRIs describing the derived text.
    fn derived_datatype_iris(&self) -> Vec<String>;

    /// Whether this deriver declines the given card.
    fn should_skip(&self, input: &DeriveInput<'_>) -> bool;

    /// Render the card as text. Only called when `should_skip` is false.
    fn derive_card_as_text(&self, input: &DeriveInput<'_>) -> Result<String>;
}

/// Focus types the format-specific derivers accept; anything else is
/// skipped (vocab records, agents, and other non-work descriptions).
pub fn allowed_focustype_iris() -> BTreeSet<String> {
    BTreeSet::from([
        vocab::sharev2("CreativeWork"),
        vocab::osfmap("Project"),
        vocab::osfmap("ProjectComponent"),
        vocab::osfmap("Registration"),
        vocab::osfmap("RegistrationComponent"),
        vocab::osfmap("Preprint"),
    ])
}

/// True when the focus has no rdf:type in the allowed set.
pub fn focustype_disallowed(focus_iri: &str, rdfdoc: &Tripledict) -> bool {
    let allowed = allowed_focustype_iris();
    !rdfdoc
        .q_iris(focus_iri, &vocab::rdf("type"))
        .any(|type_iri| allowed.contains(type_iri))
}

/// All known derivers, in registry order.
pub fn all_derivers() -> Vec<Box<dyn Deriver>> {
    vec![
        Box::new(crate::derive_jsonld::JsonldDeriver),
        Box::new(crate::derive_flat::FlatDeriver),
        Box::new(crate::derive_oaidc::OaidcDeriver),
    ]
}

/// Look up a deriver by its IRI.
pub fn get_deriver(deriver_iri: &str) -> Option<Box<dyn Deriver>> {
    all_derivers()
        .into_iter()
        .find(|deriver| deriver.deriver_iri() == deriver_iri)
}

/// What happened when a deriver ran against a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeriveOutcome {
    Derived,
    Skipped,
}

/// Run one deriver against one card: save the derived text, or delete any
/// stale derived text when the deriver declines (or the card has no
/// description left).
pub async fn derive_for_card(
    store: &dyn DescriptionStore,
    deriver: &dyn Deriver,
    card: &Indexcard,
) -> Result<DeriveOutcome> {
    let deriver_iri = deriver.deriver_iri();
    let today = Utc::now().date_naive();
    let Some((focus_iri, rdfdoc)) = rdfdoc_with_supplements(store, card.id, today).await? else {
        store.delete_derived(card.id, &deriver_iri).await?;
        return Ok(DeriveOutcome::Skipped);
    };
    let input = DeriveInput {
        card,
        focus_iri: &focus_iri,
        rdfdoc: &rdfdoc,
    };
    if deriver.should_skip(&input) {
        store.delete_derived(card.id, &deriver_iri).await?;
        return Ok(DeriveOutcome::Skipped);
    }
    let text = deriver.derive_card_as_text(&input)?;
    store.save_derived(card.id, &deriver_iri, &text).await?;
    Ok(DeriveOutcome::Derived)
}

/// Run every registered deriver against one card.
pub async fn derive_all_for_card(
    store: &dyn DescriptionStore,
    card: &Indexcard,
) -> Result<Vec<(String, DeriveOutcome)>> {
    let mut outcomes = Vec::new();
    for deriver in all_derivers() {
        let outcome = derive_for_card(store, deriver.as_ref(), card).await?;
        outcomes.push((deriver.deriver_iri(), outcome));
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::RdfObject;
    use crate::store::MemoryStore;

    fn work_doc() -> Tripledict {
        let mut doc = Tripledict::new();
        doc.add(
            "https://example.org/w1",
            vocab::rdf("type"),
            RdfObject::iri(vocab::sharev2("CreativeWork")),
        );
        doc.add(
            "https://example.org/w1",
            vocab::dcterms("title"),
            RdfObject::literal("A Work"),
        );
        doc
    }

    #[test]
    fn test_registry_lookup_by_iri() {
        for deriver in all_derivers() {
            let found = get_deriver(&deriver.deriver_iri());
            assert!(found.is_some());
        }
        assert!(get_deriver("https://example.org/no-such-deriver").is_none());
    }

    #[test]
    fn test_focustype_gate() {
        let doc = work_doc();
        assert!(!focustype_disallowed("https://example.org/w1", &doc));
        let mut agent_doc = Tripledict::new();
        agent_doc.add(
            "https://example.org/p1",
            vocab::rdf("type"),
            RdfObject::iri(vocab::foaf("Person")),
        );
        assert!(focustype_disallowed("https://example.org/p1", &agent_doc));
    }

    #[tokio::test]
    async fn test_skip_deletes_stale_derived_text() {
        let store = MemoryStore::new();
        let card = store
            .upsert_record("src", "rec-1", "https://example.org/w1", &work_doc())
            .await
            .unwrap();
        let deriver = crate::derive_flat::FlatDeriver;
        let outcome = derive_for_card(&store, &deriver, &card).await.unwrap();
        assert_eq!(outcome, DeriveOutcome::Derived);
        assert!(store
            .get_derived(card.id, &deriver.deriver_iri())
            .await
            .unwrap()
            .is_some());

        // replace the description with one the deriver declines
        let mut agent_doc = Tripledict::new();
        agent_doc.add(
            "https://example.org/w1",
            vocab::rdf("type"),
            RdfObject::iri(vocab::foaf("Person")),
        );
        store
            .upsert_record("src", "rec-1", "https://example.org/w1", &agent_doc)
            .await
            .unwrap();
        let outcome = derive_for_card(&store, &deriver, &card).await.unwrap();
        assert_eq!(outcome, DeriveOutcome::Skipped);
        assert!(store
            .get_derived(card.id, &deriver.deriver_iri())
            .await
            .unwrap()
            .is_none());
    }
}
