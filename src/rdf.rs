//! In-memory RDF data model.
//!
//! A [`Tripledict`] is a subject → predicate → object-set mapping, the shape
//! every harvested record is transformed into and every deriver reads from.
//! All containers are ordered (`BTreeMap`/`BTreeSet`) so serialization is
//! deterministic: the same graph always produces the same canonical JSON and
//! therefore the same checksum.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Predicate → object-set mapping for a single subject.
pub type Twopledict = BTreeMap<String, BTreeSet<RdfObject>>;

/// An RDF object position: an IRI reference, a literal, or an anonymous
/// node held inline by value (no identity beyond its contents).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum RdfObject {
    Iri(String),
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        datatype_iris: BTreeSet<String>,
    },
    Blanknode(Twopledict),
}

impl RdfObject {
    pub fn iri(iri: impl Into<String>) -> Self {
        RdfObject::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        RdfObject::Literal {
            value: value.into(),
            language: None,
            datatype_iris: BTreeSet::new(),
        }
    }

    pub fn literal_language(value: impl Into<String>, language: impl Into<String>) -> Self {
        RdfObject::Literal {
            value: value.into(),
            language: Some(language.into()),
            datatype_iris: BTreeSet::new(),
        }
    }

    pub fn literal_datatype(value: impl Into<String>, datatype_iri: impl Into<String>) -> Self {
        let mut datatype_iris = BTreeSet::new();
        datatype_iris.insert(datatype_iri.into());
        RdfObject::Literal {
            value: value.into(),
            language: None,
            datatype_iris,
        }
    }

    pub fn blanknode(twoples: impl IntoIterator<Item = (String, RdfObject)>) -> Self {
        let mut map: Twopledict = BTreeMap::new();
        for (predicate, object) in twoples {
            map.entry(predicate).or_default().insert(object);
        }
        RdfObject::Blanknode(map)
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            RdfObject::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal_value(&self) -> Option<&str> {
        match self {
            RdfObject::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_blanknode(&self) -> Option<&Twopledict> {
        match self {
            RdfObject::Blanknode(twoples) => Some(twoples),
            _ => None,
        }
    }
}

/// A read-only-after-build RDF graph snapshot: subject IRI → predicate IRI →
/// set of objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tripledict(pub BTreeMap<String, Twopledict>);

impl Tripledict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn add(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: RdfObject,
    ) {
        self.0
            .entry(subject.into())
            .or_default()
            .entry(predicate.into())
            .or_default()
            .insert(object);
    }

    pub fn subjects(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn twoples(&self, subject: &str) -> Option<&Twopledict> {
        self.0.get(subject)
    }

    /// All objects at `(subject, predicate)`, empty when absent.
    pub fn q<'a>(&'a self, subject: &str, predicate: &str) -> impl Iterator<Item = &'a RdfObject> {
        self.0
            .get(subject)
            .and_then(|twoples| twoples.get(predicate))
            .into_iter()
            .flatten()
    }

    /// First object at `(subject, predicate)` in canonical order.
    pub fn q_one(&self, subject: &str, predicate: &str) -> Option<&RdfObject> {
        self.q(subject, predicate).next()
    }

    /// IRI objects at `(subject, predicate)`.
    pub fn q_iris<'a>(&'a self, subject: &str, predicate: &str) -> impl Iterator<Item = &'a str> {
        self.q(subject, predicate).filter_map(RdfObject::as_iri)
    }

    /// Literal values at `(subject, predicate)`.
    pub fn q_literals<'a>(
        &'a self,
        subject: &str,
        predicate: &str,
    ) -> impl Iterator<Item = &'a str> {
        self.q(subject, predicate)
            .filter_map(RdfObject::as_literal_value)
    }

    /// Union another graph into this one.
    pub fn merge(&mut self, other: Tripledict) {
        for (subject, twoples) in other.0 {
            let entry = self.0.entry(subject).or_default();
            for (predicate, objects) in twoples {
                entry.entry(predicate).or_default().extend(objects);
            }
        }
    }

    /// Deterministic serialization: sorted-key JSON. Two equal graphs
    /// always produce byte-identical output.
    pub fn canonical_json(&self) -> String {
        // BTreeMap/BTreeSet iteration order makes this stable.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_canonical_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Content address of the canonical serialization.
    pub fn checksum_iri(&self) -> String {
        checksum_iri(self.canonical_json().as_bytes())
    }
}

/// `urn:checksum:sha-256:<hex>` for arbitrary bytes.
pub fn checksum_iri(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("urn:checksum:sha-256:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocab::{dcterms, foaf};

    fn sample() -> Tripledict {
        let mut doc = Tripledict::new();
        doc.add(
            "https://example.org/w1",
            dcterms("title"),
            RdfObject::literal("A Title"),
        );
        doc.add(
            "https://example.org/w1",
            dcterms("creator"),
            RdfObject::iri("https://example.org/p1"),
        );
        doc.add(
            "https://example.org/p1",
            foaf("name"),
            RdfObject::literal("Someone"),
        );
        doc
    }

    #[test]
    fn test_q_and_q_one() {
        let doc = sample();
        let titles: Vec<_> = doc
            .q_literals("https://example.org/w1", &dcterms("title"))
            .collect();
        assert_eq!(titles, vec!["A Title"]);
        assert!(doc.q_one("https://example.org/w1", &dcterms("missing")).is_none());
    }

    #[test]
    fn test_duplicate_add_is_idempotent() {
        let mut doc = sample();
        doc.add(
            "https://example.org/w1",
            dcterms("title"),
            RdfObject::literal("A Title"),
        );
        assert_eq!(doc.q("https://example.org/w1", &dcterms("title")).count(), 1);
    }

    #[test]
    fn test_merge_unions_objects() {
        let mut doc = sample();
        let mut other = Tripledict::new();
        other.add(
            "https://example.org/w1",
            dcterms("title"),
            RdfObject::literal("Another Title"),
        );
        doc.merge(other);
        assert_eq!(doc.q("https://example.org/w1", &dcterms("title")).count(), 2);
    }

    #[test]
    fn test_canonical_json_round_trip() {
        let doc = sample();
        let text = doc.canonical_json();
        let parsed = Tripledict::from_canonical_json(&text).unwrap();
        assert_eq!(doc, parsed);
        assert_eq!(text, parsed.canonical_json());
    }

    #[test]
    fn test_checksum_stable_across_insertion_order() {
        let mut forward = Tripledict::new();
        forward.add("s", "p1", RdfObject::literal("a"));
        forward.add("s", "p2", RdfObject::literal("b"));
        let mut backward = Tripledict::new();
        backward.add("s", "p2", RdfObject::literal("b"));
        backward.add("s", "p1", RdfObject::literal("a"));
        assert_eq!(forward.checksum_iri(), backward.checksum_iri());
    }

    #[test]
    fn test_blanknode_value_equality() {
        let a = RdfObject::blanknode([
            (foaf("name"), RdfObject::literal("N")),
            (crate::vocab::rdf("type"), RdfObject::iri(foaf("Person"))),
        ]);
        let b = RdfObject::blanknode([
            (crate::vocab::rdf("type"), RdfObject::iri(foaf("Person"))),
            (foaf("name"), RdfObject::literal("N")),
        ]);
        assert_eq!(a, b);
    }
}
