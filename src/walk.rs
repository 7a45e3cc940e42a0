//! Cycle-safe graph traversal from a focus IRI.
//!
//! [`GraphWalk`] visits every subject reachable from the focus, partitioning
//! each `(propertypath, object)` it encounters into IRI, text, date, and
//! integer values. Blank nodes are walked inline: the path extends through
//! them without marking a visit. A subject already on the in-progress stack
//! is silently not re-traversed, so cyclic graphs terminate with each cycle
//! edge contributing its value exactly once per distinct path.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::rdf::{RdfObject, Tripledict, Twopledict};
use crate::vocab;

/// A sequence of predicate IRIs leading from the focus to a value.
pub type Propertypath = Vec<String>;

/// Paths deeper than this are not indexed as searchable text.
pub const TEXT_PATH_DEPTH_MAX: usize = 1;

/// A text value found during the walk, with its language tag if any.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct WalkedText {
    pub value: String,
    pub language: Option<String>,
}

/// Whether a path is never traversed or indexed: skip-listed terminal
/// predicates, and nested identifiers (an identifier of anything other
/// than the focus itself is someone else's identifier).
pub fn should_skip_path(path: &[String]) -> bool {
    let Some(last) = path.last() else {
        return false;
    };
    if vocab::skippable_properties().contains(last) {
        return true;
    }
    path.len() > 1 && *last == vocab::dcterms("identifier")
}

/// The given IRI plus everything one `owl:sameAs` hop away (worthwhile
/// IRIs only). Deliberately shallow: no transitive closure.
pub fn iri_synonyms(iri: &str, rdfdoc: &Tripledict) -> BTreeSet<String> {
    let mut synonyms: BTreeSet<String> = rdfdoc
        .q_iris(iri, &vocab::owl("sameAs"))
        .filter(|synonym| crate::iri::is_worthwhile_iri(synonym))
        .map(str::to_string)
        .collect();
    synonyms.insert(iri.to_string());
    synonyms
}

pub fn iris_synonyms<'a>(
    iris: impl IntoIterator<Item = &'a str>,
    rdfdoc: &Tripledict,
) -> BTreeSet<String> {
    iris.into_iter()
        .flat_map(|iri| iri_synonyms(iri, rdfdoc))
        .collect()
}

/// Deduplicate a set of IRIs by their sufficiently-unique forms.
pub fn suffuniq_iris<'a>(iris: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let unique: BTreeSet<String> = iris
        .into_iter()
        .map(crate::iri::suffuniq_iri)
        .collect();
    unique.into_iter().collect()
}

#[derive(Debug)]
pub struct GraphWalk<'a> {
    pub rdfdoc: &'a Tripledict,
    pub focus_iri: String,
    pub iri_values: BTreeMap<Propertypath, BTreeSet<String>>,
    pub text_values: BTreeMap<Propertypath, BTreeSet<WalkedText>>,
    pub date_values: BTreeMap<Propertypath, BTreeSet<NaiveDate>>,
    pub integer_values: BTreeMap<Propertypath, BTreeSet<i64>>,
    pub paths_walked: BTreeSet<Propertypath>,
}

impl<'a> GraphWalk<'a> {
    pub fn new(rdfdoc: &'a Tripledict, focus_iri: &str) -> Self {
        Self::with_already_visiting(rdfdoc, focus_iri, BTreeSet::new())
    }

    /// A fresh walk from another subject in the same graph, with the
    /// original focus pre-marked as visiting so the walk stays local.
    pub fn shortwalk_from(&self, from_iri: &str) -> GraphWalk<'a> {
        let mut already_visiting = BTreeSet::new();
        already_visiting.insert(self.focus_iri.clone());
        Self::with_already_visiting(self.rdfdoc, from_iri, already_visiting)
    }

    fn with_already_visiting(
        rdfdoc: &'a Tripledict,
        focus_iri: &str,
        mut visiting: BTreeSet<String>,
    ) -> Self {
        let mut walk = GraphWalk {
            rdfdoc,
            focus_iri: focus_iri.to_string(),
            iri_values: BTreeMap::new(),
            text_values: BTreeMap::new(),
            date_values: BTreeMap::new(),
            integer_values: BTreeMap::new(),
            paths_walked: BTreeSet::new(),
        };
        walk.walk_from_subject(focus_iri, &[], &mut visiting);
        walk
    }

    /// Paths at which each IRI value was found, inverted from `iri_values`.
    pub fn paths_by_iri(&self) -> BTreeMap<String, BTreeSet<Propertypath>> {
        let mut paths_by_iri: BTreeMap<String, BTreeSet<Propertypath>> = BTreeMap::new();
        for (path, iris) in &self.iri_values {
            for iri in iris {
                paths_by_iri
                    .entry(iri.clone())
                    .or_default()
                    .insert(path.clone());
            }
        }
        paths_by_iri
    }

    fn walk_from_subject(
        &mut self,
        iri: &str,
        path_so_far: &[String],
        visiting: &mut BTreeSet<String>,
    ) {
        if visiting.contains(iri) {
            return;
        }
        visiting.insert(iri.to_string());
        if let Some(twoples) = self.rdfdoc.twoples(iri) {
            for (next_steps, obj) in flatten_twoples(twoples) {
                let mut path = path_so_far.to_vec();
                path.extend(next_steps);
                if should_skip_path(&path) {
                    continue;
                }
                self.record(&path, obj);
                if let RdfObject::Iri(object_iri) = obj {
                    let object_iri = object_iri.clone();
                    self.walk_from_subject(&object_iri, &path, visiting);
                }
            }
        }
        visiting.remove(iri);
    }

    fn record(&mut self, path: &[String], obj: &RdfObject) {
        self.paths_walked.insert(path.to_vec());
        match obj {
            RdfObject::Iri(iri) => {
                self.iri_values
                    .entry(path.to_vec())
                    .or_default()
                    .insert(iri.clone());
            }
            RdfObject::Literal {
                value,
                language,
                datatype_iris,
            } => {
                if datatype_iris.contains(&vocab::ns(vocab::XSD, "integer")) {
                    if let Ok(parsed) = value.parse::<i64>() {
                        self.integer_values
                            .entry(path.to_vec())
                            .or_default()
                            .insert(parsed);
                    }
                }
                if is_textlike(language, datatype_iris) {
                    self.text_values
                        .entry(path.to_vec())
                        .or_default()
                        .insert(WalkedText {
                            value: value.clone(),
                            language: language.clone(),
                        });
                }
            }
            RdfObject::Blanknode(_) => {}
        }
        // a literal at a date property also counts as a date, whatever
        // its datatype claims
        if let Some(last) = path.last() {
            if vocab::is_date_property(last) {
                if let Some(value) = obj.as_literal_value() {
                    match parse_date(value) {
                        Some(date) => {
                            self.date_values
                                .entry(path.to_vec())
                                .or_default()
                                .insert(date);
                        }
                        None => debug!(value, "skipping malformatted date"),
                    }
                }
            }
        }
    }
}

fn is_textlike(language: &Option<String>, datatype_iris: &BTreeSet<String>) -> bool {
    language.is_some()
        || datatype_iris.is_empty()
        || datatype_iris.contains(&vocab::rdf("string"))
        || datatype_iris.contains(&vocab::rdf("langString"))
}

/// Parse an ISO date, tolerating a datetime suffix.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_part = match value.find('T') {
        Some(pos) => &value[..pos],
        None => value,
    };
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Flatten a subject's twoples, stepping through blank nodes inline so each
/// yielded item is a (path-of-predicates, non-blanknode-or-leaf) pair.
pub fn flatten_twoples(twoples: &Twopledict) -> Vec<(Vec<String>, &RdfObject)> {
    let mut flattened = Vec::new();
    for (predicate, objects) in twoples {
        for obj in objects {
            match obj {
                RdfObject::Blanknode(inner) => {
                    for (inner_path, inner_obj) in flatten_twoples(inner) {
                        let mut full_path = vec![predicate.clone()];
                        full_path.extend(inner_path);
                        flattened.push((full_path, inner_obj));
                    }
                }
                _ => flattened.push((vec![predicate.clone()], obj)),
            }
        }
    }
    flattened
}
