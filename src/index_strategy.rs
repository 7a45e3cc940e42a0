//! Search documents and query execution.
//!
//! [`SourcedocBuilder`] flattens a (card, merged description, focus) into
//! the denormalized documents the search engine holds: one card document
//! plus one document per worthwhile IRI value found in the walk. The
//! in-memory engine then executes cardsearch and valuesearch against those
//! documents with the same boolean semantics the documents were built for.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cursor::{PageCursor, MANY_MORE};
use crate::error::{IndexStrategyError, SearchApiError};
use crate::iri::{is_worthwhile_iri, propertypath_as_keyword, suffuniq_iri};
use crate::rdf::Tripledict;
use crate::search::{
    is_globpath, CardsearchParams, DateValue, FilterOperator, SearchFilter, Textsegment,
    ValuesearchParams,
};
use crate::store::Indexcard;
use crate::vocab;
use crate::walk::{iri_synonyms, GraphWalk, Propertypath};

/// Stable map key for a property path.
pub fn path_key(path: &[String]) -> String {
    propertypath_as_keyword(path, false)
}

/// The denormalized search document for one card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardDoc {
    pub focus_exact_iris: BTreeSet<String>,
    pub focus_suffuniq_iris: BTreeSet<String>,
    pub propertypaths_present: BTreeSet<String>,
    /// path key → suffuniq IRIs (synonym-expanded) at that path.
    pub iri_by_propertypath: BTreeMap<String, BTreeSet<String>>,
    /// path depth → suffuniq IRIs at any path of that depth.
    pub iri_by_depth: BTreeMap<usize, BTreeSet<String>>,
    pub text_by_propertypath: BTreeMap<String, Vec<String>>,
    pub text_by_depth: BTreeMap<usize, Vec<String>>,
    pub date_by_propertypath: BTreeMap<String, BTreeSet<NaiveDate>>,
    pub int_by_propertypath: BTreeMap<String, BTreeSet<i64>>,
}

/// One document per IRI value reachable from the card's focus, carrying
/// what valuesearch needs to render a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IriValueDoc {
    pub iri: String,
    pub suffuniq_iri: String,
    pub at_propertypaths: BTreeSet<String>,
    pub type_iris: BTreeSet<String>,
    pub name_text: BTreeSet<String>,
    pub title_text: BTreeSet<String>,
    pub label_text: BTreeSet<String>,
}

/// Everything indexed for one card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardIndexDocs {
    pub card_id: Uuid,
    pub card: CardDoc,
    pub iri_values: Vec<IriValueDoc>,
}

/// One batch of work for the engine: index a card's documents, or delete
/// everything the engine holds for a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexActionset {
    Index(Box<CardIndexDocs>),
    Delete(Uuid),
}

pub struct SourcedocBuilder;

impl SourcedocBuilder {
    /// Build the actionset for a card. Cards with no namelike text are not
    /// worth surfacing in search results; they get a delete actionset so a
    /// previously indexed version disappears too.
    pub fn build_actionset(
        card: &Indexcard,
        focus_iri: &str,
        rdfdoc: &Tripledict,
    ) -> IndexActionset {
        if card.is_deleted() {
            return IndexActionset::Delete(card.id);
        }
        match Self::build_docs(card, focus_iri, rdfdoc) {
            Some(docs) => IndexActionset::Index(Box::new(docs)),
            None => IndexActionset::Delete(card.id),
        }
    }

    fn build_docs(card: &Indexcard, focus_iri: &str, rdfdoc: &Tripledict) -> Option<CardIndexDocs> {
        let walk = GraphWalk::new(rdfdoc, focus_iri);
        let namelike: BTreeSet<String> = vocab::namelike_properties().into_iter().collect();
        let has_namelike = walk
            .text_values
            .keys()
            .any(|path| path.last().is_some_and(|step| namelike.contains(step)));
        if !has_namelike {
            return None;
        }

        let mut doc = CardDoc::default();
        doc.focus_exact_iris.insert(focus_iri.to_string());
        doc.focus_exact_iris
            .extend(iri_synonyms(focus_iri, rdfdoc));
        doc.focus_suffuniq_iris = doc
            .focus_exact_iris
            .iter()
            .map(|iri| suffuniq_iri(iri))
            .collect();
        doc.propertypaths_present = walk.paths_walked.iter().map(|path| path_key(path)).collect();
        for (path, iris) in &walk.iri_values {
            let mut expanded: BTreeSet<String> = BTreeSet::new();
            for iri in iris {
                expanded.insert(suffuniq_iri(iri));
                for synonym in iri_synonyms(iri, rdfdoc) {
                    expanded.insert(suffuniq_iri(&synonym));
                }
            }
            doc.iri_by_depth
                .entry(path.len())
                .or_default()
                .extend(expanded.iter().cloned());
            doc.iri_by_propertypath.insert(path_key(path), expanded);
        }
        for (path, texts) in &walk.text_values {
            let values: Vec<String> = texts.iter().map(|text| text.value.clone()).collect();
            doc.text_by_depth
                .entry(path.len())
                .or_default()
                .extend(values.iter().cloned());
            doc.text_by_propertypath.insert(path_key(path), values);
        }
        for (path, dates) in &walk.date_values {
            doc.date_by_propertypath
                .insert(path_key(path), dates.clone());
        }
        for (path, integers) in &walk.integer_values {
            doc.int_by_propertypath
                .insert(path_key(path), integers.clone());
        }

        let mut iri_values = Vec::new();
        for (iri, paths) in walk.paths_by_iri() {
            if !is_worthwhile_iri(&iri) {
                continue;
            }
            let shortwalk = walk.shortwalk_from(&iri);
            let mut value_doc = IriValueDoc {
                iri: iri.clone(),
                suffuniq_iri: suffuniq_iri(&iri),
                at_propertypaths: paths.iter().map(|path| path_key(path)).collect(),
                type_iris: rdfdoc
                    .q_iris(&iri, &vocab::rdf("type"))
                    .map(str::to_string)
                    .collect(),
                ..Default::default()
            };
            for (path, texts) in &shortwalk.text_values {
                let Some(last) = path.last() else { continue };
                let target = if vocab::title_properties().contains(last) {
                    &mut value_doc.title_text
                } else if vocab::name_properties().contains(last) {
                    &mut value_doc.name_text
                } else if vocab::label_properties().contains(last) {
                    &mut value_doc.label_text
                } else {
                    continue;
                };
                target.extend(texts.iter().map(|text| text.value.clone()));
            }
            iri_values.push(value_doc);
        }

        Some(CardIndexDocs {
            card_id: card.id,
            card: doc,
            iri_values,
        })
    }
}

/// One page of cardsearch results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardsearchResponse {
    pub card_ids: Vec<Uuid>,
    /// Exact count, or [`MANY_MORE`].
    pub total_count: i64,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub first_cursor: Option<String>,
    /// Usage counts for the requested related paths, zero-initialized.
    pub related_propertypath_usage: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesearchResult {
    pub value_iri: Option<String>,
    pub value_date: Option<String>,
    pub match_count: i64,
    pub type_iris: Vec<String>,
    pub name_text: Vec<String>,
    pub title_text: Vec<String>,
    pub label_text: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesearchResponse {
    pub values: Vec<ValuesearchResult>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// In-memory search engine over [`CardIndexDocs`].
#[derive(Default, Clone)]
pub struct InMemoryIndexStrategy {
    docs: Arc<RwLock<BTreeMap<Uuid, CardIndexDocs>>>,
}

impl InMemoryIndexStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn apply_actionset(
        &self,
        actionset: IndexActionset,
    ) -> Result<(), IndexStrategyError> {
        let mut docs = self.docs.write().await;
        match actionset {
            IndexActionset::Index(card_docs) => {
                docs.insert(card_docs.card_id, *card_docs);
            }
            IndexActionset::Delete(card_id) => {
                docs.remove(&card_id);
            }
        }
        Ok(())
    }

    pub async fn indexed_count(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn cardsearch(
        &self,
        params: &CardsearchParams,
        related_propertypaths: &[Propertypath],
    ) -> Result<CardsearchResponse, SearchApiError> {
        let docs = self.docs.read().await;
        let mut matched: Vec<(Uuid, &CardDoc)> = docs
            .values()
            .filter(|card_docs| {
                matches_filters(&card_docs.card, &params.cardsearch_filters)
                    && matches_textsegments(&card_docs.card, &params.cardsearch_textsegments)
            })
            .map(|card_docs| (card_docs.card_id, &card_docs.card))
            .collect();

        let mut usage: BTreeMap<String, i64> = related_propertypaths
            .iter()
            .map(|path| (path_key(path), 0))
            .collect();
        for (_, card) in &matched {
            for path in related_propertypaths {
                if card.propertypaths_present.contains(&path_key(path)) {
                    if let Some(count) = usage.get_mut(&path_key(path)) {
                        *count += 1;
                    }
                }
            }
        }

        let relevance_matters =
            params.sort.is_none() && !params.cardsearch_textsegments.is_empty();
        let random_sampling = params.sort.is_none() && params.cardsearch_textsegments.is_empty();

        let mut cursor = match &params.page.cursor {
            Some(encoded) => PageCursor::decode(encoded)?,
            None => {
                let page_size = params.page.size_or_default().max(1) as usize;
                if random_sampling {
                    PageCursor::new_sample(page_size)
                } else {
                    PageCursor::new_offset(page_size)
                }
            }
        };
        if !cursor.is_valid() {
            return Err(SearchApiError::Cursor(
                crate::error::CursorError::InvalidPageCursor,
            ));
        }

        if let Some(sort) = &params.sort {
            sort_by_date_property(&mut matched, sort.descending, &sort.property_iri);
        } else if relevance_matters {
            sort_by_relevance(&mut matched, &params.cardsearch_textsegments);
        }

        let page_ids: Vec<Uuid> = if random_sampling {
            sample_page(&matched, &mut cursor)
        } else {
            cursor.set_total_count(matched.len() as i64);
            matched
                .iter()
                .skip(cursor.start_offset())
                .take(cursor.bounded_page_size())
                .map(|(id, _)| *id)
                .collect()
        };

        Ok(CardsearchResponse {
            card_ids: page_ids,
            total_count: cursor.total_count(),
            next_cursor: cursor.next_cursor().map(|c| c.encode()),
            prev_cursor: cursor.prev_cursor().map(|c| c.encode()),
            first_cursor: (!cursor.is_first_page())
                .then(|| cursor.first_cursor())
                .flatten()
                .map(|c| c.encode()),
            related_propertypath_usage: usage,
        })
    }

    pub async fn valuesearch(
        &self,
        params: &ValuesearchParams,
    ) -> Result<ValuesearchResponse, SearchApiError> {
        let docs = self.docs.read().await;
        let matched: Vec<&CardIndexDocs> = docs
            .values()
            .filter(|card_docs| {
                matches_filters(&card_docs.card, &params.cardsearch.cardsearch_filters)
                    && matches_textsegments(
                        &card_docs.card,
                        &params.cardsearch.cardsearch_textsegments,
                    )
            })
            .collect();

        let is_date_valuesearch = params
            .valuesearch_propertypath
            .last()
            .is_some_and(|step| vocab::is_date_property(step));
        if is_date_valuesearch {
            return Ok(self.valuesearch_dates(&matched, params));
        }
        self.valuesearch_iris(&matched, params)
    }

    /// Calendar-year buckets, descending, zero-count years omitted; date
    /// valuesearch has no cursor.
    fn valuesearch_dates(
        &self,
        matched: &[&CardIndexDocs],
        params: &ValuesearchParams,
    ) -> ValuesearchResponse {
        let key = path_key(&params.valuesearch_propertypath);
        let mut counts: BTreeMap<i32, i64> = BTreeMap::new();
        for card_docs in matched {
            let years: BTreeSet<i32> = card_docs
                .card
                .date_by_propertypath
                .get(&key)
                .into_iter()
                .flatten()
                .map(|date| date.year())
                .collect();
            for year in years {
                *counts.entry(year).or_insert(0) += 1;
            }
        }
        let values = counts
            .into_iter()
            .rev()
            .filter(|(_, count)| *count > 0)
            .map(|(year, count)| ValuesearchResult {
                value_iri: None,
                value_date: Some(year.to_string()),
                match_count: count,
                type_iris: Vec::new(),
                name_text: Vec::new(),
                title_text: Vec::new(),
                label_text: Vec::new(),
            })
            .collect();
        ValuesearchResponse {
            values,
            next_cursor: None,
            prev_cursor: None,
        }
    }

    fn valuesearch_iris(
        &self,
        matched: &[&CardIndexDocs],
        params: &ValuesearchParams,
    ) -> Result<ValuesearchResponse, SearchApiError> {
        let key = path_key(&params.valuesearch_propertypath);
        let mut counts: BTreeMap<String, (i64, &IriValueDoc)> = BTreeMap::new();
        for card_docs in matched {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            for value_doc in &card_docs.iri_values {
                if !value_doc.at_propertypaths.contains(&key) {
                    continue;
                }
                if !matches_valuesearch_text(value_doc, &params.valuesearch_textsegments) {
                    continue;
                }
                if !matches_valuesearch_filters(value_doc, &params.valuesearch_filters) {
                    continue;
                }
                if !seen.insert(&value_doc.suffuniq_iri) {
                    continue;
                }
                counts
                    .entry(value_doc.suffuniq_iri.clone())
                    .and_modify(|(count, _)| *count += 1)
                    .or_insert((1, value_doc));
            }
        }
        let mut buckets: Vec<(&String, &(i64, &IriValueDoc))> = counts.iter().collect();
        buckets.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then_with(|| a.0.cmp(b.0)));

        let mut cursor = match &params.cardsearch.page.cursor {
            Some(encoded) => PageCursor::decode(encoded)?,
            None => PageCursor::new_offset(params.cardsearch.page.size_or_default().max(1) as usize),
        };
        // fetch offset+size+1 buckets so next-page existence is known
        // without an exact total
        let fetch_count = cursor.start_offset() + cursor.bounded_page_size() + 1;
        let fetched: Vec<_> = buckets.into_iter().take(fetch_count).collect();
        let has_next = fetched.len() == fetch_count;
        cursor.set_total_count(if has_next {
            MANY_MORE
        } else {
            fetched.len() as i64
        });
        let values = fetched
            .into_iter()
            .skip(cursor.start_offset())
            .take(cursor.bounded_page_size())
            .map(|(_, (count, value_doc))| ValuesearchResult {
                value_iri: Some(value_doc.iri.clone()),
                value_date: None,
                match_count: *count,
                type_iris: value_doc.type_iris.iter().cloned().collect(),
                name_text: value_doc.name_text.iter().cloned().collect(),
                title_text: value_doc.title_text.iter().cloned().collect(),
                label_text: value_doc.label_text.iter().cloned().collect(),
            })
            .collect();
        Ok(ValuesearchResponse {
            values,
            next_cursor: has_next
                .then(|| cursor.next_cursor())
                .flatten()
                .map(|c| c.encode()),
            prev_cursor: cursor.prev_cursor().map(|c| c.encode()),
        })
    }

    /// Usage counts for candidate filter properties under the current
    /// cardsearch, from the propertypaths-present aggregation.
    pub async fn propertysearch(
        &self,
        params: &CardsearchParams,
        candidate_paths: &[Propertypath],
    ) -> Result<BTreeMap<String, i64>, SearchApiError> {
        let response = self.cardsearch_usage(params, candidate_paths).await?;
        Ok(response)
    }

    async fn cardsearch_usage(
        &self,
        params: &CardsearchParams,
        candidate_paths: &[Propertypath],
    ) -> Result<BTreeMap<String, i64>, SearchApiError> {
        let docs = self.docs.read().await;
        let mut usage: BTreeMap<String, i64> = candidate_paths
            .iter()
            .map(|path| (path_key(path), 0))
            .collect();
        for card_docs in docs.values() {
            if !matches_filters(&card_docs.card, &params.cardsearch_filters)
                || !matches_textsegments(&card_docs.card, &params.cardsearch_textsegments)
            {
                continue;
            }
            for path in candidate_paths {
                if card_docs
                    .card
                    .propertypaths_present
                    .contains(&path_key(path))
                {
                    if let Some(count) = usage.get_mut(&path_key(path)) {
                        *count += 1;
                    }
                }
            }
        }
        Ok(usage)
    }
}

/// Serve one page of a reproducible random sample.
///
/// The first page shuffles fresh and records the served ids in the cursor;
/// later pages exclude those ids and order the rest by a deterministic
/// digest seeded from the recorded ids, so the same cursor always yields
/// the same page. Returning to the first page re-applies the recorded ids
/// in their original order.
fn sample_page(matched: &[(Uuid, &CardDoc)], cursor: &mut PageCursor) -> Vec<Uuid> {
    cursor.set_total_count(matched.len() as i64);
    let page_size = cursor.bounded_page_size();
    if cursor.is_first_page() {
        if cursor.first_page_ids().is_empty() {
            let mut ids: Vec<Uuid> = matched.iter().map(|(id, _)| *id).collect();
            ids.shuffle(&mut rand::thread_rng());
            ids.truncate(page_size);
            cursor.set_first_page_ids(ids.iter().map(Uuid::to_string).collect());
            return ids;
        }
        // revisit: reproduce the recorded first page exactly
        let matched_ids: BTreeSet<Uuid> = matched.iter().map(|(id, _)| *id).collect();
        return cursor
            .first_page_ids()
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .filter(|id| matched_ids.contains(id))
            .collect();
    }
    let excluded: BTreeSet<&str> = cursor
        .first_page_ids()
        .iter()
        .map(String::as_str)
        .collect();
    let seed: String = cursor.first_page_ids().concat();
    let mut rest: Vec<(u64, Uuid)> = matched
        .iter()
        .map(|(id, _)| *id)
        .filter(|id| !excluded.contains(id.to_string().as_str()))
        .map(|id| (deterministic_score(&seed, &id.to_string()), id))
        .collect();
    rest.sort();
    // the recorded first page is excluded from the stream, so offsets
    // shift back by its length
    let offset = cursor.start_offset().saturating_sub(excluded.len());
    rest.into_iter()
        .skip(offset)
        .take(page_size)
        .map(|(_, id)| id)
        .collect()
}

fn deterministic_score(seed: &str, doc_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    hasher.update(doc_id.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

fn matches_filters(card: &CardDoc, filters: &[SearchFilter]) -> bool {
    filters.iter().all(|filter| matches_filter(card, filter))
}

fn matches_filter(card: &CardDoc, filter: &SearchFilter) -> bool {
    match filter.operator {
        FilterOperator::AnyOf => iri_filter_hits(card, filter),
        FilterOperator::NoneOf => !iri_filter_hits(card, filter),
        FilterOperator::IsPresent => path_present(card, &filter.propertypath),
        FilterOperator::IsAbsent => !path_present(card, &filter.propertypath),
        FilterOperator::Before => {
            let Some(bound) = filter_date_floor(filter) else {
                return false;
            };
            dates_at_path(card, &filter.propertypath).any(|date| date < bound)
        }
        FilterOperator::After => {
            let Some(bound) = filter_date_ceiling(filter) else {
                return false;
            };
            dates_at_path(card, &filter.propertypath).any(|date| date > bound)
        }
        FilterOperator::AtDate => filter.value_set.iter().any(|value| {
            DateValue::parse(value).is_ok_and(|parsed| {
                dates_at_path(card, &filter.propertypath)
                    .any(|date| date >= parsed.floor && date <= parsed.ceiling)
            })
        }),
    }
}

/// `before` compares against the earliest instant of the least value,
/// so `before=2024` means strictly before 2024-01-01.
fn filter_date_floor(filter: &SearchFilter) -> Option<NaiveDate> {
    let least = filter.value_set.iter().min()?;
    DateValue::parse(least).ok().map(|parsed| parsed.floor)
}

/// `after` compares against the last instant of the greatest value.
fn filter_date_ceiling(filter: &SearchFilter) -> Option<NaiveDate> {
    let greatest = filter.value_set.iter().max()?;
    DateValue::parse(greatest).ok().map(|parsed| parsed.ceiling)
}

fn dates_at_path<'a>(
    card: &'a CardDoc,
    path: &[String],
) -> impl Iterator<Item = NaiveDate> + 'a {
    card.date_by_propertypath
        .get(&path_key(path))
        .into_iter()
        .flatten()
        .copied()
}

fn path_present(card: &CardDoc, path: &[String]) -> bool {
    if is_globpath(path) {
        let depth = path.len();
        return card
            .iri_by_depth
            .contains_key(&depth)
            || card.text_by_depth.contains_key(&depth);
    }
    card.propertypaths_present.contains(&path_key(path))
}

fn iri_filter_hits(card: &CardDoc, filter: &SearchFilter) -> bool {
    let wanted: BTreeSet<String> = filter
        .value_set
        .iter()
        .map(|value| suffuniq_iri(value))
        .collect();
    if filter.is_sameas_filter() {
        return card
            .focus_suffuniq_iris
            .iter()
            .any(|iri| wanted.contains(iri));
    }
    let present: Option<&BTreeSet<String>> = if is_globpath(&filter.propertypath) {
        card.iri_by_depth.get(&filter.propertypath.len())
    } else {
        card.iri_by_propertypath.get(&path_key(&filter.propertypath))
    };
    present
        .map(|iris| iris.iter().any(|iri| wanted.contains(iri)))
        .unwrap_or(false)
}

fn card_texts(card: &CardDoc) -> impl Iterator<Item = &String> {
    card.text_by_propertypath.values().flatten()
}

fn matches_textsegments(card: &CardDoc, segments: &BTreeSet<Textsegment>) -> bool {
    segments.iter().all(|segment| {
        let hit = if segment.is_fuzzy {
            card_texts(card).any(|text| fuzzy_match(text, segment))
        } else {
            card_texts(card).any(|text| phrase_match(text, &segment.text))
        };
        if segment.is_negated {
            !hit
        } else {
            hit
        }
    })
}

fn phrase_match(text: &str, phrase: &str) -> bool {
    text.to_lowercase().contains(&phrase.to_lowercase())
}

fn fuzzy_match(text: &str, segment: &Textsegment) -> bool {
    let haystack = text.to_lowercase();
    segment
        .words()
        .iter()
        .all(|word| haystack.contains(&word.to_lowercase()))
}

fn matches_valuesearch_text(value_doc: &IriValueDoc, segments: &BTreeSet<Textsegment>) -> bool {
    if segments.is_empty() {
        return true;
    }
    let texts: Vec<&String> = value_doc
        .name_text
        .iter()
        .chain(&value_doc.title_text)
        .chain(&value_doc.label_text)
        .collect();
    segments.iter().all(|segment| {
        let hit = if segment.is_fuzzy {
            texts.iter().any(|text| fuzzy_match(text, segment))
        } else {
            texts.iter().any(|text| phrase_match(text, &segment.text))
        };
        if segment.is_negated {
            !hit
        } else {
            hit
        }
    })
}

/// Valuesearch filters narrow the candidate values themselves: a
/// `resourceType` filter checks a value's own types, `sameAs` its identity.
fn matches_valuesearch_filters(value_doc: &IriValueDoc, filters: &[SearchFilter]) -> bool {
    filters.iter().all(|filter| match filter.operator {
        FilterOperator::AnyOf => value_filter_hits(value_doc, filter),
        FilterOperator::NoneOf => !value_filter_hits(value_doc, filter),
        FilterOperator::IsPresent => value_doc
            .at_propertypaths
            .contains(&path_key(&filter.propertypath)),
        FilterOperator::IsAbsent => !value_doc
            .at_propertypaths
            .contains(&path_key(&filter.propertypath)),
        // value docs carry no dates
        _ => false,
    })
}

fn value_filter_hits(value_doc: &IriValueDoc, filter: &SearchFilter) -> bool {
    let wanted: BTreeSet<String> = filter
        .value_set
        .iter()
        .map(|value| suffuniq_iri(value))
        .collect();
    if filter.is_sameas_filter() {
        return wanted.contains(&value_doc.suffuniq_iri);
    }
    if filter
        .propertypath
        .last()
        .is_some_and(|step| step == &vocab::rdf("type"))
    {
        return value_doc
            .type_iris
            .iter()
            .any(|iri| wanted.contains(&suffuniq_iri(iri)));
    }
    false
}

fn sort_by_date_property(
    matched: &mut [(Uuid, &CardDoc)],
    descending: bool,
    property_iri: &str,
) {
    let key = path_key(&[property_iri.to_string()]);
    matched.sort_by(|(a_id, a), (b_id, b)| {
        let a_date = a.date_by_propertypath.get(&key).and_then(|dates| {
            if descending {
                dates.iter().max()
            } else {
                dates.iter().min()
            }
        });
        let b_date = b.date_by_propertypath.get(&key).and_then(|dates| {
            if descending {
                dates.iter().max()
            } else {
                dates.iter().min()
            }
        });
        // missing dates sort last either direction
        let ordering = match (a_date, b_date) {
            (Some(a_date), Some(b_date)) => {
                if descending {
                    b_date.cmp(a_date)
                } else {
                    a_date.cmp(b_date)
                }
            }
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        ordering.then_with(|| a_id.cmp(b_id))
    });
}

fn sort_by_relevance(matched: &mut [(Uuid, &CardDoc)], segments: &BTreeSet<Textsegment>) {
    let scores: Vec<(Uuid, i64)> = matched
        .iter()
        .map(|(id, card)| (*id, relevance_score(card, segments)))
        .collect();
    let score_of = |id: &Uuid| {
        scores
            .iter()
            .find(|(scored_id, _)| scored_id == id)
            .map(|(_, score)| *score)
            .unwrap_or(0)
    };
    matched.sort_by(|(a_id, _), (b_id, _)| {
        score_of(b_id).cmp(&score_of(a_id)).then_with(|| a_id.cmp(b_id))
    });
}

/// Fuzzy word hits count once per matching text; an exact phrase hit on a
/// fuzzy multi-word segment counts extra (phrase proximity boost).
fn relevance_score(card: &CardDoc, segments: &BTreeSet<Textsegment>) -> i64 {
    let mut score = 0;
    for segment in segments {
        if segment.is_negated {
            continue;
        }
        for text in card_texts(card) {
            if segment.is_fuzzy {
                if fuzzy_match(text, segment) {
                    score += 1;
                    if segment.words().len() > 1 && phrase_match(text, &segment.text) {
                        score += 1;
                    }
                }
            } else if phrase_match(text, &segment.text) {
                score += 1;
            }
        }
    }
    score
}
