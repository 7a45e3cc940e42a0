//! Flat JSON deriver.
//!
//! Renders a resource description as the flat, search-engine-friendly JSON
//! document older downstream consumers index: single-valued date and string
//! fields, related-agent name lists, subject lineages, and a nested `lists`
//! section for rendering search results.

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::derive::{focustype_disallowed, DeriveInput, Deriver};
use crate::rdf::{RdfObject, Tripledict};
use crate::vocab;

pub struct FlatDeriver;

impl Deriver for FlatDeriver {
    fn deriver_iri(&self) -> String {
        vocab::sharev2("sharev2_elastic")
    }

    fn derived_datatype_iris(&self) -> Vec<String> {
        vec![vocab::rdf("JSON")]
    }

    fn should_skip(&self, input: &DeriveInput<'_>) -> bool {
        focustype_disallowed(input.focus_iri, input.rdfdoc)
    }

    fn derive_card_as_text(&self, input: &DeriveInput<'_>) -> Result<String> {
        let doc = FlatDoc {
            rdfdoc: input.rdfdoc,
            focus_iri: input.focus_iri,
        };
        let source_name = input.card.source_label.as_str();
        let (subjects, subject_synonyms) = doc.subjects_and_synonyms(source_name);
        let derived = json!({
            // bookkeeping about the record in this system
            "id": input.card.id.to_string(),
            "date_created": input.card.created_at.to_rfc3339(),
            "date_modified": input.card.modified_at.to_rfc3339(),
            "sources": [source_name],
            "source_config": source_name,
            "source_unique_id": input.card.source_identifier,
            // metadata about the resource in some other system
            "type": doc.single_type(input.focus_iri),
            "types": doc.type_list(input.focus_iri),
            "date": doc.single_date(&[
                vocab::dcterms("date"),
                vocab::dcterms("created"),
                vocab::dcterms("modified"),
            ]),
            "date_published": doc.single_date(&[vocab::dcterms("created"), vocab::dcterms("date")]),
            "date_updated": doc.single_date(&[vocab::dcterms("modified"), vocab::dcterms("date")]),
            "description": doc.single_string(&[vocab::dcterms("description")]),
            "justification": doc.single_string(&[vocab::osfmap("withdrawalJustification")]),
            "language": doc.single_string(&[vocab::dcterms("language")]),
            "registration_type": doc.single_string(&[vocab::osfmap("registration_type")]),
            "retracted": doc.has_value(&vocab::osfmap("dateWithdrawn")),
            "title": doc.single_string(&[vocab::dcterms("title")]),
            "withdrawn": doc.has_value(&vocab::osfmap("dateWithdrawn")),
            "identifiers": doc.string_list(&[vocab::dcterms("identifier")]),
            "tags": doc.string_list(&[vocab::osfmap("keyword")]),
            "subjects": subjects,
            "subject_synonyms": subject_synonyms,
            // related names
            "affiliations": doc.related_names(&[vocab::osfmap("affiliatedInstitution")]),
            "contributors": doc.related_names(&[vocab::dcterms("contributor"), vocab::dcterms("creator")]),
            "funders": doc.related_names(&[vocab::osfmap("funder")]),
            "publishers": doc.related_names(&[vocab::dcterms("publisher")]),
            "hosts": doc.related_names(&[vocab::ns(vocab::DCAT, "accessService")]),
            "osf_related_resource_types": doc.osf_related_resource_types(),
            // nested records used mostly for rendering search results
            "lists": {
                "affiliations": doc.related_agent_list(&[vocab::osfmap("affiliatedInstitution")]),
                "contributors": doc.related_agent_list(&[vocab::dcterms("contributor"), vocab::dcterms("creator")]),
                "funders": doc.related_agent_list(&[vocab::osfmap("funder")]),
                "publishers": doc.related_agent_list(&[vocab::dcterms("publisher")]),
                "hosts": doc.related_agent_list(&[vocab::ns(vocab::DCAT, "accessService")]),
                "lineage": doc.work_lineage_list(input.focus_iri, &mut Vec::new()),
            },
        });
        // serde_json's default map keeps keys sorted
        Ok(serde_json::to_string(&strip_empty_values(derived))?)
    }
}

/// Values equivalent to absence for indexing purposes: null, empty string,
/// empty list.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn strip_empty_values(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !is_empty_value(v))
                .map(|(k, v)| (k, strip_empty_values(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !is_empty_value(v))
                .map(strip_empty_values)
                .collect(),
        ),
        other => other,
    }
}

struct FlatDoc<'a> {
    rdfdoc: &'a Tripledict,
    focus_iri: &'a str,
}

impl<'a> FlatDoc<'a> {
    fn single_value(&self, predicates: &[String], focus_iri: &str) -> Option<&'a RdfObject> {
        for predicate in predicates {
            if let Some(object) = self.rdfdoc.q_one(focus_iri, predicate) {
                return Some(object);
            }
        }
        None
    }

    fn single_string_at(&self, predicates: &[String], focus_iri: &str) -> Option<String> {
        self.single_value(predicates, focus_iri)
            .and_then(object_to_string)
    }

    fn single_string(&self, predicates: &[String]) -> Option<String> {
        self.single_string_at(predicates, self.focus_iri)
    }

    fn single_date(&self, predicates: &[String]) -> Option<String> {
        self.single_string(predicates)
    }

    fn has_value(&self, predicate: &str) -> bool {
        self.rdfdoc.q_one(self.focus_iri, predicate).is_some()
    }

    fn string_list_at(&self, predicates: &[String], focus_iri: &str) -> Vec<String> {
        let mut values: Vec<String> = predicates
            .iter()
            .flat_map(|predicate| self.rdfdoc.q(focus_iri, predicate))
            .filter_map(object_to_string)
            .collect();
        values.sort();
        values
    }

    fn string_list(&self, predicates: &[String]) -> Vec<String> {
        self.string_list_at(predicates, self.focus_iri)
    }

    /// Names one hop out through `foaf:name`, in document order.
    fn related_names(&self, predicates: &[String]) -> Vec<String> {
        let mut names = Vec::new();
        for predicate in predicates {
            for object in self.rdfdoc.q(self.focus_iri, predicate) {
                match object {
                    RdfObject::Iri(iri) => names.extend(
                        self.rdfdoc
                            .q_literals(iri, &vocab::foaf("name"))
                            .map(str::to_string),
                    ),
                    RdfObject::Blanknode(twoples) => {
                        if let Some(objects) = twoples.get(&vocab::foaf("name")) {
                            names.extend(
                                objects
                                    .iter()
                                    .filter_map(RdfObject::as_literal_value)
                                    .map(str::to_string),
                            );
                        }
                    }
                    RdfObject::Literal { .. } => {}
                }
            }
        }
        names
    }

    fn osf_related_resource_types(&self) -> Value {
        let artifact_types = [
            ("analytic_code", vocab::osfmap("hasAnalyticCodeResource")),
            ("data", vocab::osfmap("hasDataResource")),
            ("materials", vocab::osfmap("hasMaterialsResource")),
            ("papers", vocab::osfmap("hasPapersResource")),
            ("supplements", vocab::osfmap("hasSupplementalResource")),
        ];
        let mut map = Map::new();
        for (key, predicate) in artifact_types {
            map.insert(key.to_string(), Value::Bool(self.has_value(&predicate)));
        }
        Value::Object(map)
    }

    fn related_agent_list(&self, predicates: &[String]) -> Vec<Value> {
        let mut agents = Vec::new();
        for predicate in predicates {
            for agent_iri in self.rdfdoc.q_iris(self.focus_iri, predicate) {
                agents.push(self.related_agent(predicate, agent_iri));
            }
        }
        agents
    }

    fn related_agent(&self, relation_iri: &str, agent_iri: &str) -> Value {
        let name = self.single_string_at(&[vocab::foaf("name")], agent_iri);
        json!({
            "type": self.single_type(agent_iri),
            "types": self.type_list(agent_iri),
            "name": name,
            "identifiers": self.string_list_at(&[vocab::dcterms("identifier")], agent_iri),
            "relation": format_type_iri(relation_iri),
            "cited_as": name,
        })
    }

    /// Best single type name for a focus, preferring well-known work types.
    fn single_type(&self, focus_iri: &str) -> Option<String> {
        let type_iris: Vec<&str> = self.rdfdoc.q_iris(focus_iri, &vocab::rdf("type")).collect();
        for type_iri in &type_iris {
            if let Some(local) = vocab::iri_minus_namespace(type_iri, vocab::SHAREV2) {
                return Some(format_typename(local));
            }
        }
        for type_iri in &type_iris {
            if let Some(local) = vocab::iri_minus_namespace(type_iri, vocab::OSFMAP) {
                let local = match local {
                    "RegistrationComponent" => "Registration",
                    "ProjectComponent" => "Project",
                    other => other,
                };
                return Some(format_typename(local));
            }
        }
        None
    }

    fn type_list(&self, focus_iri: &str) -> Vec<String> {
        let mut types: Vec<String> = self
            .rdfdoc
            .q_iris(focus_iri, &vocab::rdf("type"))
            .filter(|iri| {
                iri.starts_with(vocab::SHAREV2) || iri.starts_with(vocab::OSFMAP)
            })
            .map(format_type_iri)
            .collect();
        types.sort();
        types
    }

    /// Ancestors-first lineage via `dcterms:isPartOf`, cycle-safe.
    fn work_lineage_list(&self, work_iri: &str, visiting: &mut Vec<String>) -> Vec<Value> {
        let parent = self
            .single_value(&[vocab::dcterms("isPartOf")], work_iri)
            .and_then(RdfObject::as_iri);
        match parent {
            Some(parent_iri) if !visiting.iter().any(|seen| seen == parent_iri) => {
                visiting.push(parent_iri.to_string());
                let mut lineage = self.work_lineage_list(parent_iri, visiting);
                lineage.push(self.work_lineage_item(parent_iri));
                lineage
            }
            _ => Vec::new(),
        }
    }

    fn work_lineage_item(&self, work_iri: &str) -> Value {
        json!({
            "type": self.single_type(work_iri),
            "types": self.type_list(work_iri),
            "title": self.single_string_at(&[vocab::dcterms("title")], work_iri),
            "identifiers": self.string_list_at(&[vocab::dcterms("identifier")], work_iri),
        })
    }

    /// Pipe-delimited subject lineages: source-specific alt-label lineages
    /// become subjects (with the pref-label lineage as a synonym), otherwise
    /// the pref-label lineage stands alone under the `bepress` taxonomy.
    fn subjects_and_synonyms(&self, source_name: &str) -> (Vec<String>, Vec<String>) {
        let mut subjects = Vec::new();
        let mut synonyms = Vec::new();
        for subject_iri in self.rdfdoc.q_iris(self.focus_iri, &vocab::dcterms("subject")) {
            let pref_lineage =
                self.subject_lineage(subject_iri, &vocab::skos("prefLabel"), &mut Vec::new());
            let alt_lineage =
                self.subject_lineage(subject_iri, &vocab::skos("altLabel"), &mut Vec::new());
            if !alt_lineage.is_empty() {
                subjects.push(serialize_subject(source_name, &alt_lineage));
                if !pref_lineage.is_empty() {
                    synonyms.push(serialize_subject("bepress", &pref_lineage));
                }
            } else if !pref_lineage.is_empty() {
                subjects.push(serialize_subject("bepress", &pref_lineage));
            }
        }
        (subjects, synonyms)
    }

    fn subject_lineage(
        &self,
        subject_iri: &str,
        label_predicate: &str,
        visiting: &mut Vec<String>,
    ) -> Vec<String> {
        visiting.push(subject_iri.to_string());
        let Some(label) = self.rdfdoc.q_literals(subject_iri, label_predicate).next() else {
            return Vec::new();
        };
        let parent = self
            .rdfdoc
            .q_iris(subject_iri, &vocab::skos("broader"))
            .next();
        match parent {
            Some(parent_iri) if !visiting.iter().any(|seen| seen == parent_iri) => {
                let mut lineage =
                    self.subject_lineage(parent_iri, label_predicate, visiting);
                lineage.push(label.to_string());
                lineage
            }
            _ => vec![label.to_string()],
        }
    }
}

fn serialize_subject(taxonomy_name: &str, lineage: &[String]) -> String {
    let mut parts = vec![taxonomy_name.to_string()];
    parts.extend(lineage.iter().cloned());
    parts.join("|")
}

fn object_to_string(object: &RdfObject) -> Option<String> {
    match object {
        RdfObject::Iri(iri) => Some(iri.clone()),
        RdfObject::Literal { value, .. } => Some(value.clone()),
        RdfObject::Blanknode(_) => None,
    }
}

fn format_type_iri(iri: &str) -> String {
    if let Some(local) = vocab::iri_minus_namespace(iri, vocab::SHAREV2) {
        return format_typename(local);
    }
    if let Some(local) = vocab::iri_minus_namespace(iri, vocab::OSFMAP) {
        return format_typename(local);
    }
    iri.to_string()
}

/// PascalCase to lower case with spaces between words.
fn format_typename(typename: &str) -> String {
    let mut spaced = String::with_capacity(typename.len() + 4);
    let mut previous_is_word = false;
    for ch in typename.chars() {
        if ch.is_uppercase() && previous_is_word {
            spaced.push(' ');
        }
        previous_is_word = ch.is_alphanumeric();
        spaced.push(ch);
    }
    spaced.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Indexcard;
    use chrono::Utc;
    use uuid::Uuid;

    fn card() -> Indexcard {
        Indexcard {
            id: Uuid::new_v4(),
            source_label: "some-source".to_string(),
            source_identifier: "rec-1".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn registration_doc() -> Tripledict {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w1";
        doc.add(w, vocab::rdf("type"), RdfObject::iri(vocab::osfmap("Registration")));
        doc.add(w, vocab::dcterms("title"), RdfObject::literal("A Registration"));
        doc.add(w, vocab::dcterms("created"), RdfObject::literal("2024-01-02"));
        doc.add(w, vocab::dcterms("modified"), RdfObject::literal("2024-03-04"));
        doc.add(
            w,
            vocab::dcterms("creator"),
            RdfObject::iri("https://example.org/p1"),
        );
        doc.add(
            "https://example.org/p1",
            vocab::rdf("type"),
            RdfObject::iri(vocab::sharev2("Person")),
        );
        doc.add(
            "https://example.org/p1",
            vocab::foaf("name"),
            RdfObject::literal("Some Person"),
        );
        doc.add(w, vocab::osfmap("keyword"), RdfObject::literal("zebra"));
        doc.add(w, vocab::osfmap("keyword"), RdfObject::literal("aardvark"));
        doc
    }

    fn derive(doc: &Tripledict) -> Value {
        let card = card();
        let input = DeriveInput {
            card: &card,
            focus_iri: "https://example.org/w1",
            rdfdoc: doc,
        };
        let text = FlatDeriver.derive_card_as_text(&input).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_flat_fields() {
        let derived = derive(&registration_doc());
        assert_eq!(derived["title"], "A Registration");
        assert_eq!(derived["type"], "registration");
        assert_eq!(derived["types"], json!(["registration"]));
        assert_eq!(derived["date"], "2024-01-02");
        assert_eq!(derived["date_published"], "2024-01-02");
        assert_eq!(derived["date_updated"], "2024-03-04");
        assert_eq!(derived["tags"], json!(["aardvark", "zebra"]));
        assert_eq!(derived["contributors"], json!(["Some Person"]));
        assert_eq!(derived["sources"], json!(["some-source"]));
    }

    #[test]
    fn test_empty_values_stripped() {
        let derived = derive(&registration_doc());
        // no description, no identifiers: keys absent rather than null/empty
        assert!(derived.get("description").is_none());
        assert!(derived.get("identifiers").is_none());
        // booleans survive stripping
        assert_eq!(derived["retracted"], false);
        assert_eq!(derived["withdrawn"], false);
    }

    #[test]
    fn test_nested_contributor_record() {
        let derived = derive(&registration_doc());
        let contributors = derived["lists"]["contributors"].as_array().unwrap();
        assert_eq!(contributors.len(), 1);
        assert_eq!(contributors[0]["name"], "Some Person");
        assert_eq!(contributors[0]["cited_as"], "Some Person");
        assert_eq!(contributors[0]["type"], "person");
    }

    #[test]
    fn test_lineage_follows_is_part_of() {
        let mut doc = registration_doc();
        doc.add(
            "https://example.org/w1",
            vocab::dcterms("isPartOf"),
            RdfObject::iri("https://example.org/parent"),
        );
        doc.add(
            "https://example.org/parent",
            vocab::rdf("type"),
            RdfObject::iri(vocab::osfmap("Project")),
        );
        doc.add(
            "https://example.org/parent",
            vocab::dcterms("title"),
            RdfObject::literal("The Project"),
        );
        let derived = derive(&doc);
        let lineage = derived["lists"]["lineage"].as_array().unwrap();
        assert_eq!(lineage.len(), 1);
        assert_eq!(lineage[0]["title"], "The Project");
        assert_eq!(lineage[0]["type"], "project");
    }

    #[test]
    fn test_subject_lineages() {
        let mut doc = registration_doc();
        let subject = "https://example.org/subjects/biology";
        let parent = "https://example.org/subjects/science";
        doc.add(
            "https://example.org/w1",
            vocab::dcterms("subject"),
            RdfObject::iri(subject),
        );
        doc.add(subject, vocab::skos("prefLabel"), RdfObject::literal("Biology"));
        doc.add(subject, vocab::skos("broader"), RdfObject::iri(parent));
        doc.add(parent, vocab::skos("prefLabel"), RdfObject::literal("Science"));
        let derived = derive(&doc);
        assert_eq!(derived["subjects"], json!(["bepress|Science|Biology"]));
        assert!(derived.get("subject_synonyms").is_none());
    }

    #[test]
    fn test_format_typename() {
        assert_eq!(format_typename("CreativeWork"), "creative work");
        assert_eq!(format_typename("Registration"), "registration");
        assert_eq!(format_typename("DataSet"), "data set");
    }

    #[test]
    fn test_withdrawn_flags() {
        let mut doc = registration_doc();
        doc.add(
            "https://example.org/w1",
            vocab::osfmap("dateWithdrawn"),
            RdfObject::literal("2024-04-01"),
        );
        let derived = derive(&doc);
        assert_eq!(derived["retracted"], true);
        assert_eq!(derived["withdrawn"], true);
    }
}
