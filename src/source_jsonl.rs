//! File-backed source: JSON Lines records through the generic transform.
//!
//! Each line holds one record: `{"identifier": ..., "datestamp": ...,
//! "doc": {...}}`. The transformer maps the common metadata shape (title,
//! description, dates, creators, keywords, identifiers) into a resource
//! description with the chain DSL, so one file can stand in for a remote
//! source during local runs and tests.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::chain::{Chain, ChainContext, TransformOutcome, Transformer, Try};
use crate::error::ChainError;
use crate::harvest::{FetchResult, Harvester, HarvestWindow};
use crate::rdf::{RdfObject, Tripledict};
use crate::vocab;

pub struct JsonlHarvester {
    source_label: String,
    path: PathBuf,
}

impl JsonlHarvester {
    pub fn new(source_label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        JsonlHarvester {
            source_label: source_label.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl Harvester for JsonlHarvester {
    fn source_label(&self) -> &str {
        &self.source_label
    }

    async fn fetch(&self, window: &HarvestWindow) -> Result<Vec<FetchResult>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut results = Vec::new();
        for (line_number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(line)
                .with_context(|| format!("bad json on line {}", line_number + 1))?;
            let identifier = record
                .get("identifier")
                .and_then(Value::as_str)
                .ok_or_else(|| anyhow!("line {} has no identifier", line_number + 1))?;
            let datestamp = record
                .get("datestamp")
                .and_then(Value::as_str)
                .map(DateTime::parse_from_rfc3339)
                .transpose()
                .with_context(|| format!("bad datestamp on line {}", line_number + 1))?
                .map(|instant| instant.with_timezone(&Utc));
            // records stamped outside the window are someone else's harvest
            if let Some(stamp) = datestamp {
                if stamp < window.start || stamp > window.end {
                    continue;
                }
            }
            let doc = record.get("doc").cloned().unwrap_or(Value::Null);
            results.push(FetchResult::from_json(identifier, &doc, datestamp));
        }
        Ok(results)
    }
}

/// Transforms the generic record shape into a resource description.
pub struct GenericTransformer {
    focus: Chain,
    title: Chain,
    description: Chain,
    language: Chain,
    date: Chain,
    agent_type: Chain,
}

impl GenericTransformer {
    pub fn new() -> Self {
        GenericTransformer {
            focus: Chain::new().path("id").iri(true),
            title: Chain::new().then(Try::new(Chain::new().path("title").trim())),
            description: Chain::new().then(Try::new(Chain::new().path("description").trim())),
            language: Chain::new().then(Try::new(Chain::new().path("language"))),
            date: Chain::new().then(Try::new(Chain::new().path("date").parse_date())),
            agent_type: Chain::new().guess_agent_type(None),
        }
    }
}

impl Default for GenericTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl Transformer for GenericTransformer {
    fn transformer_label(&self) -> &str {
        "generic-jsonl"
    }

    fn transform(
        &self,
        raw: &[u8],
        ctx: &mut ChainContext,
    ) -> Result<TransformOutcome, ChainError> {
        let doc: Value = serde_json::from_slice(raw).map_err(|_| ChainError::TypeMismatch {
            expected: "json document".to_string(),
            got: "unparseable bytes".to_string(),
        })?;
        if doc.get("suppressed").and_then(Value::as_bool) == Some(true) {
            return Ok(TransformOutcome::Skip("record marked suppressed".to_string()));
        }

        let focus = match self.focus.run(&doc, ctx)? {
            Value::String(iri) => iri,
            other => {
                return Err(ChainError::TypeMismatch {
                    expected: "focus iri string".to_string(),
                    got: other.to_string(),
                })
            }
        };

        let mut rdfdoc = Tripledict::new();
        rdfdoc.add(&focus, vocab::rdf("type"), type_object(&doc));
        if let Value::String(title) = self.title.run(&doc, ctx)? {
            rdfdoc.add(&focus, vocab::dcterms("title"), RdfObject::literal(title));
        }
        if let Value::String(description) = self.description.run(&doc, ctx)? {
            rdfdoc.add(
                &focus,
                vocab::dcterms("description"),
                RdfObject::literal(description),
            );
        }
        if let Value::String(language) = self.language.run(&doc, ctx)? {
            rdfdoc.add(
                &focus,
                vocab::dcterms("language"),
                RdfObject::literal(language),
            );
        }
        if let Value::String(date) = self.date.run(&doc, ctx)? {
            rdfdoc.add(&focus, vocab::dcterms("date"), RdfObject::literal(date));
        }
        for keyword in string_items(&doc, "keywords") {
            rdfdoc.add(&focus, vocab::osfmap("keyword"), RdfObject::literal(keyword));
        }
        for subject in string_items(&doc, "subjects") {
            rdfdoc.add(
                &focus,
                vocab::dcterms("subject"),
                RdfObject::literal(subject),
            );
        }
        for identifier in string_items(&doc, "identifiers") {
            let recognized = Chain::new().iri(true).run(&Value::String(identifier), ctx)?;
            if let Value::String(iri) = recognized {
                rdfdoc.add(&focus, vocab::dcterms("identifier"), RdfObject::iri(iri));
            }
        }
        for creator in object_items(&doc, "creators") {
            if let Some(agent) = self.agent_object(&creator, ctx)? {
                rdfdoc.add(&focus, vocab::dcterms("creator"), agent);
            }
        }
        if let Some(publisher) = doc.get("publisher") {
            if let Some(agent) = self.agent_object(publisher, ctx)? {
                rdfdoc.add(&focus, vocab::dcterms("publisher"), agent);
            }
        }

        Ok(TransformOutcome::Graph {
            focus_iri: focus,
            rdfdoc,
        })
    }
}

impl GenericTransformer {
    fn agent_object(
        &self,
        agent: &Value,
        ctx: &mut ChainContext,
    ) -> Result<Option<RdfObject>, ChainError> {
        let name = match agent.get("name").and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => return Ok(None),
        };
        let guessed = self.agent_type.run(&Value::String(name.clone()), ctx)?;
        let type_iri = match guessed.as_str() {
            Some("person") => vocab::foaf("Person"),
            _ => vocab::foaf("Organization"),
        };
        Ok(Some(RdfObject::blanknode([
            (vocab::rdf("type"), RdfObject::iri(type_iri)),
            (vocab::foaf("name"), RdfObject::literal(name)),
        ])))
    }
}

/// Declared types matching known OSFMAP classes keep them; anything else
/// is a plain creative work.
fn type_object(doc: &Value) -> RdfObject {
    let declared = doc.get("type").and_then(Value::as_str).unwrap_or_default();
    let osfmap_types = [
        "Project",
        "ProjectComponent",
        "Registration",
        "RegistrationComponent",
        "Preprint",
    ];
    if osfmap_types.contains(&declared) {
        RdfObject::iri(vocab::osfmap(declared))
    } else {
        RdfObject::iri(vocab::sharev2("CreativeWork"))
    }
}

fn string_items(doc: &Value, key: &str) -> Vec<String> {
    doc.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn object_items(doc: &Value, key: &str) -> Vec<Value> {
    doc.get(key)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::io::Write;

    fn ctx() -> ChainContext {
        ChainContext::new("test.source")
    }

    fn transform(doc: Value) -> TransformOutcome {
        GenericTransformer::new()
            .transform(doc.to_string().as_bytes(), &mut ctx())
            .unwrap()
    }

    #[test]
    fn test_transform_builds_graph_around_focus() {
        let outcome = transform(json!({
            "id": "https://example.org/w1",
            "type": "Preprint",
            "title": "  A Title  ",
            "date": "2024-05-01",
            "keywords": ["climate"],
            "creators": [{"name": "Jane Q. Public"}],
        }));
        let TransformOutcome::Graph { focus_iri, rdfdoc } = outcome else {
            panic!("expected a graph");
        };
        // the url recognizer canonicalizes schemes to plain http
        assert_eq!(focus_iri, "http://example.org/w1");
        assert!(rdfdoc
            .q_iris(&focus_iri, &vocab::rdf("type"))
            .any(|iri| iri == vocab::osfmap("Preprint")));
        assert!(rdfdoc
            .q_literals(&focus_iri, &vocab::dcterms("title"))
            .any(|title| title == "A Title"));
        let creators: Vec<_> = rdfdoc.q(&focus_iri, &vocab::dcterms("creator")).collect();
        assert_eq!(creators.len(), 1);
        let twoples = creators[0].as_blanknode().unwrap();
        assert!(twoples[&vocab::foaf("name")].contains(&RdfObject::literal("Jane Q. Public")));
    }

    #[test]
    fn test_suppressed_record_skips() {
        let outcome = transform(json!({
            "id": "https://example.org/w1",
            "suppressed": true,
        }));
        assert!(matches!(outcome, TransformOutcome::Skip(_)));
    }

    #[test]
    fn test_unrecognized_id_falls_back_to_urn() {
        let outcome = transform(json!({"id": "local-7", "title": "T"}));
        let TransformOutcome::Graph { focus_iri, .. } = outcome else {
            panic!("expected a graph");
        };
        assert_eq!(focus_iri, "urn://trove/test.source:local-7");
    }

    #[tokio::test]
    async fn test_harvester_reads_lines_and_filters_window() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"identifier": "in", "datestamp": "2024-05-01T12:00:00Z", "doc": {{"id": "a"}}}}"#
        )
        .unwrap();
        writeln!(
            file,
            r#"{{"identifier": "out", "datestamp": "2019-01-01T00:00:00Z", "doc": {{"id": "b"}}}}"#
        )
        .unwrap();
        writeln!(file, r#"{{"identifier": "unstamped", "doc": {{"id": "c"}}}}"#).unwrap();

        let harvester = JsonlHarvester::new("test.source", file.path());
        let start = DateTime::parse_from_rfc3339("2024-05-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let window = HarvestWindow {
            start,
            end: start + Duration::days(1),
        };
        let results = harvester.fetch(&window).await.unwrap();
        let identifiers: Vec<&str> = results
            .iter()
            .map(|result| result.identifier.as_str())
            .collect();
        assert_eq!(identifiers, vec!["in", "unstamped"]);
    }
}
