//! Nested JSON-LD deriver.
//!
//! Renders the whole resource description as one nested JSON object rooted
//! at the focus: every IRI object that has its own description in the graph
//! is inlined (once; revisits fall back to a bare `@id` reference, so cycles
//! terminate).

use std::collections::BTreeSet;

use anyhow::Result;
use serde_json::{json, Map, Value};

use crate::derive::{DeriveInput, Deriver};
use crate::rdf::{RdfObject, Tripledict, Twopledict};
use crate::vocab;

pub struct JsonldDeriver;

impl Deriver for JsonldDeriver {
    fn deriver_iri(&self) -> String {
        vocab::ns(vocab::TROVE, "derive/jsonld")
    }

    fn derived_datatype_iris(&self) -> Vec<String> {
        vec![vocab::rdf("JSON")]
    }

    fn should_skip(&self, _input: &DeriveInput<'_>) -> bool {
        false
    }

    fn derive_card_as_text(&self, input: &DeriveInput<'_>) -> Result<String> {
        let mut renderer = JsonldRenderer {
            rdfdoc: input.rdfdoc,
            visiting: BTreeSet::new(),
        };
        let nested = renderer.nested_iri_as_jsonld(input.focus_iri);
        Ok(serde_json::to_string(&nested)?)
    }
}

struct JsonldRenderer<'a> {
    rdfdoc: &'a Tripledict,
    visiting: BTreeSet<String>,
}

impl<'a> JsonldRenderer<'a> {
    fn nested_iri_as_jsonld(&mut self, iri: &str) -> Value {
        if self.visiting.contains(iri) || self.rdfdoc.twoples(iri).is_none() {
            return json!({ "@id": iri });
        }
        self.visiting.insert(iri.to_string());
        let mut object = Map::new();
        if !iri.starts_with("_:") {
            object.insert("@id".to_string(), Value::String(iri.to_string()));
        }
        if let Some(twoples) = self.rdfdoc.twoples(iri) {
            let pairs: Vec<(String, Vec<RdfObject>)> = twoples
                .iter()
                .map(|(predicate, objects)| {
                    (predicate.clone(), objects.iter().cloned().collect())
                })
                .collect();
            for (predicate, objects) in pairs {
                if objects.is_empty() {
                    continue;
                }
                let rendered: Vec<Value> = objects
                    .iter()
                    .map(|obj| self.nested_rdfobject_as_jsonld(obj))
                    .collect();
                object.insert(
                    vocab::shorthand_label(&predicate).to_string(),
                    list_or_single_value(rendered),
                );
            }
        }
        self.visiting.remove(iri);
        Value::Object(object)
    }

    fn nested_rdfobject_as_jsonld(&mut self, object: &RdfObject) -> Value {
        match object {
            RdfObject::Iri(iri) => self.nested_iri_as_jsonld(iri),
            other => rdfobject_as_jsonld(other),
        }
    }
}

fn rdfobject_as_jsonld(object: &RdfObject) -> Value {
    match object {
        RdfObject::Iri(iri) => json!({ "@id": iri }),
        RdfObject::Literal {
            value,
            language,
            datatype_iris,
        } => {
            if datatype_iris.contains(&vocab::rdf("JSON")) {
                return serde_json::from_str(value)
                    .unwrap_or_else(|_| json!({ "@value": value }));
            }
            if let Some(language_tag) = language {
                return json!({ "@value": value, "@language": language_tag });
            }
            if datatype_iris.is_empty()
                || (datatype_iris.len() == 1 && datatype_iris.contains(&vocab::rdf("string")))
            {
                return json!({ "@value": value });
            }
            let mut datatypes: Vec<&str> = datatype_iris
                .iter()
                .map(|iri| vocab::shorthand_label(iri))
                .collect();
            datatypes.sort_by_key(|label| label.len());
            if datatypes.len() == 1 {
                json!({ "@value": value, "@type": datatypes[0] })
            } else {
                json!({ "@value": value, "@type": datatypes })
            }
        }
        RdfObject::Blanknode(twoples) => twopledict_as_jsonld(twoples),
    }
}

fn twopledict_as_jsonld(twoples: &Twopledict) -> Value {
    let mut object = Map::new();
    for (predicate, objects) in twoples {
        if objects.is_empty() {
            continue;
        }
        let rendered: Vec<Value> = objects.iter().map(rdfobject_as_jsonld).collect();
        object.insert(
            vocab::shorthand_label(predicate).to_string(),
            list_or_single_value(rendered),
        );
    }
    Value::Object(object)
}

fn list_or_single_value(mut rendered: Vec<Value>) -> Value {
    if rendered.len() == 1 {
        rendered.remove(0)
    } else {
        rendered.sort_by_key(|value| value.to_string());
        Value::Array(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Indexcard;
    use chrono::Utc;
    use uuid::Uuid;

    fn derive(doc: &Tripledict, focus: &str) -> Value {
        let card = Indexcard {
            id: Uuid::new_v4(),
            source_label: "src".to_string(),
            source_identifier: "rec-1".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            deleted_at: None,
        };
        let input = DeriveInput {
            card: &card,
            focus_iri: focus,
            rdfdoc: doc,
        };
        let text = JsonldDeriver.derive_card_as_text(&input).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_nests_described_iris() {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w1";
        doc.add(w, vocab::dcterms("title"), RdfObject::literal("A Work"));
        doc.add(
            w,
            vocab::dcterms("creator"),
            RdfObject::iri("https://example.org/p1"),
        );
        doc.add(
            "https://example.org/p1",
            vocab::foaf("name"),
            RdfObject::literal("Someone"),
        );
        let nested = derive(&doc, w);
        assert_eq!(nested["@id"], w);
        assert_eq!(nested["title"]["@value"], "A Work");
        assert_eq!(nested["creator"]["@id"], "https://example.org/p1");
        assert_eq!(nested["creator"]["name"]["@value"], "Someone");
    }

    #[test]
    fn test_cycles_fall_back_to_references() {
        let mut doc = Tripledict::new();
        let a = "https://example.org/a";
        let b = "https://example.org/b";
        doc.add(a, vocab::dcterms("hasPart"), RdfObject::iri(b));
        doc.add(b, vocab::dcterms("isPartOf"), RdfObject::iri(a));
        let nested = derive(&doc, a);
        // the cycle back to `a` is a bare reference, not another nesting
        assert_eq!(nested["hasPart"]["isPartOf"], json!({ "@id": a }));
    }

    #[test]
    fn test_language_and_datatype_literals() {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w1";
        doc.add(
            w,
            vocab::dcterms("title"),
            RdfObject::literal_language("Le Titre", "fr"),
        );
        doc.add(
            w,
            vocab::dcterms("created"),
            RdfObject::literal_datatype("2024-05-01", vocab::ns(vocab::XSD, "date")),
        );
        let nested = derive(&doc, w);
        assert_eq!(nested["title"]["@language"], "fr");
        assert_eq!(nested["created"]["@type"], "date");
    }

    #[test]
    fn test_multiple_values_sorted_list() {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w1";
        doc.add(w, vocab::osfmap("keyword"), RdfObject::literal("zebra"));
        doc.add(w, vocab::osfmap("keyword"), RdfObject::literal("aardvark"));
        let nested = derive(&doc, w);
        let keywords = nested["keyword"].as_array().unwrap();
        assert_eq!(keywords[0]["@value"], "aardvark");
        assert_eq!(keywords[1]["@value"], "zebra");
    }
}
