//! Dublin Core XML deriver.
//!
//! Renders a resource description as an `oai_dc:dc` element in the fixed
//! element order harvest clients expect: title, creator, subject,
//! description, publisher, contributor, date, type, identifier, language,
//! relation, rights.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::derive::{focustype_disallowed, DeriveInput, Deriver};
use crate::rdf::{RdfObject, Tripledict};
use crate::vocab;

pub struct OaidcDeriver;

/// Predicates surfaced as `dc:relation`.
fn relation_predicates() -> Vec<String> {
    vec![
        vocab::dcterms("hasPart"),
        vocab::dcterms("hasVersion"),
        vocab::dcterms("isPartOf"),
        vocab::dcterms("isVersionOf"),
        vocab::dcterms("references"),
        vocab::osfmap("hasAnalyticCodeResource"),
        vocab::osfmap("hasDataResource"),
        vocab::osfmap("hasMaterialsResource"),
        vocab::osfmap("hasPapersResource"),
        vocab::osfmap("hasPreregisteredAnalysisPlan"),
        vocab::osfmap("hasPreregisteredStudyDesign"),
        vocab::osfmap("hasRoot"),
        vocab::osfmap("hasSupplementalResource"),
        vocab::osfmap("isContainedBy"),
        vocab::osfmap("isSupplementedBy"),
        vocab::osfmap("supplements"),
    ]
}

impl Deriver for OaidcDeriver {
    fn deriver_iri(&self) -> String {
        vocab::OAI_DC.to_string()
    }

    fn derived_datatype_iris(&self) -> Vec<String> {
        vec![vocab::rdf("XMLLiteral")]
    }

    fn should_skip(&self, input: &DeriveInput<'_>) -> bool {
        focustype_disallowed(input.focus_iri, input.rdfdoc)
    }

    fn derive_card_as_text(&self, input: &DeriveInput<'_>) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("oai_dc:dc");
        root.push_attribute(("xmlns:oai_dc", vocab::OAI_DC));
        root.push_attribute(("xmlns:dc", vocab::DC));
        root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        root.push_attribute((
            "xsi:schemaLocation",
            format!(
                "{} http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
                vocab::OAI_DC
            )
            .as_str(),
        ));
        writer.write_event(Event::Start(root))?;

        let doc = input.rdfdoc;
        let focus = input.focus_iri;

        for title in doc.q_literals(focus, &vocab::dcterms("title")) {
            write_element(&mut writer, "dc:title", title)?;
        }
        for name in path_literals(doc, focus, &vocab::dcterms("creator"), &[vocab::foaf("name")]) {
            write_element(&mut writer, "dc:creator", &name)?;
        }
        let mut subjects: Vec<String> = doc
            .q_literals(focus, &vocab::dcterms("subject"))
            .map(str::to_string)
            .collect();
        subjects.extend(path_literals(
            doc,
            focus,
            &vocab::dcterms("subject"),
            &[
                vocab::rdfs("label"),
                vocab::skos("prefLabel"),
                vocab::skos("altLabel"),
            ],
        ));
        for subject in subjects {
            write_element(&mut writer, "dc:subject", &subject)?;
        }
        for description in sorted(doc.q_literals(focus, &vocab::dcterms("description"))) {
            write_element(&mut writer, "dc:description", &description)?;
        }
        for name in sorted_owned(path_literals(
            doc,
            focus,
            &vocab::dcterms("publisher"),
            &[vocab::foaf("name")],
        )) {
            write_element(&mut writer, "dc:publisher", &name)?;
        }
        for name in path_literals(
            doc,
            focus,
            &vocab::dcterms("contributor"),
            &[vocab::foaf("name")],
        ) {
            write_element(&mut writer, "dc:contributor", &name)?;
        }
        if let Some(date) = first_date(doc, focus) {
            write_element(&mut writer, "dc:date", &date)?;
        }
        for type_iri in sorted(doc.q_iris(focus, &vocab::rdf("type"))) {
            for namespace in [vocab::OSFMAP, vocab::DCTYPE, vocab::SHAREV2] {
                if let Some(local) = vocab::iri_minus_namespace(&type_iri, namespace) {
                    write_element(&mut writer, "dc:type", local)?;
                }
            }
        }
        for identifier in sorted(object_strings(doc.q(focus, &vocab::dcterms("identifier")))) {
            write_element(&mut writer, "dc:identifier", &identifier)?;
        }
        for language in sorted(doc.q_literals(focus, &vocab::dcterms("language"))) {
            write_element(&mut writer, "dc:language", &language)?;
        }
        let mut related: Vec<String> = Vec::new();
        for predicate in relation_predicates() {
            related.extend(doc.q_iris(focus, &predicate).map(str::to_string));
        }
        related.sort();
        related.dedup();
        for related_iri in related {
            write_element(&mut writer, "dc:relation", &related_iri)?;
        }
        for rights in doc.q(focus, &vocab::dcterms("rights")) {
            let value = match rights {
                RdfObject::Iri(iri) => Some(iri.clone()),
                RdfObject::Literal { value, .. } => Some(value.clone()),
                RdfObject::Blanknode(_) => path_literals(
                    doc,
                    focus,
                    &vocab::dcterms("rights"),
                    &[vocab::dcterms("title")],
                )
                .into_iter()
                .next(),
            };
            if let Some(value) = value {
                write_element(&mut writer, "dc:rights", &value)?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new("oai_dc:dc")))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Literal values one hop out: objects at `(focus, predicate)` that are
/// IRIs, dereferenced through the doc at any of `terminal_predicates`.
fn path_literals(
    doc: &Tripledict,
    focus: &str,
    predicate: &str,
    terminal_predicates: &[String],
) -> Vec<String> {
    let mut values = Vec::new();
    for object in doc.q(focus, predicate) {
        match object {
            RdfObject::Iri(iri) => {
                for terminal in terminal_predicates {
                    values.extend(doc.q_literals(iri, terminal).map(str::to_string));
                }
            }
            RdfObject::Blanknode(twoples) => {
                for terminal in terminal_predicates {
                    if let Some(objects) = twoples.get(terminal) {
                        values.extend(
                            objects
                                .iter()
                                .filter_map(RdfObject::as_literal_value)
                                .map(str::to_string),
                        );
                    }
                }
            }
            RdfObject::Literal { .. } => {}
        }
    }
    values
}

/// First value among the date predicates, in priority order, formatted as
/// `YYYY-MM-DDTHH:MM:SSZ` when it parses.
fn first_date(doc: &Tripledict, focus: &str) -> Option<String> {
    let priority = [
        vocab::dcterms("date"),
        vocab::dcterms("datePublished"),
        vocab::dcterms("modified"),
        vocab::dcterms("created"),
    ];
    for predicate in priority {
        if let Some(value) = doc.q_literals(focus, &predicate).next() {
            return Some(format_datetime_z(value));
        }
    }
    None
}

fn format_datetime_z(value: &str) -> String {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return instant.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return naive.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return format!("{}T00:00:00Z", date.format("%Y-%m-%d"));
    }
    value.to_string()
}

fn object_strings<'a>(objects: impl Iterator<Item = &'a RdfObject>) -> Vec<String> {
    objects
        .filter_map(|object| match object {
            RdfObject::Iri(iri) => Some(iri.clone()),
            RdfObject::Literal { value, .. } => Some(value.clone()),
            RdfObject::Blanknode(_) => None,
        })
        .collect()
}

fn sorted<'a>(values: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    let mut collected: Vec<String> = values.into_iter().map(Into::into).collect();
    collected.sort();
    collected
}

fn sorted_owned(values: Vec<String>) -> Vec<String> {
    let mut collected = values;
    collected.sort();
    collected
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
            source_label: "src".to_string(),
            source_identifier: "rec-1".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn work_doc() -> Tripledict {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w1";
        doc.add(w, vocab::rdf("type"), RdfObject::iri(vocab::sharev2("CreativeWork")));
        doc.add(w, vocab::dcterms("title"), RdfObject::literal("A Work"));
        doc.add(
            w,
            vocab::dcterms("creator"),
            RdfObject::iri("https://example.org/p1"),
        );
        doc.add(
            "https://example.org/p1",
            vocab::foaf("name"),
            RdfObject::literal("Some Person"),
        );
        doc.add(
            w,
            vocab::dcterms("created"),
            RdfObject::literal("2024-05-01"),
        );
        doc.add(
            w,
            vocab::dcterms("identifier"),
            RdfObject::literal("https://example.org/w1"),
        );
        doc
    }

    #[test]
    fn test_renders_expected_elements() {
        let doc = work_doc();
        let card = card();
        let input = DeriveInput {
            card: &card,
            focus_iri: "https://example.org/w1",
            rdfdoc: &doc,
        };
        let xml = OaidcDeriver.derive_card_as_text(&input).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<oai_dc:dc"));
        assert!(xml.contains("<dc:title>A Work</dc:title>"));
        assert!(xml.contains("<dc:creator>Some Person</dc:creator>"));
        assert!(xml.contains("<dc:date>2024-05-01T00:00:00Z</dc:date>"));
        assert!(xml.contains("<dc:type>CreativeWork</dc:type>"));
        assert!(xml.contains("<dc:identifier>https://example.org/w1</dc:identifier>"));
        assert!(xml.ends_with("</oai_dc:dc>"));
    }

    #[test]
    fn test_element_order_is_fixed() {
        let doc = work_doc();
        let card = card();
        let input = DeriveInput {
            card: &card,
            focus_iri: "https://example.org/w1",
            rdfdoc: &doc,
        };
        let xml = OaidcDeriver.derive_card_as_text(&input).unwrap();
        let title_at = xml.find("<dc:title>").unwrap();
        let creator_at = xml.find("<dc:creator>").unwrap();
        let date_at = xml.find("<dc:date>").unwrap();
        let type_at = xml.find("<dc:type>").unwrap();
        let identifier_at = xml.find("<dc:identifier>").unwrap();
        assert!(title_at < creator_at);
        assert!(creator_at < date_at);
        assert!(date_at < type_at);
        assert!(type_at < identifier_at);
    }

    #[test]
    fn test_skips_non_work_focus() {
        let mut doc = Tripledict::new();
        doc.add(
            "https://example.org/p1",
            vocab::rdf("type"),
            RdfObject::iri(vocab::foaf("Person")),
        );
        let card = card();
        let input = DeriveInput {
            card: &card,
            focus_iri: "https://example.org/p1",
            rdfdoc: &doc,
        };
        assert!(OaidcDeriver.should_skip(&input));
    }

    #[test]
    fn test_rights_blanknode_falls_back_to_title() {
        let mut doc = work_doc();
        doc.add(
            "https://example.org/w1",
            vocab::dcterms("rights"),
            RdfObject::blanknode([(
                vocab::dcterms("title"),
                RdfObject::literal("CC-BY-4.0"),
            )]),
        );
        let card = card();
        let input = DeriveInput {
            card: &card,
            focus_iri: "https://example.org/w1",
            rdfdoc: &doc,
        };
        let xml = OaidcDeriver.derive_card_as_text(&input).unwrap();
        assert!(xml.contains("<dc:rights>CC-BY-4.0</dc:rights>"));
    }

    #[test]
    fn test_format_datetime_z_variants() {
        assert_eq!(
            format_datetime_z("2024-05-01T12:30:00+00:00"),
            "2024-05-01T12:30:00Z"
        );
        assert_eq!(format_datetime_z("2024-05-01"), "2024-05-01T00:00:00Z");
        assert_eq!(format_datetime_z("sometime"), "sometime");
    }
}
