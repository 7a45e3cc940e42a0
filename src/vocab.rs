//! IRI namespaces and well-known property sets.
//!
//! Everything here is a static table: namespace prefixes for the vocabularies
//! the rest of the crate speaks, plus the fixed property sets that drive
//! graph walking (which predicates hold dates, which hold names, which are
//! skipped entirely).

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DCTERMS: &str = "http://purl.org/dc/terms/";
pub const DCTYPE: &str = "http://purl.org/dc/dcmitype/";
pub const DC: &str = "http://purl.org/dc/elements/1.1/";
pub const DCAT: &str = "http://www.w3.org/ns/dcat#";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
pub const PROV: &str = "http://www.w3.org/ns/prov#";
pub const OSFMAP: &str = "https://osf.io/vocab/2023/";
pub const SHAREV2: &str = "https://share.osf.io/vocab/2017/sharev2/";
pub const TROVE: &str = "https://share.osf.io/vocab/2023/trove/";
pub const OAI: &str = "http://www.openarchives.org/OAI/2.0/";
pub const OAI_DC: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";

/// Join a namespace and a local name into a full IRI.
pub fn ns(namespace: &str, name: &str) -> String {
    format!("{namespace}{name}")
}

pub fn rdf(name: &str) -> String {
    ns(RDF, name)
}

pub fn rdfs(name: &str) -> String {
    ns(RDFS, name)
}

pub fn owl(name: &str) -> String {
    ns(OWL, name)
}

pub fn skos(name: &str) -> String {
    ns(SKOS, name)
}

pub fn dcterms(name: &str) -> String {
    ns(DCTERMS, name)
}

pub fn foaf(name: &str) -> String {
    ns(FOAF, name)
}

pub fn osfmap(name: &str) -> String {
    ns(OSFMAP, name)
}

pub fn sharev2(name: &str) -> String {
    ns(SHAREV2, name)
}

/// Strip a known namespace prefix, returning the local name.
///
/// Returns `None` when the IRI does not start with the given namespace.
pub fn iri_minus_namespace<'a>(iri: &'a str, namespace: &str) -> Option<&'a str> {
    iri.strip_prefix(namespace)
}

/// Local name of an IRI under any of the namespaces this crate knows,
/// falling back to the substring after the last `/` or `#`.
pub fn shorthand_label(iri: &str) -> &str {
    const KNOWN: &[&str] = &[
        RDF, RDFS, OWL, XSD, SKOS, DCTERMS, DCTYPE, DC, DCAT, FOAF, PROV, OSFMAP, SHAREV2, TROVE,
    ];
    for namespace in KNOWN {
        if let Some(local) = iri.strip_prefix(namespace) {
            return local;
        }
    }
    match iri.rfind(['/', '#']) {
        Some(pos) => &iri[pos + 1..],
        None => iri,
    }
}

/// Predicates whose literal objects are interpreted as dates.
pub fn date_properties() -> Vec<String> {
    vec![
        dcterms("date"),
        dcterms("available"),
        dcterms("created"),
        dcterms("modified"),
        dcterms("dateCopyrighted"),
        dcterms("dateSubmitted"),
        dcterms("dateAccepted"),
        osfmap("dateWithdrawn"),
    ]
}

pub fn is_date_property(property_iri: &str) -> bool {
    date_properties().iter().any(|p| p == property_iri)
}

pub fn title_properties() -> Vec<String> {
    vec![dcterms("title")]
}

pub fn name_properties() -> Vec<String> {
    vec![foaf("name"), osfmap("fileName")]
}

pub fn label_properties() -> Vec<String> {
    vec![rdfs("label"), skos("prefLabel"), skos("altLabel")]
}

/// Title, name, and label predicates, in that priority order.
pub fn namelike_properties() -> Vec<String> {
    let mut properties = title_properties();
    properties.extend(name_properties());
    properties.extend(label_properties());
    properties
}

/// Predicates never traversed by the graph walk.
pub fn skippable_properties() -> Vec<String> {
    vec![osfmap("contains"), owl("sameAs")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_join() {
        assert_eq!(dcterms("title"), "http://purl.org/dc/terms/title");
        assert_eq!(foaf("name"), "http://xmlns.com/foaf/0.1/name");
    }

    #[test]
    fn test_iri_minus_namespace() {
        assert_eq!(
            iri_minus_namespace("http://purl.org/dc/terms/creator", DCTERMS),
            Some("creator")
        );
        assert_eq!(
            iri_minus_namespace("http://example.com/thing", DCTERMS),
            None
        );
    }

    #[test]
    fn test_shorthand_label() {
        assert_eq!(shorthand_label(&dcterms("title")), "title");
        assert_eq!(shorthand_label(&rdf("type")), "type");
        assert_eq!(shorthand_label("http://example.com/x/custom"), "custom");
    }

    #[test]
    fn test_date_property_membership() {
        assert!(is_date_property(&dcterms("created")));
        assert!(is_date_property(&osfmap("dateWithdrawn")));
        assert!(!is_date_property(&dcterms("title")));
    }

    #[test]
    fn test_namelike_order_titles_first() {
        let namelike = namelike_properties();
        assert_eq!(namelike[0], dcterms("title"));
        assert!(namelike.contains(&foaf("name")));
        assert!(namelike.contains(&skos("prefLabel")));
    }
}
