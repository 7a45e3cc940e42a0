//! OAI-PMH repository adapter.
//!
//! Serves the six protocol verbs over the description store and its derived
//! records. Each protocol error condition maps to exactly one error code;
//! in particular an unparseable resumption token is `badResumptionToken`
//! while a well-formed request with zero matches is `noRecordsMatch`.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use uuid::Uuid;

use crate::error::OaiError;
use crate::store::{DescriptionStore, Indexcard};
use crate::vocab;

const PROTOCOL_VERSION: &str = "2.0";
const GRANULARITY: &str = "YYYY-MM-DDThh:mm:ssZ";
const IDENTIFIER_DELIMITER: char = ':';

type ProtocolResult<T> = std::result::Result<T, OaiError>;

/// A metadata format served over the protocol, keyed by `metadataPrefix`
/// and backed by one deriver.
struct MetadataFormat {
    prefix: &'static str,
    deriver_iri: String,
    schema: &'static str,
    namespace: &'static str,
}

fn formats() -> Vec<MetadataFormat> {
    vec![MetadataFormat {
        prefix: "oai_dc",
        deriver_iri: vocab::OAI_DC.to_string(),
        schema: "http://www.openarchives.org/OAI/2.0/oai_dc.xsd",
        namespace: vocab::OAI_DC,
    }]
}

fn format_for_prefix(prefix: &str) -> Option<MetadataFormat> {
    formats().into_iter().find(|format| format.prefix == prefix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Identify,
    ListMetadataFormats,
    ListSets,
    ListIdentifiers,
    ListRecords,
    GetRecord,
}

impl Verb {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Identify" => Some(Verb::Identify),
            "ListMetadataFormats" => Some(Verb::ListMetadataFormats),
            "ListSets" => Some(Verb::ListSets),
            "ListIdentifiers" => Some(Verb::ListIdentifiers),
            "ListRecords" => Some(Verb::ListRecords),
            "GetRecord" => Some(Verb::GetRecord),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Verb::Identify => "Identify",
            Verb::ListMetadataFormats => "ListMetadataFormats",
            Verb::ListSets => "ListSets",
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::ListRecords => "ListRecords",
            Verb::GetRecord => "GetRecord",
        }
    }

    fn allowed_args(self) -> &'static [&'static str] {
        match self {
            Verb::Identify => &[],
            Verb::ListMetadataFormats => &["identifier"],
            Verb::ListSets => &["resumptionToken"],
            Verb::ListIdentifiers | Verb::ListRecords => {
                &["metadataPrefix", "from", "until", "set", "resumptionToken"]
            }
            Verb::GetRecord => &["identifier", "metadataPrefix"],
        }
    }

    fn required_args(self) -> &'static [&'static str] {
        match self {
            Verb::ListIdentifiers | Verb::ListRecords => &["metadataPrefix"],
            Verb::GetRecord => &["identifier", "metadataPrefix"],
            _ => &[],
        }
    }
}

/// A validated request: known verb, legal argument set.
struct OaiRequest {
    verb: Verb,
    args: BTreeMap<String, String>,
}

impl OaiRequest {
    fn parse(pairs: &[(String, String)]) -> ProtocolResult<Self> {
        let mut args: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in pairs {
            if args.insert(name.clone(), value.clone()).is_some() {
                return Err(OaiError::BadArgument(format!("repeated argument '{name}'")));
            }
        }
        let verb_name = args
            .remove("verb")
            .ok_or_else(|| OaiError::BadVerb("(missing)".to_string()))?;
        let verb = Verb::from_name(&verb_name).ok_or(OaiError::BadVerb(verb_name))?;
        for name in args.keys() {
            if !verb.allowed_args().contains(&name.as_str()) {
                return Err(OaiError::BadArgument(format!(
                    "argument '{name}' is not legal for verb '{}'",
                    verb.name()
                )));
            }
        }
        if args.contains_key("resumptionToken") {
            // resumptionToken is an exclusive argument
            if args.len() > 1 {
                return Err(OaiError::BadArgument(
                    "resumptionToken may not be combined with other arguments".to_string(),
                ));
            }
        } else {
            for required in verb.required_args() {
                if !args.contains_key(*required) {
                    return Err(OaiError::BadArgument(format!(
                        "missing required argument '{required}'"
                    )));
                }
            }
        }
        Ok(OaiRequest { verb, args })
    }

    fn echo_attrs(&self) -> Vec<(String, String)> {
        let mut attrs = vec![("verb".to_string(), self.verb.name().to_string())];
        attrs.extend(
            self.args
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        attrs
    }
}

/// Everything needed to select one page of cards for a list verb.
struct PageSelection {
    from: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    set_spec: Option<String>,
    prefix: String,
    last_id: Option<Uuid>,
}

struct PageItem {
    card: Indexcard,
    datestamp: DateTime<Utc>,
    metadata: Option<String>,
}

pub struct OaiRepository {
    pub repository_name: String,
    pub repository_identifier: String,
    pub admin_email: String,
    pub base_url: String,
    pub page_size: usize,
}

impl OaiRepository {
    /// Handle one protocol request. Protocol errors render into the XML
    /// error envelope; only store failures propagate.
    pub async fn handle_request(
        &self,
        store: &dyn DescriptionStore,
        pairs: &[(String, String)],
    ) -> Result<String> {
        match OaiRequest::parse(pairs) {
            // badVerb/badArgument responses echo no request attributes
            Err(err) => self.render_envelope(&[], Err(err)),
            Ok(request) => {
                let echo = request.echo_attrs();
                let outcome = self.dispatch(store, &request).await?;
                self.render_envelope(&echo, outcome)
            }
        }
    }

    pub fn oai_identifier(&self, card_id: Uuid) -> String {
        format!(
            "oai{delim}{repo}{delim}{card_id}",
            delim = IDENTIFIER_DELIMITER,
            repo = self.repository_identifier
        )
    }

    async fn dispatch(
        &self,
        store: &dyn DescriptionStore,
        request: &OaiRequest,
    ) -> Result<ProtocolResult<Vec<u8>>> {
        match request.verb {
            Verb::Identify => self.do_identify(store).await,
            Verb::ListMetadataFormats => self.do_list_metadata_formats(store, request).await,
            Verb::ListSets => self.do_list_sets(store, request).await,
            Verb::ListIdentifiers => self.do_list_page(store, request, false).await,
            Verb::ListRecords => self.do_list_page(store, request, true).await,
            Verb::GetRecord => self.do_get_record(store, request).await,
        }
    }

    async fn do_identify(&self, store: &dyn DescriptionStore) -> Result<ProtocolResult<Vec<u8>>> {
        let mut earliest: Option<DateTime<Utc>> = None;
        for card in store.list_cards().await? {
            if card.is_deleted() {
                continue;
            }
            if let Some(description) = store.latest_description(card.id).await? {
                if earliest.map_or(true, |instant| description.modified_at < instant) {
                    earliest = Some(description.modified_at);
                }
            }
        }
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(BytesStart::new("Identify")))?;
        text_element(&mut writer, "repositoryName", &self.repository_name)?;
        text_element(&mut writer, "baseURL", &self.base_url)?;
        text_element(&mut writer, "protocolVersion", PROTOCOL_VERSION)?;
        if let Some(instant) = earliest {
            text_element(&mut writer, "earliestDatestamp", &format_datetime(instant))?;
        }
        text_element(&mut writer, "deletedRecord", "no")?;
        text_element(&mut writer, "granularity", GRANULARITY)?;
        text_element(&mut writer, "adminEmail", &self.admin_email)?;
        writer.write_event(Event::Start(BytesStart::new("description")))?;
        let mut identifier = BytesStart::new("oai-identifier");
        identifier.push_attribute((
            "xmlns",
            "http://www.openarchives.org/OAI/2.0/oai-identifier",
        ));
        writer.write_event(Event::Start(identifier))?;
        text_element(&mut writer, "scheme", "oai")?;
        text_element(
            &mut writer,
            "repositoryIdentifier",
            &self.repository_identifier,
        )?;
        text_element(&mut writer, "delimiter", &IDENTIFIER_DELIMITER.to_string())?;
        text_element(
            &mut writer,
            "sampleIdentifier",
            &self.oai_identifier(Uuid::nil()),
        )?;
        writer.write_event(Event::End(BytesEnd::new("oai-identifier")))?;
        writer.write_event(Event::End(BytesEnd::new("description")))?;
        writer.write_event(Event::End(BytesEnd::new("Identify")))?;
        Ok(Ok(writer.into_inner()))
    }

    async fn do_list_metadata_formats(
        &self,
        store: &dyn DescriptionStore,
        request: &OaiRequest,
    ) -> Result<ProtocolResult<Vec<u8>>> {
        let mut listed = formats();
        if let Some(identifier) = request.args.get("identifier") {
            let card_id = match self.resolve_identifier(store, identifier).await? {
                Ok(card) => card.id,
                Err(err) => return Ok(Err(err)),
            };
            let mut kept = Vec::new();
            for format in listed {
                if store.get_derived(card_id, &format.deriver_iri).await?.is_some() {
                    kept.push(format);
                }
            }
            listed = kept;
        }
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(BytesStart::new("ListMetadataFormats")))?;
        for format in listed {
            writer.write_event(Event::Start(BytesStart::new("metadataFormat")))?;
            text_element(&mut writer, "metadataPrefix", format.prefix)?;
            text_element(&mut writer, "schema", format.schema)?;
            text_element(&mut writer, "metadataNamespace", format.namespace)?;
            writer.write_event(Event::End(BytesEnd::new("metadataFormat")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("ListMetadataFormats")))?;
        Ok(Ok(writer.into_inner()))
    }

    /// Sets are source labels; the set listing never paginates.
    async fn do_list_sets(
        &self,
        store: &dyn DescriptionStore,
        request: &OaiRequest,
    ) -> Result<ProtocolResult<Vec<u8>>> {
        if request.args.contains_key("resumptionToken") {
            return Ok(Err(OaiError::BadResumptionToken));
        }
        let mut set_specs: BTreeSet<String> = BTreeSet::new();
        for card in store.list_cards().await? {
            if !card.is_deleted() {
                set_specs.insert(card.source_label);
            }
        }
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(BytesStart::new("ListSets")))?;
        for spec in set_specs {
            writer.write_event(Event::Start(BytesStart::new("set")))?;
            text_element(&mut writer, "setSpec", &spec)?;
            text_element(&mut writer, "setName", &spec)?;
            writer.write_event(Event::End(BytesEnd::new("set")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("ListSets")))?;
        Ok(Ok(writer.into_inner()))
    }

    async fn do_list_page(
        &self,
        store: &dyn DescriptionStore,
        request: &OaiRequest,
        with_metadata: bool,
    ) -> Result<ProtocolResult<Vec<u8>>> {
        let selection = match self.page_selection(request) {
            Ok(selection) => selection,
            Err(err) => return Ok(Err(err)),
        };
        let mut items = self.page_items(store, &selection, with_metadata).await?;
        if items.is_empty() {
            return Ok(Err(OaiError::NoRecordsMatch));
        }
        let next_token = if items.len() > self.page_size {
            items.truncate(self.page_size);
            let last = items
                .last()
                .map(|item| item.card.id)
                .unwrap_or_else(Uuid::nil);
            Some(self.format_resumption_token(&selection, last))
        } else {
            None
        };
        let tag = if with_metadata {
            "ListRecords"
        } else {
            "ListIdentifiers"
        };
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(BytesStart::new(tag)))?;
        for item in &items {
            if with_metadata {
                self.write_record(&mut writer, item)?;
            } else {
                self.write_header(&mut writer, item)?;
            }
        }
        // an empty token marks the final page of a resumed list
        text_element(
            &mut writer,
            "resumptionToken",
            next_token.as_deref().unwrap_or(""),
        )?;
        writer.write_event(Event::End(BytesEnd::new(tag)))?;
        Ok(Ok(writer.into_inner()))
    }

    async fn do_get_record(
        &self,
        store: &dyn DescriptionStore,
        request: &OaiRequest,
    ) -> Result<ProtocolResult<Vec<u8>>> {
        let prefix = request.args.get("metadataPrefix").cloned().unwrap_or_default();
        let Some(format) = format_for_prefix(&prefix) else {
            return Ok(Err(OaiError::CannotDisseminateFormat(prefix)));
        };
        let identifier = request.args.get("identifier").cloned().unwrap_or_default();
        let card = match self.resolve_identifier(store, &identifier).await? {
            Ok(card) => card,
            Err(err) => return Ok(Err(err)),
        };
        let Some(description) = store.latest_description(card.id).await? else {
            return Ok(Err(OaiError::CannotDisseminateFormat(prefix)));
        };
        let Some(derived) = store.get_derived(card.id, &format.deriver_iri).await? else {
            return Ok(Err(OaiError::CannotDisseminateFormat(prefix)));
        };
        let item = PageItem {
            card,
            datestamp: description.modified_at,
            metadata: Some(derived.text),
        };
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Start(BytesStart::new("GetRecord")))?;
        self.write_record(&mut writer, &item)?;
        writer.write_event(Event::End(BytesEnd::new("GetRecord")))?;
        Ok(Ok(writer.into_inner()))
    }

    async fn resolve_identifier(
        &self,
        store: &dyn DescriptionStore,
        identifier: &str,
    ) -> Result<ProtocolResult<Indexcard>> {
        let parts: Vec<&str> = identifier.split(IDENTIFIER_DELIMITER).collect();
        let card_id = match parts.as_slice() {
            ["oai", repo, tail] if *repo == self.repository_identifier => {
                match Uuid::parse_str(tail) {
                    Ok(card_id) => card_id,
                    Err(_) => return Ok(Err(OaiError::IdDoesNotExist(identifier.to_string()))),
                }
            }
            _ => return Ok(Err(OaiError::IdDoesNotExist(identifier.to_string()))),
        };
        match store.get_card(card_id).await? {
            Some(card) if !card.is_deleted() => Ok(Ok(card)),
            _ => Ok(Err(OaiError::IdDoesNotExist(identifier.to_string()))),
        }
    }

    fn page_selection(&self, request: &OaiRequest) -> ProtocolResult<PageSelection> {
        if let Some(token) = request.args.get("resumptionToken") {
            return parse_resumption_token(token);
        }
        let prefix = request.args.get("metadataPrefix").cloned().unwrap_or_default();
        if format_for_prefix(&prefix).is_none() {
            return Err(OaiError::CannotDisseminateFormat(prefix));
        }
        let from = match request.args.get("from") {
            Some(value) => Some(
                parse_oai_datetime(value)
                    .ok_or_else(|| OaiError::BadArgument("invalid value for 'from'".to_string()))?,
            ),
            None => None,
        };
        let until = match request.args.get("until") {
            Some(value) => Some(
                parse_oai_datetime(value)
                    .ok_or_else(|| OaiError::BadArgument("invalid value for 'until'".to_string()))?,
            ),
            None => None,
        };
        Ok(PageSelection {
            from,
            until,
            set_spec: request.args.get("set").cloned(),
            prefix,
            last_id: None,
        })
    }

    /// Cards in id order, one page plus one extra so the last page is
    /// detectable without a count query.
    async fn page_items(
        &self,
        store: &dyn DescriptionStore,
        selection: &PageSelection,
        with_metadata: bool,
    ) -> Result<Vec<PageItem>> {
        let deriver_iri = format_for_prefix(&selection.prefix)
            .map(|format| format.deriver_iri)
            .unwrap_or_default();
        let mut items = Vec::new();
        for card in store.list_cards().await? {
            if items.len() > self.page_size {
                break;
            }
            if card.is_deleted() {
                continue;
            }
            if matches!(selection.last_id, Some(last) if card.id <= last) {
                continue;
            }
            if matches!(&selection.set_spec, Some(spec) if *spec != card.source_label) {
                continue;
            }
            let Some(description) = store.latest_description(card.id).await? else {
                continue;
            };
            if matches!(selection.from, Some(from) if description.modified_at < from) {
                continue;
            }
            if matches!(selection.until, Some(until) if description.modified_at > until) {
                continue;
            }
            let Some(derived) = store.get_derived(card.id, &deriver_iri).await? else {
                continue;
            };
            items.push(PageItem {
                card,
                datestamp: description.modified_at,
                metadata: with_metadata.then_some(derived.text),
            });
        }
        Ok(items)
    }

    fn format_resumption_token(&self, selection: &PageSelection, last_id: Uuid) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            selection.from.map(format_datetime).unwrap_or_default(),
            selection.until.map(format_datetime).unwrap_or_default(),
            selection.set_spec.as_deref().unwrap_or(""),
            selection.prefix,
            last_id,
        )
    }

    fn write_header(&self, writer: &mut Writer<Vec<u8>>, item: &PageItem) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("header")))?;
        text_element(writer, "identifier", &self.oai_identifier(item.card.id))?;
        text_element(writer, "datestamp", &format_datetime(item.datestamp))?;
        text_element(writer, "setSpec", &item.card.source_label)?;
        writer.write_event(Event::End(BytesEnd::new("header")))?;
        Ok(())
    }

    fn write_record(&self, writer: &mut Writer<Vec<u8>>, item: &PageItem) -> Result<()> {
        writer.write_event(Event::Start(BytesStart::new("record")))?;
        self.write_header(writer, item)?;
        writer.write_event(Event::Start(BytesStart::new("metadata")))?;
        if let Some(metadata) = &item.metadata {
            writer.write_event(Event::Text(BytesText::from_escaped(strip_xml_decl(
                metadata,
            ))))?;
        }
        writer.write_event(Event::End(BytesEnd::new("metadata")))?;
        writer.write_event(Event::End(BytesEnd::new("record")))?;
        Ok(())
    }

    fn render_envelope(
        &self,
        echo: &[(String, String)],
        outcome: ProtocolResult<Vec<u8>>,
    ) -> Result<String> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new("OAI-PMH");
        root.push_attribute(("xmlns", "http://www.openarchives.org/OAI/2.0/"));
        root.push_attribute(("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"));
        root.push_attribute((
            "xsi:schemaLocation",
            "http://www.openarchives.org/OAI/2.0/ http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd",
        ));
        writer.write_event(Event::Start(root))?;
        text_element(&mut writer, "responseDate", &format_datetime(Utc::now()))?;
        let mut request = BytesStart::new("request");
        for (name, value) in echo {
            request.push_attribute((name.as_str(), value.as_str()));
        }
        writer.write_event(Event::Start(request))?;
        writer.write_event(Event::Text(BytesText::new(&self.base_url)))?;
        writer.write_event(Event::End(BytesEnd::new("request")))?;
        match outcome {
            Ok(body) => {
                writer.write_event(Event::Text(BytesText::from_escaped(String::from_utf8(
                    body,
                )?)))?;
            }
            Err(err) => {
                let mut element = BytesStart::new("error");
                element.push_attribute(("code", err.code()));
                writer.write_event(Event::Start(element))?;
                writer.write_event(Event::Text(BytesText::new(&err.to_string())))?;
                writer.write_event(Event::End(BytesEnd::new("error")))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("OAI-PMH")))?;
        Ok(String::from_utf8(writer.into_inner())?)
    }
}

fn parse_resumption_token(token: &str) -> ProtocolResult<PageSelection> {
    let parts: Vec<&str> = token.split('|').collect();
    let [from, until, set_spec, prefix, last_id] = parts.as_slice() else {
        return Err(OaiError::BadResumptionToken);
    };
    let parse_bound = |value: &str| -> ProtocolResult<Option<DateTime<Utc>>> {
        if value.is_empty() {
            return Ok(None);
        }
        parse_oai_datetime(value)
            .map(Some)
            .ok_or(OaiError::BadResumptionToken)
    };
    if format_for_prefix(prefix).is_none() {
        return Err(OaiError::BadResumptionToken);
    }
    let last_id = Uuid::parse_str(last_id).map_err(|_| OaiError::BadResumptionToken)?;
    Ok(PageSelection {
        from: parse_bound(from)?,
        until: parse_bound(until)?,
        set_spec: (!set_spec.is_empty()).then(|| set_spec.to_string()),
        prefix: prefix.to_string(),
        last_id: Some(last_id),
    })
}

fn parse_oai_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Some(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn format_datetime(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Stored derived text carries its own XML declaration; inline metadata
/// must not.
fn strip_xml_decl(text: &str) -> &str {
    if let Some(rest) = text.strip_prefix("<?xml") {
        if let Some((_, tail)) = rest.split_once("?>") {
            return tail.trim_start();
        }
    }
    text
}

fn text_element(writer: &mut Writer<Vec<u8>>, tag: &str, text: &str) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdf::{RdfObject, Tripledict};
    use crate::store::MemoryStore;

    fn repository() -> OaiRepository {
        OaiRepository {
            repository_name: "test repository".to_string(),
            repository_identifier: "repo.example.org".to_string(),
            admin_email: "admin@example.org".to_string(),
            base_url: "https://repo.example.org/oai".to_string(),
            page_size: 3,
        }
    }

    fn work_doc(title: &str) -> Tripledict {
        let mut doc = Tripledict::new();
        let w = "https://example.org/w";
        doc.add(
            w,
            vocab::rdf("type"),
            RdfObject::iri(vocab::sharev2("CreativeWork")),
        );
        doc.add(w, vocab::dcterms("title"), RdfObject::literal(title));
        doc
    }

    async fn seeded_store(record_count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for n in 0..record_count {
            let card = store
                .upsert_record(
                    "some-source",
                    &format!("rec-{n}"),
                    "https://example.org/w",
                    &work_doc(&format!("Work {n}")),
                )
                .await
                .unwrap();
            store
                .save_derived(card.id, vocab::OAI_DC, "<?xml version=\"1.0\"?><oai_dc:dc/>")
                .await
                .unwrap();
        }
        store
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_verb_is_bad_verb() {
        let store = MemoryStore::new();
        let xml = repository()
            .handle_request(&store, &pairs(&[("verb", "ListEverything")]))
            .await
            .unwrap();
        assert!(xml.contains("code=\"badVerb\""));
    }

    #[tokio::test]
    async fn test_missing_metadata_prefix_is_bad_argument() {
        let store = MemoryStore::new();
        let xml = repository()
            .handle_request(&store, &pairs(&[("verb", "ListRecords")]))
            .await
            .unwrap();
        assert!(xml.contains("code=\"badArgument\""));
    }

    #[tokio::test]
    async fn test_unknown_prefix_is_cannot_disseminate() {
        let store = seeded_store(1).await;
        let xml = repository()
            .handle_request(
                &store,
                &pairs(&[("verb", "ListRecords"), ("metadataPrefix", "marc21")]),
            )
            .await
            .unwrap();
        assert!(xml.contains("code=\"cannotDisseminateFormat\""));
    }

    #[tokio::test]
    async fn test_get_record_round_trip() {
        let store = seeded_store(1).await;
        let repo = repository();
        let card = store.find_card("some-source", "rec-0").await.unwrap().unwrap();
        let identifier = repo.oai_identifier(card.id);
        let xml = repo
            .handle_request(
                &store,
                &pairs(&[
                    ("verb", "GetRecord"),
                    ("identifier", identifier.as_str()),
                    ("metadataPrefix", "oai_dc"),
                ]),
            )
            .await
            .unwrap();
        assert!(xml.contains(&format!("<identifier>{identifier}</identifier>")));
        assert!(xml.contains("<oai_dc:dc/>"));
        assert!(xml.contains("<setSpec>some-source</setSpec>"));
        // the derived text's own declaration is stripped
        assert_eq!(xml.matches("<?xml").count(), 1);
    }

    #[tokio::test]
    async fn test_get_record_unknown_id() {
        let store = seeded_store(1).await;
        let repo = repository();
        let xml = repo
            .handle_request(
                &store,
                &pairs(&[
                    ("verb", "GetRecord"),
                    ("identifier", "oai:repo.example.org:not-a-uuid"),
                    ("metadataPrefix", "oai_dc"),
                ]),
            )
            .await
            .unwrap();
        assert!(xml.contains("code=\"idDoesNotExist\""));
    }

    #[tokio::test]
    async fn test_list_records_paginates_with_resumption_token() {
        let store = seeded_store(5).await;
        let repo = repository();
        let xml = repo
            .handle_request(
                &store,
                &pairs(&[("verb", "ListRecords"), ("metadataPrefix", "oai_dc")]),
            )
            .await
            .unwrap();
        assert_eq!(xml.matches("<record>").count(), 3);
        let token_start = xml.find("<resumptionToken>").unwrap() + "<resumptionToken>".len();
        let token_end = xml.find("</resumptionToken>").unwrap();
        let token = &xml[token_start..token_end];
        assert!(!token.is_empty());

        let xml = repo
            .handle_request(
                &store,
                &pairs(&[("verb", "ListRecords"), ("resumptionToken", token)]),
            )
            .await
            .unwrap();
        assert_eq!(xml.matches("<record>").count(), 2);
        assert!(xml.contains("<resumptionToken></resumptionToken>"));
    }

    #[tokio::test]
    async fn test_no_records_and_bad_token_are_distinct() {
        let store = seeded_store(1).await;
        let repo = repository();
        let xml = repo
            .handle_request(
                &store,
                &pairs(&[
                    ("verb", "ListRecords"),
                    ("metadataPrefix", "oai_dc"),
                    ("set", "no-such-source"),
                ]),
            )
            .await
            .unwrap();
        assert!(xml.contains("code=\"noRecordsMatch\""));

        let xml = repo
            .handle_request(
                &store,
                &pairs(&[("verb", "ListRecords"), ("resumptionToken", "gibberish")]),
            )
            .await
            .unwrap();
        assert!(xml.contains("code=\"badResumptionToken\""));
    }

    #[tokio::test]
    async fn test_list_identifiers_headers_only() {
        let store = seeded_store(2).await;
        let xml = repository()
            .handle_request(
                &store,
                &pairs(&[("verb", "ListIdentifiers"), ("metadataPrefix", "oai_dc")]),
            )
            .await
            .unwrap();
        assert_eq!(xml.matches("<header>").count(), 2);
        assert!(!xml.contains("<metadata>"));
    }

    #[tokio::test]
    async fn test_list_sets_from_source_labels() {
        let store = seeded_store(2).await;
        let xml = repository()
            .handle_request(&store, &pairs(&[("verb", "ListSets")]))
            .await
            .unwrap();
        assert_eq!(xml.matches("<setSpec>some-source</setSpec>").count(), 1);
    }

    #[tokio::test]
    async fn test_identify_lists_repository_facts() {
        let store = seeded_store(1).await;
        let xml = repository()
            .handle_request(&store, &pairs(&[("verb", "Identify")]))
            .await
            .unwrap();
        assert!(xml.contains("<repositoryName>test repository</repositoryName>"));
        assert!(xml.contains("<protocolVersion>2.0</protocolVersion>"));
        assert!(xml.contains("<earliestDatestamp>"));
        assert!(xml.contains("<adminEmail>admin@example.org</adminEmail>"));
    }

    #[tokio::test]
    async fn test_from_until_filter_by_datestamp() {
        let store = seeded_store(2).await;
        let xml = repository()
            .handle_request(
                &store,
                &pairs(&[
                    ("verb", "ListRecords"),
                    ("metadataPrefix", "oai_dc"),
                    ("until", "2000-01-01"),
                ]),
            )
            .await
            .unwrap();
        assert!(xml.contains("code=\"noRecordsMatch\""));
    }

    #[test]
    fn test_resumption_token_round_trip() {
        let selection = PageSelection {
            from: parse_oai_datetime("2024-01-01"),
            until: None,
            set_spec: Some("some-source".to_string()),
            prefix: "oai_dc".to_string(),
            last_id: None,
        };
        let last = Uuid::from_bytes([7; 16]);
        let token = repository().format_resumption_token(&selection, last);
        let resumed = parse_resumption_token(&token).unwrap();
        assert_eq!(resumed.from, selection.from);
        assert_eq!(resumed.until, None);
        assert_eq!(resumed.set_spec.as_deref(), Some("some-source"));
        assert_eq!(resumed.prefix, "oai_dc");
        assert_eq!(resumed.last_id, Some(last));
    }
}
