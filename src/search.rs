//! Search query parameters.
//!
//! Parses the JSON:API-flavored query surface (`cardSearchText`,
//! `cardSearchFilter[path][operator]`, `valueSearchPropertyPath`, `sort`,
//! `page[cursor]`, `page[size]`) into typed parameter structs. Anything a
//! client can get wrong is a [`SearchApiError`], kept distinct from engine
//! failures.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::cursor::DEFAULT_PAGE_SIZE;
use crate::error::SearchApiError;
use crate::vocab;
use crate::walk::Propertypath;

/// Special characters in search text.
const NEGATE_PREFIX: char = '-';
const DOUBLE_QUOTE: char = '"';

/// The one-step glob path, matching any single predicate.
pub const GLOB_PATHSTEP: &str = "*";

pub fn is_globpath(path: &[String]) -> bool {
    path.iter().any(|step| step == GLOB_PATHSTEP)
}

/// One parsed piece of search text: a word group, an exact phrase, or a
/// negated term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Textsegment {
    pub text: String,
    pub is_fuzzy: bool,
    pub is_negated: bool,
    pub is_openended: bool,
}

impl Textsegment {
    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Parse search text into words and quoted phrases.
    pub fn split_str(text: &str) -> BTreeSet<Textsegment> {
        let mut segments = BTreeSet::new();
        let mut in_quotes = false;
        let mut last_quote_prefix: Option<char> = None;
        let mut remaining = text;
        loop {
            let (chunk, had_quote, rest) = match remaining.find(DOUBLE_QUOTE) {
                Some(at) => (&remaining[..at], true, &remaining[at + 1..]),
                None => (remaining, false, ""),
            };
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                let is_openended = !had_quote && rest.is_empty();
                if in_quotes {
                    segments.insert(Textsegment {
                        text: trimmed.to_string(),
                        is_fuzzy: false,
                        is_negated: last_quote_prefix == Some(NEGATE_PREFIX),
                        is_openended,
                    });
                } else {
                    from_fuzzy_text(trimmed, is_openended, &mut segments);
                }
            }
            if had_quote {
                if in_quotes {
                    in_quotes = false;
                    last_quote_prefix = None;
                } else {
                    in_quotes = true;
                    last_quote_prefix = trimmed.chars().last();
                }
            }
            if rest.is_empty() {
                break;
            }
            remaining = rest;
        }
        segments
    }
}

/// Split an unquoted chunk into alternating negated/plain word groups:
/// negated words each become their own exact must-not segment, plain runs
/// stay together as one fuzzy segment.
fn from_fuzzy_text(chunk: &str, is_openended: bool, segments: &mut BTreeSet<Textsegment>) {
    if chunk == "*" {
        return;
    }
    let words: Vec<&str> = chunk.split_whitespace().collect();
    let mut groups: Vec<(bool, Vec<&str>)> = Vec::new();
    for word in words {
        let negated = word.starts_with(NEGATE_PREFIX);
        match groups.last_mut() {
            Some((last_negated, group)) if *last_negated == negated => group.push(word),
            _ => groups.push((negated, vec![word])),
        }
    }
    let last_index = groups.len().saturating_sub(1);
    for (index, (negated, group)) in groups.into_iter().enumerate() {
        if negated {
            for word in group {
                let without_prefix = word.strip_prefix(NEGATE_PREFIX).unwrap_or(word);
                if !without_prefix.is_empty() {
                    segments.insert(Textsegment {
                        text: without_prefix.to_string(),
                        is_fuzzy: false,
                        is_negated: true,
                        is_openended: false,
                    });
                }
            }
        } else {
            segments.insert(Textsegment {
                text: group.join(" "),
                is_fuzzy: true,
                is_negated: false,
                is_openended: is_openended && index == last_index,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FilterOperator {
    AnyOf,
    NoneOf,
    IsPresent,
    IsAbsent,
    Before,
    After,
    AtDate,
}

impl FilterOperator {
    pub fn from_shortname(shortname: &str) -> Result<Self, SearchApiError> {
        match shortname {
            "any-of" => Ok(FilterOperator::AnyOf),
            "none-of" => Ok(FilterOperator::NoneOf),
            "is-present" => Ok(FilterOperator::IsPresent),
            "is-absent" => Ok(FilterOperator::IsAbsent),
            "before" => Ok(FilterOperator::Before),
            "after" => Ok(FilterOperator::After),
            "at-date" => Ok(FilterOperator::AtDate),
            other => Err(SearchApiError::InvalidFilterOperator(other.to_string())),
        }
    }

    pub fn to_shortname(self) -> &'static str {
        match self {
            FilterOperator::AnyOf => "any-of",
            FilterOperator::NoneOf => "none-of",
            FilterOperator::IsPresent => "is-present",
            FilterOperator::IsAbsent => "is-absent",
            FilterOperator::Before => "before",
            FilterOperator::After => "after",
            FilterOperator::AtDate => "at-date",
        }
    }

    pub fn is_date_operator(self) -> bool {
        matches!(
            self,
            FilterOperator::Before | FilterOperator::After | FilterOperator::AtDate
        )
    }

    pub fn is_iri_operator(self) -> bool {
        matches!(self, FilterOperator::AnyOf | FilterOperator::NoneOf)
    }

    pub fn is_valueless_operator(self) -> bool {
        matches!(self, FilterOperator::IsPresent | FilterOperator::IsAbsent)
    }
}

/// One filter on card search results.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SearchFilter {
    pub propertypath: Propertypath,
    pub operator: FilterOperator,
    pub value_set: BTreeSet<String>,
}

impl SearchFilter {
    /// Build a filter from the pieces of a
    /// `...Filter[<path>][<operator>]=<values>` query parameter.
    pub fn from_param(
        serialized_path: &str,
        operator_shortname: Option<&str>,
        param_value: &str,
    ) -> Result<Self, SearchApiError> {
        let propertypath = parse_propertypath(serialized_path, true)?;
        let is_date_filter = propertypath
            .last()
            .is_some_and(|step| vocab::is_date_property(step));
        let operator = match operator_shortname {
            Some(shortname) if !shortname.is_empty() => FilterOperator::from_shortname(shortname)?,
            _ => {
                if is_date_filter {
                    FilterOperator::AtDate
                } else {
                    FilterOperator::AnyOf
                }
            }
        };
        if operator.is_date_operator() && !is_date_filter {
            return Err(SearchApiError::InvalidParameter(format!(
                "cannot use date operator \"{}\" on non-date property",
                operator.to_shortname()
            )));
        }
        let mut value_set = BTreeSet::new();
        if !operator.is_valueless_operator() {
            for value in split_queryparam_value(param_value) {
                if is_date_filter {
                    DateValue::parse(&value)?;
                    value_set.insert(value);
                } else {
                    value_set.insert(expand_shorthand(&value)?);
                }
            }
        }
        Ok(SearchFilter {
            propertypath,
            operator,
            value_set,
        })
    }

    /// The special filter matching exact identifier IRIs.
    pub fn is_sameas_filter(&self) -> bool {
        self.operator == FilterOperator::AnyOf && self.propertypath == vec![vocab::owl("sameAs")]
    }
}

/// A date filter value with inferred granularity: `YYYY`, `YYYY-MM`, or
/// `YYYY-MM-DD`. Anything else is a client error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateValue {
    pub floor: NaiveDate,
    pub ceiling: NaiveDate,
}

impl DateValue {
    pub fn parse(text: &str) -> Result<Self, SearchApiError> {
        lazy_static! {
            static ref YEAR_RE: Regex = Regex::new(r"^\d{4,}$").unwrap();
            static ref MONTH_RE: Regex = Regex::new(r"^(\d{4,})-(\d{2})$").unwrap();
            static ref DAY_RE: Regex = Regex::new(r"^\d{4,}-\d{2}-\d{2}$").unwrap();
        }
        let clean = text.trim();
        let bad = || SearchApiError::InvalidDateValue(text.to_string());
        if YEAR_RE.is_match(clean) {
            let year: i32 = clean.parse().map_err(|_| bad())?;
            let floor = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(bad)?;
            let ceiling = NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(bad)?;
            return Ok(DateValue { floor, ceiling });
        }
        if let Some(captures) = MONTH_RE.captures(clean) {
            let year: i32 = captures[1].parse().map_err(|_| bad())?;
            let month: u32 = captures[2].parse().map_err(|_| bad())?;
            let floor = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(bad)?;
            let next_month = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)
            }
            .ok_or_else(bad)?;
            let ceiling = next_month.pred_opt().ok_or_else(bad)?;
            return Ok(DateValue { floor, ceiling });
        }
        if DAY_RE.is_match(clean) {
            let date = NaiveDate::parse_from_str(clean, "%Y-%m-%d").map_err(|_| bad())?;
            return Ok(DateValue {
                floor: date,
                ceiling: date,
            });
        }
        Err(bad())
    }
}

/// Sort by a date property, ascending or descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortParam {
    pub property_iri: String,
    pub descending: bool,
}

impl SortParam {
    /// Parse a `sort` parameter value. Empty or `-relevance` means no sort.
    pub fn parse(param_value: &str) -> Result<Option<Self>, SearchApiError> {
        if param_value.is_empty() || param_value == "-relevance" {
            return Ok(None);
        }
        let descending = param_value.starts_with('-');
        let sort_property = param_value.trim_start_matches('-');
        let property_iri = expand_shorthand(sort_property)?;
        if !vocab::is_date_property(&property_iri) {
            return Err(SearchApiError::InvalidParameter(format!(
                "bad sort: {sort_property}"
            )));
        }
        Ok(Some(SortParam {
            property_iri,
            descending,
        }))
    }
}

/// Opaque-cursor-or-size pagination parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParam {
    pub cursor: Option<String>,
    pub size: Option<i64>,
}

impl PageParam {
    pub fn size_or_default(&self) -> i64 {
        self.size.unwrap_or(DEFAULT_PAGE_SIZE as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardsearchParams {
    pub cardsearch_text: String,
    pub cardsearch_textsegments: BTreeSet<Textsegment>,
    pub cardsearch_filters: Vec<SearchFilter>,
    pub sort: Option<SortParam>,
    pub page: PageParam,
}

impl CardsearchParams {
    /// Parse from decoded (name, value) query pairs.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, SearchApiError> {
        let mut cardsearch_text = String::new();
        let mut cardsearch_filters = Vec::new();
        let mut sort = None;
        let mut page = PageParam::default();
        for (name, value) in pairs {
            let parsed = QueryparamName::parse(name)?;
            match (parsed.family.as_str(), parsed.brackets.as_slice()) {
                ("cardSearchText", _) => {
                    if !cardsearch_text.is_empty() {
                        cardsearch_text.push(' ');
                    }
                    cardsearch_text.push_str(value);
                }
                ("cardSearchFilter", [path]) => {
                    cardsearch_filters.push(SearchFilter::from_param(path, None, value)?);
                }
                ("cardSearchFilter", [path, operator]) => {
                    cardsearch_filters.push(SearchFilter::from_param(
                        path,
                        Some(operator),
                        value,
                    )?);
                }
                ("sort", []) => sort = SortParam::parse(value)?,
                ("page", [segment]) if segment == "cursor" => page.cursor = Some(value.clone()),
                ("page", [segment]) if segment == "size" => {
                    let size: i64 = value.parse().map_err(|_| {
                        SearchApiError::InvalidParameter(format!("bad page[size]: {value}"))
                    })?;
                    page.size = Some(size);
                }
                // valuesearch params are parsed separately
                _ => {}
            }
        }
        let cardsearch_textsegments = Textsegment::split_str(&cardsearch_text);
        Ok(CardsearchParams {
            cardsearch_text,
            cardsearch_textsegments,
            cardsearch_filters,
            sort,
            page,
        })
    }
}

/// A valuesearch is always in context of a cardsearch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuesearchParams {
    pub cardsearch: CardsearchParams,
    pub valuesearch_propertypath: Propertypath,
    pub valuesearch_text: String,
    pub valuesearch_textsegments: BTreeSet<Textsegment>,
    pub valuesearch_filters: Vec<SearchFilter>,
}

impl ValuesearchParams {
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, SearchApiError> {
        let cardsearch = CardsearchParams::from_query_pairs(pairs)?;
        let mut propertypath = None;
        let mut valuesearch_text = String::new();
        let mut valuesearch_filters = Vec::new();
        for (name, value) in pairs {
            let parsed = QueryparamName::parse(name)?;
            match (parsed.family.as_str(), parsed.brackets.as_slice()) {
                ("valueSearchPropertyPath", _) => {
                    propertypath = Some(parse_propertypath(value, false)?);
                }
                ("valueSearchText", _) => {
                    if !valuesearch_text.is_empty() {
                        valuesearch_text.push(' ');
                    }
                    valuesearch_text.push_str(value);
                }
                ("valueSearchFilter", [path]) => {
                    valuesearch_filters.push(SearchFilter::from_param(path, None, value)?);
                }
                ("valueSearchFilter", [path, operator]) => {
                    valuesearch_filters.push(SearchFilter::from_param(
                        path,
                        Some(operator),
                        value,
                    )?);
                }
                _ => {}
            }
        }
        let valuesearch_propertypath = propertypath.ok_or_else(|| {
            SearchApiError::InvalidParameter("valueSearchPropertyPath required".to_string())
        })?;
        let is_date_path = valuesearch_propertypath
            .last()
            .is_some_and(|step| vocab::is_date_property(step));
        if is_date_path && (!valuesearch_text.is_empty() || !valuesearch_filters.is_empty()) {
            return Err(SearchApiError::InvalidParameter(
                "valueSearchText and valueSearchFilter do not apply to date values".to_string(),
            ));
        }
        let valuesearch_textsegments = Textsegment::split_str(&valuesearch_text);
        Ok(ValuesearchParams {
            cardsearch,
            valuesearch_propertypath,
            valuesearch_text,
            valuesearch_textsegments,
            valuesearch_filters,
        })
    }
}

/// A query parameter name like `cardSearchFilter[subject][any-of]`:
/// a family plus bracketed segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryparamName {
    pub family: String,
    pub brackets: Vec<String>,
}

impl QueryparamName {
    pub fn parse(name: &str) -> Result<Self, SearchApiError> {
        lazy_static! {
            static ref NAME_RE: Regex = Regex::new(r"^([^\[\]]+)((?:\[[^\[\]]*\])*)$").unwrap();
            static ref BRACKET_RE: Regex = Regex::new(r"\[([^\[\]]*)\]").unwrap();
        }
        let captures = NAME_RE
            .captures(name)
            .ok_or_else(|| SearchApiError::InvalidParameter(format!("bad param name: {name}")))?;
        let family = captures[1].to_string();
        let brackets_text = captures[2].to_string();
        let brackets = BRACKET_RE
            .captures_iter(&brackets_text)
            .map(|bracket| bracket[1].to_string())
            .collect();
        Ok(QueryparamName { family, brackets })
    }
}

/// Comma-separated values within one query parameter.
pub fn split_queryparam_value(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a serialized property path: comma-separated steps, each a known
/// shorthand label, a full IRI, or (when allowed) the `*` glob.
pub fn parse_propertypath(
    serialized: &str,
    allow_glob: bool,
) -> Result<Propertypath, SearchApiError> {
    let steps = split_queryparam_value(serialized);
    if steps.is_empty() {
        return Err(SearchApiError::InvalidPropertyPath(serialized.to_string()));
    }
    let mut path = Vec::with_capacity(steps.len());
    for step in steps {
        if step == GLOB_PATHSTEP {
            if !allow_glob {
                return Err(SearchApiError::InvalidPropertyPath(serialized.to_string()));
            }
            path.push(step);
        } else {
            path.push(expand_shorthand(&step)?);
        }
    }
    if path.iter().any(|step| step == GLOB_PATHSTEP) && path.len() > 1 {
        // globs only stand alone; "creator,*" is not a meaningful path
        return Err(SearchApiError::InvalidPropertyPath(serialized.to_string()));
    }
    Ok(path)
}

/// Expand a shorthand label to its property IRI; full IRIs pass through.
pub fn expand_shorthand(step: &str) -> Result<String, SearchApiError> {
    let expanded = match step {
        "title" => vocab::dcterms("title"),
        "creator" => vocab::dcterms("creator"),
        "contributor" => vocab::dcterms("contributor"),
        "publisher" => vocab::dcterms("publisher"),
        "subject" => vocab::dcterms("subject"),
        "description" => vocab::dcterms("description"),
        "language" => vocab::dcterms("language"),
        "identifier" => vocab::dcterms("identifier"),
        "date" => vocab::dcterms("date"),
        "dateCreated" => vocab::dcterms("created"),
        "dateModified" => vocab::dcterms("modified"),
        "dateAccepted" => vocab::dcterms("dateAccepted"),
        "dateSubmitted" => vocab::dcterms("dateSubmitted"),
        "dateAvailable" => vocab::dcterms("available"),
        "dateCopyrighted" => vocab::dcterms("dateCopyrighted"),
        "dateWithdrawn" => vocab::osfmap("dateWithdrawn"),
        "keyword" => vocab::osfmap("keyword"),
        "affiliation" => vocab::osfmap("affiliatedInstitution"),
        "funder" => vocab::osfmap("funder"),
        "isPartOf" => vocab::dcterms("isPartOf"),
        "hasPart" => vocab::dcterms("hasPart"),
        "rights" => vocab::dcterms("rights"),
        "name" => vocab::foaf("name"),
        "sameAs" => vocab::owl("sameAs"),
        "resourceType" => vocab::rdf("type"),
        other => {
            if other.contains(':') {
                other.to_string()
            } else {
                return Err(SearchApiError::InvalidPropertyPath(other.to_string()));
            }
        }
    };
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, fuzzy: bool, negated: bool, openended: bool) -> Textsegment {
        Textsegment {
            text: text.to_string(),
            is_fuzzy: fuzzy,
            is_negated: negated,
            is_openended: openended,
        }
    }

    #[test]
    fn test_split_str_plain_words_one_fuzzy_segment() {
        let segments = Textsegment::split_str("open science data");
        assert_eq!(
            segments,
            BTreeSet::from([segment("open science data", true, false, true)])
        );
    }

    #[test]
    fn test_split_str_quoted_phrase_exact() {
        let segments = Textsegment::split_str("\"exact phrase\" trailing");
        assert!(segments.contains(&segment("exact phrase", false, false, false)));
        assert!(segments.contains(&segment("trailing", true, false, true)));
    }

    #[test]
    fn test_split_str_negated_words() {
        let segments = Textsegment::split_str("wanted -unwanted also");
        assert!(segments.contains(&segment("wanted", true, false, false)));
        assert!(segments.contains(&segment("unwanted", false, true, false)));
        assert!(segments.contains(&segment("also", true, false, true)));
    }

    #[test]
    fn test_split_str_negated_phrase() {
        let segments = Textsegment::split_str("-\"not this phrase\"");
        assert!(segments.contains(&segment("not this phrase", false, true, false)));
    }

    #[test]
    fn test_split_str_bare_star_ignored() {
        assert!(Textsegment::split_str("*").is_empty());
    }

    #[test]
    fn test_filter_default_operators() {
        let iri_filter =
            SearchFilter::from_param("subject", None, "https://example.org/s").unwrap();
        assert_eq!(iri_filter.operator, FilterOperator::AnyOf);
        let date_filter = SearchFilter::from_param("dateCreated", None, "2024").unwrap();
        assert_eq!(date_filter.operator, FilterOperator::AtDate);
    }

    #[test]
    fn test_filter_rejects_date_operator_on_non_date_property() {
        let result = SearchFilter::from_param("subject", Some("before"), "2024");
        assert!(matches!(result, Err(SearchApiError::InvalidParameter(_))));
    }

    #[test]
    fn test_filter_rejects_unknown_operator() {
        let result = SearchFilter::from_param("subject", Some("almost-of"), "x");
        assert!(matches!(
            result,
            Err(SearchApiError::InvalidFilterOperator(_))
        ));
    }

    #[test]
    fn test_date_value_granularities() {
        let year = DateValue::parse("2024").unwrap();
        assert_eq!(year.floor, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(year.ceiling, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        let month = DateValue::parse("2024-02").unwrap();
        assert_eq!(month.ceiling, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        let day = DateValue::parse("2024-05-01").unwrap();
        assert_eq!(day.floor, day.ceiling);
    }

    #[test]
    fn test_date_value_rejects_other_shapes() {
        for bad in ["05-01", "2024-5", "last tuesday", "2024-05-01T00:00:00Z"] {
            assert!(
                matches!(
                    DateValue::parse(bad),
                    Err(SearchApiError::InvalidDateValue(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_sort_param() {
        let sort = SortParam::parse("-dateCreated").unwrap().unwrap();
        assert!(sort.descending);
        assert_eq!(sort.property_iri, vocab::dcterms("created"));
        assert!(SortParam::parse("-relevance").unwrap().is_none());
        assert!(SortParam::parse("title").is_err());
    }

    #[test]
    fn test_propertypath_glob_rules() {
        assert_eq!(
            parse_propertypath("*", true).unwrap(),
            vec![GLOB_PATHSTEP.to_string()]
        );
        assert!(parse_propertypath("*", false).is_err());
        assert!(parse_propertypath("creator,*", true).is_err());
        assert_eq!(
            parse_propertypath("creator,name", false).unwrap(),
            vec![vocab::dcterms("creator"), vocab::foaf("name")]
        );
    }

    #[test]
    fn test_cardsearch_params_from_pairs() {
        let pairs = vec![
            ("cardSearchText".to_string(), "hello world".to_string()),
            (
                "cardSearchFilter[subject]".to_string(),
                "https://example.org/s1".to_string(),
            ),
            (
                "cardSearchFilter[dateCreated][after]".to_string(),
                "2020".to_string(),
            ),
            ("sort".to_string(), "-dateModified".to_string()),
            ("page[size]".to_string(), "7".to_string()),
        ];
        let params = CardsearchParams::from_query_pairs(&pairs).unwrap();
        assert_eq!(params.cardsearch_text, "hello world");
        assert_eq!(params.cardsearch_filters.len(), 2);
        assert!(params.sort.as_ref().unwrap().descending);
        assert_eq!(params.page.size, Some(7));
        assert!(params.page.cursor.is_none());
    }

    #[test]
    fn test_valuesearch_requires_propertypath() {
        let pairs = vec![("valueSearchText".to_string(), "nih".to_string())];
        assert!(ValuesearchParams::from_query_pairs(&pairs).is_err());
        let pairs = vec![
            ("valueSearchPropertyPath".to_string(), "funder".to_string()),
            ("valueSearchText".to_string(), "nih".to_string()),
        ];
        let params = ValuesearchParams::from_query_pairs(&pairs).unwrap();
        assert_eq!(
            params.valuesearch_propertypath,
            vec![vocab::osfmap("funder")]
        );
    }

    #[test]
    fn test_date_valuesearch_rejects_text_and_filters() {
        let pairs = vec![
            (
                "valueSearchPropertyPath".to_string(),
                "dateCreated".to_string(),
            ),
            ("valueSearchText".to_string(), "2024".to_string()),
        ];
        assert!(matches!(
            ValuesearchParams::from_query_pairs(&pairs),
            Err(SearchApiError::InvalidParameter(_))
        ));
        let pairs = vec![
            (
                "valueSearchPropertyPath".to_string(),
                "dateCreated".to_string(),
            ),
            (
                "valueSearchFilter[resourceType][any-of]".to_string(),
                vocab::foaf("Person"),
            ),
        ];
        assert!(matches!(
            ValuesearchParams::from_query_pairs(&pairs),
            Err(SearchApiError::InvalidParameter(_))
        ));
        // a bare date valuesearch stays fine
        let pairs = vec![(
            "valueSearchPropertyPath".to_string(),
            "dateCreated".to_string(),
        )];
        assert!(ValuesearchParams::from_query_pairs(&pairs).is_ok());
    }
}
