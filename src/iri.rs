//! IRI normalization and identifier recognition.
//!
//! Two concerns live here:
//!
//! * "sufficiently unique" IRI normalization ([`suffuniq_iri`]): two IRIs
//!   that differ only in scheme (given a non-empty authority) or trailing
//!   path slashes are treated as equivalent at index time.
//! * identifier recognition: turning messy harvested strings (DOIs, ORCIDs,
//!   ISSNs, bare URLs, emails...) into one canonical IRI. Recognizers live
//!   in an explicit priority-ordered list; each scores its confidence via
//!   `hint` and the best scorer parses. A hint of 1.0 short-circuits.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ChainError;

lazy_static! {
    static ref IRI_SCHEME_RE: Regex = Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*").unwrap();
}

/// Normalize an IRI to its "sufficiently unique" form.
///
/// When the IRI has an authority component (`scheme://...`), the scheme is
/// dropped and trailing slashes are stripped from the path; otherwise the
/// input is returned unchanged (nothing safe can be assumed about
/// non-authority IRIs like `urn:` or `mailto:`).
pub fn suffuniq_iri(iri: &str) -> String {
    let Some(scheme_match) = IRI_SCHEME_RE.find(iri) else {
        return iri.to_string();
    };
    let remainder = &iri[scheme_match.end()..];
    let Some(after) = remainder.strip_prefix("://") else {
        return iri.to_string();
    };
    // split off fragment, then query, then trim trailing slashes from
    // the authority+path portion
    let (before_fragment, fragment) = match after.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (after, None),
    };
    let (before_query, query) = match before_fragment.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (before_fragment, None),
    };
    let mut out = format!("//{}", before_query.trim_end_matches('/'));
    if let Some(q) = query {
        if !q.is_empty() {
            out.push('?');
            out.push_str(q);
        }
    }
    if let Some(f) = fragment {
        if !f.is_empty() {
            out.push('#');
            out.push_str(f);
        }
    }
    out
}

/// Whether an IRI is worth keeping as a synonym or search value.
pub fn is_worthwhile_iri(iri: &str) -> bool {
    !iri.starts_with('_')
}

/// A property path rendered as a JSON array keyword, optionally with each
/// step normalized to its sufficiently-unique form.
pub fn propertypath_as_keyword(path: &[String], suffuniq: bool) -> String {
    let steps: Vec<String> = if suffuniq {
        path.iter().map(|step| suffuniq_iri(step)).collect()
    } else {
        path.to_vec()
    };
    serde_json::to_string(&steps).unwrap_or_else(|_| "[]".to_string())
}

/// Percent-encode a string, keeping unreserved characters and the segment
/// characters RFC 3987 allows unescaped.
pub fn quote(text: &str) -> String {
    const SAFE: &str = ":@-._~!$&'()*+,;=";
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        let c = byte as char;
        if c.is_ascii_alphanumeric() || SAFE.contains(c) {
            out.push(c);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn compose(scheme: &str, authority: &str, path: &str) -> String {
    format!("{scheme}://{authority}{path}")
}

/// A single identifier format the [`recognize_iri`] dispatcher can try.
pub trait IriRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Confidence in `[0.0, 1.0]` that `recognize` will succeed.
    fn hint(&self, text: &str) -> f64;

    /// Parse the text into its canonical IRI form.
    fn recognize(&self, text: &str) -> Result<String, ChainError>;
}

/// The recognizer list, in priority order. Ties on hint score are broken
/// by position; a 1.0 hint stops the scan.
pub fn recognizers() -> &'static [&'static dyn IriRecognizer] {
    static LIST: &[&dyn IriRecognizer] = &[
        &IssnRecognizer,
        &UrnRecognizer,
        &IsniRecognizer,
        &OrcidRecognizer,
        &DoiRecognizer,
        &UrlRecognizer,
        &EmailRecognizer,
        &ArxivRecognizer,
        &ArkRecognizer,
        &InfoUriRecognizer,
        &IsbnRecognizer,
    ];
    LIST
}

/// Recognize the best-matching identifier format in `text` and return its
/// canonical IRI.
pub fn recognize_iri(text: &str) -> Result<String, ChainError> {
    let mut best: Option<(&dyn IriRecognizer, f64)> = None;
    for recognizer in recognizers() {
        let hint = recognizer.hint(text);
        if hint > best.map_or(0.0, |(_, score)| score) {
            best = Some((*recognizer, hint));
        }
        if hint >= 1.0 {
            break;
        }
    }
    match best {
        Some((recognizer, _)) => recognizer.recognize(text),
        None => Err(ChainError::InvalidIri(text.to_string())),
    }
}

/// Synthesize a fallback URN for text no recognizer accepts.
pub fn urn_fallback(source_label: &str, text: &str) -> String {
    format!("urn://trove/{}:{}", source_label, quote(text))
}

// ── ISSN ────────────────────────────────────────────────────────────────

pub struct IssnRecognizer;

lazy_static! {
    static ref ISSN_RE: Regex = Regex::new(r"(?:^|\s)(\d{4})-(\d{3}[\dxX])\s*$").unwrap();
}

fn issn_checksum_ok(digits: &str) -> bool {
    let chars: Vec<char> = digits.chars().collect();
    let mut total = 0u32;
    for (i, c) in chars[..7].iter().enumerate() {
        match c.to_digit(10) {
            Some(d) => total += (8 - i as u32) * d,
            None => return false,
        }
    }
    let actual = (11 - (total % 11)) % 11;
    let expected = if actual == 10 {
        'X'
    } else {
        char::from_digit(actual, 10).unwrap_or('?')
    };
    chars[7] == expected
}

impl IriRecognizer for IssnRecognizer {
    fn name(&self) -> &'static str {
        "issn"
    }

    fn hint(&self, text: &str) -> f64 {
        if ISSN_RE.is_match(text) {
            0.9
        } else if text.to_lowercase().contains("issn") {
            0.35
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let upper = text.to_uppercase();
        let caps = ISSN_RE
            .captures(&upper)
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        let digits = format!("{}{}", &caps[1], &caps[2]);
        if !issn_checksum_ok(&digits) {
            return Err(ChainError::InvalidIri(text.to_string()));
        }
        Ok(compose("urn", "ISSN", &format!("/{}-{}", &caps[1], &caps[2])))
    }
}

// ── URN / OAI ───────────────────────────────────────────────────────────

pub struct UrnRecognizer;

lazy_static! {
    static ref URN_RE: Regex = Regex::new(r"(?i)\b(urn|oai):([\w.-]+):(\S+)").unwrap();
    static ref PARSED_URN_RE: Regex = Regex::new(r"(?i)^(urn|oai)://([^/\s]+)/(\S+)$").unwrap();
}

impl IriRecognizer for UrnRecognizer {
    fn name(&self) -> &'static str {
        "urn"
    }

    fn hint(&self, text: &str) -> f64 {
        if URN_RE.is_match(text) || PARSED_URN_RE.is_match(text) {
            0.9
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let lower = text.to_lowercase();
        let caps = URN_RE
            .captures(&lower)
            .or_else(|| PARSED_URN_RE.captures(&lower))
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        Ok(compose(&caps[1], &caps[2], &format!("/{}", &caps[3])))
    }
}

// ── ISNI / ORCID ────────────────────────────────────────────────────────

lazy_static! {
    static ref ISNI_RE: Regex =
        Regex::new(r"(?:^|\b)(?:HTTPS?://)?(?:[^=\d/\s]*/)?(\d{4})-?(\d{4})-?(\d{4})-?(\d{3}[\dX])\b")
            .unwrap();
}

/// Validate the ISO 7064 mod 11-2 check digit and return the numeric value
/// of the full 16-digit identifier.
fn isni_checksum(digits16: &str) -> Result<u64, ()> {
    let chars: Vec<char> = digits16.chars().collect();
    if chars.len() != 16 {
        return Err(());
    }
    let mut total = 0u64;
    for c in &chars[..15] {
        let d = c.to_digit(10).ok_or(())? as u64;
        total = (total + d) * 2;
    }
    let check = (12 - (total % 11)) % 11;
    let leading: u64 = digits16[..15].parse().map_err(|_| ())?;
    let literal = leading * 10 + check;
    let expected = if check == 10 {
        'X'
    } else {
        char::from_digit(check as u32, 10).ok_or(())?
    };
    if chars[15] != expected {
        return Err(());
    }
    Ok(literal)
}

const ORCID_LOWER: u64 = 150_000_007;
const ORCID_UPPER: u64 = 350_000_001;

fn isni_parse(text: &str) -> Option<[String; 4]> {
    let upper = text.to_uppercase();
    let caps = ISNI_RE.captures(&upper)?;
    Some([
        caps[1].to_string(),
        caps[2].to_string(),
        caps[3].to_string(),
        caps[4].to_string(),
    ])
}

pub struct IsniRecognizer;

impl IsniRecognizer {
    fn try_recognize(text: &str) -> Result<String, ChainError> {
        let groups = isni_parse(text).ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        let digits = groups.concat();
        let literal =
            isni_checksum(&digits).map_err(|_| ChainError::InvalidIri(text.to_string()))?;
        // the ORCID range is reserved out of ISNI space
        if literal > ORCID_LOWER && literal < ORCID_UPPER {
            return Err(ChainError::InvalidIri(text.to_string()));
        }
        Ok(compose("http", "isni.org", &format!("/{digits}")))
    }
}

impl IriRecognizer for IsniRecognizer {
    fn name(&self) -> &'static str {
        "isni"
    }

    fn hint(&self, text: &str) -> f64 {
        if Self::try_recognize(text).is_ok() {
            1.0
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        Self::try_recognize(text)
    }
}

pub struct OrcidRecognizer;

impl OrcidRecognizer {
    fn try_recognize(text: &str) -> Result<String, ChainError> {
        let groups = isni_parse(text).ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        let digits = groups.concat();
        let literal =
            isni_checksum(&digits).map_err(|_| ChainError::InvalidIri(text.to_string()))?;
        if literal <= ORCID_LOWER || literal >= ORCID_UPPER {
            return Err(ChainError::InvalidIri(text.to_string()));
        }
        Ok(compose("http", "orcid.org", &format!("/{}", groups.join("-"))))
    }
}

impl IriRecognizer for OrcidRecognizer {
    fn name(&self) -> &'static str {
        "orcid"
    }

    fn hint(&self, text: &str) -> f64 {
        if Self::try_recognize(text).is_ok() {
            1.0
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        Self::try_recognize(text)
    }
}

// ── DOI ─────────────────────────────────────────────────────────────────

pub struct DoiRecognizer;

lazy_static! {
    static ref DOI_RE: Regex =
        Regex::new(r#"(?i)(?:^|\b)(?:https?://)?(?:[^=/\s]*/)?(10\.\d{4,}(?:\.\d+)*(?:/|%2F)[^\s"&'<>]+)"#)
            .unwrap();
}

impl IriRecognizer for DoiRecognizer {
    fn name(&self) -> &'static str {
        "doi"
    }

    fn hint(&self, text: &str) -> f64 {
        if DOI_RE.is_match(text) {
            0.9
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let upper = text.to_uppercase();
        let caps = DOI_RE
            .captures(&upper)
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        let doi = caps[1].replace("%2F", "/");
        let path: Vec<String> = doi.split('/').map(|segment| quote(segment)).collect();
        Ok(compose("http", "dx.doi.org", &format!("/{}", path.join("/"))))
    }
}

// ── URL ─────────────────────────────────────────────────────────────────

pub struct UrlRecognizer;

lazy_static! {
    static ref URL_RE: Regex = Regex::new(
        r"(?i)\b(https?|ftps?)://[-a-z0-9@:%._+~#=]{2,256}\.[a-z]{2,6}\b[-a-z0-9@:%_+.~#?&/=]*"
    )
    .unwrap();
    static ref IP_URL_RE: Regex = Regex::new(
        r"(?i)\b(https?|ftps?)://\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}(?::\d{2,5})?[-a-z0-9@:%_+.~#?&/=]*"
    )
    .unwrap();
}

fn split_url(url: &str) -> Result<(String, String, String), ChainError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| ChainError::InvalidIri(url.to_string()))?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let tail = &rest[end..];
    Ok((scheme.to_string(), authority.to_string(), tail.to_string()))
}

impl IriRecognizer for UrlRecognizer {
    fn name(&self) -> &'static str {
        "url"
    }

    fn hint(&self, text: &str) -> f64 {
        let text = text.replace("&amp;", "&");
        if URL_RE.is_match(&text) || IP_URL_RE.is_match(&text) {
            0.25
        } else if text.to_lowercase().starts_with("www.") || text.to_lowercase().starts_with("www2.")
        {
            0.1
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        // some OAI feeds double-escape ampersands
        let cleaned = text.replace("&amp;", "&");
        let lowered = cleaned.to_lowercase();
        let matched = URL_RE
            .find(&cleaned)
            .or_else(|| IP_URL_RE.find(&cleaned))
            .map(|m| m.as_str().to_string())
            .or_else(|| {
                if lowered.starts_with("www.") || lowered.starts_with("www2.") {
                    let prefixed = format!("http://{cleaned}");
                    URL_RE.find(&prefixed).map(|m| m.as_str().to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        let (scheme, authority, tail) = split_url(&matched)?;
        // standardize on non-secure scheme so http/https unify
        let scheme = scheme.to_lowercase();
        let scheme = scheme.trim_end_matches('s');
        let mut authority = authority.to_lowercase();
        if let Some((host, port)) = authority.clone().split_once(':') {
            if port == "80" || port == "443" {
                authority = host.to_string();
            }
        }
        Ok(compose(scheme, &authority, &tail))
    }
}

// ── Email ───────────────────────────────────────────────────────────────

pub struct EmailRecognizer;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"(?:mailto:)?([a-zA-Z0-9_.+-]+)@([a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+)").unwrap();
}

impl IriRecognizer for EmailRecognizer {
    fn name(&self) -> &'static str {
        "email"
    }

    fn hint(&self, text: &str) -> f64 {
        if EMAIL_RE.is_match(text) {
            1.0
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let cleaned = text.replace('\u{2010}', "-");
        let mut found = EMAIL_RE.captures_iter(&cleaned);
        let first = found
            .next()
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        if found.next().is_some() {
            return Err(ChainError::InvalidIri(text.to_string()));
        }
        Ok(format!("mailto:{}@{}", &first[1], &first[2]))
    }
}

// ── arXiv ───────────────────────────────────────────────────────────────

pub struct ArxivRecognizer;

lazy_static! {
    static ref ARXIV_RE: Regex = Regex::new(r"(?i)\barXiv:(\d{4}\.\d{5})(v\d)?").unwrap();
}

impl IriRecognizer for ArxivRecognizer {
    fn name(&self) -> &'static str {
        "arxiv"
    }

    fn hint(&self, text: &str) -> f64 {
        if ARXIV_RE.is_match(text) {
            1.0
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let caps = ARXIV_RE
            .captures(text)
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        Ok(compose("http", "arxiv.org", &format!("/abs/{}", &caps[1])))
    }
}

// ── ARK ─────────────────────────────────────────────────────────────────

pub struct ArkRecognizer;

lazy_static! {
    static ref ARK_RE: Regex = Regex::new(r"(?i)\bark://?(\d+)(/\S+)").unwrap();
}

impl IriRecognizer for ArkRecognizer {
    fn name(&self) -> &'static str {
        "ark"
    }

    fn hint(&self, text: &str) -> f64 {
        if ARK_RE.is_match(text) {
            0.9
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let caps = ARK_RE
            .captures(text)
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        Ok(compose("ark", &caps[1], &caps[2]))
    }
}

// ── info: URI ───────────────────────────────────────────────────────────

pub struct InfoUriRecognizer;

lazy_static! {
    static ref INFO_RE: Regex = Regex::new(r"^\s*info:([\w-]+)(/\S+)\s*$").unwrap();
}

impl IriRecognizer for InfoUriRecognizer {
    fn name(&self) -> &'static str {
        "info-uri"
    }

    fn hint(&self, text: &str) -> f64 {
        if INFO_RE.is_match(text) {
            0.9
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let caps = INFO_RE
            .captures(text)
            .ok_or_else(|| ChainError::InvalidIri(text.to_string()))?;
        Ok(compose("info", &caps[1], &caps[2]))
    }
}

// ── ISBN ────────────────────────────────────────────────────────────────

pub struct IsbnRecognizer;

lazy_static! {
    static ref ISBN10_RE: Regex =
        Regex::new(r"(?i)^(?:urn://isbn/|ISBN:? ?)?(\d\d?)-(\d{3,7})-(\d{1,6})-([\dxX])$").unwrap();
    static ref ISBN13_RE: Regex =
        Regex::new(r"(?i)^(?:urn://isbn/|ISBN:? ?)?(978|979)-(\d\d?)-(\d{3,5})-(\d{2,5})-(\d)$")
            .unwrap();
}

fn isbn13_check(digits12: &[u32]) -> u32 {
    let sum: u32 = digits12
        .iter()
        .enumerate()
        .map(|(i, d)| d * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    (10 - sum % 10) % 10
}

impl IriRecognizer for IsbnRecognizer {
    fn name(&self) -> &'static str {
        "isbn"
    }

    fn hint(&self, text: &str) -> f64 {
        if ISBN13_RE.is_match(text) || ISBN10_RE.is_match(text) {
            1.0
        } else {
            0.0
        }
    }

    fn recognize(&self, text: &str) -> Result<String, ChainError> {
        let upper = text.to_uppercase();
        let invalid = || ChainError::InvalidIri(text.to_string());
        let digits: Vec<char> = if let Some(caps) = ISBN13_RE.captures(&upper) {
            let joined: String = (1..=5).map(|i| caps[i].to_string()).collect();
            if joined.len() != 13 {
                return Err(invalid());
            }
            let nums: Vec<u32> = joined.chars().filter_map(|c| c.to_digit(10)).collect();
            if nums.len() != 13 || isbn13_check(&nums[..12]) != nums[12] {
                return Err(invalid());
            }
            joined.chars().collect()
        } else if let Some(caps) = ISBN10_RE.captures(&upper) {
            let joined: String = (1..=4).map(|i| caps[i].to_string()).collect();
            if joined.len() != 10 {
                return Err(invalid());
            }
            let check: u32 = joined
                .chars()
                .enumerate()
                .map(|(i, c)| {
                    if c == 'X' {
                        10
                    } else {
                        c.to_digit(10).unwrap_or(0) * (10 - i as u32)
                    }
                })
                .sum();
            if check % 11 != 0 {
                return Err(invalid());
            }
            // upgrade to isbn-13 and recompute the check digit
            let mut upgraded = format!("978{joined}");
            let nums: Vec<u32> = upgraded[..12].chars().filter_map(|c| c.to_digit(10)).collect();
            if nums.len() != 12 {
                return Err(invalid());
            }
            let check13 = isbn13_check(&nums);
            upgraded.truncate(12);
            upgraded.push(char::from_digit(check13, 10).ok_or_else(invalid)?);
            upgraded.chars().collect()
        } else {
            return Err(invalid());
        };
        // group digits EAN - group - publisher - title - check
        let d = &digits;
        let path = format!(
            "/{}{}{}-{}{}-{}{}{}{}-{}{}{}-{}",
            d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7], d[8], d[9], d[10], d[11], d[12]
        );
        Ok(compose("urn", "isbn", &path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suffuniq_drops_scheme_and_trailing_slashes() {
        assert_eq!(suffuniq_iri("https://example.org/foo/"), "//example.org/foo");
        assert_eq!(suffuniq_iri("http://example.org/foo"), "//example.org/foo");
        assert_eq!(
            suffuniq_iri("https://example.org/foo?q=1"),
            "//example.org/foo?q=1"
        );
    }

    #[test]
    fn test_suffuniq_leaves_authorityless_iris_alone() {
        assert_eq!(suffuniq_iri("urn:isbn:123"), "urn:isbn:123");
        assert_eq!(suffuniq_iri("mailto:a@b.org"), "mailto:a@b.org");
    }

    #[test]
    fn test_suffuniq_is_idempotent() {
        let once = suffuniq_iri("https://example.org/foo/");
        assert_eq!(suffuniq_iri(&once), once);
    }

    #[test]
    fn test_worthwhile_iri() {
        assert!(is_worthwhile_iri("https://example.org"));
        assert!(!is_worthwhile_iri("_:b0"));
    }

    #[test]
    fn test_propertypath_as_keyword() {
        let path = vec![
            "https://example.org/p1".to_string(),
            "https://example.org/p2".to_string(),
        ];
        assert_eq!(
            propertypath_as_keyword(&path, true),
            r#"["//example.org/p1","//example.org/p2"]"#
        );
    }

    #[test]
    fn test_recognize_orcid_forms() {
        for input in [
            "0000-0002-4869-2419",
            "0000000248692419",
            "https://orcid.org/0000-0002-4869-2419",
        ] {
            assert_eq!(
                recognize_iri(input).unwrap(),
                "http://orcid.org/0000-0002-4869-2419",
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_recognize_doi() {
        assert_eq!(
            recognize_iri("https://doi.org/10.5281/zenodo.123456").unwrap(),
            "http://dx.doi.org/10.5281/ZENODO.123456"
        );
        assert_eq!(
            recognize_iri("10.1234/abc.def").unwrap(),
            "http://dx.doi.org/10.1234/ABC.DEF"
        );
    }

    #[test]
    fn test_recognize_issn() {
        assert_eq!(
            recognize_iri("ISSN 2049-3630").unwrap(),
            "urn://ISSN/2049-3630"
        );
        assert!(recognize_iri("2049-3631").is_err()); // bad checksum
    }

    #[test]
    fn test_recognize_url_normalizes_scheme_and_port() {
        assert_eq!(
            recognize_iri("https://Example.org:443/thing").unwrap(),
            "http://example.org/thing"
        );
        assert_eq!(
            recognize_iri("ftp://files.example.org/x").unwrap(),
            "ftp://files.example.org/x"
        );
    }

    #[test]
    fn test_recognize_email() {
        assert_eq!(
            recognize_iri("mailto:someone@example.org").unwrap(),
            "mailto:someone@example.org"
        );
        assert_eq!(
            recognize_iri("someone@example.org").unwrap(),
            "mailto:someone@example.org"
        );
    }

    #[test]
    fn test_recognize_arxiv_and_ark() {
        assert_eq!(
            recognize_iri("arXiv:1701.01234").unwrap(),
            "http://arxiv.org/abs/1701.01234"
        );
        assert_eq!(
            recognize_iri("ark:/13030/tf5p30086k").unwrap(),
            "ark://13030/tf5p30086k"
        );
    }

    #[test]
    fn test_recognize_urn_and_oai() {
        assert_eq!(
            recognize_iri("oai:share.osf.io:abc123").unwrap(),
            "oai://share.osf.io/abc123"
        );
        assert_eq!(
            recognize_iri("urn:nbn:de:1234-56789").unwrap(),
            "urn://nbn/de:1234-56789"
        );
    }

    #[test]
    fn test_recognize_isbn_upgrades_to_13() {
        assert_eq!(
            recognize_iri("ISBN: 0-306-40615-2").unwrap(),
            "urn://isbn/978-03-0640-615-7"
        );
        assert_eq!(
            recognize_iri("978-0-306-40615-7").unwrap(),
            "urn://isbn/978-03-0640-615-7"
        );
    }

    #[test]
    fn test_recognize_canonical_iri_is_idempotent() {
        let first = recognize_iri("https://doi.org/10.5281/zenodo.123456").unwrap();
        assert_eq!(recognize_iri(&first).unwrap(), first);
    }

    #[test]
    fn test_unrecognizable_text_errors() {
        assert!(matches!(
            recognize_iri("just some words"),
            Err(ChainError::InvalidIri(_))
        ));
    }

    #[test]
    fn test_urn_fallback_quotes() {
        assert_eq!(
            urn_fallback("some.source", "weird id/with spaces"),
            "urn://trove/some.source:weird%20id%2Fwith%20spaces"
        );
    }
}
