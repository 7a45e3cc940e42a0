//! Graph-construction transform DSL.
//!
//! A [`Chain`] is a left-to-right pipeline of [`Link`]s over JSON values.
//! Every execution threads an explicit [`ChainContext`] carrying the source
//! label, the iteration frame stack, and the named-function registry; links
//! never reach for globals.
//!
//! Error recovery is deliberate: only `MissingKey`, `IndexOutOfRange`, and
//! `TypeMismatch` are recoverable (see [`ChainError::is_recoverable`]), and
//! only [`Maybe`] and [`Try`] absorb them. Anything else fails the whole
//! transform so bad data never silently produces an empty graph.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::ChainError;
use crate::iri;
use crate::rdf::Tripledict;

/// A named function callable from a chain via [`RunFunction`].
pub type TransformFn =
    Arc<dyn Fn(&Value, &ChainContext) -> Result<Value, ChainError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Iteration { index: usize },
    Concat,
}

/// Execution-local state for one transform run.
pub struct ChainContext {
    source_label: String,
    frames: Vec<Frame>,
    functions: HashMap<String, TransformFn>,
}

impl ChainContext {
    pub fn new(source_label: impl Into<String>) -> Self {
        ChainContext {
            source_label: source_label.into(),
            frames: Vec::new(),
            functions: HashMap::new(),
        }
    }

    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    /// Register a function that chains may call by name.
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        function: TransformFn,
    ) {
        self.functions.insert(name.into(), function);
    }

    /// Index of the innermost enclosing iteration, if any.
    pub fn current_index(&self) -> Option<usize> {
        self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Iteration { index } => Some(*index),
            Frame::Concat => None,
        })
    }

    fn in_list_frame(&self) -> bool {
        matches!(
            self.frames.last(),
            Some(Frame::Iteration { .. }) | Some(Frame::Concat)
        )
    }
}

/// One transform step.
pub trait Link: Send + Sync {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError>;
}

/// A pipeline of links, built with the method-chaining constructors below.
#[derive(Default)]
pub struct Chain {
    links: Vec<Box<dyn Link>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, link: impl Link + 'static) -> Self {
        self.links.push(Box::new(link));
        self
    }

    pub fn run(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let mut current = input.clone();
        for link in &self.links {
            current = link.execute(&current, ctx)?;
        }
        Ok(current)
    }

    // builder shorthands for the common links

    pub fn path(self, segment: impl Into<String>) -> Self {
        self.then(Path(segment.into()))
    }

    pub fn index(self, index: usize) -> Self {
        self.then(Index(index))
    }

    pub fn trim(self) -> Self {
        self.then(Trim)
    }

    pub fn join(self, joiner: impl Into<String>) -> Self {
        self.then(Join(joiner.into()))
    }

    pub fn unique(self) -> Self {
        self.then(Unique)
    }

    pub fn int(self) -> Self {
        self.then(Int)
    }

    pub fn parse_date(self) -> Self {
        self.then(ParseDate)
    }

    pub fn iri(self, urn_fallback: bool) -> Self {
        self.then(Iri { urn_fallback })
    }

    pub fn guess_agent_type(self, default: Option<&str>) -> Self {
        self.then(GuessAgentType {
            default: default.map(str::to_string),
        })
    }

    pub fn prepend(self, prefix: impl Into<String>) -> Self {
        self.then(Prepend(prefix.into()))
    }

    pub fn run_function(self, name: impl Into<String>) -> Self {
        self.then(RunFunction(name.into()))
    }

    pub fn get_index(self) -> Self {
        self.then(GetIndex)
    }
}

impl Link for Chain {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        self.run(input, ctx)
    }
}

fn value_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}

/// Step into an object by key.
pub struct Path(pub String);

impl Link for Path {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match input {
            Value::Object(map) => map
                .get(&self.0)
                .cloned()
                .ok_or_else(|| ChainError::MissingKey(self.0.clone())),
            other => Err(ChainError::TypeMismatch {
                expected: "object".to_string(),
                got: value_kind(other),
            }),
        }
    }
}

/// Step into an array by position.
pub struct Index(pub usize);

impl Link for Index {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match input {
            Value::Array(items) => items
                .get(self.0)
                .cloned()
                .ok_or(ChainError::IndexOutOfRange(self.0)),
            other => Err(ChainError::TypeMismatch {
                expected: "array".to_string(),
                got: value_kind(other),
            }),
        }
    }
}

/// Always produce a fixed value, ignoring input.
pub struct Static(pub Value);

impl Link for Static {
    fn execute(&self, _input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        Ok(self.0.clone())
    }
}

pub struct Trim;

impl Link for Trim {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match input {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            other => Err(ChainError::TypeMismatch {
                expected: "string".to_string(),
                got: value_kind(other),
            }),
        }
    }
}

pub struct Prepend(pub String);

impl Link for Prepend {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match input {
            Value::String(s) => Ok(Value::String(format!("{}{}", self.0, s))),
            other => Err(ChainError::TypeMismatch {
                expected: "string".to_string(),
                got: value_kind(other),
            }),
        }
    }
}

/// Join string elements, skipping empties.
pub struct Join(pub String);

impl Link for Join {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let items = input.as_array().ok_or_else(|| ChainError::TypeMismatch {
            expected: "array".to_string(),
            got: value_kind(input),
        })?;
        let mut parts = Vec::new();
        for item in items {
            match item {
                Value::Null => {}
                Value::String(s) if s.is_empty() => {}
                Value::String(s) => parts.push(s.clone()),
                other => {
                    return Err(ChainError::TypeMismatch {
                        expected: "string".to_string(),
                        got: value_kind(other),
                    })
                }
            }
        }
        Ok(Value::String(parts.join(&self.0)))
    }
}

/// Deduplicate array elements, keeping first-seen order.
pub struct Unique;

impl Link for Unique {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let items = match input {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let mut seen = Vec::new();
        for item in items {
            if !seen.contains(&item) {
                seen.push(item);
            }
        }
        Ok(Value::Array(seen))
    }
}

/// Keep only array elements matching a predicate.
pub struct Filter(pub Box<dyn Fn(&Value) -> bool + Send + Sync>);

impl Link for Filter {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let items = input.as_array().ok_or_else(|| ChainError::TypeMismatch {
            expected: "array".to_string(),
            got: value_kind(input),
        })?;
        Ok(Value::Array(
            items.iter().filter(|v| (self.0)(v)).cloned().collect(),
        ))
    }
}

pub struct Int;

impl Link for Int {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match input {
            Value::Null => Ok(Value::Null),
            Value::String(s) if s.is_empty() => Ok(Value::Null),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| ChainError::InvalidInt(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Value::from)
                .ok_or_else(|| ChainError::InvalidInt(n.to_string())),
            other => Err(ChainError::TypeMismatch {
                expected: "string or number".to_string(),
                got: value_kind(other),
            }),
        }
    }
}

/// Gather results of several chains into one flat list, dropping nulls and
/// empty strings. With `deep`, nested lists are flattened one level too.
pub struct Concat {
    pub chains: Vec<Chain>,
    pub deep: bool,
}

impl Concat {
    pub fn new(chains: Vec<Chain>) -> Self {
        Concat {
            chains,
            deep: false,
        }
    }

    pub fn deep(chains: Vec<Chain>) -> Self {
        Concat { chains, deep: true }
    }

    fn push_value(&self, value: Value, out: &mut Vec<Value>) {
        match value {
            Value::Null => {}
            Value::String(s) if s.is_empty() => {}
            Value::Array(items) => {
                for item in items {
                    if self.deep {
                        match item {
                            Value::Array(inner) => {
                                for v in inner {
                                    match v {
                                        Value::Null => {}
                                        Value::String(s) if s.is_empty() => {}
                                        other => out.push(other),
                                    }
                                }
                            }
                            Value::Null => {}
                            Value::String(s) if s.is_empty() => {}
                            other => out.push(other),
                        }
                    } else {
                        match item {
                            Value::Null => {}
                            Value::String(s) if s.is_empty() => {}
                            other => out.push(other),
                        }
                    }
                }
            }
            other => out.push(other),
        }
    }
}

impl Link for Concat {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        ctx.frames.push(Frame::Concat);
        let mut out = Vec::new();
        let mut result = Ok(());
        for chain in &self.chains {
            match chain.run(input, ctx) {
                Ok(value) => self.push_value(value, &mut out),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        ctx.frames.pop();
        result.map(|()| Value::Array(out))
    }
}

/// Run a chain over each element of the input array, tracking the index
/// in the frame stack for [`GetIndex`].
pub struct Iterate(pub Chain);

impl Link for Iterate {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let items = input.as_array().ok_or_else(|| ChainError::TypeMismatch {
            expected: "array".to_string(),
            got: value_kind(input),
        })?;
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            ctx.frames.push(Frame::Iteration { index });
            let result = self.0.run(item, ctx);
            ctx.frames.pop();
            out.push(result?);
        }
        Ok(Value::Array(out))
    }
}

/// Concatenate source chains, then run an item chain over each element.
pub struct Map {
    sources: Concat,
    item: Chain,
}

impl Map {
    pub fn new(item: Chain, sources: Vec<Chain>) -> Self {
        Map {
            sources: Concat::new(sources),
            item,
        }
    }
}

impl Link for Map {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let gathered = self.sources.execute(input, ctx)?;
        let items = gathered.as_array().cloned().unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            ctx.frames.push(Frame::Iteration { index });
            let result = self.item.run(item, ctx);
            ctx.frames.pop();
            out.push(result?);
        }
        Ok(Value::Array(out))
    }
}

/// Step into an optional key: run the continuation when present and
/// non-empty, otherwise yield `[]` inside a list frame or the default.
pub struct Maybe {
    pub segment: String,
    pub chain: Chain,
    pub default: Value,
}

impl Maybe {
    pub fn new(segment: impl Into<String>, chain: Chain) -> Self {
        Maybe {
            segment: segment.into(),
            chain,
            default: Value::Null,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

impl Link for Maybe {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let found = input
            .as_object()
            .and_then(|map| map.get(&self.segment))
            .filter(|v| !v.is_null() && v.as_str() != Some(""));
        match found {
            Some(value) => self.chain.run(&value.clone(), ctx),
            None if ctx.in_list_frame() => Ok(json!([])),
            None => Ok(self.default.clone()),
        }
    }
}

/// Run a chain, absorbing recoverable errors into a default.
pub struct Try {
    pub chain: Chain,
    pub default: Value,
}

impl Try {
    pub fn new(chain: Chain) -> Self {
        Try {
            chain,
            default: Value::Null,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = default;
        self
    }
}

impl Link for Try {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        match self.chain.run(input, ctx) {
            Ok(value) => Ok(value),
            Err(err) if err.is_recoverable() => Ok(self.default.clone()),
            Err(err) => Err(err),
        }
    }
}

/// First chain to succeed wins; all failing is its own error carrying
/// every attempt's reason.
pub struct OneOf(pub Vec<Chain>);

impl Link for OneOf {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let mut failures = Vec::new();
        for chain in &self.0 {
            match chain.run(input, ctx) {
                Ok(value) => return Ok(value),
                Err(err) => failures.push(err.to_string()),
            }
        }
        Err(ChainError::NoneOf(failures))
    }
}

/// Index of the current element within the innermost iteration.
pub struct GetIndex;

impl Link for GetIndex {
    fn execute(&self, _input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        ctx.current_index()
            .map(Value::from)
            .ok_or(ChainError::NotIterating)
    }
}

/// Call a function registered on the context by name.
pub struct RunFunction(pub String);

impl Link for RunFunction {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let function = ctx
            .functions
            .get(&self.0)
            .cloned()
            .ok_or_else(|| ChainError::UnknownFunction(self.0.clone()))?;
        function(input, ctx)
    }
}

const DATE_YEAR_MIN: i32 = 1200;
const DATE_YEAR_MAX: i32 = 3000;

/// Parse a date or datetime and normalize to a UTC RFC 3339 string.
pub struct ParseDate;

impl Link for ParseDate {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let text = input.as_str().ok_or_else(|| ChainError::TypeMismatch {
            expected: "string".to_string(),
            got: value_kind(input),
        })?;
        let parsed = parse_datetime(text.trim())
            .ok_or_else(|| ChainError::InvalidDate(text.to_string()))?;
        if parsed.year() <= DATE_YEAR_MIN || parsed.year() > DATE_YEAR_MAX {
            return Err(ChainError::InvalidDate(text.to_string()));
        }
        Ok(Value::String(parsed.to_rfc3339()))
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%B %d, %Y"];
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }
    None
}

/// Recognize an identifier in the input text (see [`crate::iri`]),
/// optionally synthesizing a source-scoped URN when nothing matches.
pub struct Iri {
    pub urn_fallback: bool,
}

impl Link for Iri {
    fn execute(&self, input: &Value, ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let text = input.as_str().ok_or_else(|| ChainError::TypeMismatch {
            expected: "string".to_string(),
            got: value_kind(input),
        })?;
        match iri::recognize_iri(text) {
            Ok(canonical) => Ok(Value::String(canonical)),
            Err(_) if self.urn_fallback => {
                Ok(Value::String(iri::urn_fallback(ctx.source_label(), text)))
            }
            Err(err) => Err(err),
        }
    }
}

lazy_static! {
    static ref INSTITUTION_RE: Regex =
        Regex::new(r"(?i)\b(college|institute|institution|school|university|univ)\b").unwrap();
    static ref ORGANIZATION_RE: Regex = Regex::new(
        r"(?i)\b((^the\s|\sthe\s)|^[-A-Z]+$|bureau|council|center|foundation|group|inc|society)\b"
    )
    .unwrap();
}

/// Guess an agent type from its name: keyword rules, institutions before
/// organizations, falling back to the default (person).
pub struct GuessAgentType {
    pub default: Option<String>,
}

impl Link for GuessAgentType {
    fn execute(&self, input: &Value, _ctx: &mut ChainContext) -> Result<Value, ChainError> {
        let name = input.as_str().ok_or_else(|| ChainError::TypeMismatch {
            expected: "string".to_string(),
            got: value_kind(input),
        })?;
        let guessed = if INSTITUTION_RE.is_match(name) {
            "institution".to_string()
        } else if ORGANIZATION_RE.is_match(name) {
            "organization".to_string()
        } else {
            self.default
                .clone()
                .unwrap_or_else(|| "person".to_string())
                .to_lowercase()
        };
        Ok(Value::String(guessed))
    }
}

/// Outcome of transforming one raw datum.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    /// A focus IRI and the graph built around it.
    Graph {
        focus_iri: String,
        rdfdoc: Tripledict,
    },
    /// The datum is intentionally not represented (e.g. an excluded set);
    /// any existing resource description for it should be deleted.
    Skip(String),
}

/// Turns one raw harvested datum into a resource description.
pub trait Transformer: Send + Sync {
    fn transformer_label(&self) -> &str;

    fn transform(
        &self,
        raw: &[u8],
        ctx: &mut ChainContext,
    ) -> Result<TransformOutcome, ChainError>;
}
