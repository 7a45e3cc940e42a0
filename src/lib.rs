//! # Trove
//!
//! A metadata aggregation core: harvest raw records from upstream sources,
//! normalize them into RDF resource descriptions, and serve them back out
//! as derived documents, search results, and OAI-PMH responses.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌─────────────┐
//! │ Harvesters │──▶│   Chain    │──▶│ Description │
//! │  (sources) │   │ Transform  │   │    Store    │
//! └────────────┘   └────────────┘   └──────┬──────┘
//!                                          │ graph walk
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                ┌──────────┐       ┌────────────┐
//!                │ Derivers │       │   Search   │
//!                │ XML/JSON │       │   Index    │
//!                └────┬─────┘       └─────┬──────┘
//!                     ▼                   ▼
//!                  OAI-PMH         cardsearch/valuesearch
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`harvest`] | Harvester contract, time windows, rate limiting |
//! | [`chain`] | Transform chain DSL |
//! | [`rdf`] | In-memory RDF graphs with canonical serialization |
//! | [`iri`] | IRI canonicalization and recognizers |
//! | [`store`] | Indexcards and resource descriptions |
//! | [`walk`] | Cycle-safe graph walk from a focus node |
//! | [`derive`] | Deriver registry (OAI-DC XML, flat JSON, JSON-LD) |
//! | [`search`] | Search API query parameters |
//! | [`cursor`] | Opaque pagination cursors |
//! | [`index_strategy`] | Search documents and query execution |
//! | [`oai`] | OAI-PMH repository adapter |
//! | [`ingest`] | Pipeline orchestration |
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | SQLite-backed description store |
//! | [`migrate`] | Schema migrations |

pub mod chain;
pub mod config;
pub mod cursor;
pub mod db;
pub mod derive;
pub mod derive_flat;
pub mod derive_jsonld;
pub mod derive_oaidc;
pub mod error;
pub mod harvest;
pub mod index_strategy;
pub mod ingest;
pub mod iri;
pub mod migrate;
pub mod oai;
pub mod rdf;
pub mod search;
pub mod source_jsonl;
pub mod store;
pub mod vocab;
pub mod walk;
