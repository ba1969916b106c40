// SPDX-License-Identifier: MIT OR Apache-2.0

//! ripsolr - ripgrep search with a Solr-backed session store
//!
//! Fresh searches run `rg` over every workspace root and rank the hits.
//! Results can be stored in Solr as a session and searched again later with
//! relevance ranking and HTML-safe highlighting.

pub mod config;
pub mod errors;
pub mod highlight;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod search;
pub mod store;

pub use errors::{PipelineError, Result};
pub use pipeline::Pipeline;
