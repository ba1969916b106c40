// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query module - translation of user queries into the store's query language

pub mod translate;

pub use translate::{translate, QueryTranslator, MATCH_ALL};
