//! Shared utility functions.
//!
//! Currently JSON extraction from generated content.

pub mod json_extraction;

pub use json_extraction::{
    analyze_balance, extract_json_object, find_matching_brace, parse_payload, JsonBalance,
    JsonExtractionError,
};
