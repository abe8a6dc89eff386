//! Shared utilities.
//!
//! - Date/time helpers (lenient parsing of LLM dates, Cypher datetime literals)
//! - Vector similarity (cosine, L2 normalisation)
//! - Text helpers (whitespace normalisation, keyword tokens, Lucene escaping)

pub mod datetime;
pub mod similarity;
pub mod text;

pub use datetime::{format_neo4j_datetime, parse_flexible_datetime};
pub use similarity::{cosine_similarity, normalize_l2};
pub use text::{keyword_tokens, lucene_sanitize, normalize_whitespace, truncate_with_ellipsis};
