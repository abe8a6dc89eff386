//! Prompt templates for LLM interactions.
//!
//! Each submodule builds the message list for one extraction stage. Prompts
//! are Rust string literals so they ship inside the binary.

pub mod extract_edges;
pub mod extract_nodes;

use crate::nodes::EpisodicNode;
use crate::utils::format_neo4j_datetime;

/// Shared episode preamble used by every extraction prompt.
pub(crate) fn episode_context(episode: &EpisodicNode) -> String {
    let mut ctx = format!(
        "<EPISODE TYPE>{}</EPISODE TYPE>\n<REFERENCE TIME>{}</REFERENCE TIME>\n",
        episode.source.as_str(),
        format_neo4j_datetime(&episode.valid_at),
    );
    if !episode.source_description.is_empty() {
        ctx.push_str(&format!(
            "<SOURCE DESCRIPTION>{}</SOURCE DESCRIPTION>\n",
            episode.source_description
        ));
    }
    ctx.push_str(&format!("<EPISODE>\n{}\n</EPISODE>\n", episode.content));
    ctx
}
