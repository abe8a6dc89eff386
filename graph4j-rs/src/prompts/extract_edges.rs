//! Fact (relationship) extraction prompt.

use crate::llm_client::Message;
use crate::nodes::EpisodicNode;

use super::episode_context;

const SYSTEM: &str = "You are an expert fact extractor that extracts fact triples from text. \
Each fact is a relationship between two of the given entities.";

const GUIDELINES: &str = "Guidelines:
1. Only extract facts between entities from the <ENTITIES> list, using their names verbatim \
as `source` and `target`.
2. `relation_type` is a short SCREAMING_SNAKE_CASE predicate such as PREFERS, WORKS_AT or LIVES_IN.
3. `fact` restates the relationship as one self-contained sentence.
4. Use the reference time to resolve relative dates. Set `valid_at` to when the fact became \
true and `invalid_at` to when it stopped being true, as ISO 8601 strings, or null when unknown.
5. Do not repeat a fact.";

/// Build the fact extraction conversation for `episode` over `entity_names`.
pub fn build(episode: &EpisodicNode, entity_names: &[String]) -> Vec<Message> {
    let entities = entity_names
        .iter()
        .map(|n| format!("- {n}"))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        Message::system(SYSTEM),
        Message::user(format!(
            "{}<ENTITIES>\n{entities}\n</ENTITIES>\n\n{GUIDELINES}",
            episode_context(episode)
        )),
    ]
}
