//! Entity extraction prompt.

use crate::llm_client::Message;
use crate::nodes::{EpisodeType, EpisodicNode};

use super::episode_context;

const SYSTEM: &str = "You are an AI assistant that extracts entity nodes from conversational \
messages, documents and JSON payloads. Your primary task is to identify the significant \
entities, concepts or actors mentioned in the episode.";

const GUIDELINES: &str = "Guidelines:
1. Extract every significant entity, concept or actor explicitly or implicitly mentioned.
2. For messages, always extract the speaker as an entity (the part before the colon).
3. Give each entity a concise, specific `name` as written in the episode.
4. Choose an `entity_type` label in PascalCase, such as Person, Organization, Location, \
Preference, Requirement, Event or Topic.
5. Write a one-sentence `summary` based only on the episode.
6. Do not extract relationships, actions, dates or times as entities.
7. Do not extract the same entity twice.";

/// Build the entity extraction conversation for `episode`.
pub fn build(episode: &EpisodicNode) -> Vec<Message> {
    let focus = match episode.source {
        EpisodeType::Message => "The episode is a chat message formatted as `role(role_type): content`.",
        EpisodeType::Text => "The episode is free text.",
        EpisodeType::Json => "The episode is a JSON document; entities are the objects and named values it describes.",
    };

    vec![
        Message::system(SYSTEM),
        Message::user(format!("{}\n{focus}\n\n{GUIDELINES}", episode_context(episode))),
    ]
}
