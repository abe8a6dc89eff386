//! Node types for the knowledge graph.
//!
//! - [`EntityNode`]: deduplicated concepts extracted from episodes
//! - [`EpisodicNode`]: ingested data episodes (messages, text, JSON records)

pub mod entity;
pub mod episodic;

pub use entity::EntityNode;
pub use episodic::{EpisodeInput, EpisodeType, EpisodicNode};
