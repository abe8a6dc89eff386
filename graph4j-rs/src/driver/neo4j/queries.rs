//! Cypher statements used by [`super::Neo4jDriver`].
//!
//! Entity labels live in the `labels` list property: Cypher cannot bind a
//! label as a parameter. Optional datetimes are sent as `""` for null.

pub const INDEX_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT entity_uuid IF NOT EXISTS FOR (n:Entity) REQUIRE n.uuid IS UNIQUE",
    "CREATE CONSTRAINT episodic_uuid IF NOT EXISTS FOR (n:Episodic) REQUIRE n.uuid IS UNIQUE",
    "CREATE INDEX entity_group_id IF NOT EXISTS FOR (n:Entity) ON (n.group_id)",
    "CREATE INDEX episodic_group_id IF NOT EXISTS FOR (n:Episodic) ON (n.group_id)",
    "CREATE INDEX relates_to_uuid IF NOT EXISTS FOR ()-[r:RELATES_TO]-() ON (r.uuid)",
    "CREATE INDEX mentions_uuid IF NOT EXISTS FOR ()-[r:MENTIONS]-() ON (r.uuid)",
    "CREATE FULLTEXT INDEX node_name_and_summary IF NOT EXISTS FOR (n:Entity) ON EACH [n.name, n.summary]",
    "CREATE FULLTEXT INDEX edge_name_and_fact IF NOT EXISTS FOR ()-[r:RELATES_TO]-() ON EACH [r.name, r.fact]",
];

const OPT_DATETIME: &str = "CASE WHEN $__ = '' THEN null ELSE datetime($__) END";

/// `CASE` expression turning the string parameter `name` into an optional datetime.
pub fn optional_datetime(name: &str) -> String {
    OPT_DATETIME.replace("__", name)
}

pub const UPSERT_EPISODE: &str = "
MERGE (e:Episodic {uuid: $uuid})
SET e.name = $name,
    e.group_id = $group_id,
    e.source = $source,
    e.source_description = $source_description,
    e.content = $content,
    e.entity_edges = $entity_edges,
    e.created_at = datetime($created_at),
    e.valid_at = datetime($valid_at)";

pub const UPSERT_NODE: &str = "
MERGE (n:Entity {uuid: $uuid})
SET n.name = $name,
    n.group_id = $group_id,
    n.labels = $labels,
    n.summary = $summary,
    n.name_embedding = $name_embedding,
    n.attributes = $attributes,
    n.created_at = datetime($created_at)";

pub fn upsert_edge() -> String {
    format!(
        "
MATCH (a:Entity {{uuid: $source_uuid}}), (b:Entity {{uuid: $target_uuid}})
MERGE (a)-[r:RELATES_TO {{uuid: $uuid}}]->(b)
SET r.name = $name,
    r.fact = $fact,
    r.fact_embedding = $fact_embedding,
    r.group_id = $group_id,
    r.episodes = $episodes,
    r.attributes = $attributes,
    r.created_at = datetime($created_at),
    r.valid_at = {},
    r.invalid_at = {},
    r.expired_at = {}",
        optional_datetime("valid_at"),
        optional_datetime("invalid_at"),
        optional_datetime("expired_at"),
    )
}

pub const UPSERT_MENTION: &str = "
MATCH (e:Episodic {uuid: $episode_uuid}), (n:Entity {uuid: $entity_uuid})
MERGE (e)-[m:MENTIONS {uuid: $uuid}]->(n)
SET m.group_id = $group_id,
    m.created_at = datetime($created_at)";

pub const NODE_RETURN: &str = "
RETURN n.uuid AS uuid,
       n.name AS name,
       n.group_id AS group_id,
       coalesce(n.labels, ['Entity']) AS labels,
       coalesce(n.summary, '') AS summary,
       n.name_embedding AS name_embedding,
       coalesce(n.attributes, '{}') AS attributes,
       toString(n.created_at) AS created_at";

pub const EDGE_RETURN: &str = "
RETURN r.uuid AS uuid,
       a.uuid AS source_node_uuid,
       b.uuid AS target_node_uuid,
       r.name AS name,
       r.fact AS fact,
       r.fact_embedding AS fact_embedding,
       r.group_id AS group_id,
       coalesce(r.episodes, []) AS episodes,
       coalesce(r.attributes, '{}') AS attributes,
       toString(r.created_at) AS created_at,
       toString(r.valid_at) AS valid_at,
       toString(r.invalid_at) AS invalid_at,
       toString(r.expired_at) AS expired_at";

pub const EPISODE_RETURN: &str = "
RETURN e.uuid AS uuid,
       e.name AS name,
       e.group_id AS group_id,
       e.source AS source,
       coalesce(e.source_description, '') AS source_description,
       e.content AS content,
       coalesce(e.entity_edges, []) AS entity_edges,
       toString(e.created_at) AS created_at,
       toString(e.valid_at) AS valid_at";

pub const NODES_BY_GROUP: &str = "MATCH (n:Entity) WHERE n.group_id = $group_id";

pub const NODES_BY_UUIDS: &str = "MATCH (n:Entity) WHERE n.uuid IN $uuids";

pub const EDGES_BY_UUIDS: &str =
    "MATCH (a:Entity)-[r:RELATES_TO]->(b:Entity) WHERE r.uuid IN $uuids";

pub const NODE_FULLTEXT: &str = "
CALL db.index.fulltext.queryNodes('node_name_and_summary', $keywords, {limit: $limit})
YIELD node AS n, score
WHERE ($group_ids = [] OR n.group_id IN $group_ids)
  AND ($labels = [] OR any(l IN coalesce(n.labels, []) WHERE l IN $labels))
RETURN n.uuid AS uuid
ORDER BY score DESC, uuid
LIMIT $limit";

pub const NODE_VECTOR: &str = "
MATCH (n:Entity)
WHERE n.name_embedding IS NOT NULL
  AND size(n.name_embedding) = size($vector)
  AND ($group_ids = [] OR n.group_id IN $group_ids)
  AND ($labels = [] OR any(l IN coalesce(n.labels, []) WHERE l IN $labels))
WITH n, vector.similarity.cosine(n.name_embedding, $vector) AS score
WHERE score > $min_score
RETURN n.uuid AS uuid
ORDER BY score DESC, uuid
LIMIT $limit";

pub const EDGE_FULLTEXT: &str = "
CALL db.index.fulltext.queryRelationships('edge_name_and_fact', $keywords, {limit: $limit})
YIELD relationship AS r, score
WHERE ($group_ids = [] OR r.group_id IN $group_ids)
RETURN r.uuid AS uuid
ORDER BY score DESC, uuid
LIMIT $limit";

pub const EDGE_VECTOR: &str = "
MATCH ()-[r:RELATES_TO]->()
WHERE r.fact_embedding IS NOT NULL
  AND size(r.fact_embedding) = size($vector)
  AND ($group_ids = [] OR r.group_id IN $group_ids)
WITH r, vector.similarity.cosine(r.fact_embedding, $vector) AS score
WHERE score > $min_score
RETURN r.uuid AS uuid
ORDER BY score DESC, uuid
LIMIT $limit";

/// Hop distance from the center to each candidate node, null when unreachable.
pub const NODE_DISTANCES: &str = "
MATCH (c:Entity {uuid: $center})
UNWIND $uuids AS id
MATCH (n:Entity {uuid: id})
WHERE n <> c
OPTIONAL MATCH p = shortestPath((c)-[:RELATES_TO*1..6]-(n))
RETURN id AS uuid, length(p) AS distance";

pub const DELETE_EDGE: &str = "
MATCH ()-[r:RELATES_TO {uuid: $uuid}]->()
WITH r LIMIT 1
DELETE r
RETURN 1 AS deleted";

pub const EPISODE_EXISTS: &str = "MATCH (e:Episodic {uuid: $uuid}) RETURN e.uuid AS uuid";

pub const DELETE_EPISODE_STEPS: &[&str] = &[
    // facts only this episode supported
    "MATCH ()-[r:RELATES_TO]->() WHERE r.episodes = [$uuid] DELETE r",
    "MATCH ()-[r:RELATES_TO]->() WHERE $uuid IN r.episodes
     SET r.episodes = [x IN r.episodes WHERE x <> $uuid]",
    // entities nobody else mentions
    "MATCH (e:Episodic {uuid: $uuid})-[:MENTIONS]->(n:Entity)
     WHERE NOT EXISTS { MATCH (o:Episodic)-[:MENTIONS]->(n) WHERE o.uuid <> $uuid }
     DETACH DELETE n",
    "MATCH (e:Episodic {uuid: $uuid}) DETACH DELETE e",
];

pub const DELETE_GROUP: &str = "
MATCH (n)
WHERE (n:Entity OR n:Episodic) AND n.group_id = $group_id
DETACH DELETE n";

pub const CLEAR: &str = "MATCH (n) DETACH DELETE n";

pub const RECENT_EPISODES: &str = "
MATCH (e:Episodic)
WHERE e.valid_at <= datetime($reference_time)
  AND ($group_ids = [] OR e.group_id IN $group_ids)";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_datetime_substitutes_parameter() {
        assert_eq!(
            optional_datetime("valid_at"),
            "CASE WHEN $valid_at = '' THEN null ELSE datetime($valid_at) END"
        );
    }

    #[test]
    fn edge_upsert_sets_all_temporal_fields() {
        let q = upsert_edge();
        for field in ["r.valid_at", "r.invalid_at", "r.expired_at", "r.created_at"] {
            assert!(q.contains(field), "missing {field}");
        }
        assert!(q.contains("MERGE (a)-[r:RELATES_TO {uuid: $uuid}]->(b)"));
    }
}
