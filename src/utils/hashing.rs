//! Content-addressed id derivation.
//!
//! Chunk ids, feedback doc ids and vector-store point ids are all derived the
//! same way: md5 the colon-joined key parts, then format the digest as a
//! standard `8-4-4-4-12` UUID string. Any deviation here breaks cross-process
//! idempotence (§9 of the design notes), so this is the single place the
//! formatting happens.

/// Derive a content-addressed UUID-shaped id from the colon-joined `parts`.
///
/// `md5("a:b:c")` formatted as `8-4-4-4-12`, matching the teacher's approach to
/// deterministic ids but keyed on domain parts instead of a single string.
pub fn content_addressed_id(parts: &[&str]) -> String {
    let joined = parts.join(":");
    let digest = md5::compute(joined.as_bytes());
    format_digest_as_uuid(&digest.0)
}

fn format_digest_as_uuid(bytes: &[u8; 16]) -> String {
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        bytes[6], bytes[7],
        bytes[8], bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15],
    )
}

/// Derive the vector-store id for a chunk under content addressing:
/// `md5(collectionId ":" ownerId ":" data+vectorSource)`.
pub fn chunk_id(collection_id: &str, owner_id: &str, data: &str, vector_source: Option<&str>) -> String {
    let content = match vector_source {
        Some(vs) => format!("{data}{vs}"),
        None => data.to_string(),
    };
    content_addressed_id(&[collection_id, owner_id, &content])
}

/// Derive the feedback doc id for a `(collectionId, ownerId, query)` triple.
pub fn feedback_id(collection_id: &str, owner_id: &str, query: &str) -> String {
    content_addressed_id(&[collection_id, owner_id, query])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_and_uuid_shaped() {
        let id1 = chunk_id("coll", "public", "hello world", None);
        let id2 = chunk_id("coll", "public", "hello world", None);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 36);
        assert_eq!(id1.chars().filter(|c| *c == '-').count(), 4);
    }

    #[test]
    fn different_content_different_id() {
        let a = chunk_id("coll", "public", "hello", None);
        let b = chunk_id("coll", "public", "world", None);
        assert_ne!(a, b);
    }

    #[test]
    fn owner_scopes_the_id() {
        let a = chunk_id("coll", "alice", "same text", None);
        let b = chunk_id("coll", "bob", "same text", None);
        assert_ne!(a, b);
    }

    #[test]
    fn vector_source_changes_id() {
        let a = chunk_id("coll", "public", "display text", None);
        let b = chunk_id("coll", "public", "display text", Some("embed this instead"));
        assert_ne!(a, b);
    }

    #[test]
    fn feedback_id_is_stable() {
        let a = feedback_id("coll", "public", "feline sound");
        let b = feedback_id("coll", "public", "feline sound");
        assert_eq!(a, b);
    }
}
