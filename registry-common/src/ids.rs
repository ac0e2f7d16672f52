use uuid::Uuid;

/// Produce a new entity id.
///
/// Ids are UUIDv7 strings: unique across callers, and ordered by creation time when
/// compared as strings, including ids produced within the same millisecond.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
