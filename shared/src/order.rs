use std::collections::HashMap;
use uuid::Uuid;

/// Ids of a map sorted by their string form, giving a reproducible iteration order
pub fn ordered_ids<T>(entities: &HashMap<Uuid, T>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = entities.keys().copied().collect();
    ids.sort_by_cached_key(|id| id.to_string());
    ids
}
