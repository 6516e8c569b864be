use snowflake::SnowflakeIdBucket;
use std::sync::Mutex;

static ID_GENERATOR: Mutex<Option<SnowflakeIdBucket>> = Mutex::new(None);

/// Initialize the snowflake ID generator.
///
/// `machine_id` / `node_id`: 0-31. Collector processes on the same host can
/// share a machine_id; uniqueness only needs the (machine, node) pair to
/// differ between processes writing the same store.
pub fn init(machine_id: i32, node_id: i32) {
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|p| p.into_inner());
    *gen = Some(SnowflakeIdBucket::new(machine_id, node_id));
}

/// Generate one snowflake ID in string form.
pub fn next_id() -> String {
    let mut gen = ID_GENERATOR.lock().unwrap_or_else(|p| p.into_inner());
    let bucket = gen.get_or_insert_with(|| SnowflakeIdBucket::new(1, 1));
    bucket.get_id().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn next_id_returns_unique_ids() {
        init(1, 1);
        let mut ids = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(!id.is_empty());
            assert!(ids.insert(id), "duplicate ID generated");
        }
    }

    #[test]
    fn next_id_is_numeric() {
        init(1, 1);
        let id = next_id();
        assert!(id.parse::<i64>().is_ok(), "ID should be a valid i64: {id}");
    }

    #[test]
    fn distinct_node_coordinates_never_collide() {
        // Two collector processes sharing a data_dir are told apart only by
        // their (machine, node) pair; IDs minted in the same millisecond
        // must still differ.
        let mut a = SnowflakeIdBucket::new(2, 5);
        let mut b = SnowflakeIdBucket::new(3, 7);
        let ids_a: HashSet<i64> = (0..500).map(|_| a.get_id()).collect();
        let ids_b: HashSet<i64> = (0..500).map(|_| b.get_id()).collect();
        assert_eq!(ids_a.len(), 500);
        assert_eq!(ids_b.len(), 500);
        assert!(ids_a.is_disjoint(&ids_b));
    }
}
