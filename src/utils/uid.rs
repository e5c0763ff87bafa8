use std::collections::HashMap;

use parking_lot::{const_mutex, Mutex};

static COUNTERS: Mutex<Option<HashMap<String, u64>>> = const_mutex(None);

/// Returns `<prefix>-<n>`, where `n` counts up per prefix for the process.
pub fn uid(prefix: &str) -> String {
    let mut guard = COUNTERS.lock();
    let counters = guard.get_or_insert_with(HashMap::new);
    let next = counters.entry(prefix.to_string()).or_insert(0);
    let id = format!("{prefix}-{next}");
    *next += 1;
    id
}

#[cfg(test)]
mod tests {
    use super::uid;

    #[test]
    fn ids_are_unique_per_prefix() {
        let a = uid("uid-test");
        let b = uid("uid-test");
        assert_ne!(a, b);
        assert!(a.starts_with("uid-test-"));
    }
}
