//! Fuzz target for record diffing and merging.
//!
//! Arbitrary JSON objects go through `diff` and `merge`; neither may panic,
//! and merging the diff must leave nothing outside it changed.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sync_reconciler::{diff, merge, Record};

fuzz_target!(|data: (&str, &str)| {
    let (local, remote) = data;
    let (Ok(local), Ok(remote)) = (
        serde_json::from_str::<Record>(local),
        serde_json::from_str::<Record>(remote),
    ) else {
        return;
    };

    let fields = diff(&local, &remote).fields();
    assert!(diff(&local, &local).is_empty());

    let merged = merge(&local, &remote, &fields);
    for (key, value) in &remote {
        if !fields.contains(key) {
            assert_eq!(merged.get(key), Some(value));
        }
    }
});
