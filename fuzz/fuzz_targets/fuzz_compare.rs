//! Fuzz target for value comparison.
//!
//! This tests that `values_equal` never panics on arbitrary text (which it
//! tries to parse as JSON) and stays reflexive and symmetric.

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use sync_reconciler::compare::values_equal;

fuzz_target!(|data: (&str, &str)| {
    let (a, b) = data;
    let a = Value::String(a.to_string());
    let b = Value::String(b.to_string());

    // Should never panic
    let ab = values_equal(&a, &b);
    let ba = values_equal(&b, &a);

    assert_eq!(ab, ba);
    assert!(values_equal(&a, &a));
});
