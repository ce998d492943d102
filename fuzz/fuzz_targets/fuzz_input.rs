// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use juxta::align::ComparisonRow;
use juxta::judgment::JudgmentStore;
use juxta::key::normalize_key;
use juxta::snapshot;

#[derive(Arbitrary, Debug)]
struct Input<'a> {
    path: &'a str,
    document: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let key = normalize_key(input.path);
    assert_eq!(key, normalize_key(input.path));

    let _ = snapshot::parse_manifest(input.document);

    let mut store = JudgmentStore::default();
    store.reconcile(vec![ComparisonRow::skeleton(key, vec![None])]);
    let before = store.rows().to_vec();
    if snapshot::import(&mut store, input.document).is_err() {
        assert_eq!(store.rows(), before.as_slice());
    }
});
