use std::collections::{BTreeMap, BTreeSet};

use super::model::{Label, Sample};

/// Number of samples per label, in label order.
pub fn label_counts(samples: &[Sample]) -> BTreeMap<Label, usize> {
    let mut counts = BTreeMap::new();
    for s in samples {
        *counts.entry(s.label().clone()).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Predicates for `DataLoader::filter_data`
// ---------------------------------------------------------------------------

/// Integer labels divisible by two. Text labels never match.
pub fn even_label(sample: &Sample) -> bool {
    sample.label().as_int().is_some_and(|l| l % 2 == 0)
}

pub fn label_is(label: impl Into<Label>) -> impl Fn(&Sample) -> bool {
    let label = label.into();
    move |s: &Sample| *s.label() == label
}

/// Labels in `selected`. An empty set drops every sample.
pub fn label_in(selected: BTreeSet<Label>) -> impl Fn(&Sample) -> bool {
    move |s: &Sample| selected.contains(s.label())
}
