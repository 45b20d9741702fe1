//! Hoisting of tags shared by every series into block scope.

use crate::block::SeriesMeta;
use crate::tags::{TagOptions, Tags};

/// Split `series` into the tags common to all of them and per-series residuals.
///
/// A tag is common iff every series carries it with an identical value. The
/// returned series keep their order and names; only their tags shrink.
/// Zero series yields empty common tags and no residuals.
pub fn dedupe_metadata(series: &[SeriesMeta], opts: &TagOptions) -> (Tags, Vec<SeriesMeta>) {
    let Some((first, rest)) = series.split_first() else {
        return (Tags::new(opts.clone()), Vec::new());
    };

    let mut common = Tags::with_capacity(first.tags.len(), opts.clone());
    for tag in first.tags.iter() {
        let shared = rest
            .iter()
            .all(|m| m.tags.get(&tag.name) == Some(tag.value.as_slice()));
        if shared {
            common.set(tag.clone());
        }
    }

    let residual = series
        .iter()
        .map(|m| SeriesMeta {
            tags: m.tags.subtract(&common),
            name: m.name.clone(),
        })
        .collect();

    (common, residual)
}
