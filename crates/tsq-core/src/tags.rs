//! Tag sets attached to series and blocks.
//!
//! A `Tags` value is an ordered-by-name set of byte-string pairs, unique by
//! name. Ordering is the byte order of the names so that iteration, hashing and
//! serialization are reproducible.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_pairs, Hash256};

/// Default name of the tag holding the metric name.
pub const DEFAULT_METRIC_NAME: &[u8] = b"__name__";

/// Policy under which tag sets are compared and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTagOptions")]
pub struct TagOptions {
    metric_name: Vec<u8>,
}

impl Default for TagOptions {
    fn default() -> Self {
        Self {
            metric_name: DEFAULT_METRIC_NAME.to_vec(),
        }
    }
}

#[derive(Deserialize)]
struct RawTagOptions {
    metric_name: Vec<u8>,
}

impl TryFrom<RawTagOptions> for TagOptions {
    type Error = Error;

    fn try_from(raw: RawTagOptions) -> Result<Self> {
        TagOptions::with_metric_name(raw.metric_name)
    }
}

impl TagOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric_name(name: impl Into<Vec<u8>>) -> Result<Self> {
        let metric_name = name.into();
        if metric_name.is_empty() {
            return Err(Error::Tags("metric name tag cannot be empty".into()));
        }
        Ok(Self { metric_name })
    }

    pub fn metric_name(&self) -> &[u8] {
        &self.metric_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tag {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTags")]
pub struct Tags {
    tags: Vec<Tag>,
    opts: TagOptions,
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.opts == other.opts && self.tags == other.tags
    }
}

impl Eq for Tags {}

/// Wire form of `Tags`; decoding re-sorts and re-validates the pairs.
#[derive(Deserialize)]
struct RawTags {
    tags: Vec<Tag>,
    #[serde(default)]
    opts: TagOptions,
}

impl TryFrom<RawTags> for Tags {
    type Error = Error;

    fn try_from(raw: RawTags) -> Result<Self> {
        Tags::try_from_pairs(raw.opts, raw.tags.into_iter().map(|t| (t.name, t.value)))
    }
}

impl Tags {
    /// Empty tag set under `opts`.
    pub fn new(opts: TagOptions) -> Self {
        Self {
            tags: Vec::new(),
            opts,
        }
    }

    pub fn with_capacity(capacity: usize, opts: TagOptions) -> Self {
        Self {
            tags: Vec::with_capacity(capacity),
            opts,
        }
    }

    /// Build a tag set from raw pairs, rejecting empty or repeated names.
    pub fn try_from_pairs<I, N, V>(opts: TagOptions, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let mut tags: Vec<Tag> = pairs.into_iter().map(|(n, v)| Tag::new(n, v)).collect();
        if tags.iter().any(|t| t.name.is_empty()) {
            return Err(Error::Tags("tag name cannot be empty".into()));
        }
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(w) = tags.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(Error::Tags(format!(
                "duplicate tag name '{}'",
                String::from_utf8_lossy(&w[0].name)
            )));
        }
        Ok(Self { tags, opts })
    }

    pub fn opts(&self) -> &TagOptions {
        &self.opts
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    fn position(&self, name: &[u8]) -> std::result::Result<usize, usize> {
        self.tags.binary_search_by(|t| t.name.as_slice().cmp(name))
    }

    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.position(name)
            .ok()
            .map(|i| self.tags[i].value.as_slice())
    }

    /// Insert or replace a single tag, keeping the set sorted.
    pub fn set(&mut self, tag: Tag) {
        match self.position(&tag.name) {
            Ok(i) => self.tags[i].value = tag.value,
            Err(i) => self.tags.insert(i, tag),
        }
    }

    pub fn add_tag(mut self, tag: Tag) -> Self {
        self.set(tag);
        self
    }

    /// Union of `self` and `other`; on a name collision `other` wins.
    pub fn add(&self, other: &Tags) -> Tags {
        let mut out = Vec::with_capacity(self.tags.len() + other.tags.len());
        let (mut a, mut b) = (self.tags.iter().peekable(), other.tags.iter().peekable());
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(x), Some(y)) => match x.name.cmp(&y.name) {
                    std::cmp::Ordering::Less => a.next(),
                    std::cmp::Ordering::Greater => b.next(),
                    std::cmp::Ordering::Equal => {
                        a.next();
                        b.next()
                    }
                },
                (Some(_), None) => a.next(),
                (None, Some(_)) => b.next(),
                (None, None) => break,
            };
            if let Some(t) = next {
                out.push(t.clone());
            }
        }
        Tags {
            tags: out,
            opts: self.opts.clone(),
        }
    }

    /// Copy of `self` without any tag whose name appears in `names`.
    pub fn without_names<N: AsRef<[u8]>>(&self, names: &[N]) -> Tags {
        let tags = self
            .tags
            .iter()
            .filter(|t| !names.iter().any(|n| n.as_ref() == t.name.as_slice()))
            .cloned()
            .collect();
        Tags {
            tags,
            opts: self.opts.clone(),
        }
    }

    /// Remove every tag named in `common`, regardless of value.
    pub fn subtract(&self, common: &Tags) -> Tags {
        let tags = self
            .tags
            .iter()
            .filter(|t| common.get(&t.name).is_none())
            .cloned()
            .collect();
        Tags {
            tags,
            opts: self.opts.clone(),
        }
    }

    /// Value of the metric-name tag under this set's options.
    pub fn name(&self) -> Option<&[u8]> {
        self.get(self.opts.metric_name())
    }

    pub fn without_name(&self) -> Tags {
        self.without_names(&[self.opts.metric_name()])
    }

    /// Stable identity of the name/value pairs (options are not part of it).
    pub fn id(&self) -> Hash256 {
        hash_pairs(
            self.tags
                .iter()
                .map(|t| (t.name.as_slice(), t.value.as_slice())),
        )
    }
}

impl<'a> IntoIterator for &'a Tags {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl fmt::Display for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, t) in self.tags.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}=\"{}\"",
                String::from_utf8_lossy(&t.name),
                String::from_utf8_lossy(&t.value)
            )?;
        }
        write!(f, "}}")
    }
}
