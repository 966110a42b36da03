pub const SEPARATOR: char = '.';
pub const RESERVED_PREFIX: &str = "__";

/// A parsed dotted path such as `so-vits.models.foo`.
///
/// Keys containing the separator cannot be expressed as a path; use the
/// key-level `Node` methods for those.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr<'a> {
    raw: &'a str,
    segments: Vec<&'a str>,
}

impl<'a> PathExpr<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let trimmed = raw.trim_matches(SEPARATOR);
        let segments = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split(SEPARATOR).filter(|s| !s.is_empty()).collect()
        };
        Self { raw, segments }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn segments(&self) -> &[&'a str] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Splits into parent segments and the final key.
    pub fn split_last(&self) -> Option<(&'a str, &[&'a str])> {
        self.segments
            .split_last()
            .map(|(last, parents)| (*last, parents))
    }

    pub fn has_reserved_segment(&self) -> bool {
        self.segments.iter().any(|segment| is_reserved(segment))
    }
}

pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(".")
}
