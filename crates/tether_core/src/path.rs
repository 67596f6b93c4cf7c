//! Access paths from a pinned anchor to a location inside it

use std::fmt;
use std::sync::Arc;

/// One parent-to-child access step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Record field or module binding.
    Field(String),
    /// Zero-based element index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Ordered segments applied to an anchor value, root first.
///
/// Cheap to clone: children share their parent's prefix until they extend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath {
    segments: Arc<[PathSegment]>,
}

impl AccessPath {
    /// The empty path (a root proxy).
    pub fn root() -> Self {
        Self {
            segments: Arc::from(Vec::new()),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// This path extended by one segment.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push(segment);
        Self {
            segments: segments.into(),
        }
    }

    /// This path without its last segment; `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, prefix) = self.segments.split_last()?;
        Some(Self {
            segments: prefix.into(),
        })
    }

    /// Render the path under `label`, e.g. `Main.config.values[1]`.
    pub fn display_with<'a>(&'a self, label: &'a str) -> impl fmt::Display + 'a {
        Labelled { label, path: self }
    }
}

impl Default for AccessPath {
    fn default() -> Self {
        Self::root()
    }
}

struct Labelled<'a> {
    label: &'a str,
    path: &'a AccessPath,
}

impl fmt::Display for Labelled<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)?;
        for segment in self.path.segments() {
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_and_parent_are_inverse() {
        let root = AccessPath::root();
        let field = root.child("config".into());
        let element = field.child(1usize.into());

        assert!(root.is_root());
        assert_eq!(element.len(), 2);
        assert_eq!(element.last(), Some(&PathSegment::Index(1)));
        assert_eq!(element.parent(), Some(field.clone()));
        assert_eq!(field.parent(), Some(root.clone()));
        assert_eq!(root.parent(), None);
    }

    #[test]
    fn child_does_not_disturb_the_parent_path() {
        let base = AccessPath::root().child("a".into());
        let left = base.child("x".into());
        let right = base.child(0usize.into());

        assert_eq!(base.len(), 1);
        assert_eq!(left.segments()[1], PathSegment::Field("x".into()));
        assert_eq!(right.segments()[1], PathSegment::Index(0));
    }

    #[test]
    fn renders_under_a_label() {
        let path = AccessPath::root()
            .child("config".into())
            .child("values".into())
            .child(1usize.into());
        assert_eq!(path.display_with("Main").to_string(), "Main.config.values[1]");
        assert_eq!(AccessPath::root().display_with("_").to_string(), "_");
    }
}
