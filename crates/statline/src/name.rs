use std::fmt;

/// Hierarchical name of a task: an ordered path of segments.
///
/// The root task has the empty path. Names are compared segment-wise, so a
/// `TaskName` can key a `BTreeMap` directly without any joined-string
/// encoding. Two tasks with the same name cannot be open at the same time;
/// the tracker registry enforces that.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskName {
    segments: Vec<String>,
}

impl TaskName {
    /// The root name (empty path).
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a name from an iterator of segments. Mostly useful in tests;
    /// production code derives names through [`child`](Self::child).
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Derive a child name with one more segment.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The parent name (one segment dropped), or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Number of segments; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The final segment, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for TaskName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_has_no_parent() {
        assert!(TaskName::root().parent().is_none());
        assert!(TaskName::root().is_root());
        assert_eq!(TaskName::root().depth(), 0);
    }

    #[test]
    fn test_child_and_parent_round_trip() {
        let fetch = TaskName::root().child("fetch");
        let download = fetch.child("download");

        assert_eq!(download.depth(), 2);
        assert_eq!(download.last(), Some("download"));
        assert_eq!(download.parent().expect("should have parent"), fetch);
        assert_eq!(
            fetch.parent().expect("should have parent"),
            TaskName::root()
        );
    }

    #[test]
    fn test_display_joins_with_slash() {
        let name = TaskName::from_segments(["fetch", "download"]);
        assert_eq!(name.to_string(), "fetch/download");
        assert_eq!(TaskName::root().to_string(), "");
    }

    #[test]
    fn test_ordering_is_segment_wise() {
        let a = TaskName::from_segments(["a"]);
        let ab = TaskName::from_segments(["a", "b"]);
        let b = TaskName::from_segments(["b"]);
        assert!(a < ab);
        assert!(ab < b);
    }
}
