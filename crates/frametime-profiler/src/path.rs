//! Timer path parsing.
//!
//! A path names a timer by the chain of timer names leading to it, like a
//! file system path. `/`, `\` and `|` are interchangeable separators.

/// Characters accepted between path segments.
pub const PATH_SEPARATORS: [char; 3] = ['/', '\\', '|'];

/// Separator used when rendering paths.
pub const DISPLAY_SEPARATOR: char = '|';

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATORS).filter(|segment| !segment.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_separators_are_equivalent() {
        let expected = vec!["Render", "ZPrepass", "solid"];
        assert_eq!(segments("Render|ZPrepass|solid").collect::<Vec<_>>(), expected);
        assert_eq!(segments("Render/ZPrepass/solid").collect::<Vec<_>>(), expected);
        assert_eq!(segments("Render\\ZPrepass\\solid").collect::<Vec<_>>(), expected);
        assert_eq!(segments("Render/ZPrepass|solid").collect::<Vec<_>>(), expected);
    }

    #[test]
    fn empty_segments_are_skipped() {
        assert_eq!(segments("|A||B/").collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(segments("").count(), 0);
    }

    #[test]
    fn names_may_contain_spaces() {
        assert_eq!(
            segments("Z prepass|solid").collect::<Vec<_>>(),
            vec!["Z prepass", "solid"]
        );
    }
}
