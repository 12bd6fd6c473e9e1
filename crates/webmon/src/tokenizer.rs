//! Field splitter used by the snapshot importer
//!
//! Splits a line into the maximal runs of non-separator characters. Runs of
//! separators collapse, so no field is ever empty.

/// Upper bound on the number of fields returned by [`split_on_separators`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldLimit {
    /// One field per non-separator run
    Unbounded,
    /// Stop after this many fields
    AtMost(usize),
}

/// Split `line` on any character in `separators`.
///
/// With [`FieldLimit::AtMost`] and `keep_remainder` set, the last field runs
/// to the end of the input, separators included. Otherwise input past the
/// limit is dropped. `keep_remainder` is ignored when the limit is unbounded.
///
/// An absent line yields no fields. An empty separator set yields the whole
/// line as a single field.
///
/// # Examples
/// ```
/// use webmon::{split_on_separators, FieldLimit};
///
/// let fields = split_on_separators(Some("a,,b,c"), &[','], FieldLimit::Unbounded, false);
/// assert_eq!(fields, vec!["a", "b", "c"]);
///
/// let fields = split_on_separators(Some("1 2 3 4"), &[' '], FieldLimit::AtMost(2), true);
/// assert_eq!(fields, vec!["1", "2 3 4"]);
/// ```
pub fn split_on_separators<'a>(
    line: Option<&'a str>,
    separators: &[char],
    limit: FieldLimit,
    keep_remainder: bool,
) -> Vec<&'a str> {
    let line = match line {
        Some(line) => line,
        None => return Vec::new(),
    };

    let is_separator = |c: char| separators.contains(&c);
    let (max_fields, keep_remainder) = match limit {
        FieldLimit::Unbounded => (usize::MAX, false),
        FieldLimit::AtMost(n) => (n, keep_remainder),
    };

    let mut fields = Vec::new();
    let mut rest = line.trim_start_matches(is_separator);

    while !rest.is_empty() && fields.len() < max_fields {
        if keep_remainder && fields.len() + 1 == max_fields {
            fields.push(rest);
            break;
        }

        let end = rest.find(is_separator).unwrap_or(rest.len());
        fields.push(&rest[..end]);
        rest = rest[end..].trim_start_matches(is_separator);
    }

    fields
}
