//! Wildcard Pattern Location
//!
//! Three wildcard forms may appear in a task's specification strings:
//! - `*`   single: one task per matched value, carried on to dependents
//! - `**`  flatten: the entry is replaced in place by all matching files
//! - `***` Cartesian: one task per combination of matched values
//!
//! They share one character, so a spec only counts as carrying a form when
//! the form's token occurs in it exactly once.

use std::fmt;

/// Character every wildcard form is made of.
pub const WILDCARD_CHAR: char = '*';

/// One of the three wildcard forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Wildcard {
    Single,
    Flatten,
    Cartesian,
}

impl Wildcard {
    /// The literal token for this form.
    pub fn token(self) -> &'static str {
        match self {
            Wildcard::Single => "*",
            Wildcard::Flatten => "**",
            Wildcard::Cartesian => "***",
        }
    }

    /// Tells whether `spec` carries this form, i.e. contains its token exactly once.
    ///
    /// # Example
    /// ```
    /// use mlplan::plan::pattern::Wildcard;
    ///
    /// assert!(Wildcard::Single.is_in("data/*.txt"));
    /// assert!(!Wildcard::Single.is_in("data/**.txt"));
    /// assert!(Wildcard::Flatten.is_in("data/**.txt"));
    /// ```
    pub fn is_in(self, spec: &str) -> bool {
        let token = self.token();
        match (spec.find(token), spec.rfind(token)) {
            (Some(first), Some(last)) => first == last,
            _ => false,
        }
    }
}

impl fmt::Display for Wildcard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.token())
    }
}

/// Returns the positions of `specs` that carry the given wildcard form.
///
/// `None` means no entry qualifies, which is an ordinary outcome.
///
/// # Example
/// ```
/// use mlplan::plan::pattern::{locate, Wildcard};
///
/// let specs = vec!["a.txt".to_string(), "b/*.txt".to_string(), "c/***.txt".to_string()];
/// assert_eq!(locate(Wildcard::Single, &specs), Some(vec![1]));
/// assert_eq!(locate(Wildcard::Cartesian, &specs), Some(vec![2]));
/// assert_eq!(locate(Wildcard::Flatten, &specs), None);
/// ```
pub fn locate(wildcard: Wildcard, specs: &[String]) -> Option<Vec<usize>> {
    let positions: Vec<usize> = specs
        .iter()
        .enumerate()
        .filter(|(_, spec)| wildcard.is_in(spec))
        .map(|(i, _)| i)
        .collect();

    if positions.is_empty() {
        None
    } else {
        Some(positions)
    }
}

/// Checks whether any of `specs` carries the given wildcard form.
pub fn contains(wildcard: Wildcard, specs: &[String]) -> bool {
    specs.iter().any(|spec| wildcard.is_in(spec))
}

/// Checks whether any of `specs` has a wildcard character at all.
pub fn has_wildcards(specs: &[String]) -> bool {
    specs.iter().any(|spec| spec.contains(WILDCARD_CHAR))
}

/// Replaces the first run of wildcard characters in `spec` with `value`.
///
/// # Example
/// ```
/// use mlplan::plan::pattern::substitute;
///
/// assert_eq!(substitute("out/*.conll", "doc1"), "out/doc1.conll");
/// assert_eq!(substitute("out/***.conll", "doc1"), "out/doc1.conll");
/// ```
pub fn substitute(spec: &str, value: &str) -> String {
    let Some(start) = spec.find(WILDCARD_CHAR) else {
        return spec.to_string();
    };
    let run = spec[start..]
        .find(|c| c != WILDCARD_CHAR)
        .unwrap_or(spec.len() - start);

    let mut result = String::with_capacity(spec.len() + value.len());
    result.push_str(&spec[..start]);
    result.push_str(value);
    result.push_str(&spec[start + run..]);
    result
}
