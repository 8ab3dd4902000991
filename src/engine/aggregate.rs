// src/engine/aggregate.rs

//! Merging independent failures into one reported error.

use std::fmt;

use crate::errors::CmdpipeError;

/// Separator used when several errors are rendered as one message.
pub const SEPARATOR: &str = "; ";

/// Several errors that happened independently, in the order they were
/// collected.
#[derive(Debug)]
pub struct MultiError {
    errors: Vec<CmdpipeError>,
}

impl MultiError {
    pub fn new(errors: Vec<CmdpipeError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[CmdpipeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CmdpipeError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str(SEPARATOR)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Combine optional errors.
///
/// Returns `None` iff every input is `None`. A single error comes back
/// unchanged; several become [`CmdpipeError::Multiple`]. Nested
/// `MultiError`s are flattened so `errors()` always lists leaf failures.
pub fn join_errors<I>(errors: I) -> Option<CmdpipeError>
where
    I: IntoIterator<Item = Option<CmdpipeError>>,
{
    let mut flat = Vec::new();
    for err in errors.into_iter().flatten() {
        match err {
            CmdpipeError::Multiple(multi) => flat.extend(multi.into_errors()),
            other => flat.push(other),
        }
    }

    match flat.len() {
        0 => None,
        1 => flat.pop(),
        _ => Some(CmdpipeError::Multiple(MultiError::new(flat))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(msg: &str) -> Option<CmdpipeError> {
        Some(CmdpipeError::ConfigError(msg.to_string()))
    }

    #[test]
    fn all_none_is_none() {
        assert!(join_errors([None, None, None]).is_none());
        assert!(join_errors(Vec::<Option<CmdpipeError>>::new()).is_none());
    }

    #[test]
    fn single_error_is_not_wrapped() {
        let joined = join_errors([None, err("a"), None]).unwrap();
        assert!(matches!(joined, CmdpipeError::ConfigError(_)));
    }

    #[test]
    fn nested_errors_are_flattened_in_order() {
        let inner = join_errors([err("a"), err("b")]);
        let joined = join_errors([inner, None, err("c")]).unwrap();

        match &joined {
            CmdpipeError::Multiple(multi) => assert_eq!(multi.len(), 3),
            other => panic!("expected Multiple, got {other:?}"),
        }
        assert_eq!(
            joined.to_string(),
            "Configuration error: a; Configuration error: b; Configuration error: c"
        );
    }
}
