//! Named argument mappings carried inside a message

use crate::error::ArgumentMismatchError;
use std::collections::BTreeSet;

/// Key → value mapping delivered to a callback handler.
pub type Arguments = serde_json::Map<String, serde_json::Value>;

/// The parameter names a callback handler declares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    names: BTreeSet<String>,
}

impl ParameterSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Submit-side check: the keys must be exactly the declared names.
    pub fn check_exact(&self, arguments: &Arguments) -> Result<(), ArgumentMismatchError> {
        let missing = self.missing_from(arguments);
        let unexpected: Vec<String> = arguments
            .keys()
            .filter(|key| !self.names.contains(*key))
            .cloned()
            .collect();

        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(ArgumentMismatchError {
                missing,
                unexpected,
            })
        }
    }

    /// Receive-side check: every declared name must be present, extra keys
    /// are tolerated.
    pub fn check_covered(&self, arguments: &Arguments) -> Result<(), ArgumentMismatchError> {
        let missing = self.missing_from(arguments);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ArgumentMismatchError {
                missing,
                unexpected: Vec::new(),
            })
        }
    }

    fn missing_from(&self, arguments: &Arguments) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| !arguments.contains_key(name.as_str()))
            .cloned()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
