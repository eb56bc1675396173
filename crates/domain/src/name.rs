use derive_more::{AsRef, Display};

const MAX_LEN: usize = 64;

/// Display name of a user, catalog exercise or workout. Stored trimmed.
#[derive(AsRef, Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    pub fn new(name: &str) -> Result<Self, NameError> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(NameError::Empty);
        }

        if trimmed.len() > MAX_LEN {
            return Err(NameError::TooLong(trimmed.len()));
        }

        Ok(Name(trimmed.to_string()))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum NameError {
    #[error("Name must not be empty")]
    Empty,
    #[error("Name must be {MAX_LEN} characters or fewer ({0} > {MAX_LEN})")]
    TooLong(usize),
}
