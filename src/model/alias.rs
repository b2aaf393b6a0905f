use std::fmt;

use thiserror::Error;

/// Label under which a key is stored in the module
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyAlias(String);

impl KeyAlias {
    pub const MAX_LENGTH: usize = 255;

    pub fn new(alias: impl Into<String>) -> Result<Self, AliasError> {
        let alias = alias.into();
        if alias.is_empty() {
            return Err(AliasError::Empty);
        }
        if alias.len() > Self::MAX_LENGTH {
            return Err(AliasError::TooLong { length: alias.len() });
        }
        if alias.contains('\0') {
            return Err(AliasError::ContainsNul);
        }
        Ok(Self(alias))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for KeyAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for KeyAlias {
    type Error = AliasError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    #[error("Key alias must not be empty")]
    Empty,

    #[error("Key alias is {length} bytes, at most {max} allowed", max = KeyAlias::MAX_LENGTH)]
    TooLong { length: usize },

    #[error("Key alias must not contain NUL bytes")]
    ContainsNul,
}
