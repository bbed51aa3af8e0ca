//! Module identity.
//!
//! Every business module owns one outbox partition and one relay. The module
//! name is the partition key for outbox rows and the suffix of the relay's lock
//! resource.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Prefix of the advisory-lock resource guarding a module's outbox.
pub const OUTBOX_LOCK_PREFIX: &str = "outbox:";

/// Validated module name (`identity`, `payroll`, `time-off`, ...).
///
/// Allowed characters: lowercase ASCII letters, digits, `_`, `-` and `.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleName(String);

impl ModuleName {
    pub fn new(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(DomainError::validation("module name cannot be empty"));
        }
        if let Some(bad) = name
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-' | '.')))
        {
            return Err(DomainError::validation(format!(
                "module name '{name}' contains invalid character '{bad}'"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the mutual-exclusion resource for this module's relay.
    pub fn lock_resource(&self) -> String {
        format!("{OUTBOX_LOCK_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ModuleName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ModuleName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ModuleName> for String {
    fn from(value: ModuleName) -> Self {
        value.0
    }
}

impl AsRef<str> for ModuleName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_resource_is_prefixed() {
        let module = ModuleName::new("identity").unwrap();
        assert_eq!(module.lock_resource(), "outbox:identity");
    }

    #[test]
    fn rejects_empty_and_uppercase() {
        assert!(ModuleName::new("").is_err());
        assert!(matches!(
            ModuleName::new("Identity"),
            Err(DomainError::Validation(_))
        ));
        assert!(ModuleName::new("time-off.v2").is_ok());
    }

    #[test]
    fn deserialization_validates() {
        let ok: ModuleName = serde_json::from_str("\"payroll\"").unwrap();
        assert_eq!(ok.as_str(), "payroll");
        assert!(serde_json::from_str::<ModuleName>("\"Pay Roll\"").is_err());
    }
}
