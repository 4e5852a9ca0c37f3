use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::KeyValueStore;
use crate::error::{DarkroomError, Result};

/// Fixed storage key for the appearance preference.
pub const APPEARANCE_KEY: &str = "appearance";

/// Colour scheme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Appearance {
    Light,
    Dark,
    #[default]
    System,
}

impl Appearance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }

    /// Read the stored preference; unknown or missing values fall back to `System`.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        Ok(store
            .get(APPEARANCE_KEY)?
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or_default())
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        store.set(APPEARANCE_KEY, self.as_str())
    }
}

impl fmt::Display for Appearance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Appearance {
    type Err = DarkroomError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(DarkroomError::InvalidArgument(format!(
                "Unknown appearance: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_appearance_defaults_to_system() {
        let store = MemoryStore::new();
        assert_eq!(Appearance::load(&store).unwrap(), Appearance::System);

        store.set(APPEARANCE_KEY, "sepia").unwrap();
        assert_eq!(Appearance::load(&store).unwrap(), Appearance::System);
    }

    #[test]
    fn test_appearance_persisted() {
        let store = MemoryStore::new();
        Appearance::Dark.save(&store).unwrap();
        assert_eq!(store.get(APPEARANCE_KEY).unwrap().as_deref(), Some("dark"));
        assert_eq!(Appearance::load(&store).unwrap(), Appearance::Dark);
    }
}
