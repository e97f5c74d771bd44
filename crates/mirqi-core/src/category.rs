//! Observation categories and assertion polarity

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{MirqiError, Result};

pub const OTHER_FINDING: &str = "Other Finding";
pub const ENLARGED_CARDIOMEDIASTINUM: &str = "Enlarged Cardiomediastinum";
pub const CARDIOMEGALY: &str = "Cardiomegaly";
pub const SUPPORT_DEVICES: &str = "Support Devices";

/// The frozen category order shared by every label vector
pub const DEFAULT_CATEGORIES: [&str; 20] = [
    OTHER_FINDING,
    ENLARGED_CARDIOMEDIASTINUM,
    CARDIOMEGALY,
    "Lung Lesion",
    "Airspace Opacity",
    "Edema",
    "Consolidation",
    "Pneumonia",
    "Atelectasis",
    "Pneumothorax",
    "Pleural Effusion",
    "Pleural Other",
    "Fracture",
    SUPPORT_DEVICES,
    "Emphysema",
    "Cicatrix",
    "Hernia",
    "Calcinosis",
    "Airspace Disease",
    "Hypoinflation",
];

// ============================================================================
// Polarity
// ============================================================================

/// Whether an observation is asserted, denied, or hedged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Polarity {
    Positive,
    Negative,
    Uncertain,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "POSITIVE",
            Self::Negative => "NEGATIVE",
            Self::Uncertain => "UNCERTAIN",
        }
    }

    /// Numeric label code (1 / 0 / -1)
    pub fn code(&self) -> i8 {
        match self {
            Self::Positive => 1,
            Self::Negative => 0,
            Self::Uncertain => -1,
        }
    }

    /// Derive polarity from resolved flags; negation wins over uncertainty
    pub fn from_flags(negated: bool, uncertain: bool) -> Self {
        if negated {
            Self::Negative
        } else if uncertain {
            Self::Uncertain
        } else {
            Self::Positive
        }
    }

    /// Positive or uncertain
    pub fn is_finding(&self) -> bool {
        !matches!(self, Self::Negative)
    }
}

impl std::fmt::Display for Polarity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Polarity {
    type Err = MirqiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "POSITIVE" => Ok(Self::Positive),
            "NEGATIVE" => Ok(Self::Negative),
            "UNCERTAIN" => Ok(Self::Uncertain),
            _ => Err(MirqiError::InvalidDocument(format!("unknown polarity: {s}"))),
        }
    }
}

// ============================================================================
// Category Registry
// ============================================================================

/// Immutable, ordered list of observation categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryRegistry {
    categories: Vec<String>,
}

impl CategoryRegistry {
    /// Build a registry, rejecting empty or duplicate names
    pub fn new<I, S>(categories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for name in &categories {
            if name.trim().is_empty() {
                return Err(MirqiError::Config("empty category name".to_string()));
            }
            if !seen.insert(name.as_str()) {
                return Err(MirqiError::Config(format!("duplicate category: {name}")));
            }
        }
        Ok(Self { categories })
    }

    /// The 20 standard chest X-ray observation categories
    pub fn chest_xray() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.categories.get(index).map(String::as_str)
    }

    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.index_of(category).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(String::as_str)
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::chest_xray()
    }
}

impl TryFrom<Vec<String>> for CategoryRegistry {
    type Error = MirqiError;

    fn try_from(categories: Vec<String>) -> Result<Self> {
        Self::new(categories)
    }
}

impl From<CategoryRegistry> for Vec<String> {
    fn from(registry: CategoryRegistry) -> Self {
        registry.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order() {
        let registry = CategoryRegistry::default();
        assert_eq!(registry.len(), 20);
        assert_eq!(registry.get(0), Some(OTHER_FINDING));
        assert_eq!(registry.index_of(CARDIOMEGALY), Some(2));
        assert_eq!(registry.index_of(SUPPORT_DEVICES), Some(13));
        assert_eq!(registry.get(19), Some("Hypoinflation"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        assert!(CategoryRegistry::new(["Edema", "Edema"]).is_err());
        assert!(CategoryRegistry::new(["Edema", " "]).is_err());
        assert!(CategoryRegistry::new(["Edema", "Hernia"]).is_ok());
    }

    #[test]
    fn test_polarity_codes_and_flags() {
        assert_eq!(Polarity::Positive.code(), 1);
        assert_eq!(Polarity::Negative.code(), 0);
        assert_eq!(Polarity::Uncertain.code(), -1);
        assert_eq!(Polarity::from_flags(true, true), Polarity::Negative);
        assert_eq!(Polarity::from_flags(false, true), Polarity::Uncertain);
        assert_eq!(Polarity::from_flags(false, false), Polarity::Positive);
    }

    #[test]
    fn test_polarity_serde() {
        let json = serde_json::to_string(&Polarity::Uncertain).unwrap();
        assert_eq!(json, "\"UNCERTAIN\"");
        let parsed: Polarity = serde_json::from_str("\"NEGATIVE\"").unwrap();
        assert_eq!(parsed, Polarity::Negative);
        assert_eq!("positive".parse::<Polarity>().unwrap(), Polarity::Positive);
    }
}
