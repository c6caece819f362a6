//! Cosmetic categories and the per-session option catalog
//!
//! The catalog is resolved once when a session is configured and never changes
//! afterwards. Both the authority's bounds check and the client's cyclic
//! selection read it, so they can never disagree on how many options exist.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of cosmetic categories every participant carries
pub const CATEGORY_COUNT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CosmeticCategory {
    Body,
    BodyPart,
    Eye,
    Glove,
    HeadPart,
    MouthAndNose,
    Tail,
}

impl CosmeticCategory {
    /// All categories in catalog order
    pub const ALL: [CosmeticCategory; CATEGORY_COUNT] = [
        CosmeticCategory::Body,
        CosmeticCategory::BodyPart,
        CosmeticCategory::Eye,
        CosmeticCategory::Glove,
        CosmeticCategory::HeadPart,
        CosmeticCategory::MouthAndNose,
        CosmeticCategory::Tail,
    ];

    /// Position of this category in [`CosmeticCategory::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CosmeticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CosmeticCategory::Body => "Body",
            CosmeticCategory::BodyPart => "BodyPart",
            CosmeticCategory::Eye => "Eye",
            CosmeticCategory::Glove => "Glove",
            CosmeticCategory::HeadPart => "HeadPart",
            CosmeticCategory::MouthAndNose => "MouthAndNose",
            CosmeticCategory::Tail => "Tail",
        };
        f.write_str(name)
    }
}

impl FromStr for CosmeticCategory {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "body" => Ok(CosmeticCategory::Body),
            "bodypart" => Ok(CosmeticCategory::BodyPart),
            "eye" | "eyes" => Ok(CosmeticCategory::Eye),
            "glove" | "gloves" => Ok(CosmeticCategory::Glove),
            "headpart" | "head" => Ok(CosmeticCategory::HeadPart),
            "mouthandnose" | "mouth" => Ok(CosmeticCategory::MouthAndNose),
            "tail" => Ok(CosmeticCategory::Tail),
            _ => Err(CatalogError::UnknownCategory(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog for {0} must offer at least one option")]
    EmptyCategory(CosmeticCategory),
    #[error("expected {expected} catalog sizes, got {got}")]
    WrongLength { expected: usize, got: usize },
    #[error("invalid catalog size {0:?}")]
    InvalidSize(String),
    #[error("unknown cosmetic category {0:?}")]
    UnknownCategory(String),
}

/// Immutable option counts, one per category
///
/// Sizes differ per category, so every bounds check must go through
/// [`Catalog::size`] for the category in question. Deserialization runs the
/// same checks as [`Catalog::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "[u32; CATEGORY_COUNT]",
    into = "[u32; CATEGORY_COUNT]"
)]
pub struct Catalog {
    sizes: [u32; CATEGORY_COUNT],
}

impl Catalog {
    /// Builds a catalog, refusing any category with zero options
    ///
    /// A participant's cosmetic index starts at 0, which is only valid when
    /// the category offers at least one option.
    pub fn new(sizes: [u32; CATEGORY_COUNT]) -> Result<Self, CatalogError> {
        for category in CosmeticCategory::ALL {
            if sizes[category.index()] == 0 {
                return Err(CatalogError::EmptyCategory(category));
            }
        }
        Ok(Self { sizes })
    }

    /// Number of options offered in `category`, always at least 1
    pub fn size(&self, category: CosmeticCategory) -> u32 {
        self.sizes[category.index()]
    }

    /// Every size in category order
    pub fn sizes(&self) -> [u32; CATEGORY_COUNT] {
        self.sizes
    }

    /// Returns true if `index` selects an existing option in `category`
    pub fn contains(&self, category: CosmeticCategory, index: i32) -> bool {
        index >= 0 && (index as i64) < self.size(category) as i64
    }

    /// Steps `current` by `delta` options, wrapping at both ends
    pub fn cycle(&self, category: CosmeticCategory, current: i32, delta: i32) -> i32 {
        let size = self.size(category) as i64;
        (current as i64 + delta as i64).rem_euclid(size) as i32
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            sizes: [4, 3, 5, 3, 4, 3, 3],
        }
    }
}

impl TryFrom<[u32; CATEGORY_COUNT]> for Catalog {
    type Error = CatalogError;

    fn try_from(sizes: [u32; CATEGORY_COUNT]) -> Result<Self, Self::Error> {
        Catalog::new(sizes)
    }
}

impl From<Catalog> for [u32; CATEGORY_COUNT] {
    fn from(catalog: Catalog) -> Self {
        catalog.sizes()
    }
}

impl FromStr for Catalog {
    type Err = CatalogError;

    /// Parses seven comma separated sizes in category order
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != CATEGORY_COUNT {
            return Err(CatalogError::WrongLength {
                expected: CATEGORY_COUNT,
                got: parts.len(),
            });
        }

        let mut sizes = [0u32; CATEGORY_COUNT];
        for (slot, part) in sizes.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .map_err(|_| CatalogError::InvalidSize(part.to_string()))?;
        }

        Catalog::new(sizes)
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sizes: Vec<String> = self.sizes().iter().map(u32::to_string).collect();
        f.write_str(&sizes.join(","))
    }
}
