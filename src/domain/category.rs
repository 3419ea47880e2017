//! Category Set - the closed set of item tags plus an optional temperature band
//!
//! Flags are stored as a bitset; the temperature band is a separate
//! `Option` so a set can never carry two bands.

use serde::{Serialize, Serializer};
use std::fmt;

/// Item type tags (non-temperature)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Category {
    Perishable = 0,
    Hazardous = 1,
    Fragile = 2,
    Edible = 3,
    Medicinal = 4,
    Bulky = 5,
    Dry = 6,
}

impl Category {
    /// All categories in code order
    pub const ALL: [Category; 7] = [
        Category::Perishable,
        Category::Hazardous,
        Category::Fragile,
        Category::Edible,
        Category::Medicinal,
        Category::Bulky,
        Category::Dry,
    ];

    #[inline]
    const fn bit(self) -> u8 {
        1 << self as u8
    }

    pub fn code(self) -> char {
        match self {
            Category::Perishable => 'P',
            Category::Hazardous => 'H',
            Category::Fragile => 'F',
            Category::Edible => 'E',
            Category::Medicinal => 'M',
            Category::Bulky => 'B',
            Category::Dry => 'D',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        Category::ALL.into_iter().find(|cat| cat.code() == c)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Perishable => "perishable",
            Category::Hazardous => "hazardous",
            Category::Fragile => "fragile",
            Category::Edible => "edible",
            Category::Medicinal => "medicinal",
            Category::Bulky => "bulky",
            Category::Dry => "dry",
        }
    }
}

/// Environmental temperature bands (mutually exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TempBand {
    Frozen,
    HeatSensitive,
    Cool,
    Room,
    Ambient,
}

impl TempBand {
    pub const ALL: [TempBand; 5] =
        [TempBand::Frozen, TempBand::HeatSensitive, TempBand::Cool, TempBand::Room, TempBand::Ambient];

    /// Band number used in category codes (`T1`..`T5`)
    pub fn number(self) -> u8 {
        match self {
            TempBand::Frozen => 1,
            TempBand::HeatSensitive => 2,
            TempBand::Cool => 3,
            TempBand::Room => 4,
            TempBand::Ambient => 5,
        }
    }

    fn from_number(n: u8) -> Option<Self> {
        TempBand::ALL.into_iter().find(|band| band.number() == n)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TempBand::Frozen => "frozen",
            TempBand::HeatSensitive => "heat_sensitive",
            TempBand::Cool => "cool",
            TempBand::Room => "room",
            TempBand::Ambient => "ambient",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CategoryParseError {
    #[error("unknown category code '{0}'")]
    UnknownCode(char),
    #[error("invalid temperature band code 'T{0}'")]
    InvalidBand(String),
    #[error("category set carries more than one temperature band")]
    MultipleBands,
}

/// Immutable set of categories with at most one temperature band
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CategorySet {
    flags: u8,
    band: Option<TempBand>,
}

impl CategorySet {
    pub const EMPTY: CategorySet = CategorySet { flags: 0, band: None };

    pub fn new<I>(categories: I, band: Option<TempBand>) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        let flags = categories.into_iter().fold(0u8, |acc, c| acc | c.bit());
        Self { flags, band }
    }

    /// Set of plain categories with no temperature band
    pub fn of(categories: &[Category]) -> Self {
        Self::new(categories.iter().copied(), None)
    }

    #[must_use]
    pub fn with(self, category: Category) -> Self {
        Self { flags: self.flags | category.bit(), band: self.band }
    }

    /// Returns a copy carrying `band`, replacing any existing band
    #[must_use]
    pub fn with_band(self, band: TempBand) -> Self {
        Self { flags: self.flags, band: Some(band) }
    }

    #[must_use]
    pub fn without_band(self) -> Self {
        Self { flags: self.flags, band: None }
    }

    #[inline]
    pub fn contains(self, category: Category) -> bool {
        self.flags & category.bit() != 0
    }

    #[inline]
    pub fn band(self) -> Option<TempBand> {
        self.band
    }

    /// OR of the non-temperature flags of both sets; the band is dropped
    #[must_use]
    pub fn merge_flags(self, other: CategorySet) -> Self {
        Self { flags: self.flags | other.flags, band: None }
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.flags == 0 && self.band.is_none()
    }

    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl fmt::Display for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for category in self.iter() {
            write!(f, "{}", category.code())?;
        }
        if let Some(band) = self.band {
            write!(f, "T{}", band.number())?;
        }
        Ok(())
    }
}

impl std::str::FromStr for CategorySet {
    type Err = CategoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = CategorySet::EMPTY;
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == 'T' {
                let digit = chars.next();
                let band = digit
                    .and_then(|d| d.to_digit(10))
                    .and_then(|n| TempBand::from_number(n as u8))
                    .ok_or_else(|| {
                        CategoryParseError::InvalidBand(digit.map(String::from).unwrap_or_default())
                    })?;
                if set.band.is_some() {
                    return Err(CategoryParseError::MultipleBands);
                }
                set = set.with_band(band);
            } else {
                let category = Category::from_code(c).ok_or(CategoryParseError::UnknownCode(c))?;
                set = set.with(category);
            }
        }
        Ok(set)
    }
}

impl Serialize for CategorySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
