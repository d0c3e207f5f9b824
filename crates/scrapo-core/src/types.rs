//! Shared types used across Scrapo.
//!
//! Records are keyed by a fixed field enumeration and only ever hold
//! non-empty trimmed values. Row-shaped data stays positional; its header is
//! just the first row.

use crate::error::ScrapoError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Fields an item-list extractor may observe on a single entity.
///
/// Declaration order is the canonical column order used when serializing
/// record-shaped datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    /// Display name of the entity
    Name,
    /// Absolute URL of the entity's profile
    #[serde(rename = "ProfileURL")]
    ProfileUrl,
    /// Geographic location
    Location,
    /// Industry label
    Industry,
    /// Employee count text
    Employees,
    /// Job title
    Designation,
    /// Organization name
    Organization,
    /// Absolute URL of the organization page
    #[serde(rename = "OrganizationURL")]
    OrganizationUrl,
    /// Free-form description
    About,
}

impl Field {
    /// All fields in canonical column order.
    pub const ALL: [Field; 9] = [
        Field::Name,
        Field::ProfileUrl,
        Field::Location,
        Field::Industry,
        Field::Employees,
        Field::Designation,
        Field::Organization,
        Field::OrganizationUrl,
        Field::About,
    ];

    /// Column name used in persisted JSON and CSV headers.
    #[must_use]
    pub fn column_name(self) -> &'static str {
        match self {
            Self::Name => "Name",
            Self::ProfileUrl => "ProfileURL",
            Self::Location => "Location",
            Self::Industry => "Industry",
            Self::Employees => "Employees",
            Self::Designation => "Designation",
            Self::Organization => "Organization",
            Self::OrganizationUrl => "OrganizationURL",
            Self::About => "About",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

impl FromStr for Field {
    type Err = ScrapoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.column_name() == s)
            .ok_or_else(|| ScrapoError::UnknownField(s.to_string()))
    }
}

/// One scraped entity.
///
/// A field is either present with non-empty trimmed content or absent.
/// Deserialization applies the same normalization, so blank values coming
/// back from storage are dropped rather than kept as empty cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Field, String>")]
pub struct Record(BTreeMap<Field, String>);

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a looked-up value. Missing or blank values leave the field absent.
    ///
    /// Returns `true` if the field was stored.
    pub fn insert(&mut self, field: Field, value: Option<&str>) -> bool {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => {
                self.0.insert(field, v.to_string());
                true
            }
            _ => {
                self.0.remove(&field);
                false
            }
        }
    }

    /// Get a field's value.
    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// Whether the field was observed.
    #[must_use]
    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    /// Number of observed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no field was observed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate observed fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, v)| (*f, v.as_str()))
    }
}

impl From<BTreeMap<Field, String>> for Record {
    fn from(map: BTreeMap<Field, String>) -> Self {
        map.into_iter().collect()
    }
}

impl<S: AsRef<str>> FromIterator<(Field, S)> for Record {
    fn from_iter<I: IntoIterator<Item = (Field, S)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (field, value) in iter {
            record.insert(field, Some(value.as_ref()));
        }
        record
    }
}

/// A positional row of cells.
pub type Row = Vec<String>;

/// One table extracted from a page: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Column names
    pub header: Row,
    /// Data rows, positionally aligned with the header
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    /// Whether the page yielded no table at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.rows.is_empty()
    }
}

/// Shape of a persisted collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetShape {
    /// Sequence of [`Record`]s, columns derived at serialization time
    Records,
    /// Header row followed by positional data rows
    Rows,
}

/// Key of a persisted collection plus the shape stored under it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHandle {
    key: String,
    shape: DatasetShape,
}

impl DatasetHandle {
    /// Create a handle for a storage key.
    ///
    /// # Errors
    /// Returns error if the key is empty or contains characters other than
    /// ASCII alphanumerics, `_` and `-`.
    pub fn new(key: impl Into<String>, shape: DatasetShape) -> Result<Self, ScrapoError> {
        let key = key.into();
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(ScrapoError::Validation(format!(
                "invalid dataset key: must be non-empty ASCII alphanumeric, got '{key}'"
            )));
        }
        Ok(Self { key, shape })
    }

    /// Storage key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Shape of the stored collection.
    #[must_use]
    pub fn shape(&self) -> DatasetShape {
        self.shape
    }
}

impl fmt::Display for DatasetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Which page layout a run extracts, and therefore which dataset it feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionType {
    /// Account list pages, record-shaped
    Accounts,
    /// Lead list tables, row-shaped
    Leads,
}

impl ExtractionType {
    /// Storage key of the dataset this type feeds.
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Accounts => "scrapedListData",
            Self::Leads => "scrapedData",
        }
    }

    /// Shape of the dataset this type feeds.
    #[must_use]
    pub fn shape(self) -> DatasetShape {
        match self {
            Self::Accounts => DatasetShape::Records,
            Self::Leads => DatasetShape::Rows,
        }
    }

    /// The single active dataset handle for this type.
    #[must_use]
    pub fn dataset_handle(self) -> DatasetHandle {
        DatasetHandle {
            key: self.storage_key().to_string(),
            shape: self.shape(),
        }
    }

    /// Filename used when the dataset is downloaded.
    #[must_use]
    pub fn export_filename(self) -> &'static str {
        match self {
            Self::Accounts => "linkedin_accounts_data.csv",
            Self::Leads => "linkedin_leads_data.csv",
        }
    }
}

impl fmt::Display for ExtractionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accounts => f.write_str("accounts"),
            Self::Leads => f.write_str("leads"),
        }
    }
}

impl FromStr for ExtractionType {
    type Err = ScrapoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accounts" | "account" => Ok(Self::Accounts),
            "leads" | "lead" => Ok(Self::Leads),
            other => Err(ScrapoError::Validation(format!(
                "unknown extraction type '{other}', expected 'accounts' or 'leads'"
            ))),
        }
    }
}

/// Number of pages a multi-page run may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageBudget(u32);

impl PageBudget {
    /// Largest budget accepted for one run.
    pub const MAX: u32 = 50;

    /// Create a validated budget.
    ///
    /// # Errors
    /// Returns error unless `1 <= pages <= 50`.
    pub fn new(pages: u32) -> Result<Self, ScrapoError> {
        if (1..=Self::MAX).contains(&pages) {
            Ok(Self(pages))
        } else {
            Err(ScrapoError::Validation(format!(
                "page budget must be between 1 and {}, got {pages}",
                Self::MAX
            )))
        }
    }

    /// Number of pages.
    #[must_use]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PageBudget {
    type Error = ScrapoError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PageBudget> for u32 {
    fn from(budget: PageBudget) -> Self {
        budget.0
    }
}

impl fmt::Display for PageBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do when a row-shaped batch arrives with a header that differs
/// from the dataset's established header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaDriftPolicy {
    /// Put the new header at the front and keep every old row after it.
    /// The old header ends up embedded in the data.
    #[default]
    PrependHeader,
    /// Refuse the batch and leave the dataset unchanged.
    Reject,
}
