use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

/// One tracked listing as persisted between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub title: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub url: String,
    pub added_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Item {
    /// Create a freshly seen item; both timestamps start at `now`.
    pub fn first_seen(raw: RawItem, now: DateTime<Utc>) -> Self {
        Self {
            title: raw.title,
            price: raw.price,
            url: raw.url,
            added_on: now,
            updated_on: now,
        }
    }

    /// Record a new price. `added_on` is never touched.
    pub fn reprice(&mut self, price: Decimal, now: DateTime<Utc>) {
        self.price = price;
        self.updated_on = now;
    }
}

/// A listing as produced by a source adapter, before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RawItem {
    #[validate(custom(function = "validate_title"))]
    pub title: String,
    #[validate(custom(function = "validate_price"))]
    pub price: Decimal,
    #[validate(url)]
    pub url: String,
}

impl RawItem {
    pub fn new(title: impl Into<String>, price: Decimal, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            price,
            url: url.into(),
        }
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        let mut err = ValidationError::new("blank_title");
        err.message = Some(Cow::from("title must not be blank"));
        return Err(err);
    }
    Ok(())
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price < Decimal::ZERO {
        let mut err = ValidationError::new("negative_price");
        err.message = Some(Cow::from("price must not be negative"));
        return Err(err);
    }
    Ok(())
}

/// How incoming titles are matched against the catalog.
///
/// Only the lookup key is affected; stored titles keep the form first seen.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatching {
    /// Byte-for-byte comparison.
    #[default]
    Exact,
    /// Trim the ends and collapse internal whitespace runs.
    Trimmed,
    /// `Trimmed`, then lowercase.
    CaseInsensitive,
}

impl TitleMatching {
    pub fn key<'a>(&self, title: &'a str) -> Cow<'a, str> {
        match self {
            TitleMatching::Exact => Cow::Borrowed(title),
            TitleMatching::Trimmed => Cow::Owned(collapse_whitespace(title)),
            TitleMatching::CaseInsensitive => Cow::Owned(collapse_whitespace(title).to_lowercase()),
        }
    }
}

fn collapse_whitespace(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The known items of one deployment, keyed by exact title.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    items: BTreeMap<String, Item>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from stored rows. A repeated title keeps the last row.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let mut catalog = Self::new();
        for item in items {
            if let Some(previous) = catalog.insert(item) {
                tracing::warn!("Duplicate stored title '{}', keeping the later row", previous.title);
            }
        }
        catalog
    }

    pub fn get(&self, title: &str) -> Option<&Item> {
        self.items.get(title)
    }

    pub fn get_mut(&mut self, title: &str) -> Option<&mut Item> {
        self.items.get_mut(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.items.contains_key(title)
    }

    /// Insert or replace by title, returning the replaced item.
    pub fn insert(&mut self, item: Item) -> Option<Item> {
        self.items.insert(item.title.clone(), item)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

impl IntoIterator for Catalog {
    type Item = Item;
    type IntoIter = std::collections::btree_map::IntoValues<String, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_values()
    }
}
