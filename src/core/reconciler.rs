use chrono::{DateTime, Utc};
use std::collections::HashMap;
use validator::Validate;

use crate::models::{Catalog, ChangeEvent, Item, PriceChange, RawItem, TitleMatching};
use crate::utils::error::{AppError, Result};

/// Classifies incoming items against a working copy of the catalog.
///
/// The engine owns the catalog for the duration of a run and stamps every
/// mutation with the single run timestamp it was created with.
pub struct ReconciliationEngine {
    catalog: Catalog,
    // match key -> stored title
    index: HashMap<String, String>,
    matching: TitleMatching,
    now: DateTime<Utc>,
}

impl ReconciliationEngine {
    pub fn new(catalog: Catalog, now: DateTime<Utc>, matching: TitleMatching) -> Self {
        let mut index = HashMap::with_capacity(catalog.len());
        for title in catalog.titles() {
            let key = matching.key(title).into_owned();
            if let Some(existing) = index.get(&key) {
                tracing::warn!(
                    "Stored titles '{}' and '{}' share match key '{}'; matching against the first",
                    existing,
                    title,
                    key
                );
                continue;
            }
            index.insert(key, title.to_string());
        }

        Self {
            catalog,
            index,
            matching,
            now,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    /// Reconcile one item, producing exactly one event.
    ///
    /// Fails only with [`AppError::InvalidItem`]; the catalog is untouched in
    /// that case.
    pub fn reconcile(&mut self, incoming: RawItem) -> Result<ChangeEvent> {
        incoming.validate()?;

        let key = self.matching.key(&incoming.title).into_owned();
        let stored_title = match self.index.get(&key).cloned() {
            Some(title) => title,
            None => return Ok(self.insert_new(key, incoming)),
        };

        let stored = self
            .catalog
            .get_mut(&stored_title)
            .ok_or_else(|| AppError::Internal(format!("match index points at missing title '{}'", stored_title)))?;

        // Exact decimal equality, no tolerance
        if stored.price == incoming.price {
            return Ok(ChangeEvent::Unchanged {
                title: stored.title.clone(),
            });
        }

        let old_price = stored.price;
        stored.reprice(incoming.price, self.now);

        Ok(ChangeEvent::PriceChanged(PriceChange {
            title: stored.title.clone(),
            url: incoming.url,
            old_price,
            new_price: incoming.price,
        }))
    }

    fn insert_new(&mut self, key: String, incoming: RawItem) -> ChangeEvent {
        let item = Item::first_seen(incoming, self.now);
        self.index.insert(key, item.title.clone());
        self.catalog.insert(item.clone());
        ChangeEvent::NewItem { item }
    }
}
