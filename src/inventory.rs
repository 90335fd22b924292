//! Nested category → item inventory.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub price: u64,
    pub quantity: u64,
}

impl Item {
    pub fn new(name: impl Into<String>, price: u64, quantity: u64) -> Self {
        Self {
            name: name.into(),
            price,
            quantity,
        }
    }
}

/// Fields to overwrite on an existing item; `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemUpdate {
    pub price: Option<u64>,
    pub quantity: Option<u64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("no item '{item}' in category '{category}'")]
    UnknownItem { category: String, item: String },
}

/// Items of one category, keyed by item name.
pub type Category = BTreeMap<String, Item>;

/// Categories keyed by name. `Clone` gives a fully independent copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    categories: BTreeMap<String, Category>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starter inventory with a laptop, rice and oil.
    pub fn sample() -> Self {
        let mut inv = Self::new();
        inv.insert("Electronics", Item::new("Laptop", 1100, 5));
        inv.insert("Groceries", Item::new("Rice", 100, 1000));
        inv.insert("Groceries", Item::new("Oil", 220, 50));
        inv
    }

    /// Add or replace an item, creating its category when needed.
    pub fn insert(&mut self, category: impl Into<String>, item: Item) {
        self.categories
            .entry(category.into())
            .or_default()
            .insert(item.name.clone(), item);
    }

    pub fn update_item(
        &mut self,
        category: &str,
        item_name: &str,
        update: &ItemUpdate,
    ) -> Result<(), InventoryError> {
        let items = self
            .categories
            .get_mut(category)
            .ok_or_else(|| InventoryError::UnknownCategory(category.to_string()))?;
        let item = items
            .get_mut(item_name)
            .ok_or_else(|| InventoryError::UnknownItem {
                category: category.to_string(),
                item: item_name.to_string(),
            })?;
        if let Some(price) = update.price {
            item.price = price;
        }
        if let Some(quantity) = update.quantity {
            item.quantity = quantity;
        }
        Ok(())
    }

    /// Fold `other` into `self`. New categories and items are added; items
    /// present in both keep `self`'s price and get the summed quantity.
    pub fn merge(&mut self, other: Inventory) {
        for (category, items) in other.categories {
            let mine = self.categories.entry(category).or_default();
            for (name, item) in items {
                mine.entry(name)
                    .and_modify(|existing| existing.quantity += item.quantity)
                    .or_insert(item);
            }
        }
    }

    pub fn items_in_category(&self, category: &str) -> Option<&Category> {
        self.categories.get(category)
    }

    /// Highest price; the first one in category/name order wins a tie.
    pub fn most_expensive_item(&self) -> Option<&Item> {
        self.all_items()
            .into_iter()
            .reduce(|best, item| if item.price > best.price { item } else { best })
    }

    /// First item named `item_name` in any category, if its quantity is
    /// positive.
    pub fn item_in_stock(&self, item_name: &str) -> Option<&Item> {
        self.categories
            .values()
            .filter_map(|items| items.get(item_name))
            .find(|item| item.quantity > 0)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn all_items(&self) -> Vec<&Item> {
        self.categories.values().flat_map(|items| items.values()).collect()
    }

    pub fn category_item_pairs(&self) -> Vec<(&str, &str)> {
        self.categories
            .iter()
            .flat_map(|(category, items)| {
                items.keys().map(move |name| (category.as_str(), name.as_str()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_layout() {
        let inv = Inventory::sample();
        assert_eq!(inv.categories().collect::<Vec<_>>(), vec!["Electronics", "Groceries"]);
        assert_eq!(
            inv.category_item_pairs(),
            vec![
                ("Electronics", "Laptop"),
                ("Groceries", "Oil"),
                ("Groceries", "Rice")
            ]
        );
        assert_eq!(inv.all_items().len(), 3);
        assert_eq!(inv.items_in_category("Groceries").unwrap().len(), 2);
        assert!(inv.items_in_category("Toys").is_none());
    }

    #[test]
    fn update_changes_only_given_fields() {
        let mut inv = Inventory::sample();
        let update = ItemUpdate {
            quantity: Some(7),
            ..Default::default()
        };
        inv.update_item("Electronics", "Laptop", &update).unwrap();
        let laptop = &inv.items_in_category("Electronics").unwrap()["Laptop"];
        assert_eq!(laptop.quantity, 7);
        assert_eq!(laptop.price, 1100);

        assert_eq!(
            inv.update_item("Toys", "Ball", &update),
            Err(InventoryError::UnknownCategory("Toys".into()))
        );
        assert!(matches!(
            inv.update_item("Groceries", "Salt", &update),
            Err(InventoryError::UnknownItem { .. })
        ));
    }

    #[test]
    fn merge_sums_shared_items() {
        let mut a = Inventory::sample();
        let mut b = Inventory::new();
        b.insert("Groceries", Item::new("Rice", 90, 500));
        b.insert("Groceries", Item::new("Salt", 20, 10));
        b.insert("Toys", Item::new("Ball", 15, 3));

        a.merge(b);

        let groceries = a.items_in_category("Groceries").unwrap();
        assert_eq!(groceries["Rice"].quantity, 1500);
        assert_eq!(groceries["Rice"].price, 100);
        assert_eq!(groceries["Salt"].quantity, 10);
        assert_eq!(a.items_in_category("Toys").unwrap().len(), 1);
    }

    #[test]
    fn queries() {
        let mut inv = Inventory::sample();
        assert_eq!(inv.most_expensive_item().unwrap().name, "Laptop");
        assert_eq!(inv.item_in_stock("Oil").unwrap().price, 220);

        inv.update_item(
            "Groceries",
            "Oil",
            &ItemUpdate {
                quantity: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(inv.item_in_stock("Oil").is_none());
        assert!(inv.item_in_stock("Phone").is_none());
        assert!(Inventory::new().most_expensive_item().is_none());
    }

    #[test]
    fn clone_is_independent() {
        let original = Inventory::sample();
        let mut copy = original.clone();
        copy.insert("Groceries", Item::new("Rice", 1, 1));
        assert_eq!(original.items_in_category("Groceries").unwrap()["Rice"].price, 100);
    }

    #[test]
    fn serializes_as_nested_maps() {
        let mut inv = Inventory::new();
        inv.insert("Toys", Item::new("Ball", 15, 3));
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["Toys"]["Ball"]["quantity"], 3);
        let back: Inventory = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }
}
