use anyhow::{Context, Result};
use log::info;

use batch_loader::inventory::{Inventory, Item, ItemUpdate};

fn main() -> Result<()> {
    env_logger::init();

    let mut inventory = Inventory::sample();
    let snapshot = inventory.clone();

    inventory
        .update_item(
            "Electronics",
            "Laptop",
            &ItemUpdate {
                price: Some(1050),
                quantity: Some(8),
            },
        )
        .context("updating laptop")?;

    let mut delivery = Inventory::new();
    delivery.insert("Groceries", Item::new("Rice", 100, 250));
    delivery.insert("Toys", Item::new("Ball", 15, 30));
    inventory.merge(delivery);
    info!("merged delivery into inventory");

    println!("Categories: {:?}", inventory.categories().collect::<Vec<_>>());
    println!("Groceries: {:?}", inventory.items_in_category("Groceries"));
    println!("Most expensive: {:?}", inventory.most_expensive_item());
    println!("Rice in stock: {:?}", inventory.item_in_stock("Rice"));
    println!("Pairs: {:?}", inventory.category_item_pairs());
    println!(
        "Inventory:\n{}",
        serde_json::to_string_pretty(&inventory).context("serializing inventory")?
    );
    println!(
        "Before changes:\n{}",
        serde_json::to_string_pretty(&snapshot).context("serializing snapshot")?
    );
    Ok(())
}
