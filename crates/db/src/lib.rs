pub mod connection;
pub mod inventory;
pub mod migrations;
pub mod repositories;

pub use connection::{connect_with_config, connect_with_settings, DbPool};
pub use inventory::{import_yaml_inventory, ImportReport, InventoryError, YamlInventory};
