pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod store;

pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use store::{Store, StoreError};
