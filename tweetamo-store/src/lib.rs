mod errors;
pub use errors::{Result, StoreError};

pub mod schema;

mod store;
#[cfg(test)]
mod store_test;
pub use store::IndexedStore;
