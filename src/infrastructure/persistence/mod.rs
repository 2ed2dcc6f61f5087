mod link_store;
mod pg_link_store;

pub use link_store::{LinkStore, StoreError, StoreResult};
pub use pg_link_store::PgLinkStore;

#[cfg(test)]
pub use link_store::MockLinkStore;
