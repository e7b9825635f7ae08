//! # Storage
//!
//! Persistent backends for [`crate::store::TenderStore`].

mod redb_store;

pub use redb_store::RedbStore;
