//! The event ledger: an append-only store of [`Event`](sa_domain::event::Event)s
//! and derived [`Snapshot`](sa_domain::event::Snapshot)s, backed by an
//! embedded relational store (spec §4.1).

mod store;

pub use store::{EventQuery, Ledger, NewSnapshot, Order, SnapshotQuery};
