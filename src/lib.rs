//! A single-node proof-of-work ledger with peer replication.
//!
//! [`blockchain::Ledger`] owns the chain, the open transaction pool and the
//! peer set. [`replication::Node`] wires a ledger to its peers, and [`api`]
//! exposes both over HTTP.

pub mod api;
pub mod blockchain;
pub mod config;
pub mod replication;
