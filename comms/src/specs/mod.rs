//! Wire-level specifications exchanged between the coordinator and its clients.
//!
//! These types intentionally carry plain data only, the runtime types that give them
//! behavior live in `machine_learning` and are built from these specs.

pub mod preprocessing;
pub mod training;
