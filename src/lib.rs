//! Ironworks: a multi-tenant manufacturing ERP
//!
//! Quoting, sales orders, purchasing, parts, inventory, a chart of accounts
//! and employee permissions, stored in an embedded SQLite workspace and
//! driven from the `iw` command line.

pub mod cli;
pub mod core;
pub mod entities;
pub mod schema;
