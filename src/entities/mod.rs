//! Record type definitions
//!
//! **Tenancy & people:**
//! - [`Company`] - the tenant every business record belongs to
//! - [`User`], [`Employee`], [`EmployeeType`] - accounts and permission templates
//!
//! **Trading partners:**
//! - [`Customer`] and [`Supplier`]
//!
//! **Items & stock:**
//! - [`Part`] - item master
//! - [`LedgerEntry`] - immutable stock movements
//!
//! **Documents:**
//! - [`Quote`] - priced offers, convertible to sales orders
//! - [`SalesOrder`] and [`PurchaseOrder`]
//! - [`Account`] - chart of accounts
//! - [`Document`] - files stored in workspace buckets

pub mod account;
pub mod company;
pub mod contact;
pub mod document;
pub mod inventory;
pub mod part;
pub mod purchase_order;
pub mod quote;
pub mod sales_order;
pub mod user;

pub use account::{Account, AccountType};
pub use company::Company;
pub use contact::{ContactDetails, Customer, Supplier};
pub use document::{Bucket, Document};
pub use inventory::{EntryType, LedgerEntry, StockLevel};
pub use part::{Part, PartType, Replenishment};
pub use purchase_order::{PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus};
pub use quote::{Quote, QuoteLine, QuoteStatus};
pub use sales_order::{SalesOrder, SalesOrderLine, SalesOrderStatus};
pub use user::{Employee, EmployeeType, User, UserType};
