//! CLI command implementations

pub mod acct;
pub mod company;
pub mod completions;
pub mod config;
pub mod contacts;
pub mod cust;
pub mod doc;
pub mod import;
pub mod init;
pub mod inv;
pub mod job;
pub mod orders;
pub mod part;
pub mod po;
pub mod quote;
pub mod seq;
pub mod so;
pub mod sup;
pub mod user;
pub mod watch;
