//! General ledger account (chart of accounts)

use serde::{Deserialize, Serialize};

use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityPrefix};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Balance sheet accounts carry balances across periods
    pub fn is_balance_sheet(&self) -> bool {
        matches!(
            self,
            AccountType::Asset | AccountType::Liability | AccountType::Equity
        )
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Asset => write!(f, "asset"),
            AccountType::Liability => write!(f, "liability"),
            AccountType::Equity => write!(f, "equity"),
            AccountType::Revenue => write!(f, "revenue"),
            AccountType::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asset" => Ok(AccountType::Asset),
            "liability" => Ok(AccountType::Liability),
            "equity" => Ok(AccountType::Equity),
            "revenue" | "income" => Ok(AccountType::Revenue),
            "expense" => Ok(AccountType::Expense),
            _ => Err(format!(
                "Invalid account type: {}. Use asset, liability, equity, revenue, or expense",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: EntityId,
    pub company_id: EntityId,
    /// Account number, unique within the company
    pub number: String,
    pub name: String,
    pub account_type: AccountType,
    pub active: bool,
}

impl Account {
    pub fn new(company_id: EntityId, number: &str, name: &str, account_type: AccountType) -> Self {
        Self {
            id: EntityId::new(EntityPrefix::Acct),
            company_id,
            number: number.to_string(),
            name: name.to_string(),
            account_type,
            active: true,
        }
    }
}

impl Entity for Account {
    const PREFIX: EntityPrefix = EntityPrefix::Acct;
    const TABLE: &'static str = "account";

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn label(&self) -> &str {
        &self.number
    }
}

/// Starter chart of accounts seeded with every new company
pub fn default_chart() -> &'static [(&'static str, &'static str, AccountType)] {
    &[
        ("1000", "Cash", AccountType::Asset),
        ("1200", "Accounts Receivable", AccountType::Asset),
        ("1300", "Inventory", AccountType::Asset),
        ("2000", "Accounts Payable", AccountType::Liability),
        ("3000", "Retained Earnings", AccountType::Equity),
        ("4000", "Sales", AccountType::Revenue),
        ("5000", "Cost of Goods Sold", AccountType::Expense),
        ("6000", "Operating Expenses", AccountType::Expense),
    ]
}
