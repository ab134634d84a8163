//! Arguments and output shared by `iw cust` and `iw sup`

use miette::Result;
use serde_json::json;

use crate::cli::helpers::{format_short_id, or_dash, truncate_str, validate_input};
use crate::cli::output::Listing;
use crate::core::db::ContactUpdate;
use crate::core::EntityId;
use crate::entities::ContactDetails;
use crate::schema::Form;

#[derive(clap::Args, Debug)]
pub struct ContactFields {
    /// Display name
    pub name: String,

    #[arg(long)]
    pub tax_id: Option<String>,

    #[arg(long, short = 'e')]
    pub email: Option<String>,

    #[arg(long, short = 'p')]
    pub phone: Option<String>,
}

impl ContactFields {
    pub fn validate(&self) -> Result<()> {
        validate_input(
            Form::Contact,
            &json!({
                "name": self.name,
                "tax_id": self.tax_id,
                "email": self.email,
                "phone": self.phone,
            }),
        )
    }

    pub fn details(&self) -> ContactDetails {
        ContactDetails {
            tax_id: self.tax_id.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Search name, email and tax id
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Include deactivated records
    #[arg(long)]
    pub all: bool,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(clap::Args, Debug)]
pub struct ContactRef {
    /// Id or exact name
    pub reference: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Id or exact name
    pub reference: String,

    #[arg(long)]
    pub name: Option<String>,

    /// An empty string clears the field
    #[arg(long)]
    pub tax_id: Option<String>,

    /// An empty string clears the field
    #[arg(long)]
    pub email: Option<String>,

    /// An empty string clears the field
    #[arg(long)]
    pub phone: Option<String>,
}

impl UpdateArgs {
    /// Validate the fields being set and turn them into a change set
    pub fn into_update(self) -> Result<ContactUpdate> {
        let mut candidate = serde_json::Map::new();
        candidate.insert(
            "name".into(),
            json!(self.name.clone().unwrap_or_else(|| "unchanged".to_string())),
        );
        if let Some(email) = self.email.as_deref().filter(|e| !e.trim().is_empty()) {
            candidate.insert("email".into(), json!(email.trim()));
        }
        validate_input(Form::Contact, &serde_json::Value::Object(candidate))?;

        let update = ContactUpdate {
            name: self.name,
            tax_id: self.tax_id,
            email: self.email,
            phone: self.phone,
        };
        if update.is_empty() {
            return Err(miette::miette!(
                help = "pass at least one of --name, --tax-id, --email, --phone",
                "nothing to update"
            ));
        }
        Ok(update)
    }
}

/// One row of a customer or supplier listing
pub struct ContactRow<'a> {
    pub id: &'a EntityId,
    pub name: &'a str,
    pub details: &'a ContactDetails,
    pub active: bool,
}

pub fn contact_listing<'a>(
    noun: &'static str,
    rows: impl IntoIterator<Item = ContactRow<'a>>,
) -> Listing {
    let mut listing = Listing::new(noun, &["ID", "NAME", "EMAIL", "PHONE", "ACTIVE"]);
    for row in rows {
        listing.push(
            row.id.to_string(),
            vec![
                format_short_id(row.id),
                truncate_str(row.name, 32),
                or_dash(row.details.email.as_deref()),
                or_dash(row.details.phone.as_deref()),
                if row.active { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    listing
}
