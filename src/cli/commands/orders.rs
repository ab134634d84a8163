//! Line arguments and line tables shared by quotes, sales and purchase orders

use miette::Result;
use serde_json::json;

use crate::cli::helpers::{format_money, format_quantity, truncate_str, validate_input};
use crate::cli::output::Listing;
use crate::core::{Database, EntityId};
use crate::schema::Form;

#[derive(clap::Args, Debug)]
pub struct AddLineArgs {
    /// Document number or id
    pub document: String,

    /// Part number or id
    pub part: String,

    /// Quantity in the part's unit of measure
    pub quantity: f64,

    /// Unit price; defaults to the part's unit cost
    #[arg(long)]
    pub price: Option<f64>,

    /// Line text; defaults to the part name
    #[arg(long, short = 'd')]
    pub description: Option<String>,
}

impl AddLineArgs {
    pub fn validate(&self) -> Result<()> {
        validate_input(
            Form::Line,
            &json!({
                "part": self.part,
                "quantity": self.quantity,
                "unit_price": self.price,
                "description": self.description,
            }),
        )
    }
}

#[derive(clap::Args, Debug)]
pub struct DocumentRef {
    /// Document number or id
    pub document: String,
}

/// One printable line of a quote or order
pub struct LineRow {
    pub part_id: EntityId,
    pub description: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// Shipped or received so far, for orders
    pub progress: Option<f64>,
}

/// Build a numbered line table, resolving part ids to part numbers
pub fn line_listing(
    db: &Database,
    company_id: &EntityId,
    progress_header: Option<&'static str>,
    rows: impl IntoIterator<Item = LineRow>,
) -> Result<Listing> {
    let mut headers = vec!["#", "PART", "DESCRIPTION", "QTY"];
    if let Some(header) = progress_header {
        headers.push(header);
    }
    headers.extend(["PRICE", "AMOUNT"]);

    let mut listing = Listing::new("line", &headers);
    for (i, row) in rows.into_iter().enumerate() {
        let part = db.find_part(company_id, &row.part_id.to_string())?;
        let mut cells = vec![
            (i + 1).to_string(),
            part.part_number.clone(),
            truncate_str(&row.description, 32),
            format_quantity(row.quantity),
        ];
        if let Some(done) = row.progress {
            cells.push(format_quantity(done));
        }
        cells.push(format_money(row.unit_price));
        cells.push(format_money(row.quantity * row.unit_price));
        listing.push(part.part_number, cells);
    }
    Ok(listing)
}
