//! Printable quote documents

use chrono::{NaiveDate, Utc};
use rust_embed::Embed;
use serde::Serialize;
use tera::Tera;
use thiserror::Error;

use crate::core::db::{Database, DbError};
use crate::core::identity::EntityId;

#[derive(Embed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

const QUOTE_TEMPLATE: &str = "quote.html.tera";

#[derive(Debug, Error, miette::Diagnostic)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    #[diagnostic(code(iw::render::not_found))]
    NotFound(String),

    #[error("Template rendering error: {0}")]
    #[diagnostic(code(iw::render::failed))]
    RenderError(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, Serialize)]
pub struct CompanyHeader {
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerHeader {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteHeader {
    pub number: String,
    pub name: String,
    pub status: String,
    pub date: String,
    pub expiration_date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedLine {
    pub line_no: usize,
    pub part_number: String,
    pub description: String,
    pub quantity: String,
    pub unit_price: String,
    pub amount: String,
}

/// Everything the quote template needs, already formatted for print
#[derive(Debug, Clone, Serialize)]
pub struct QuoteDocument {
    pub company: CompanyHeader,
    pub customer: CustomerHeader,
    pub quote: QuoteHeader,
    pub lines: Vec<RenderedLine>,
    pub total: String,
    pub generated: String,
}

fn money(value: f64) -> String {
    format!("{:.2}", value)
}

fn quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl QuoteDocument {
    /// Gather a quote with its customer, company and part numbers
    pub fn assemble(
        db: &Database,
        company_id: &EntityId,
        reference: &str,
    ) -> Result<Self, DbError> {
        let company = db.get_company(company_id)?;
        let quote = db.get_quote(company_id, reference)?;
        let customer = db.get_customer(company_id, &quote.customer_id)?;

        let mut lines = Vec::with_capacity(quote.lines.len());
        for (i, line) in quote.lines.iter().enumerate() {
            let part = db.find_part(company_id, &line.part_id.to_string())?;
            lines.push(RenderedLine {
                line_no: i + 1,
                part_number: part.part_number,
                description: line.description.clone(),
                quantity: quantity(line.quantity),
                unit_price: money(line.unit_price),
                amount: money(line.extended_price()),
            });
        }

        Ok(Self {
            company: CompanyHeader {
                name: company.name,
                currency: company.base_currency,
            },
            customer: CustomerHeader {
                name: customer.name,
                email: customer.details.email,
            },
            quote: QuoteHeader {
                number: quote.quote_number.clone(),
                name: quote.name.clone(),
                status: quote.status.to_string(),
                date: iso(quote.created.date_naive()),
                expiration_date: quote.expiration_date.map(iso),
            },
            total: money(quote.total()),
            lines,
            generated: Utc::now().format("%Y-%m-%d %H:%M UTC").to_string(),
        })
    }
}

/// Renders documents from the embedded templates
pub struct DocumentRenderer {
    tera: Tera,
}

impl DocumentRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![".html.tera"]);

        for file in EmbeddedTemplates::iter() {
            let filename = file.as_ref();
            if let Some(content) = EmbeddedTemplates::get(filename) {
                let source = std::str::from_utf8(&content.data)
                    .map_err(|e| RenderError::RenderError(format!("{}: {}", filename, e)))?;
                tera.add_raw_template(filename, source)
                    .map_err(|e| RenderError::RenderError(e.to_string()))?;
            }
        }
        Ok(Self { tera })
    }

    pub fn render_quote(&self, doc: &QuoteDocument) -> Result<String, RenderError> {
        if !self.tera.get_template_names().any(|n| n == QUOTE_TEMPLATE) {
            return Err(RenderError::NotFound(QUOTE_TEMPLATE.to_string()));
        }
        let context = tera::Context::from_serialize(doc)
            .map_err(|e| RenderError::RenderError(e.to_string()))?;
        self.tera
            .render(QUOTE_TEMPLATE, &context)
            .map_err(|e| RenderError::RenderError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::sales_fixture;

    #[test]
    fn test_quantity_and_money_formatting() {
        assert_eq!(money(12.5), "12.50");
        assert_eq!(quantity(4.0), "4");
        assert_eq!(quantity(2.5), "2.5");
    }

    #[test]
    fn test_render_quote_document() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let quote = fx
            .db
            .create_quote(&company, &customer.id, "Brackets <rush>", None, &user)
            .unwrap();
        fx.db
            .add_quote_line(&company, &quote.quote_number, "BRK-100", 4.0, None, None)
            .unwrap();
        fx.db
            .add_quote_line(&company, &quote.quote_number, "SETUP", 1.0, Some(80.0), None)
            .unwrap();

        let doc = QuoteDocument::assemble(&fx.db, &company, &quote.quote_number).unwrap();
        assert_eq!(doc.total, "130.00");
        assert_eq!(doc.lines[1].part_number, "SETUP");

        let html = DocumentRenderer::new().unwrap().render_quote(&doc).unwrap();
        assert!(html.contains("Quote Q000001"));
        assert!(html.contains("Acme Fabrication"));
        assert!(html.contains("Globex"));
        assert!(html.contains("<td class=\"num\">50.00</td>"));
        assert!(html.contains("Total (USD)"));
        assert!(html.contains("Brackets &lt;rush&gt;"));
    }
}
