//! Quote to sales order conversion

use miette::Diagnostic;
use thiserror::Error;

use crate::core::db::{
    insert_sales_order, load_quote, set_quote_status, Database, DbError, SALES_ORDER_SEQUENCE,
};
use crate::core::identity::EntityId;
use crate::core::sequence::next_sequence_in;
use crate::entities::{Quote, QuoteStatus, SalesOrder, SalesOrderLine, SalesOrderStatus};

#[derive(Debug, Error, Diagnostic)]
pub enum ConversionError {
    #[error("quote {number} is {status}; only draft or sent quotes can be converted")]
    #[diagnostic(code(iw::convert::not_open))]
    NotOpen { number: String, status: QuoteStatus },

    #[error("quote {0} has no lines")]
    #[diagnostic(
        code(iw::convert::no_lines),
        help("add lines with `iw quote add-line` first")
    )]
    NoLines(String),

    #[error("quote {number} was already converted to {order}")]
    #[diagnostic(code(iw::convert::already_converted))]
    AlreadyConverted { number: String, order: EntityId },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Db(#[from] DbError),
}

fn check_convertible(quote: &Quote) -> Result<(), ConversionError> {
    if let Some(order) = &quote.sales_order_id {
        return Err(ConversionError::AlreadyConverted {
            number: quote.quote_number.clone(),
            order: order.clone(),
        });
    }
    if !quote.status.is_open() {
        return Err(ConversionError::NotOpen {
            number: quote.quote_number.clone(),
            status: quote.status,
        });
    }
    if quote.lines.is_empty() {
        return Err(ConversionError::NoLines(quote.quote_number.clone()));
    }
    Ok(())
}

impl Database {
    /// Turn an open quote into a confirmed sales order
    ///
    /// The order number, the order with every line copied, and the quote's
    /// move to `ordered` commit together or not at all.
    pub fn convert_quote_to_order(
        &mut self,
        company_id: &EntityId,
        quote_reference: &str,
        user_id: &EntityId,
    ) -> Result<SalesOrder, ConversionError> {
        let outcome = self.write(|tx| {
            let quote = load_quote(tx, company_id, quote_reference)?;
            if let Err(rule) = check_convertible(&quote) {
                return Ok(Err(rule));
            }

            let number = next_sequence_in(tx, company_id, SALES_ORDER_SEQUENCE)?;
            let mut order = SalesOrder::new(
                company_id.clone(),
                number,
                quote.customer_id.clone(),
                user_id.clone(),
            );
            order.status = SalesOrderStatus::Confirmed;
            order.quote_id = Some(quote.id.clone());
            order.lines = quote
                .lines
                .iter()
                .map(|line| {
                    SalesOrderLine::new(
                        order.id.clone(),
                        line.part_id.clone(),
                        line.description.clone(),
                        line.quantity,
                        line.unit_price,
                    )
                })
                .collect();

            insert_sales_order(tx, &order)?;
            set_quote_status(tx, &quote, QuoteStatus::Ordered, Some(&order.id))?;
            Ok(Ok((quote.quote_number, order)))
        })?;

        match outcome {
            Ok((quote_number, order)) => {
                tracing::info!(
                    quote = %quote_number,
                    order = %order.order_number,
                    lines = order.lines.len(),
                    "quote converted"
                );
                Ok(order)
            }
            Err(rule) => {
                tracing::warn!(quote = quote_reference, error = %rule, "conversion refused");
                Err(rule)
            }
        }
    }
}
