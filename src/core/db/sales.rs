//! Quotes and sales orders

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::parts::{find_active_part_in, find_part_in};
use super::{
    date, not_found_if_none, param_refs, parse_date, parse_ts, post_entry, ts, Database, DbError,
    Page, SqlParams,
};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::realtime::{record_change, Operation};
use crate::core::sequence::next_sequence_in;
use crate::entities::inventory::{DEFAULT_LOCATION, QUANTITY_TOLERANCE};
use crate::entities::{
    EntryType, LedgerEntry, Quote, QuoteLine, QuoteStatus, SalesOrder, SalesOrderLine,
    SalesOrderStatus,
};

/// Sequence table used for quote numbers
pub const QUOTE_SEQUENCE: &str = "quote";
/// Sequence table used for sales order numbers
pub const SALES_ORDER_SEQUENCE: &str = "salesOrder";

const QUOTE_COLUMNS: &str = "id, company_id, quote_number, customer_id, name, status, \
                             expiration_date, sales_order_id, created_by, created";
const ORDER_COLUMNS: &str =
    "id, company_id, order_number, customer_id, quote_id, status, order_date, created_by, created";

/// Filter for quote listings
#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    pub status: Option<QuoteStatus>,
    pub customer_id: Option<EntityId>,
    /// Substring of quote number or name
    pub search: Option<String>,
}

/// Manual quote status changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteTransition {
    /// draft -> sent
    Send,
    /// draft or sent -> lost
    Lose,
    /// draft or sent -> cancelled
    Cancel,
}

impl QuoteTransition {
    fn target(&self) -> QuoteStatus {
        match self {
            QuoteTransition::Send => QuoteStatus::Sent,
            QuoteTransition::Lose => QuoteStatus::Lost,
            QuoteTransition::Cancel => QuoteStatus::Cancelled,
        }
    }

    fn allowed_from(&self, status: QuoteStatus) -> bool {
        match self {
            QuoteTransition::Send => status == QuoteStatus::Draft,
            QuoteTransition::Lose | QuoteTransition::Cancel => status.is_open(),
        }
    }
}

/// Filter for sales order listings
#[derive(Debug, Clone, Default)]
pub struct SalesOrderFilter {
    pub status: Option<SalesOrderStatus>,
    pub customer_id: Option<EntityId>,
}

/// Manual sales order status changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalesOrderTransition {
    /// draft -> confirmed
    Confirm,
    /// any open order with nothing shipped -> cancelled
    Cancel,
}

fn map_quote(row: &Row<'_>) -> rusqlite::Result<Quote> {
    let expiration: Option<String> = row.get(6)?;
    Ok(Quote {
        id: row.get(0)?,
        company_id: row.get(1)?,
        quote_number: row.get(2)?,
        customer_id: row.get(3)?,
        name: row.get(4)?,
        status: parse_column(5, row.get(5)?)?,
        expiration_date: expiration.map(|d| parse_date(6, d)).transpose()?,
        sales_order_id: row.get(7)?,
        created_by: row.get(8)?,
        created: parse_ts(9, row.get(9)?)?,
        lines: Vec::new(),
    })
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<SalesOrder> {
    Ok(SalesOrder {
        id: row.get(0)?,
        company_id: row.get(1)?,
        order_number: row.get(2)?,
        customer_id: row.get(3)?,
        quote_id: row.get(4)?,
        status: parse_column(5, row.get(5)?)?,
        order_date: parse_date(6, row.get(6)?)?,
        created_by: row.get(7)?,
        created: parse_ts(8, row.get(8)?)?,
        lines: Vec::new(),
    })
}

fn quote_lines(conn: &Connection, quote_id: &EntityId) -> Result<Vec<QuoteLine>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, quote_id, part_id, description, quantity, unit_price
         FROM quote_line WHERE quote_id = ?1 ORDER BY position",
    )?;
    let lines = stmt
        .query_map(params![quote_id], |row| {
            Ok(QuoteLine {
                id: row.get(0)?,
                quote_id: row.get(1)?,
                part_id: row.get(2)?,
                description: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

fn order_lines(conn: &Connection, order_id: &EntityId) -> Result<Vec<SalesOrderLine>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, sales_order_id, part_id, description, quantity, unit_price, quantity_shipped
         FROM sales_order_line WHERE sales_order_id = ?1 ORDER BY position",
    )?;
    let lines = stmt
        .query_map(params![order_id], |row| {
            Ok(SalesOrderLine {
                id: row.get(0)?,
                sales_order_id: row.get(1)?,
                part_id: row.get(2)?,
                description: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
                quantity_shipped: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

pub(crate) fn next_position(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    parent: &EntityId,
) -> Result<i64, DbError> {
    Ok(conn.query_row(
        &format!("SELECT COALESCE(MAX(position), 0) + 1 FROM {table} WHERE {parent_column} = ?1"),
        params![parent],
        |row| row.get(0),
    )?)
}

/// Load a quote and its lines by id or quote number
pub(crate) fn load_quote(
    conn: &Connection,
    company_id: &EntityId,
    reference: &str,
) -> Result<Quote, DbError> {
    let (column, key) = if EntityId::looks_like(reference, EntityPrefix::Quot) {
        ("id", reference.to_uppercase())
    } else {
        ("quote_number", reference.trim().to_string())
    };
    let quote = conn
        .query_row(
            &format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE company_id = ?1 AND {column} = ?2"),
            params![company_id, key],
            map_quote,
        )
        .optional()?;
    let mut quote = not_found_if_none(quote, "quote", reference)?;
    quote.lines = quote_lines(conn, &quote.id)?;
    Ok(quote)
}

/// Load a sales order and its lines by id or order number
pub(crate) fn load_sales_order(
    conn: &Connection,
    company_id: &EntityId,
    reference: &str,
) -> Result<SalesOrder, DbError> {
    let (column, key) = if EntityId::looks_like(reference, EntityPrefix::Sord) {
        ("id", reference.to_uppercase())
    } else {
        ("order_number", reference.trim().to_string())
    };
    let order = conn
        .query_row(
            &format!(
                "SELECT {ORDER_COLUMNS} FROM sales_order WHERE company_id = ?1 AND {column} = ?2"
            ),
            params![company_id, key],
            map_order,
        )
        .optional()?;
    let mut order = not_found_if_none(order, "sales order", reference)?;
    order.lines = order_lines(conn, &order.id)?;
    Ok(order)
}

pub(crate) fn set_quote_status(
    conn: &Connection,
    quote: &Quote,
    status: QuoteStatus,
    sales_order_id: Option<&EntityId>,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE quote SET status = ?2, sales_order_id = COALESCE(?3, sales_order_id) WHERE id = ?1",
        params![quote.id, status.to_string(), sales_order_id],
    )?;
    record_change(conn, &quote.company_id, Quote::TABLE, Operation::Update, &quote.id.to_string())
}

fn set_order_status(
    conn: &Connection,
    order: &SalesOrder,
    status: SalesOrderStatus,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE sales_order SET status = ?2 WHERE id = ?1",
        params![order.id, status.to_string()],
    )?;
    record_change(
        conn,
        &order.company_id,
        SalesOrder::TABLE,
        Operation::Update,
        &order.id.to_string(),
    )
}

fn insert_order_line(conn: &Connection, line: &SalesOrderLine, position: i64) -> Result<(), DbError> {
    conn.execute(
        "INSERT INTO sales_order_line
           (id, sales_order_id, part_id, description, quantity, unit_price, quantity_shipped, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            line.id,
            line.sales_order_id,
            line.part_id,
            line.description,
            line.quantity,
            line.unit_price,
            line.quantity_shipped,
            position
        ],
    )?;
    Ok(())
}

/// Insert a sales order with all of its lines
pub(crate) fn insert_sales_order(conn: &Connection, order: &SalesOrder) -> Result<(), DbError> {
    conn.execute(
        &format!(
            "INSERT INTO sales_order ({ORDER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            order.id,
            order.company_id,
            order.order_number,
            order.customer_id,
            order.quote_id,
            order.status.to_string(),
            date(&order.order_date),
            order.created_by,
            ts(&order.created)
        ],
    )
    .map_err(|e| DbError::from_insert(e, "sales order", &order.order_number))?;
    for (i, line) in order.lines.iter().enumerate() {
        insert_order_line(conn, line, i as i64 + 1)?;
    }
    record_change(
        conn,
        &order.company_id,
        SalesOrder::TABLE,
        Operation::Insert,
        &order.id.to_string(),
    )
}

/// Move every sent quote whose expiration date is before `as_of` to expired
pub(crate) fn expire_overdue(
    conn: &Connection,
    company_id: &EntityId,
    as_of: NaiveDate,
) -> Result<Vec<String>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {QUOTE_COLUMNS} FROM quote
         WHERE company_id = ?1 AND status = 'sent' AND expiration_date IS NOT NULL
           AND expiration_date < ?2
         ORDER BY quote_number"
    ))?;
    let overdue = stmt
        .query_map(params![company_id, date(&as_of)], map_quote)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut numbers = Vec::with_capacity(overdue.len());
    for quote in overdue {
        set_quote_status(conn, &quote, QuoteStatus::Expired, None)?;
        numbers.push(quote.quote_number);
    }
    if !numbers.is_empty() {
        tracing::info!(count = numbers.len(), %as_of, "quotes expired");
    }
    Ok(numbers)
}

/// Quantity must be finite and positive, price finite and not negative
pub(crate) fn check_line_values(quantity: f64, unit_price: f64) -> Result<(), DbError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(DbError::InvalidState(
            "line quantity must be a positive number".into(),
        ));
    }
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(DbError::InvalidState(
            "unit price must be a number no less than zero".into(),
        ));
    }
    Ok(())
}

impl Database {
    /// Create a draft quote; the number is issued in the same transaction
    pub fn create_quote(
        &mut self,
        company_id: &EntityId,
        customer_id: &EntityId,
        name: &str,
        expiration_date: Option<NaiveDate>,
        user_id: &EntityId,
    ) -> Result<Quote, DbError> {
        let customer = self.get_customer(company_id, customer_id)?;
        if !customer.active {
            return Err(DbError::InvalidState(format!(
                "customer '{}' is inactive",
                customer.name
            )));
        }

        let quote = self.write(|tx| {
            let number = next_sequence_in(tx, company_id, QUOTE_SEQUENCE)?;
            let quote = Quote::new(
                company_id.clone(),
                number,
                customer_id.clone(),
                name.to_string(),
                expiration_date,
                user_id.clone(),
            );
            tx.execute(
                &format!(
                    "INSERT INTO quote ({QUOTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    quote.id,
                    quote.company_id,
                    quote.quote_number,
                    quote.customer_id,
                    quote.name,
                    quote.status.to_string(),
                    quote.expiration_date.as_ref().map(date),
                    quote.sales_order_id,
                    quote.created_by,
                    ts(&quote.created)
                ],
            )
            .map_err(|e| DbError::from_insert(e, "quote", &quote.quote_number))?;
            record_change(tx, company_id, Quote::TABLE, Operation::Insert, &quote.id.to_string())?;
            Ok(quote)
        })?;
        tracing::info!(quote = %quote.quote_number, "quote created");
        Ok(quote)
    }

    pub fn get_quote(&self, company_id: &EntityId, reference: &str) -> Result<Quote, DbError> {
        load_quote(self.conn(), company_id, reference)
    }

    /// Add a line to a draft quote. Price defaults to the part's unit cost.
    pub fn add_quote_line(
        &mut self,
        company_id: &EntityId,
        quote_reference: &str,
        part_reference: &str,
        quantity: f64,
        unit_price: Option<f64>,
        description: Option<String>,
    ) -> Result<Quote, DbError> {
        self.write(|tx| {
            let quote = load_quote(tx, company_id, quote_reference)?;
            if quote.status != QuoteStatus::Draft {
                return Err(DbError::InvalidState(format!(
                    "quote {} is {}; lines can only change while draft",
                    quote.quote_number, quote.status
                )));
            }
            let part = find_active_part_in(tx, company_id, part_reference)?;
            let price = unit_price.or(part.unit_cost).unwrap_or(0.0);
            check_line_values(quantity, price)?;

            let line = QuoteLine::new(
                quote.id.clone(),
                part.id.clone(),
                description.unwrap_or_else(|| part.name.clone()),
                quantity,
                price,
            );
            let position = next_position(tx, "quote_line", "quote_id", &quote.id)?;
            tx.execute(
                "INSERT INTO quote_line (id, quote_id, part_id, description, quantity, unit_price, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    line.id,
                    line.quote_id,
                    line.part_id,
                    line.description,
                    line.quantity,
                    line.unit_price,
                    position
                ],
            )?;
            record_change(tx, company_id, "quote_line", Operation::Insert, &line.id.to_string())?;
            load_quote(tx, company_id, &quote.id.to_string())
        })
    }

    /// Remove the `line_no`-th line (1-based) from a draft quote
    pub fn remove_quote_line(
        &mut self,
        company_id: &EntityId,
        quote_reference: &str,
        line_no: usize,
    ) -> Result<Quote, DbError> {
        self.write(|tx| {
            let quote = load_quote(tx, company_id, quote_reference)?;
            if quote.status != QuoteStatus::Draft {
                return Err(DbError::InvalidState(format!(
                    "quote {} is {}; lines can only change while draft",
                    quote.quote_number, quote.status
                )));
            }
            let line = line_no
                .checked_sub(1)
                .and_then(|i| quote.lines.get(i))
                .ok_or_else(|| DbError::not_found("quote line", line_no.to_string()))?;
            tx.execute("DELETE FROM quote_line WHERE id = ?1", params![line.id])?;
            record_change(tx, company_id, "quote_line", Operation::Delete, &line.id.to_string())?;
            load_quote(tx, company_id, &quote.id.to_string())
        })
    }

    pub fn list_quotes(
        &self,
        company_id: &EntityId,
        filter: &QuoteFilter,
        page: Page,
    ) -> Result<Vec<Quote>, DbError> {
        let mut sql = format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE company_id = ?1");
        let mut args: SqlParams = vec![Box::new(company_id.clone())];
        if let Some(status) = filter.status {
            args.push(Box::new(status.to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(customer) = &filter.customer_id {
            args.push(Box::new(customer.clone()));
            sql.push_str(&format!(" AND customer_id = ?{}", args.len()));
        }
        if let Some(term) = &filter.search {
            args.push(Box::new(format!("%{}%", term.to_lowercase())));
            sql.push_str(&format!(
                " AND (LOWER(quote_number) LIKE ?{n} OR LOWER(name) LIKE ?{n})",
                n = args.len()
            ));
        }
        sql.push_str(" ORDER BY quote_number DESC");
        sql.push_str(&page.sql());

        let mut stmt = self.conn().prepare(&sql)?;
        let mut quotes = stmt
            .query_map(param_refs(&args).as_slice(), map_quote)?
            .collect::<Result<Vec<_>, _>>()?;
        for quote in &mut quotes {
            quote.lines = quote_lines(self.conn(), &quote.id)?;
        }
        Ok(quotes)
    }

    pub fn transition_quote(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        transition: QuoteTransition,
    ) -> Result<Quote, DbError> {
        let quote = self.write(|tx| {
            let mut quote = load_quote(tx, company_id, reference)?;
            if !transition.allowed_from(quote.status) {
                return Err(DbError::InvalidState(format!(
                    "quote {} is {} and cannot become {}",
                    quote.quote_number,
                    quote.status,
                    transition.target()
                )));
            }
            if transition == QuoteTransition::Send && quote.lines.is_empty() {
                return Err(DbError::InvalidState(format!(
                    "quote {} has no lines",
                    quote.quote_number
                )));
            }
            set_quote_status(tx, &quote, transition.target(), None)?;
            quote.status = transition.target();
            Ok(quote)
        })?;
        tracing::info!(quote = %quote.quote_number, status = %quote.status, "quote status changed");
        Ok(quote)
    }

    /// Expire sent quotes past their expiration date; returns their numbers
    pub fn expire_quotes(
        &mut self,
        company_id: &EntityId,
        as_of: NaiveDate,
    ) -> Result<Vec<String>, DbError> {
        self.write(|tx| expire_overdue(tx, company_id, as_of))
    }

    /// Create an empty draft sales order
    pub fn create_sales_order(
        &mut self,
        company_id: &EntityId,
        customer_id: &EntityId,
        user_id: &EntityId,
    ) -> Result<SalesOrder, DbError> {
        let customer = self.get_customer(company_id, customer_id)?;
        if !customer.active {
            return Err(DbError::InvalidState(format!(
                "customer '{}' is inactive",
                customer.name
            )));
        }
        let order = self.write(|tx| {
            let number = next_sequence_in(tx, company_id, SALES_ORDER_SEQUENCE)?;
            let order = SalesOrder::new(company_id.clone(), number, customer_id.clone(), user_id.clone());
            insert_sales_order(tx, &order)?;
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, "sales order created");
        Ok(order)
    }

    pub fn get_sales_order(
        &self,
        company_id: &EntityId,
        reference: &str,
    ) -> Result<SalesOrder, DbError> {
        load_sales_order(self.conn(), company_id, reference)
    }

    /// Add a line to a draft sales order
    pub fn add_sales_order_line(
        &mut self,
        company_id: &EntityId,
        order_reference: &str,
        part_reference: &str,
        quantity: f64,
        unit_price: Option<f64>,
        description: Option<String>,
    ) -> Result<SalesOrder, DbError> {
        self.write(|tx| {
            let order = load_sales_order(tx, company_id, order_reference)?;
            if order.status != SalesOrderStatus::Draft {
                return Err(DbError::InvalidState(format!(
                    "sales order {} is {}; lines can only be added while draft",
                    order.order_number, order.status
                )));
            }
            let part = find_active_part_in(tx, company_id, part_reference)?;
            let price = unit_price.or(part.unit_cost).unwrap_or(0.0);
            check_line_values(quantity, price)?;

            let line = SalesOrderLine::new(
                order.id.clone(),
                part.id.clone(),
                description.unwrap_or_else(|| part.name.clone()),
                quantity,
                price,
            );
            let position = next_position(tx, "sales_order_line", "sales_order_id", &order.id)?;
            insert_order_line(tx, &line, position)?;
            record_change(tx, company_id, "sales_order_line", Operation::Insert, &line.id.to_string())?;
            load_sales_order(tx, company_id, &order.id.to_string())
        })
    }

    pub fn list_sales_orders(
        &self,
        company_id: &EntityId,
        filter: &SalesOrderFilter,
        page: Page,
    ) -> Result<Vec<SalesOrder>, DbError> {
        let mut sql = format!("SELECT {ORDER_COLUMNS} FROM sales_order WHERE company_id = ?1");
        let mut args: SqlParams = vec![Box::new(company_id.clone())];
        if let Some(status) = filter.status {
            args.push(Box::new(status.to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(customer) = &filter.customer_id {
            args.push(Box::new(customer.clone()));
            sql.push_str(&format!(" AND customer_id = ?{}", args.len()));
        }
        sql.push_str(" ORDER BY order_number DESC");
        sql.push_str(&page.sql());

        let mut stmt = self.conn().prepare(&sql)?;
        let mut orders = stmt
            .query_map(param_refs(&args).as_slice(), map_order)?
            .collect::<Result<Vec<_>, _>>()?;
        for order in &mut orders {
            order.lines = order_lines(self.conn(), &order.id)?;
        }
        Ok(orders)
    }

    pub fn transition_sales_order(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        transition: SalesOrderTransition,
    ) -> Result<SalesOrder, DbError> {
        let order = self.write(|tx| {
            let mut order = load_sales_order(tx, company_id, reference)?;
            let target = match transition {
                SalesOrderTransition::Confirm => {
                    if order.status != SalesOrderStatus::Draft {
                        return Err(DbError::InvalidState(format!(
                            "sales order {} is {}; only draft orders can be confirmed",
                            order.order_number, order.status
                        )));
                    }
                    if order.lines.is_empty() {
                        return Err(DbError::InvalidState(format!(
                            "sales order {} has no lines",
                            order.order_number
                        )));
                    }
                    SalesOrderStatus::Confirmed
                }
                SalesOrderTransition::Cancel => {
                    if matches!(
                        order.status,
                        SalesOrderStatus::Completed | SalesOrderStatus::Cancelled
                    ) {
                        return Err(DbError::InvalidState(format!(
                            "sales order {} is already {}",
                            order.order_number, order.status
                        )));
                    }
                    if order.anything_shipped() {
                        return Err(DbError::InvalidState(format!(
                            "sales order {} has shipments and cannot be cancelled",
                            order.order_number
                        )));
                    }
                    SalesOrderStatus::Cancelled
                }
            };
            set_order_status(tx, &order, target)?;
            order.status = target;
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, status = %order.status, "sales order status changed");
        Ok(order)
    }

    /// Ship part of the `line_no`-th line (1-based)
    ///
    /// Stocked parts post a `sales_shipment` ledger entry at `location`.
    /// The order moves to in-progress, and to completed once every line is
    /// fully shipped.
    #[allow(clippy::too_many_arguments)]
    pub fn ship_sales_order_line(
        &mut self,
        company_id: &EntityId,
        order_reference: &str,
        line_no: usize,
        quantity: f64,
        location: Option<&str>,
        user_id: &EntityId,
    ) -> Result<SalesOrder, DbError> {
        let order = self.write(|tx| {
            let mut order = load_sales_order(tx, company_id, order_reference)?;
            if !order.status.can_ship() {
                return Err(DbError::InvalidState(format!(
                    "sales order {} is {} and cannot ship",
                    order.order_number, order.status
                )));
            }
            let idx = line_no
                .checked_sub(1)
                .filter(|i| *i < order.lines.len())
                .ok_or_else(|| DbError::not_found("sales order line", line_no.to_string()))?;
            let remaining = order.lines[idx].remaining();
            if !quantity.is_finite()
                || quantity <= 0.0
                || quantity > remaining + QUANTITY_TOLERANCE
            {
                return Err(DbError::InvalidState(format!(
                    "can ship between 0 and {} on line {}",
                    remaining, line_no
                )));
            }

            let part = find_part_in(tx, company_id, &order.lines[idx].part_id.to_string())?;
            if part.part_type.is_stocked() {
                let entry = LedgerEntry::new(
                    company_id.clone(),
                    part.id.clone(),
                    location.unwrap_or(DEFAULT_LOCATION),
                    EntryType::SalesShipment,
                    quantity,
                    Some(order.order_number.clone()),
                    user_id.clone(),
                );
                post_entry(tx, &entry)?;
            }

            let line = &mut order.lines[idx];
            line.add_shipped(quantity);
            tx.execute(
                "UPDATE sales_order_line SET quantity_shipped = ?2 WHERE id = ?1",
                params![line.id, line.quantity_shipped],
            )?;
            record_change(tx, company_id, "sales_order_line", Operation::Update, &line.id.to_string())?;

            let status = if order.fully_shipped() {
                SalesOrderStatus::Completed
            } else {
                SalesOrderStatus::InProgress
            };
            if status != order.status {
                set_order_status(tx, &order, status)?;
                order.status = status;
            }
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, line = line_no, quantity, "shipped");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::{sales_fixture, Fixture};
    use crate::entities::Customer;

    fn draft_quote(fx: &mut Fixture, customer: &Customer) -> Quote {
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let quote = fx
            .db
            .create_quote(&company, &customer.id, "Brackets for Globex", None, &user)
            .unwrap();
        fx.db
            .add_quote_line(&company, &quote.quote_number, "BRK-100", 10.0, None, None)
            .unwrap()
    }

    #[test]
    fn test_quote_numbers_come_from_sequence() {
        let (mut fx, customer) = sales_fixture();
        let first = draft_quote(&mut fx, &customer);
        let second = draft_quote(&mut fx, &customer);
        assert_eq!(first.quote_number, "Q000001");
        assert_eq!(second.quote_number, "Q000002");
    }

    #[test]
    fn test_quote_line_defaults_to_unit_cost() {
        let (mut fx, customer) = sales_fixture();
        let quote = draft_quote(&mut fx, &customer);
        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].description, "Steel bracket");
        assert_eq!(quote.total(), 125.0);
    }

    #[test]
    fn test_remove_line_only_while_draft() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let quote = draft_quote(&mut fx, &customer);
        fx.db
            .add_quote_line(&company, &quote.quote_number, "SETUP", 1.0, Some(80.0), None)
            .unwrap();

        let quote = fx.db.remove_quote_line(&company, &quote.quote_number, 1).unwrap();
        assert_eq!(quote.lines.len(), 1);
        assert_eq!(quote.lines[0].unit_price, 80.0);

        fx.db
            .transition_quote(&company, &quote.quote_number, QuoteTransition::Send)
            .unwrap();
        let err = fx.db.remove_quote_line(&company, &quote.quote_number, 1).unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn test_send_requires_lines() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let empty = fx.db.create_quote(&company, &customer.id, "Empty", None, &user).unwrap();
        let err = fx
            .db
            .transition_quote(&company, &empty.quote_number, QuoteTransition::Send)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn test_closed_quote_cannot_transition() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let quote = draft_quote(&mut fx, &customer);
        fx.db
            .transition_quote(&company, &quote.quote_number, QuoteTransition::Lose)
            .unwrap();
        assert!(fx
            .db
            .transition_quote(&company, &quote.quote_number, QuoteTransition::Cancel)
            .is_err());
    }

    #[test]
    fn test_list_quotes_filters() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let a = draft_quote(&mut fx, &customer);
        draft_quote(&mut fx, &customer);
        fx.db
            .transition_quote(&company, &a.quote_number, QuoteTransition::Send)
            .unwrap();

        let sent = fx
            .db
            .list_quotes(
                &company,
                &QuoteFilter {
                    status: Some(QuoteStatus::Sent),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].quote_number, a.quote_number);
        assert_eq!(sent[0].lines.len(), 1);

        let paged = fx
            .db
            .list_quotes(&company, &QuoteFilter::default(), Page::new(Some(1), 0))
            .unwrap();
        assert_eq!(paged[0].quote_number, "Q000002");
    }

    #[test]
    fn test_expire_only_sent_and_overdue() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let expiry = NaiveDate::from_ymd_opt(2026, 1, 31);

        let overdue = fx.db.create_quote(&company, &customer.id, "Old", expiry, &user).unwrap();
        fx.db
            .add_quote_line(&company, &overdue.quote_number, "BRK-100", 1.0, None, None)
            .unwrap();
        fx.db
            .transition_quote(&company, &overdue.quote_number, QuoteTransition::Send)
            .unwrap();
        let draft = fx.db.create_quote(&company, &customer.id, "Draft", expiry, &user).unwrap();

        let as_of = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let expired = fx.db.expire_quotes(&company, as_of).unwrap();
        assert_eq!(expired, vec![overdue.quote_number.clone()]);
        assert_eq!(
            fx.db.get_quote(&company, &draft.quote_number).unwrap().status,
            QuoteStatus::Draft
        );
        assert!(fx.db.expire_quotes(&company, as_of).unwrap().is_empty());
    }

    fn confirmed_order(fx: &mut Fixture, customer: &Customer) -> SalesOrder {
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_sales_order(&company, &customer.id, &user).unwrap();
        fx.db
            .add_sales_order_line(&company, &order.order_number, "BRK-100", 5.0, None, None)
            .unwrap();
        fx.db
            .add_sales_order_line(&company, &order.order_number, "SETUP", 1.0, Some(50.0), None)
            .unwrap();
        fx.db
            .transition_sales_order(&company, &order.order_number, SalesOrderTransition::Confirm)
            .unwrap()
    }

    #[test]
    fn test_shipping_moves_stock_and_status() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        fx.db.adjust_inventory(&company, "BRK-100", "MAIN", 8.0, None, &user).unwrap();
        let order = confirmed_order(&mut fx, &customer);
        assert_eq!(order.order_number, "SO000001");

        let order = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 3.0, None, &user)
            .unwrap();
        assert_eq!(order.status, SalesOrderStatus::InProgress);
        let part = fx.db.find_part(&company, "BRK-100").unwrap();
        assert_eq!(fx.db.on_hand(&part.id).unwrap(), 5.0);

        fx.db
            .ship_sales_order_line(&company, &order.order_number, 1, 2.0, None, &user)
            .unwrap();
        let order = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 2, 1.0, None, &user)
            .unwrap();
        assert_eq!(order.status, SalesOrderStatus::Completed);
        assert_eq!(fx.db.on_hand(&part.id).unwrap(), 3.0);
    }

    #[test]
    fn test_ship_refuses_over_shipment_and_missing_stock() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = confirmed_order(&mut fx, &customer);

        let err = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 6.0, None, &user)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));

        let err = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 1.0, None, &user)
            .unwrap_err();
        assert!(matches!(err, DbError::InsufficientStock { .. }));

        let unchanged = fx.db.get_sales_order(&company, &order.order_number).unwrap();
        assert_eq!(unchanged.lines[0].quantity_shipped, 0.0);
        assert_eq!(unchanged.status, SalesOrderStatus::Confirmed);
    }

    #[test]
    fn test_cancel_refused_after_shipment() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = confirmed_order(&mut fx, &customer);
        fx.db
            .ship_sales_order_line(&company, &order.order_number, 2, 1.0, None, &user)
            .unwrap();
        let err = fx
            .db
            .transition_sales_order(&company, &order.order_number, SalesOrderTransition::Cancel)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
    }

    #[test]
    fn test_draft_order_cannot_ship() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_sales_order(&company, &customer.id, &user).unwrap();
        fx.db
            .add_sales_order_line(&company, &order.order_number, "SETUP", 1.0, None, None)
            .unwrap();
        assert!(fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 1.0, None, &user)
            .is_err());
        let listed = fx
            .db
            .list_sales_orders(
                &company,
                &SalesOrderFilter {
                    status: Some(SalesOrderStatus::Draft),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn test_fractional_shipments_complete_order() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        fx.db.adjust_inventory(&company, "BRK-100", "MAIN", 0.9, None, &user).unwrap();
        let order = fx.db.create_sales_order(&company, &customer.id, &user).unwrap();
        fx.db
            .add_sales_order_line(&company, &order.order_number, "BRK-100", 0.9, None, None)
            .unwrap();
        fx.db
            .transition_sales_order(&company, &order.order_number, SalesOrderTransition::Confirm)
            .unwrap();

        let order = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 0.7, None, &user)
            .unwrap();
        assert_eq!(order.status, SalesOrderStatus::InProgress);
        let order = fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 0.2, None, &user)
            .unwrap();
        assert_eq!(order.status, SalesOrderStatus::Completed);

        let stored = fx.db.get_sales_order(&company, &order.order_number).unwrap();
        assert_eq!(stored.lines[0].quantity_shipped, 0.9);
        assert_eq!(stored.lines[0].remaining(), 0.0);
        assert!(fx
            .db
            .ship_sales_order_line(&company, &order.order_number, 1, 0.1, None, &user)
            .is_err());
    }

    #[test]
    fn test_line_values_must_be_finite() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let quote = draft_quote(&mut fx, &customer);
        for (quantity, price) in [
            (f64::INFINITY, Some(1.0)),
            (f64::NAN, Some(1.0)),
            (0.0, Some(1.0)),
            (1.0, Some(f64::NAN)),
            (1.0, Some(f64::INFINITY)),
            (1.0, Some(-0.5)),
        ] {
            let err = fx
                .db
                .add_quote_line(&company, &quote.quote_number, "BRK-100", quantity, price, None)
                .unwrap_err();
            assert!(matches!(err, DbError::InvalidState(_)), "{quantity} @ {price:?}");
        }
        let stored = fx.db.get_quote(&company, &quote.quote_number).unwrap();
        assert_eq!(stored.lines.len(), 1);
        assert!(stored.total().is_finite());
    }

    #[test]
    fn test_inactive_part_refused_on_order_lines() {
        let (mut fx, customer) = sales_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        fx.db.set_part_active(&company, "BRK-100", false).unwrap();
        let order = fx.db.create_sales_order(&company, &customer.id, &user).unwrap();

        let err = fx
            .db
            .add_sales_order_line(&company, &order.order_number, "BRK-100", 1.0, None, None)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(ref m) if m.contains("inactive")));
        assert!(fx
            .db
            .add_sales_order_line(&company, &order.order_number, "SETUP", 1.0, None, None)
            .is_ok());
    }
}
