//! Purchase orders

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::parts::{find_active_part_in, find_part_in};
use super::sales::{check_line_values, next_position};
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
    EntryType, LedgerEntry, PurchaseOrder, PurchaseOrderLine, PurchaseOrderStatus,
};

/// Sequence table used for purchase order numbers
pub const PURCHASE_ORDER_SEQUENCE: &str = "purchaseOrder";

const COLUMNS: &str =
    "id, company_id, order_number, supplier_id, status, order_date, created_by, created";

/// Filter for purchase order listings
#[derive(Debug, Clone, Default)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
    pub supplier_id: Option<EntityId>,
}

fn map_order(row: &Row<'_>) -> rusqlite::Result<PurchaseOrder> {
    Ok(PurchaseOrder {
        id: row.get(0)?,
        company_id: row.get(1)?,
        order_number: row.get(2)?,
        supplier_id: row.get(3)?,
        status: parse_column(4, row.get(4)?)?,
        order_date: parse_date(5, row.get(5)?)?,
        created_by: row.get(6)?,
        created: parse_ts(7, row.get(7)?)?,
        lines: Vec::new(),
    })
}

fn order_lines(conn: &Connection, order_id: &EntityId) -> Result<Vec<PurchaseOrderLine>, DbError> {
    let mut stmt = conn.prepare(
        "SELECT id, purchase_order_id, part_id, description, quantity, unit_price, quantity_received
         FROM purchase_order_line WHERE purchase_order_id = ?1 ORDER BY position",
    )?;
    let lines = stmt
        .query_map(params![order_id], |row| {
            Ok(PurchaseOrderLine {
                id: row.get(0)?,
                purchase_order_id: row.get(1)?,
                part_id: row.get(2)?,
                description: row.get(3)?,
                quantity: row.get(4)?,
                unit_price: row.get(5)?,
                quantity_received: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

fn load_order(
    conn: &Connection,
    company_id: &EntityId,
    reference: &str,
) -> Result<PurchaseOrder, DbError> {
    let (column, key) = if EntityId::looks_like(reference, EntityPrefix::Pord) {
        ("id", reference.to_uppercase())
    } else {
        ("order_number", reference.trim().to_string())
    };
    let order = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM purchase_order WHERE company_id = ?1 AND {column} = ?2"
            ),
            params![company_id, key],
            map_order,
        )
        .optional()?;
    let mut order = not_found_if_none(order, "purchase order", reference)?;
    order.lines = order_lines(conn, &order.id)?;
    Ok(order)
}

fn set_status(
    conn: &Connection,
    order: &PurchaseOrder,
    status: PurchaseOrderStatus,
) -> Result<(), DbError> {
    conn.execute(
        "UPDATE purchase_order SET status = ?2 WHERE id = ?1",
        params![order.id, status.to_string()],
    )?;
    record_change(
        conn,
        &order.company_id,
        PurchaseOrder::TABLE,
        Operation::Update,
        &order.id.to_string(),
    )
}

impl Database {
    /// Create an empty draft purchase order
    pub fn create_purchase_order(
        &mut self,
        company_id: &EntityId,
        supplier_id: &EntityId,
        user_id: &EntityId,
    ) -> Result<PurchaseOrder, DbError> {
        let supplier = self.get_supplier(company_id, supplier_id)?;
        if !supplier.active {
            return Err(DbError::InvalidState(format!(
                "supplier '{}' is inactive",
                supplier.name
            )));
        }

        let order = self.write(|tx| {
            let number = next_sequence_in(tx, company_id, PURCHASE_ORDER_SEQUENCE)?;
            let order = PurchaseOrder::new(
                company_id.clone(),
                number,
                supplier_id.clone(),
                user_id.clone(),
            );
            tx.execute(
                &format!("INSERT INTO purchase_order ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    order.id,
                    order.company_id,
                    order.order_number,
                    order.supplier_id,
                    order.status.to_string(),
                    date(&order.order_date),
                    order.created_by,
                    ts(&order.created)
                ],
            )
            .map_err(|e| DbError::from_insert(e, "purchase order", &order.order_number))?;
            record_change(
                tx,
                company_id,
                PurchaseOrder::TABLE,
                Operation::Insert,
                &order.id.to_string(),
            )?;
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, "purchase order created");
        Ok(order)
    }

    pub fn get_purchase_order(
        &self,
        company_id: &EntityId,
        reference: &str,
    ) -> Result<PurchaseOrder, DbError> {
        load_order(self.conn(), company_id, reference)
    }

    /// Add a line to a draft purchase order. Price defaults to unit cost.
    pub fn add_purchase_order_line(
        &mut self,
        company_id: &EntityId,
        order_reference: &str,
        part_reference: &str,
        quantity: f64,
        unit_price: Option<f64>,
        description: Option<String>,
    ) -> Result<PurchaseOrder, DbError> {
        self.write(|tx| {
            let order = load_order(tx, company_id, order_reference)?;
            if order.status != PurchaseOrderStatus::Draft {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} is {}; lines can only be added while draft",
                    order.order_number, order.status
                )));
            }
            let part = find_active_part_in(tx, company_id, part_reference)?;
            let price = unit_price.or(part.unit_cost).unwrap_or(0.0);
            check_line_values(quantity, price)?;

            let line = PurchaseOrderLine::new(
                order.id.clone(),
                part.id.clone(),
                description.unwrap_or_else(|| part.name.clone()),
                quantity,
                price,
            );
            let position =
                next_position(tx, "purchase_order_line", "purchase_order_id", &order.id)?;
            tx.execute(
                "INSERT INTO purchase_order_line
                   (id, purchase_order_id, part_id, description, quantity, unit_price,
                    quantity_received, position)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    line.id,
                    line.purchase_order_id,
                    line.part_id,
                    line.description,
                    line.quantity,
                    line.unit_price,
                    position
                ],
            )?;
            record_change(
                tx,
                company_id,
                "purchase_order_line",
                Operation::Insert,
                &line.id.to_string(),
            )?;
            load_order(tx, company_id, &order.id.to_string())
        })
    }

    pub fn list_purchase_orders(
        &self,
        company_id: &EntityId,
        filter: &PurchaseOrderFilter,
        page: Page,
    ) -> Result<Vec<PurchaseOrder>, DbError> {
        let mut sql = format!("SELECT {COLUMNS} FROM purchase_order WHERE company_id = ?1");
        let mut args: SqlParams = vec![Box::new(company_id.clone())];
        if let Some(status) = filter.status {
            args.push(Box::new(status.to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(supplier) = &filter.supplier_id {
            args.push(Box::new(supplier.clone()));
            sql.push_str(&format!(" AND supplier_id = ?{}", args.len()));
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

    /// Release a draft order to the supplier (`draft` -> `to_receive`)
    pub fn release_purchase_order(
        &mut self,
        company_id: &EntityId,
        reference: &str,
    ) -> Result<PurchaseOrder, DbError> {
        let order = self.write(|tx| {
            let mut order = load_order(tx, company_id, reference)?;
            if order.status != PurchaseOrderStatus::Draft {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} is {}; only draft orders can be released",
                    order.order_number, order.status
                )));
            }
            if order.lines.is_empty() {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} has no lines",
                    order.order_number
                )));
            }
            set_status(tx, &order, PurchaseOrderStatus::ToReceive)?;
            order.status = PurchaseOrderStatus::ToReceive;
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, "purchase order released");
        Ok(order)
    }

    /// Receive part of the `line_no`-th line (1-based)
    ///
    /// Stocked parts post a `purchase_receipt` ledger entry. The order
    /// completes once every line is fully received; over-receipt is refused.
    pub fn receive_purchase_order_line(
        &mut self,
        company_id: &EntityId,
        reference: &str,
        line_no: usize,
        quantity: f64,
        location: Option<&str>,
        user_id: &EntityId,
    ) -> Result<PurchaseOrder, DbError> {
        let order = self.write(|tx| {
            let mut order = load_order(tx, company_id, reference)?;
            if order.status != PurchaseOrderStatus::ToReceive {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} is {} and cannot be received",
                    order.order_number, order.status
                )));
            }
            let idx = line_no
                .checked_sub(1)
                .filter(|i| *i < order.lines.len())
                .ok_or_else(|| DbError::not_found("purchase order line", line_no.to_string()))?;
            let outstanding = order.lines[idx].outstanding();
            if !quantity.is_finite()
                || quantity <= 0.0
                || quantity > outstanding + QUANTITY_TOLERANCE
            {
                return Err(DbError::InvalidState(format!(
                    "can receive between 0 and {} on line {}",
                    outstanding, line_no
                )));
            }

            let part = find_part_in(tx, company_id, &order.lines[idx].part_id.to_string())?;
            if part.part_type.is_stocked() {
                let entry = LedgerEntry::new(
                    company_id.clone(),
                    part.id.clone(),
                    location.unwrap_or(DEFAULT_LOCATION),
                    EntryType::PurchaseReceipt,
                    quantity,
                    Some(order.order_number.clone()),
                    user_id.clone(),
                );
                post_entry(tx, &entry)?;
            }

            let line = &mut order.lines[idx];
            line.add_received(quantity);
            tx.execute(
                "UPDATE purchase_order_line SET quantity_received = ?2 WHERE id = ?1",
                params![line.id, line.quantity_received],
            )?;
            record_change(
                tx,
                company_id,
                "purchase_order_line",
                Operation::Update,
                &line.id.to_string(),
            )?;

            if order.fully_received() {
                set_status(tx, &order, PurchaseOrderStatus::Completed)?;
                order.status = PurchaseOrderStatus::Completed;
            }
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, line = line_no, quantity, "received");
        Ok(order)
    }

    /// Cancel an order that has not received anything
    pub fn cancel_purchase_order(
        &mut self,
        company_id: &EntityId,
        reference: &str,
    ) -> Result<PurchaseOrder, DbError> {
        let order = self.write(|tx| {
            let mut order = load_order(tx, company_id, reference)?;
            if matches!(
                order.status,
                PurchaseOrderStatus::Completed | PurchaseOrderStatus::Cancelled
            ) {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} is already {}",
                    order.order_number, order.status
                )));
            }
            if order.anything_received() {
                return Err(DbError::InvalidState(format!(
                    "purchase order {} has receipts and cannot be cancelled",
                    order.order_number
                )));
            }
            set_status(tx, &order, PurchaseOrderStatus::Cancelled)?;
            order.status = PurchaseOrderStatus::Cancelled;
            Ok(order)
        })?;
        tracing::info!(order = %order.order_number, "purchase order cancelled");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::testing::{fixture, Fixture};
    use crate::entities::{ContactDetails, Part, PartType, Replenishment, Supplier};

    fn purchasing_fixture() -> (Fixture, Supplier, Part) {
        let mut fx = fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let supplier = Supplier::new(
            company.clone(),
            "Steel Supply Co".to_string(),
            ContactDetails::default(),
            user.clone(),
        );
        fx.db.create_supplier(&supplier).unwrap();

        let mut sheet = Part::new(
            company,
            "SHEET-3MM".to_string(),
            "3mm steel sheet".to_string(),
            PartType::Inventory,
            Replenishment::Buy,
            user,
        );
        sheet.unit_cost = Some(40.0);
        fx.db.create_part(&sheet).unwrap();
        (fx, supplier, sheet)
    }

    fn released_order(fx: &mut Fixture, supplier: &Supplier, qty: f64) -> PurchaseOrder {
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_purchase_order(&company, &supplier.id, &user).unwrap();
        fx.db
            .add_purchase_order_line(&company, &order.order_number, "SHEET-3MM", qty, None, None)
            .unwrap();
        fx.db.release_purchase_order(&company, &order.order_number).unwrap()
    }

    #[test]
    fn test_receive_in_parts_completes_order() {
        let (mut fx, supplier, sheet) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = released_order(&mut fx, &supplier, 10.0);
        assert_eq!(order.order_number, "PO000001");
        assert_eq!(order.total(), 400.0);

        let order = fx
            .db
            .receive_purchase_order_line(&company, &order.order_number, 1, 4.0, None, &user)
            .unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::ToReceive);

        let order = fx
            .db
            .receive_purchase_order_line(&company, &order.order_number, 1, 6.0, Some("dock"), &user)
            .unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Completed);
        assert_eq!(fx.db.on_hand(&sheet.id).unwrap(), 10.0);
    }

    #[test]
    fn test_over_receipt_refused() {
        let (mut fx, supplier, sheet) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = released_order(&mut fx, &supplier, 2.0);
        let err = fx
            .db
            .receive_purchase_order_line(&company, &order.order_number, 1, 3.0, None, &user)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(_)));
        assert_eq!(fx.db.on_hand(&sheet.id).unwrap(), 0.0);
    }

    #[test]
    fn test_release_requires_lines_and_draft() {
        let (mut fx, supplier, _) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_purchase_order(&company, &supplier.id, &user).unwrap();
        assert!(fx.db.release_purchase_order(&company, &order.order_number).is_err());

        let released = released_order(&mut fx, &supplier, 1.0);
        assert!(fx
            .db
            .add_purchase_order_line(&company, &released.order_number, "SHEET-3MM", 1.0, None, None)
            .is_err());
    }

    #[test]
    fn test_draft_cannot_be_received() {
        let (mut fx, supplier, _) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_purchase_order(&company, &supplier.id, &user).unwrap();
        fx.db
            .add_purchase_order_line(&company, &order.order_number, "SHEET-3MM", 1.0, None, None)
            .unwrap();
        assert!(fx
            .db
            .receive_purchase_order_line(&company, &order.order_number, 1, 1.0, None, &user)
            .is_err());
    }

    #[test]
    fn test_cancel_refused_after_receipt() {
        let (mut fx, supplier, _) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let untouched = released_order(&mut fx, &supplier, 5.0);
        let received = released_order(&mut fx, &supplier, 5.0);
        fx.db
            .receive_purchase_order_line(&company, &received.order_number, 1, 1.0, None, &user)
            .unwrap();

        let cancelled = fx.db.cancel_purchase_order(&company, &untouched.order_number).unwrap();
        assert_eq!(cancelled.status, PurchaseOrderStatus::Cancelled);
        assert!(fx.db.cancel_purchase_order(&company, &received.order_number).is_err());

        let open = fx
            .db
            .list_purchase_orders(
                &company,
                &PurchaseOrderFilter {
                    status: Some(PurchaseOrderStatus::ToReceive),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].order_number, received.order_number);
    }

    #[test]
    fn test_fractional_receipts_complete_order() {
        let (mut fx, supplier, sheet) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = released_order(&mut fx, &supplier, 0.3);
        for _ in 0..2 {
            let partial = fx
                .db
                .receive_purchase_order_line(&company, &order.order_number, 1, 0.1, None, &user)
                .unwrap();
            assert_eq!(partial.status, PurchaseOrderStatus::ToReceive);
        }
        let order = fx
            .db
            .receive_purchase_order_line(&company, &order.order_number, 1, 0.1, None, &user)
            .unwrap();
        assert_eq!(order.status, PurchaseOrderStatus::Completed);
        assert_eq!(order.lines[0].quantity_received, 0.3);
        assert!((fx.db.on_hand(&sheet.id).unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_purchase_line_checks_part_and_values() {
        let (mut fx, supplier, _) = purchasing_fixture();
        let company = fx.company_id().clone();
        let user = fx.admin.id.clone();
        let order = fx.db.create_purchase_order(&company, &supplier.id, &user).unwrap();

        for (quantity, price) in [(f64::INFINITY, None), (1.0, Some(f64::NAN))] {
            assert!(matches!(
                fx.db
                    .add_purchase_order_line(&company, &order.order_number, "SHEET-3MM", quantity, price, None)
                    .unwrap_err(),
                DbError::InvalidState(_)
            ));
        }

        fx.db.set_part_active(&company, "SHEET-3MM", false).unwrap();
        let err = fx
            .db
            .add_purchase_order_line(&company, &order.order_number, "SHEET-3MM", 1.0, None, None)
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidState(ref m) if m.contains("inactive")));
        assert!(fx
            .db
            .get_purchase_order(&company, &order.order_number)
            .unwrap()
            .lines
            .is_empty());
    }
}
