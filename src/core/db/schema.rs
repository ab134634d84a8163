//! Database schema initialization

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, SCHEMA_VERSION};

impl Database {
    /// Stored schema version, or None for a fresh database
    pub(super) fn schema_version(&self) -> Result<Option<i32>, DbError> {
        let has_meta: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'meta'",
            [],
            |row| row.get(0),
        )?;
        if !has_meta {
            return Ok(None);
        }

        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    /// Initialize database schema
    pub(super) fn init_schema(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS company (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                base_currency TEXT NOT NULL,
                created TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                user_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created TEXT NOT NULL
            );

            -- Permission key -> company ids, as JSON
            CREATE TABLE IF NOT EXISTS user_permission (
                user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                permissions TEXT NOT NULL DEFAULT '{}'
            );

            CREATE TABLE IF NOT EXISTS employee_type (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                name TEXT NOT NULL,
                permissions TEXT NOT NULL DEFAULT '{}',
                UNIQUE (company_id, name)
            );

            CREATE TABLE IF NOT EXISTS employee (
                user_id TEXT NOT NULL REFERENCES users(id),
                company_id TEXT NOT NULL REFERENCES company(id),
                employee_type_id TEXT NOT NULL REFERENCES employee_type(id),
                PRIMARY KEY (user_id, company_id)
            );

            CREATE TABLE IF NOT EXISTS customer (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                name TEXT NOT NULL,
                tax_id TEXT,
                email TEXT,
                phone TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_customer_company ON customer(company_id);

            CREATE TABLE IF NOT EXISTS supplier (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                name TEXT NOT NULL,
                tax_id TEXT,
                email TEXT,
                phone TEXT,
                active INTEGER NOT NULL DEFAULT 1,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_supplier_company ON supplier(company_id);

            CREATE TABLE IF NOT EXISTS part (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                part_number TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                part_type TEXT NOT NULL,
                replenishment TEXT NOT NULL,
                unit_of_measure TEXT NOT NULL,
                unit_cost REAL,
                active INTEGER NOT NULL DEFAULT 1,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (company_id, part_number)
            );

            CREATE TABLE IF NOT EXISTS item_ledger (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                part_id TEXT NOT NULL REFERENCES part(id),
                location TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                quantity REAL NOT NULL,
                document_ref TEXT,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_ledger_part ON item_ledger(part_id, location);

            CREATE TABLE IF NOT EXISTS sequence (
                company_id TEXT NOT NULL REFERENCES company(id),
                table_name TEXT NOT NULL,
                name TEXT NOT NULL,
                prefix TEXT,
                suffix TEXT,
                next INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                step INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (company_id, table_name)
            );

            CREATE TABLE IF NOT EXISTS quote (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                quote_number TEXT NOT NULL,
                customer_id TEXT NOT NULL REFERENCES customer(id),
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                expiration_date TEXT,
                sales_order_id TEXT,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (company_id, quote_number)
            );

            CREATE TABLE IF NOT EXISTS quote_line (
                id TEXT PRIMARY KEY,
                quote_id TEXT NOT NULL REFERENCES quote(id) ON DELETE CASCADE,
                part_id TEXT NOT NULL REFERENCES part(id),
                description TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit_price REAL NOT NULL,
                position INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_quote_line_quote ON quote_line(quote_id);

            CREATE TABLE IF NOT EXISTS sales_order (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                order_number TEXT NOT NULL,
                customer_id TEXT NOT NULL REFERENCES customer(id),
                quote_id TEXT REFERENCES quote(id),
                status TEXT NOT NULL,
                order_date TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (company_id, order_number)
            );

            CREATE TABLE IF NOT EXISTS sales_order_line (
                id TEXT PRIMARY KEY,
                sales_order_id TEXT NOT NULL REFERENCES sales_order(id) ON DELETE CASCADE,
                part_id TEXT NOT NULL REFERENCES part(id),
                description TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit_price REAL NOT NULL,
                quantity_shipped REAL NOT NULL DEFAULT 0,
                position INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_so_line_order ON sales_order_line(sales_order_id);

            CREATE TABLE IF NOT EXISTS purchase_order (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                order_number TEXT NOT NULL,
                supplier_id TEXT NOT NULL REFERENCES supplier(id),
                status TEXT NOT NULL,
                order_date TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (company_id, order_number)
            );

            CREATE TABLE IF NOT EXISTS purchase_order_line (
                id TEXT PRIMARY KEY,
                purchase_order_id TEXT NOT NULL REFERENCES purchase_order(id) ON DELETE CASCADE,
                part_id TEXT NOT NULL REFERENCES part(id),
                description TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit_price REAL NOT NULL,
                quantity_received REAL NOT NULL DEFAULT 0,
                position INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_po_line_order ON purchase_order_line(purchase_order_id);

            CREATE TABLE IF NOT EXISTS account (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                number TEXT NOT NULL,
                name TEXT NOT NULL,
                account_type TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                UNIQUE (company_id, number)
            );

            CREATE TABLE IF NOT EXISTS document (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL REFERENCES company(id),
                bucket TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                sha256 TEXT NOT NULL,
                uploaded_by TEXT NOT NULL,
                created TEXT NOT NULL,
                UNIQUE (company_id, bucket, path)
            );

            -- Realtime change feed
            CREATE TABLE IF NOT EXISTS change_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id TEXT NOT NULL,
                table_name TEXT NOT NULL,
                operation TEXT NOT NULL,
                record_id TEXT NOT NULL,
                at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_change_log_topic ON change_log(table_name, seq);

            -- Background jobs
            CREATE TABLE IF NOT EXISTS job (
                id TEXT PRIMARY KEY,
                company_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                status TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                error TEXT,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                finished TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_job_status ON job(status, created);
            "#,
        )?;

        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;

        Ok(())
    }
}
