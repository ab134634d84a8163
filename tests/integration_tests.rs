//! Integration tests for the iw CLI
//!
//! Each test runs the binary against its own temporary workspace.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// An `iw` command isolated from the caller's environment and global config
fn iw(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("iw").unwrap();
    cmd.current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join("xdg"))
        .env_remove("IW_USER")
        .env_remove("IW_COMPANY")
        .env_remove("IW_FORMAT")
        .env_remove("IW_WORKSPACE")
        .env_remove("IW_LOG");
    cmd
}

/// Workspace with one company and its administrator
fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    iw(&tmp)
        .args(["init", "--company", "Acme Works", "--email", "admin@acme.example"])
        .assert()
        .success();
    tmp
}

/// Workspace with a part and a customer ready for quoting
fn setup_sales() -> TempDir {
    let tmp = setup_workspace();
    iw(&tmp)
        .args(["part", "new", "BRK-100", "--name", "Steel bracket", "--cost", "4.25"])
        .assert()
        .success();
    iw(&tmp)
        .args(["cust", "new", "Globex", "--email", "ap@globex.example"])
        .assert()
        .success();
    tmp
}

/// Draft quote Q000001 with one line of 10 x BRK-100 at 12.50
fn setup_quote() -> TempDir {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["quote", "new", "--customer", "Globex", "--name", "Brackets", "-q"])
        .assert()
        .success()
        .stdout("Q000001\n");
    iw(&tmp)
        .args(["quote", "add-line", "Q000001", "BRK-100", "10", "--price", "12.50"])
        .assert()
        .success();
    tmp
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    iw(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Quoting, sales"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    iw(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("iw"));
}

#[test]
fn test_command_outside_workspace_fails() {
    let tmp = TempDir::new().unwrap();
    iw(&tmp).args(["part", "list"]).assert().failure();
}

// ============================================================================
// Init and companies
// ============================================================================

#[test]
fn test_init_creates_workspace() {
    let tmp = TempDir::new().unwrap();
    iw(&tmp)
        .args(["init", "--company", "Acme Works", "--email", "admin@acme.example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized"));

    assert!(tmp.path().join(".iw/config.yaml").exists());
    assert!(tmp.path().join(".iw/signing.key").exists());
    assert!(tmp.path().join(".iw/storage/private").is_dir());
    assert!(tmp.path().join(".iw/storage/public").is_dir());

    let config = fs::read_to_string(tmp.path().join(".iw/config.yaml")).unwrap();
    assert!(config.contains("admin@acme.example"));
}

#[test]
fn test_init_twice_is_harmless() {
    let tmp = setup_workspace();
    iw(&tmp)
        .args(["init", "--company", "Other", "--email", "other@acme.example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_new_company_is_seeded() {
    let tmp = setup_workspace();
    iw(&tmp).args(["acct", "list", "-f", "id"]).assert().success().stdout(predicate::str::contains("1000"));
    iw(&tmp)
        .args(["seq", "list", "-f", "id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("quote").and(predicate::str::contains("purchaseOrder")));
}

#[test]
fn test_second_company_is_isolated() {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["company", "new", "Beta Fab", "--use"])
        .assert()
        .success();
    iw(&tmp)
        .args(["part", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No parts found"));
    iw(&tmp)
        .args(["part", "list", "--company", "Acme Works", "-f", "id"])
        .assert()
        .success()
        .stdout("BRK-100\n");
}

// ============================================================================
// Master data
// ============================================================================

#[test]
fn test_part_new_and_list() {
    let tmp = setup_sales();
    let csv = stdout_of(iw(&tmp).args(["part", "list", "-f", "csv"]));
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("number,name,type,replenish,uom,cost,active"));
    assert_eq!(lines.next(), Some("BRK-100,Steel bracket,inventory,buy,EA,4.25,yes"));
}

#[test]
fn test_duplicate_part_number_rejected() {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["part", "new", "BRK-100", "--name", "Again"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_email_fails_validation() {
    let tmp = setup_workspace();
    iw(&tmp)
        .args(["cust", "new", "Initech", "--email", "not-an-email"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid contact input"));
    iw(&tmp)
        .args(["cust", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No customers found"));
}

#[test]
fn test_import_parts_from_csv() {
    let tmp = setup_workspace();
    let file = tmp.path().join("parts.csv");
    fs::write(
        &file,
        "part_number,name,unit_cost\nP-1,First,1.5\nP-2,Second,\n",
    )
    .unwrap();

    iw(&tmp)
        .args(["import", "parts", "--dry-run"])
        .arg(&file)
        .assert()
        .success();
    iw(&tmp)
        .args(["part", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No parts found"));

    iw(&tmp).args(["import", "parts"]).arg(&file).assert().success();
    iw(&tmp)
        .args(["part", "list", "-f", "id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("P-1").and(predicate::str::contains("P-2")));
}

#[test]
fn test_import_stops_on_bad_row() {
    let tmp = setup_workspace();
    let file = tmp.path().join("customers.csv");
    fs::write(&file, "name,email\nGood Co,ok@good.example\n,bad\n").unwrap();

    iw(&tmp)
        .args(["import", "customers"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Row 3"));
}

// ============================================================================
// Sales flow
// ============================================================================

#[test]
fn test_quote_convert_creates_sales_order() {
    let tmp = setup_quote();
    iw(&tmp)
        .args(["quote", "convert", "Q000001", "-q"])
        .assert()
        .success()
        .stdout("SO000001\n");

    let quote = stdout_of(iw(&tmp).args(["quote", "show", "Q000001", "-f", "json"]));
    assert!(quote.contains("\"status\": \"ordered\""));

    let order = stdout_of(iw(&tmp).args(["so", "show", "SO000001", "-f", "json"]));
    assert!(order.contains("\"status\": \"confirmed\""));
    assert!(order.contains("12.5"));

    iw(&tmp)
        .args(["quote", "convert", "Q000001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already converted"));
}

#[test]
fn test_convert_empty_quote_refused() {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["quote", "new", "--customer", "Globex", "--name", "Empty"])
        .assert()
        .success();
    iw(&tmp)
        .args(["quote", "convert", "Q000001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no lines"));
    iw(&tmp)
        .args(["so", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No sales orders found"));
}

#[test]
fn test_ship_takes_stock() {
    let tmp = setup_quote();
    iw(&tmp).args(["quote", "convert", "Q000001"]).assert().success();

    iw(&tmp)
        .args(["so", "ship", "SO000001", "1", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("insufficient stock"));

    iw(&tmp).args(["inv", "adjust", "BRK-100", "12"]).assert().success();
    iw(&tmp).args(["so", "ship", "SO000001", "1", "10"]).assert().success();

    let order = stdout_of(iw(&tmp).args(["so", "show", "SO000001", "-f", "json"]));
    assert!(order.contains("\"status\": \"completed\""));
    iw(&tmp)
        .args(["inv", "onhand", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BRK-100,MAIN,2"));
}

#[test]
fn test_purchase_receipt_adds_stock() {
    let tmp = setup_sales();
    iw(&tmp).args(["sup", "new", "Acme Metals"]).assert().success();
    iw(&tmp)
        .args(["po", "new", "--supplier", "Acme Metals", "-q"])
        .assert()
        .success()
        .stdout("PO000001\n");
    iw(&tmp).args(["po", "add-line", "PO000001", "BRK-100", "20"]).assert().success();
    iw(&tmp).args(["po", "release", "PO000001"]).assert().success();
    iw(&tmp).args(["po", "receive", "PO000001", "1", "20"]).assert().success();

    iw(&tmp)
        .args(["inv", "onhand", "-f", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BRK-100,MAIN,20"));
    iw(&tmp)
        .args(["po", "receive", "PO000001", "1", "1"])
        .assert()
        .failure();
}

#[test]
fn test_negative_adjustment_cannot_go_below_zero() {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["inv", "adjust", "BRK-100", "-3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("insufficient stock"));
}

#[test]
fn test_quote_render_store_and_preview() {
    let tmp = setup_quote();
    iw(&tmp)
        .args(["quote", "render", "Q000001", "--store"])
        .assert()
        .success();
    iw(&tmp)
        .args(["doc", "list", "-f", "id"])
        .assert()
        .success()
        .stdout("quotes/Q000001.html\n");

    let url = stdout_of(iw(&tmp).args(["doc", "sign", "quotes/Q000001.html"]));
    iw(&tmp)
        .args(["doc", "open", url.trim()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Quote Q000001"));

    let tampered = url.trim().replace("Q000001", "Q000002");
    iw(&tmp).args(["doc", "open", &tampered]).assert().failure();
}

#[test]
fn test_watch_replays_changes() {
    let tmp = setup_quote();
    iw(&tmp)
        .args(["watch", "quote", "--once", "--from-start", "-f", "tsv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\tquote\tinsert\t"));
}

// ============================================================================
// Permissions
// ============================================================================

#[test]
fn test_user_without_permission_is_denied() {
    let tmp = setup_sales();
    iw(&tmp).args(["user", "type", "new", "Visitor"]).assert().success();
    iw(&tmp)
        .args([
            "user", "add", "clerk@acme.example", "--first", "Casey", "--last", "Clerk", "--type",
            "Visitor",
        ])
        .assert()
        .success();

    iw(&tmp)
        .env("IW_USER", "clerk@acme.example")
        .args(["part", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lacks permission"));

    iw(&tmp)
        .args(["user", "grant", "clerk@acme.example", "parts_view"])
        .assert()
        .success();
    iw(&tmp)
        .env("IW_USER", "clerk@acme.example")
        .args(["part", "list", "-f", "id"])
        .assert()
        .success()
        .stdout("BRK-100\n");
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_set_and_get() {
    let tmp = setup_workspace();
    iw(&tmp)
        .args(["config", "set", "preview_ttl_secs", "600"])
        .assert()
        .success();
    iw(&tmp)
        .args(["config", "get", "preview_ttl_secs"])
        .assert()
        .success()
        .stdout("600\n");
    iw(&tmp)
        .args(["config", "set", "preview_ttl_secs", "soon"])
        .assert()
        .failure();
    iw(&tmp)
        .args(["config", "get", "nonsense"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown config key"));
}

#[test]
fn test_default_format_from_config() {
    let tmp = setup_sales();
    iw(&tmp)
        .args(["config", "set", "default_format", "id"])
        .assert()
        .success();
    iw(&tmp)
        .args(["part", "list"])
        .assert()
        .success()
        .stdout("BRK-100\n");
}
