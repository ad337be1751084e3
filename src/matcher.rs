use std::path::Path;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{PennyError, Result};
use crate::models::Transaction;

fn compute_checksum(file_path: &Path) -> Result<String> {
    let data = std::fs::read(file_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Ok(hex::encode(hasher.finalize()))
}

fn is_duplicate_row(conn: &Connection, account_id: i64, txn: &Transaction) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM transactions WHERE account_id = ?1 AND date = ?2 AND amount = ?3 AND description = ?4",
    )?;
    Ok(stmt.exists(rusqlite::params![
        account_id,
        txn.date,
        txn.amount,
        txn.description
    ])?)
}

pub struct MatchSummary {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
}

/// One matching run: collects the transactions a wizard produced, then
/// commits them into an account with row-level duplicate detection. A
/// session that is torn down instead of run leaves the database alone.
#[derive(Debug)]
pub struct MatcherSession<'a> {
    conn: &'a Connection,
    account_id: i64,
    filename: String,
    checksum: Option<String>,
    transactions: Vec<Transaction>,
}

impl<'a> MatcherSession<'a> {
    pub fn new(conn: &'a Connection, account_name: &str) -> Result<Self> {
        let account_id = conn
            .query_row(
                "SELECT id FROM accounts WHERE name = ?1",
                [account_name],
                |row| row.get(0),
            )
            .map_err(|_| PennyError::UnknownAccount(account_name.to_string()))?;
        Ok(Self {
            conn,
            account_id,
            filename: String::new(),
            checksum: None,
            transactions: Vec::new(),
        })
    }

    /// Record which file the transactions came from; a file already
    /// imported into this account (same checksum) is refused by `run`.
    pub fn set_source_file(&mut self, file_path: &Path) -> Result<()> {
        self.filename = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        self.checksum = Some(compute_checksum(file_path)?);
        Ok(())
    }

    pub fn add(&mut self, txn: Transaction) {
        self.transactions.push(txn);
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Commit the collected transactions. `snapshot_path`, when given,
    /// receives a copy of the database before anything is written.
    pub fn run(self, snapshot_path: Option<&Path>) -> Result<MatchSummary> {
        if let Some(checksum) = &self.checksum {
            let mut stmt = self
                .conn
                .prepare("SELECT 1 FROM imports WHERE checksum = ?1 AND account_id = ?2")?;
            if stmt.exists(rusqlite::params![checksum, self.account_id])? {
                return Ok(MatchSummary {
                    imported: 0,
                    skipped: 0,
                    duplicate_file: true,
                });
            }
        }

        if let Some(path) = snapshot_path {
            crate::db::snapshot(self.conn, path)?;
        }

        let dates: Vec<&str> = self.transactions.iter().map(|t| t.date.as_str()).collect();
        let min_date = dates.iter().min().copied();
        let max_date = dates.iter().max().copied();
        self.conn.execute(
            "INSERT INTO imports (filename, account_id, record_count, date_range_start, date_range_end, checksum) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                self.filename,
                self.account_id,
                self.transactions.len() as i64,
                min_date,
                max_date,
                self.checksum,
            ],
        )?;
        let import_id = self.conn.last_insert_rowid();

        let mut imported = 0usize;
        let mut skipped = 0usize;
        for txn in &self.transactions {
            if is_duplicate_row(self.conn, self.account_id, txn)? {
                skipped += 1;
                continue;
            }
            self.conn.execute(
                "INSERT INTO transactions (account_id, date, description, amount, import_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![self.account_id, txn.date, txn.description, txn.amount, import_id],
            )?;
            imported += 1;
        }

        debug!(imported, skipped, "matcher run complete");
        Ok(MatchSummary {
            imported,
            skipped,
            duplicate_file: false,
        })
    }

    /// Tear the session down without committing anything.
    pub fn delete(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{get_connection, init_db};

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn add_test_account(conn: &Connection) {
        conn.execute(
            "INSERT INTO accounts (name, account_type) VALUES ('Test Checking', 'checking')", [],
        ).unwrap();
    }

    fn txn(date: &str, description: &str, amount: f64) -> Transaction {
        Transaction {
            date: date.to_string(),
            description: description.to_string(),
            amount,
        }
    }

    fn txn_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_unknown_account_is_rejected() {
        let (_dir, conn) = test_db();
        assert!(matches!(
            MatcherSession::new(&conn, "Nope").unwrap_err(),
            PennyError::UnknownAccount(_)
        ));
    }

    #[test]
    fn test_run_inserts_transactions_and_records_import() {
        let (_dir, conn) = test_db();
        add_test_account(&conn);
        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        session.add(txn("2025-01-17", "DEPOSIT", 500.0));
        let summary = session.run(None).unwrap();
        assert_eq!(summary.imported, 2);
        assert!(!summary.duplicate_file);
        assert_eq!(txn_count(&conn), 2);

        let (count, start, end): (i64, String, String) = conn
            .query_row(
                "SELECT record_count, date_range_start, date_range_end FROM imports LIMIT 1",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(start, "2025-01-15");
        assert_eq!(end, "2025-01-17");
    }

    #[test]
    fn test_run_skips_duplicate_rows() {
        let (_dir, conn) = test_db();
        add_test_account(&conn);
        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        session.run(None).unwrap();

        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        session.add(txn("2025-01-18", "PAYMENT THREE", -300.0));
        let summary = session.run(None).unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(txn_count(&conn), 2);
    }

    #[test]
    fn test_run_refuses_duplicate_file() {
        let (dir, conn) = test_db();
        add_test_account(&conn);
        let file = dir.path().join("stmt.csv");
        std::fs::write(&file, "2025-01-15,PAYMENT ONE,-100.00\n").unwrap();

        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.set_source_file(&file).unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        assert_eq!(session.run(None).unwrap().imported, 1);

        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.set_source_file(&file).unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        let summary = session.run(None).unwrap();
        assert!(summary.duplicate_file);
        assert_eq!(summary.imported, 0);
        assert_eq!(txn_count(&conn), 1);
    }

    #[test]
    fn test_delete_commits_nothing() {
        let (_dir, conn) = test_db();
        add_test_account(&conn);
        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        session.delete();
        assert_eq!(txn_count(&conn), 0);
        let imports: i64 = conn
            .query_row("SELECT count(*) FROM imports", [], |r| r.get(0))
            .unwrap();
        assert_eq!(imports, 0);
    }

    #[test]
    fn test_run_snapshots_before_writing() {
        let (dir, conn) = test_db();
        add_test_account(&conn);
        let snap = dir.path().join("snapshots").join("pre-import.db");
        let mut session = MatcherSession::new(&conn, "Test Checking").unwrap();
        session.add(txn("2025-01-15", "PAYMENT ONE", -100.0));
        session.run(Some(&snap)).unwrap();

        let copy = get_connection(&snap).unwrap();
        let count: i64 = copy
            .query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0, "snapshot must predate the inserts");
        assert_eq!(txn_count(&conn), 1);
    }
}
