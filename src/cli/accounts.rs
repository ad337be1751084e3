use comfy_table::{Cell, Table};

use crate::commodities::{CommodityTable, NAMESPACE_ISO};
use crate::db::get_connection;
use crate::error::{PennyError, Result};
use crate::models::Account;
use crate::settings::{get_data_dir, load_settings};

pub fn add(
    name: &str,
    account_type: &str,
    currency: Option<&str>,
    institution: Option<&str>,
    last_four: Option<&str>,
) -> Result<()> {
    let table = CommodityTable::new();
    let currency = match currency {
        Some(code) => {
            let code = code.to_uppercase();
            table
                .lookup(NAMESPACE_ISO, &code)
                .ok_or_else(|| PennyError::UnknownCurrency(code.clone()))?;
            code
        }
        None => load_settings().default_currency,
    };

    let conn = get_connection(&get_data_dir().join("penny.db"))?;
    conn.execute(
        "INSERT INTO accounts (name, account_type, currency, institution, last_four) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![name, account_type, currency, institution, last_four],
    )?;
    println!("Added account: {name} ({currency})");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&get_data_dir().join("penny.db"))?;
    let mut stmt = conn.prepare(
        "SELECT id, name, account_type, currency, institution, last_four FROM accounts ORDER BY name",
    )?;
    let accounts: Vec<Account> = stmt
        .query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                account_type: row.get(2)?,
                currency: row.get(3)?,
                institution: row.get(4)?,
                last_four: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Currency", "Institution", "Last Four"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_type),
            Cell::new(account.currency),
            Cell::new(account.institution.unwrap_or_default()),
            Cell::new(account.last_four.unwrap_or_default()),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
