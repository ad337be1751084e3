use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::commodities::{CommodityTable, CurrencySelector, NAMESPACE_ISO};
use crate::error::Result;
use crate::settings::load_settings;

/// Print the currency list exactly as the selection widget presents it:
/// sorted by display name, with the configured default marked.
pub fn run() -> Result<()> {
    let settings = load_settings();
    let commodities = CommodityTable::new();
    let mut selector = CurrencySelector::new(&commodities);
    let default = commodities.default_currency(&settings.default_currency);
    selector.set_currency(&default);

    let mut table = Table::new();
    table.set_header(vec!["", "Code", "Name", "Fraction"]);
    for (i, name) in selector.names().iter().enumerate() {
        let marker = if selector.active_index() == Some(i) {
            "*"
        } else {
            ""
        };
        let mnemonic = name.split(' ').next().unwrap_or(name);
        let Some(commodity) = commodities.lookup(NAMESPACE_ISO, mnemonic) else {
            continue;
        };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(&commodity.mnemonic),
            Cell::new(&commodity.fullname),
            Cell::new(commodity.fraction),
        ]);
    }
    println!("Currencies\n{table}");

    let active = selector.get_currency(&commodities, &settings.default_currency);
    println!("Default currency: {}", active.printname().bold());
    Ok(())
}
