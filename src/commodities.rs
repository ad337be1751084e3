use tracing::warn;

use crate::models::Commodity;

pub const NAMESPACE_ISO: &str = "ISO4217";

// (mnemonic, full name, smallest-unit fraction)
const ISO_CURRENCIES: &[(&str, &str, i64)] = &[
    ("AED", "UAE Dirham", 100),
    ("AUD", "Australian Dollar", 100),
    ("BGN", "Bulgarian Lev", 100),
    ("BRL", "Brazilian Real", 100),
    ("CAD", "Canadian Dollar", 100),
    ("CHF", "Swiss Franc", 100),
    ("CLP", "Chilean Peso", 1),
    ("CNY", "Yuan Renminbi", 100),
    ("COP", "Colombian Peso", 100),
    ("CZK", "Czech Koruna", 100),
    ("DKK", "Danish Krone", 100),
    ("EUR", "Euro", 100),
    ("GBP", "Pound Sterling", 100),
    ("HKD", "Hong Kong Dollar", 100),
    ("HUF", "Forint", 100),
    ("IDR", "Rupiah", 100),
    ("ILS", "New Israeli Sheqel", 100),
    ("INR", "Indian Rupee", 100),
    ("ISK", "Iceland Krona", 1),
    ("JPY", "Yen", 1),
    ("KRW", "Won", 1),
    ("MXN", "Mexican Peso", 100),
    ("MYR", "Malaysian Ringgit", 100),
    ("NOK", "Norwegian Krone", 100),
    ("NZD", "New Zealand Dollar", 100),
    ("PHP", "Philippine Peso", 100),
    ("PLN", "Zloty", 100),
    ("RON", "Romanian Leu", 100),
    ("SEK", "Swedish Krona", 100),
    ("SGD", "Singapore Dollar", 100),
    ("THB", "Baht", 100),
    ("TRY", "Turkish Lira", 100),
    ("TWD", "New Taiwan Dollar", 100),
    ("USD", "US Dollar", 100),
    ("VND", "Dong", 1),
    ("ZAR", "Rand", 100),
];

/// Process-wide reference table of known commodities. Read-only after
/// construction.
pub struct CommodityTable {
    commodities: Vec<Commodity>,
}

impl CommodityTable {
    pub fn new() -> Self {
        let commodities = ISO_CURRENCIES
            .iter()
            .map(|(mnemonic, fullname, fraction)| Commodity {
                namespace: NAMESPACE_ISO.to_string(),
                mnemonic: mnemonic.to_string(),
                fullname: fullname.to_string(),
                fraction: *fraction,
            })
            .collect();
        Self { commodities }
    }

    pub fn get_commodities(&self, namespace: &str) -> Vec<Commodity> {
        self.commodities
            .iter()
            .filter(|c| c.namespace == namespace)
            .cloned()
            .collect()
    }

    pub fn lookup(&self, namespace: &str, mnemonic: &str) -> Option<&Commodity> {
        self.commodities
            .iter()
            .find(|c| c.namespace == namespace && c.mnemonic == mnemonic)
    }

    /// The configured default currency, falling back to US Dollar when the
    /// configured mnemonic is unknown.
    pub fn default_currency(&self, mnemonic: &str) -> Commodity {
        if let Some(c) = self.lookup(NAMESPACE_ISO, mnemonic) {
            return c.clone();
        }
        if let Some(c) = self.lookup(NAMESPACE_ISO, "USD") {
            return c.clone();
        }
        Commodity {
            namespace: NAMESPACE_ISO.to_string(),
            mnemonic: "USD".to_string(),
            fullname: "US Dollar".to_string(),
            fraction: 100,
        }
    }
}

impl Default for CommodityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Currency picker backed by a fixed, sorted list of display names. The
/// list is built once from the ISO namespace and never changes afterwards.
pub struct CurrencySelector {
    names: Vec<String>,
    active: Option<usize>,
}

impl CurrencySelector {
    pub fn new(table: &CommodityTable) -> Self {
        let mut currencies = table.get_commodities(NAMESPACE_ISO);
        currencies.sort_by(|a, b| a.printname().cmp(&b.printname()));
        let names = currencies.iter().map(|c| c.printname()).collect();
        Self {
            names,
            active: None,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Make `currency` the active selection, matched by exact display name.
    /// A name that is not in the list leaves the selection unchanged.
    // TODO: warn when the requested currency is missing from the list
    // instead of keeping the old selection without a trace.
    pub fn set_currency(&mut self, currency: &Commodity) {
        let printname = currency.printname();
        if let Some(pos) = self.names.iter().position(|n| *n == printname) {
            self.active = Some(pos);
        }
    }

    /// The commodity named by the active selection. With nothing selected,
    /// falls back to the default currency for `default_mnemonic`.
    pub fn get_currency(&self, table: &CommodityTable, default_mnemonic: &str) -> Commodity {
        match self.active.and_then(|i| self.names.get(i)) {
            Some(name) => {
                let mnemonic = name.split(' ').next().unwrap_or(name);
                match table.lookup(NAMESPACE_ISO, mnemonic) {
                    Some(c) => c.clone(),
                    None => {
                        warn!(mnemonic, "selected currency not in the commodity table");
                        table.default_currency(default_mnemonic)
                    }
                }
            }
            None => {
                warn!("no currency selected, using the default currency");
                table.default_currency(default_mnemonic)
            }
        }
    }
}
