#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: String,
    pub currency: String,
    pub institution: Option<String>,
    pub last_four: Option<String>,
}

/// A currency (or other tradeable unit) identified by namespace + mnemonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commodity {
    pub namespace: String,
    pub mnemonic: String,
    pub fullname: String,
    /// Smallest unit per whole unit, e.g. 100 for cent-denominated currencies.
    pub fraction: i64,
}

impl Commodity {
    /// Display name shown in selection lists: `USD (US Dollar)`.
    /// The mnemonic runs up to the first space, so the display name can be
    /// mapped back to the commodity it names.
    pub fn printname(&self) -> String {
        format!("{} ({})", self.mnemonic, self.fullname)
    }
}

/// A transaction built from one parsed statement row, ready for the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printname_format() {
        let usd = Commodity {
            namespace: "ISO4217".to_string(),
            mnemonic: "USD".to_string(),
            fullname: "US Dollar".to_string(),
            fraction: 100,
        };
        assert_eq!(usd.printname(), "USD (US Dollar)");
        assert_eq!(usd.printname().split(' ').next(), Some("USD"));
    }
}
