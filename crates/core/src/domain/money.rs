use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Number of fractional digits carried by every monetary amount.
pub const MONEY_SCALE: u32 = 2;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Jpy,
    Cad,
}

impl Currency {
    pub const ALL: [Currency; 5] =
        [Currency::Usd, Currency::Eur, Currency::Gbp, Currency::Jpy, Currency::Cad];

    pub fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Jpy => "JPY",
            Self::Cad => "CAD",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
            Self::Jpy => "¥",
            Self::Cad => "C$",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Usd => "US Dollar",
            Self::Eur => "Euro",
            Self::Gbp => "British Pound",
            Self::Jpy => "Japanese Yen",
            Self::Cad => "Canadian Dollar",
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let code = value.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|currency| currency.code() == code).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "unsupported currency `{}` (expected USD|EUR|GBP|JPY|CAD)",
                value.trim()
            ))
        })
    }
}

/// Renders `amount` as `<symbol><amount>` with two decimals, e.g. `€89.99`.
pub fn format_amount(amount: Decimal, currency: Currency) -> String {
    let mut rounded = amount.round_dp(MONEY_SCALE);
    rounded.rescale(MONEY_SCALE);
    format!("{}{}", currency.symbol(), rounded)
}

/// Checks the fixed-point invariants shared by expense amounts and rule thresholds.
pub fn validate_amount(field: &str, amount: Decimal) -> Result<(), DomainError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(DomainError::InvariantViolation(format!("{field} must be >= 0, got {amount}")));
    }

    if amount.normalize().scale() > MONEY_SCALE {
        return Err(DomainError::InvariantViolation(format!(
            "{field} must have at most {MONEY_SCALE} decimal places, got {amount}"
        )));
    }

    Ok(())
}
