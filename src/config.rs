use crate::address::Address;
use crate::error::LedgerResult;
use crate::fee::{FeeConfig, DEFAULT_FEE_DENOMINATOR, DEFAULT_FEE_NUMERATOR};

#[derive(Debug, Clone)]
pub struct Config {
    pub fee_numerator: u128,
    pub fee_denominator: u128,
    pub journal_path: String,
    pub replica_db_path: String,
    pub replica_key: String,
    pub catalog_path: String,
    pub actor_capacity: usize,
    pub replica_channel_capacity: usize,
    pub admin_address: Option<Address>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            fee_numerator: std::env::var("FEE_NUMERATOR").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_FEE_NUMERATOR),
            fee_denominator: std::env::var("FEE_DENOMINATOR").ok().and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_FEE_DENOMINATOR),
            journal_path: std::env::var("JOURNAL_PATH").unwrap_or_else(|_| "./ledger.wal".to_string()),
            replica_db_path: std::env::var("REPLICA_DB_PATH").unwrap_or_else(|_| "./replica.sqlite".to_string()),
            replica_key: std::env::var("REPLICA_KEY").unwrap_or_else(|_| "summit-demo".to_string()),
            catalog_path: std::env::var("CATALOG_PATH").unwrap_or_else(|_| "./catalog.json".to_string()),
            actor_capacity: std::env::var("ACTOR_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(64),
            replica_channel_capacity: std::env::var("REPLICA_CHANNEL_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(64),
            admin_address: std::env::var("ADMIN_ADDRESS").ok().and_then(|v| v.parse().ok()),
        }
    }

    /// Bootstrap fee policy; the admin collects fees until reconfigured.
    pub fn fee_config(&self, admin: Address) -> LedgerResult<FeeConfig> {
        FeeConfig::new(self.fee_numerator, self.fee_denominator, admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;

    fn base() -> Config {
        Config {
            fee_numerator: DEFAULT_FEE_NUMERATOR,
            fee_denominator: DEFAULT_FEE_DENOMINATOR,
            journal_path: "./ledger.wal".to_string(),
            replica_db_path: "./replica.sqlite".to_string(),
            replica_key: "summit-demo".to_string(),
            catalog_path: "./catalog.json".to_string(),
            actor_capacity: 64,
            replica_channel_capacity: 64,
            admin_address: None,
        }
    }

    #[test]
    fn test_default_fee_validates() {
        let admin = Address::from_low_u64(1);
        let fee = base().fee_config(admin).unwrap();
        assert_eq!((fee.numerator(), fee.denominator(), fee.recipient()), (1, 18, admin));
    }

    #[test]
    fn test_bad_fee_fails_bootstrap() {
        let cfg = Config { fee_numerator: 2, fee_denominator: 10, ..base() };
        assert!(matches!(
            cfg.fee_config(Address::from_low_u64(1)),
            Err(LedgerError::FeeTooHigh { .. })
        ));
        let cfg = Config { fee_denominator: 0, ..base() };
        assert_eq!(cfg.fee_config(Address::from_low_u64(1)), Err(LedgerError::DenominatorZero));
    }
}
