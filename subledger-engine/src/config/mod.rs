use anyhow::Result;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Deserialize, Clone, Debug)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub accounts: WellKnownCodes,
    /// Annual rate used by the deposit-time cost-of-money penalty.
    pub cost_of_money_annual_rate: Decimal,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Fixed chart codes the journal builder needs. The EWT account is not
/// here: it comes from the payee's configured withholding-tax title.
#[derive(Deserialize, Clone, Debug)]
pub struct WellKnownCodes {
    pub cash_in_bank: String,
    pub vat_input: String,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let url = env::var("SUBLEDGER_DATABASE_URL").expect("SUBLEDGER_DATABASE_URL must be set");
        let max_connections = env::var("SUBLEDGER_DB_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("SUBLEDGER_DB_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let cash_in_bank =
            env::var("SUBLEDGER_CASH_IN_BANK_CODE").unwrap_or_else(|_| "1010".to_string());
        let vat_input =
            env::var("SUBLEDGER_VAT_INPUT_CODE").unwrap_or_else(|_| "1150".to_string());

        let cost_of_money_annual_rate = Decimal::from_str(
            &env::var("SUBLEDGER_COST_OF_MONEY_RATE").unwrap_or_else(|_| "0.12".to_string()),
        )?;

        Ok(Self {
            database: DatabaseConfig {
                url,
                max_connections,
                min_connections,
            },
            accounts: WellKnownCodes {
                cash_in_bank,
                vat_input,
            },
            cost_of_money_annual_rate,
            service_name: "subledger-engine".to_string(),
        })
    }
}
