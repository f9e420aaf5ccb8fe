use clap::Parser;

use crate::ledger::MAX_AMOUNT;

/// Number-betting wager ledger with an HTTP command gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "wager-ledger-bot", version, about)]
pub struct Config {
    /// Gateway / dashboard listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Token a caller must present in `x-admin-token` to run admin commands
    #[arg(long, env = "ADMIN_TOKEN")]
    pub admin_token: String,

    /// Stake used when a wager token names only the number
    #[arg(long, env = "DEFAULT_UNIT", default_value = "500")]
    pub default_unit: u64,

    /// SQLite journal path; omit to keep the ledger in memory only
    #[arg(long, env = "JOURNAL_PATH")]
    pub journal_path: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.admin_token.trim().is_empty() {
            anyhow::bail!("ADMIN_TOKEN must not be empty");
        }
        if self.default_unit == 0 {
            anyhow::bail!("default_unit must be positive");
        }
        if self.default_unit > MAX_AMOUNT {
            anyhow::bail!("default_unit must not exceed {}", MAX_AMOUNT);
        }
        if let Some(path) = &self.journal_path {
            if path.trim().is_empty() {
                anyhow::bail!("JOURNAL_PATH must not be empty when set");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("wager-ledger-bot").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["--admin-token", "s3cret"]);
        assert_eq!(cfg.default_unit, 500);
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
        assert!(cfg.journal_path.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_unit_and_blank_token() {
        assert!(parse(&["--admin-token", "x", "--default-unit", "0"]).validate().is_err());
        assert!(parse(&["--admin-token", "  "]).validate().is_err());
        let huge = (MAX_AMOUNT + 1).to_string();
        assert!(parse(&["--admin-token", "x", "--default-unit", &huge]).validate().is_err());
    }
}
