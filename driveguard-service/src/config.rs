use driveguard::{ContractAddresses, DEFAULT_ETH_USD_PRICE};

/// Service settings read from the environment
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub database_url: Option<String>,
    /// "pretty" or "json"
    pub log_format: String,
    pub reverify_roles: bool,
    pub eth_usd_price: u128,
    pub admin_addresses: Vec<String>,
    pub contracts: ContractAddresses,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            log_format: "json".to_string(),
            reverify_roles: true,
            eth_usd_price: DEFAULT_ETH_USD_PRICE,
            admin_addresses: Vec::new(),
            contracts: ContractAddresses::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("PORT must be a port number: {}", e))?,
            None => defaults.port,
        };

        let reverify_roles = match lookup("REVERIFY_ROLES") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => anyhow::bail!("REVERIFY_ROLES must be true or false, got '{}'", other),
            },
            None => defaults.reverify_roles,
        };

        let eth_usd_price = match lookup("ETH_USD_PRICE") {
            Some(raw) => raw
                .parse::<u128>()
                .map_err(|e| anyhow::anyhow!("ETH_USD_PRICE must be an integer: {}", e))?,
            None => defaults.eth_usd_price,
        };

        let admin_addresses = lookup("ADMIN_ADDRESSES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let contracts = ContractAddresses {
            role_contract: lookup("ROLE_CONTRACT_ADDRESS")
                .unwrap_or(defaults.contracts.role_contract),
            policy_contract: lookup("POLICY_CONTRACT_ADDRESS")
                .unwrap_or(defaults.contracts.policy_contract),
        };

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            log_format: lookup("LOG_FORMAT").unwrap_or(defaults.log_format),
            reverify_roles,
            eth_usd_price,
            admin_addresses,
            contracts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert!(config.reverify_roles);
        assert_eq!(config.eth_usd_price, DEFAULT_ETH_USD_PRICE);
        assert!(config.admin_addresses.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("PORT", "8080"),
            ("REVERIFY_ROLES", "false"),
            ("ADMIN_ADDRESSES", "0xaa, 0xbb,"),
            ("LOG_FORMAT", "pretty"),
            ("DATABASE_URL", ""),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert!(!config.reverify_roles);
        assert_eq!(config.admin_addresses, vec!["0xaa", "0xbb"]);
        assert_eq!(config.log_format, "pretty");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServiceConfig::from_lookup(lookup_from(&[("PORT", "http")])).is_err());
        assert!(ServiceConfig::from_lookup(lookup_from(&[("REVERIFY_ROLES", "maybe")])).is_err());
    }
}
