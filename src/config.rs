// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Service configuration, loaded once at start and passed to collaborators
//! by reference. The file format is TOML; every section has usable defaults
//! except the wallet and asset identities, which must be provided.

use std::{path::Path, time::Duration};

use anyhow::Context as _;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ledger::asset::Asset;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub horizon: HorizonConfig,
    pub wallet: WalletConfig,
    pub reward: RewardConfig,
    pub delegation: DelegationConfig,
    pub tracker: TrackerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    pub url: Url,
    pub network_passphrase: String,
    pub base_fee: u32,
    #[serde(with = "humantime_duration")]
    pub request_timeout: Duration,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://horizon-testnet.stellar.org")
                .expect("default horizon url is valid"),
            network_passphrase: "Test SDF Network ; September 2015".into(),
            base_fee: 200_000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// The house wallet bribes are claimed into and rewards are paid from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WalletConfig {
    pub address: String,
    pub signer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub asset_code: String,
    pub asset_issuer: String,
    /// Fixed reward-asset portion converted out of every accepted bribe.
    #[serde(with = "decimal_string")]
    pub conversion_amount: BigDecimal,
    /// Length of the activation window.
    #[serde(with = "humantime_duration")]
    pub default_duration: Duration,
    /// Share of the daily amount paid per tick.
    #[serde(with = "humantime_duration")]
    pub reward_period: Duration,
    /// Soft deadline of a single pay task.
    #[serde(with = "humantime_duration")]
    pub payreward_time_limit: Duration,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            asset_code: String::new(),
            asset_issuer: String::new(),
            conversion_amount: BigDecimal::from(100_000),
            default_duration: Duration::from_secs(7 * 24 * 3600),
            reward_period: Duration::from_secs(24 * 3600),
            payreward_time_limit: Duration::from_secs(55 * 60),
        }
    }
}

impl RewardConfig {
    pub fn asset(&self) -> Asset {
        Asset::credit(&self.asset_code, &self.asset_issuer)
    }
}

/// Delegation bookkeeping: which assets mark delegated stakes and which
/// sentinel address tags a claimable balance as a delegation record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DelegationConfig {
    pub marker: String,
    pub pairs: Vec<DelegationPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationPair {
    /// Asset a holder sends to an aggregator to delegate, `CODE:ISSUER`.
    pub delegatable: String,
    /// Asset the aggregator holds against a market, `CODE:ISSUER`.
    pub delegated: String,
}

impl DelegationConfig {
    pub fn delegatable_assets(&self) -> anyhow::Result<Vec<Asset>> {
        self.pairs
            .iter()
            .map(|p| Asset::from_horizon(&p.delegatable).map_err(Into::into))
            .collect()
    }

    pub fn delegated_assets(&self) -> anyhow::Result<Vec<Asset>> {
        self.pairs
            .iter()
            .map(|p| Asset::from_horizon(&p.delegated).map_err(Into::into))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub url: Url,
    pub page_limit: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://voting-tracker.aqua.network")
                .expect("default tracker url is valid"),
            page_limit: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "aquarius-bribes.db".into(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config =
            toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.wallet.address.is_empty(), "wallet.address is not set");
        anyhow::ensure!(!self.wallet.signer.is_empty(), "wallet.signer is not set");
        anyhow::ensure!(
            !self.reward.asset_code.is_empty() && !self.reward.asset_issuer.is_empty(),
            "reward asset is not set"
        );
        Ok(())
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(D::Error::custom)
    }
}

mod decimal_string {
    use bigdecimal::BigDecimal;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BigDecimal, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let config = Config::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.horizon.base_fee, config.horizon.base_fee);
        assert_eq!(parsed.reward.conversion_amount, config.reward.conversion_amount);
        assert_eq!(parsed.reward.reward_period, config.reward.reward_period);
    }

    #[test]
    fn durations_parse_from_friendly_strings() {
        let raw = r#"
            [reward]
            asset_code = "AQUA"
            asset_issuer = "GBNZILSTVQZ4R7IKQDGHYGY2QXL5QOFJYQMXPKWRRM5PAV7Y4M67AQUA"
            reward_period = "1h"
            payreward_time_limit = "55m"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.reward.reward_period, Duration::from_secs(3600));
        assert_eq!(
            config.reward.payreward_time_limit,
            Duration::from_secs(55 * 60)
        );
    }

    #[test]
    fn validate_rejects_missing_wallet() {
        assert!(Config::default().validate().is_err());
    }
}
