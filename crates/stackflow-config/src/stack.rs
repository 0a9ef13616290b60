//! Typed stack configuration

use crate::error::{ConfigError, Result};
use crate::source::ConfigSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

const DEFAULT_SERVICE_NAME: &str = "lago";
const DEFAULT_DB_NAME: &str = "lago";
const DEFAULT_DB_USER: &str = "lago";
const DEFAULT_REGION: &str = "eu-west-2";
const DEFAULT_VPC_CIDR: &str = "172.42.0.0/16";
const DEFAULT_SUBNET_COUNT: u8 = 2;
const MAX_SUBNETS: u8 = 16;

/// Prefix length of every subnet carved from the VPC block.
pub const SUBNET_PREFIX: u8 = 24;

/// An IPv4 network block, e.g. `172.42.0.0/16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

impl Cidr {
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The `index`-th block of length `prefix` inside this one.
    pub fn subnet(&self, prefix: u8, index: u32) -> Option<Cidr> {
        if prefix < self.prefix || prefix > 32 {
            return None;
        }
        let bits = u32::from(prefix - self.prefix);
        if bits < 32 && u64::from(index) >= 1u64 << bits {
            return None;
        }
        let step = 1u64 << (32 - u32::from(prefix));
        let base = u64::from(u32::from(self.network)) + u64::from(index) * step;
        let network = Ipv4Addr::from(u32::try_from(base).ok()?);
        Some(Cidr { network, prefix })
    }

    /// How many blocks of length `prefix` fit.
    pub fn capacity(&self, prefix: u8) -> u64 {
        if prefix < self.prefix || prefix > 32 {
            0
        } else {
            1u64 << (prefix - self.prefix)
        }
    }
}

impl FromStr for Cidr {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("'{}' is not in a.b.c.d/n form", s))?;
        let network: Ipv4Addr = address
            .parse()
            .map_err(|_| format!("'{}' is not an IPv4 address", address))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| format!("'{}' is not a prefix length between 0 and 32", prefix))?;

        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        };
        if u32::from(network) & !mask != 0 {
            return Err(format!("'{}' has host bits set", s));
        }
        Ok(Cidr { network, prefix })
    }
}

impl TryFrom<String> for Cidr {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cidr> for String {
    fn from(cidr: Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Settings for one Lago stack, validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub service_name: String,
    /// Image tag without the leading `v`.
    pub lago_version: String,
    pub db_name: String,
    pub db_user: String,
    pub region: String,
    pub vpc_cidr: Cidr,
    pub subnet_count: u8,
}

impl StackConfig {
    /// Read every setting from `source`, applying defaults.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let name = |key: &str, default: &str| -> Result<String> {
            let value = source.get(key).unwrap_or_else(|| default.to_string());
            non_empty(key, value)
        };

        let lago_version = source
            .get("lago_version")
            .ok_or_else(|| ConfigError::Missing {
                key: "lago_version".to_string(),
            })?;
        let lago_version = non_empty("lago_version", lago_version)?;
        let lago_version = lago_version
            .strip_prefix('v')
            .unwrap_or(&lago_version)
            .to_string();

        let vpc_cidr: Cidr = source
            .get("vpc_cidr")
            .unwrap_or_else(|| DEFAULT_VPC_CIDR.to_string())
            .parse()
            .map_err(|reason: String| ConfigError::invalid("vpc_cidr", reason))?;

        let subnet_count = match source.get("subnet_count") {
            Some(raw) => raw
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::invalid("subnet_count", format!("'{}' is not a number", raw)))?,
            None => DEFAULT_SUBNET_COUNT,
        };

        let config = Self {
            service_name: name("service_name", DEFAULT_SERVICE_NAME)?,
            lago_version,
            db_name: name("db_name", DEFAULT_DB_NAME)?,
            db_user: name("db_user", DEFAULT_DB_USER)?,
            region: name("region", DEFAULT_REGION)?,
            vpc_cidr,
            subnet_count,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_SUBNETS).contains(&self.subnet_count) {
            return Err(ConfigError::invalid(
                "subnet_count",
                format!("{} is outside 1..={}", self.subnet_count, MAX_SUBNETS),
            ));
        }
        // Block 0 stays unused, subnets start at index 1.
        let needed = u64::from(self.subnet_count) + 1;
        if self.vpc_cidr.capacity(SUBNET_PREFIX) < needed {
            return Err(ConfigError::invalid(
                "subnet_count",
                format!(
                    "{} /{} subnets do not fit in {}",
                    self.subnet_count, SUBNET_PREFIX, self.vpc_cidr
                ),
            ));
        }
        if self
            .service_name
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || c == '-'))
        {
            return Err(ConfigError::invalid(
                "service_name",
                "only letters, digits and '-' are allowed",
            ));
        }
        Ok(())
    }

    /// CIDR blocks of the stack's subnets, in order.
    pub fn subnet_cidrs(&self) -> Vec<Cidr> {
        (1..=u32::from(self.subnet_count))
            .filter_map(|index| self.vpc_cidr.subnet(SUBNET_PREFIX, index))
            .collect()
    }
}

fn non_empty(key: &str, value: String) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;

    fn minimal() -> StaticSource {
        StaticSource::new().with("lago_version", "1.2.0")
    }

    #[test]
    fn test_defaults() {
        let config = StackConfig::from_source(&minimal()).unwrap();
        assert_eq!(config.service_name, "lago");
        assert_eq!(config.db_name, "lago");
        assert_eq!(config.db_user, "lago");
        assert_eq!(config.region, "eu-west-2");
        assert_eq!(config.vpc_cidr.to_string(), "172.42.0.0/16");
        assert_eq!(config.subnet_count, 2);
        assert_eq!(
            config
                .subnet_cidrs()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec!["172.42.1.0/24", "172.42.2.0/24"]
        );
    }

    #[test]
    fn test_missing_version() {
        let err = StackConfig::from_source(&StaticSource::new()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { ref key } if key == "lago_version"));
        assert!(err.to_string().contains("STACKFLOW_LAGO_VERSION"));
    }

    #[test]
    fn test_version_prefix_is_stripped() {
        let config = StackConfig::from_source(&StaticSource::new().with("lago_version", "v1.4.1"))
            .unwrap();
        assert_eq!(config.lago_version, "1.4.1");
    }

    #[test]
    fn test_invalid_values() {
        let cases = [
            ("vpc_cidr", "172.42.0.0"),
            ("vpc_cidr", "172.42.1.0/16"),
            ("vpc_cidr", "300.1.0.0/16"),
            ("subnet_count", "0"),
            ("subnet_count", "17"),
            ("subnet_count", "two"),
            ("service_name", "  "),
            ("service_name", "lago stack"),
            ("db_user", ""),
        ];
        for (key, value) in cases {
            let source = minimal().with(key, value);
            assert!(
                matches!(StackConfig::from_source(&source), Err(ConfigError::Invalid { .. })),
                "{}={:?} should be rejected",
                key,
                value
            );
        }
    }

    #[test]
    fn test_subnets_must_fit_the_block() {
        let source = minimal().with("vpc_cidr", "10.0.0.0/23").with("subnet_count", "2");
        assert!(StackConfig::from_source(&source).is_err());

        let source = minimal().with("vpc_cidr", "10.0.0.0/22").with("subnet_count", "3");
        let config = StackConfig::from_source(&source).unwrap();
        assert_eq!(config.subnet_cidrs().last().unwrap().to_string(), "10.0.3.0/24");
    }

    #[test]
    fn test_cidr_subnet_bounds() {
        let cidr: Cidr = "10.0.0.0/30".parse().unwrap();
        assert_eq!(cidr.subnet(32, 3).unwrap().to_string(), "10.0.0.3/32");
        assert!(cidr.subnet(32, 4).is_none());
        assert!(cidr.subnet(24, 0).is_none());
        let everything: Cidr = "0.0.0.0/0".parse().unwrap();
        assert_eq!(everything.capacity(24), 1 << 24);
    }
}
