//! Cloud providers compared by a run.

use serde::{Deserialize, Serialize};

/// A cloud provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Amazon Web Services
    Aws,

    /// Microsoft Azure
    Azure,
}

impl Provider {
    /// Both providers, in processing order
    pub const ALL: [Provider; 2] = [Provider::Aws, Provider::Azure];

    /// Stable lowercase key, used in artifact paths
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
        }
    }

    /// Display name for reports
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Azure => "Azure",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "aws" | "amazon" => Ok(Provider::Aws),
            "azure" | "az" => Ok(Provider::Azure),
            _ => anyhow::bail!("Unknown provider: {}", s),
        }
    }
}

/// One value per provider.
///
/// Stage outputs that come in pairs are stored as a whole pair, so a stage
/// can never leave one provider's field set and the other empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderPair<T> {
    pub aws: T,
    pub azure: T,
}

impl<T> ProviderPair<T> {
    pub fn new(aws: T, azure: T) -> Self {
        Self { aws, azure }
    }

    /// Get the value for a provider
    pub fn get(&self, provider: Provider) -> &T {
        match provider {
            Provider::Aws => &self.aws,
            Provider::Azure => &self.azure,
        }
    }
}
