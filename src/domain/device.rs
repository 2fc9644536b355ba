use crate::error::PushError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target platform of a registered device. A closed enum rather than a
/// free-form string so unsupported platforms are rejected at
/// config-validation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Apple,
    Google,
    Web,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Apple => "apple",
            Self::Google => "google",
            Self::Web => "web",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = PushError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apple" => Ok(Self::Apple),
            "google" => Ok(Self::Google),
            "web" => Ok(Self::Web),
            other => Err(PushError::Config(format!("'{other}' platform is unsupported"))),
        }
    }
}

/// A registered device, owned and persisted by the host application. The
/// pipeline only reads its routing fields and calls [`Device::deactivate`]
/// when a provider permanently rejects the token.
#[async_trait]
pub trait Device: Send + Sync + fmt::Debug {
    fn platform(&self) -> Platform;

    /// Provider-assigned opaque delivery address.
    fn token(&self) -> &str;

    /// Selects the provider credentials for this device.
    fn application(&self) -> &str;

    /// Removes or disables the device record. Invoked exactly once per
    /// delivery attempt whose token the provider reports as permanently
    /// invalid.
    async fn deactivate(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_known_names() {
        assert_eq!("apple".parse::<Platform>().unwrap(), Platform::Apple);
        assert_eq!("google".parse::<Platform>().unwrap(), Platform::Google);
        assert_eq!("web".parse::<Platform>().unwrap(), Platform::Web);
    }

    #[test]
    fn platform_rejects_unknown_names() {
        let err = "windows".parse::<Platform>().unwrap_err();
        assert!(matches!(err, PushError::Config(_)));
    }

    #[test]
    fn platform_display_round_trips() {
        for platform in [Platform::Apple, Platform::Google, Platform::Web] {
            assert_eq!(platform.to_string().parse::<Platform>().unwrap(), platform);
        }
    }
}
