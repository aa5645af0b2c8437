use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maturity of a component kind.
///
/// The runtime is configured with a minimum stability level: kinds below that level
/// cannot be used in a configuration.
/// `Deprecated` kinds are treated like `Stable` ones, but a warning is logged when they are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Experimental,
    Beta,
    Stable,
    Deprecated,
}

impl Stability {
    fn rank(self) -> u8 {
        match self {
            Stability::Experimental => 0,
            Stability::Beta => 1,
            Stability::Stable | Stability::Deprecated => 2,
        }
    }

    /// Checks whether a kind with this stability can be used when the minimum is `min`.
    pub fn permitted_by(self, min: Stability) -> bool {
        self.rank() >= min.rank()
    }
}

impl Default for Stability {
    fn default() -> Self {
        Stability::Stable
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stability::Experimental => "experimental",
            Stability::Beta => "beta",
            Stability::Stable => "stable",
            Stability::Deprecated => "deprecated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid stability level `{0}`, expected one of: experimental, beta, stable, deprecated")]
pub struct ParseStabilityError(String);

impl FromStr for Stability {
    type Err = ParseStabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "experimental" => Ok(Stability::Experimental),
            "beta" => Ok(Stability::Beta),
            "stable" => Ok(Stability::Stable),
            "deprecated" => Ok(Stability::Deprecated),
            other => Err(ParseStabilityError(other.to_owned())),
        }
    }
}
