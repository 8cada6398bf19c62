//! Engine configuration.
//!
//! The only runtime choice the engine exposes is which convolution strategy
//! answers to the name `"conv2d"`. Both strategies are always registered under
//! their explicit names; the configuration decides the alias, so the active
//! implementation never depends on registration order.
//!
//! # Environment
//!
//! [`EngineConfig::from_env`] reads `BRINY_CONV` (`direct`/`naive` or
//! `im2col`/`patch`/`patch-matrix`). The process-wide registry is built from it
//! once, on first use.

use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;

/// Environment variable selecting the active convolution strategy.
pub const CONV_ENV: &str = "BRINY_CONV";

/// How `conv2d` is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[repr(u8)]
pub enum ConvStrategy {
    /// Slide the window over every output position and take small dot products.
    Direct = 0,
    /// Extract all patches into one matrix and perform a single matrix product.
    #[default]
    PatchMatrix,
}

impl ConvStrategy {
    /// Registry name of the implementation behind this strategy.
    pub const fn op_name(self) -> &'static str {
        match self {
            Self::Direct => "conv2d_direct",
            Self::PatchMatrix => "conv2d_im2col",
        }
    }
}

impl TryFrom<u8> for ConvStrategy {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Direct),
            1 => Ok(Self::PatchMatrix),
            _ => Err(()),
        }
    }
}

impl FromStr for ConvStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "naive" => Ok(Self::Direct),
            "im2col" | "patch" | "patch-matrix" => Ok(Self::PatchMatrix),
            other => Err(format!("unknown convolution strategy `{other}`")),
        }
    }
}

impl fmt::Display for ConvStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::PatchMatrix => f.write_str("im2col"),
        }
    }
}

/// Settings a [`Registry`](crate::registry::Registry) is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineConfig {
    pub conv: ConvStrategy,
}

impl EngineConfig {
    /// Config with an explicit convolution strategy.
    pub const fn with_conv(conv: ConvStrategy) -> Self {
        Self { conv }
    }

    /// Reads the configuration from the environment.
    ///
    /// Unset variables keep their defaults; unparsable ones are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(CONV_ENV) {
            match raw.parse() {
                Ok(conv) => config.conv = conv,
                Err(e) => log::warn!("{CONV_ENV}: {e}; using {}", config.conv),
            }
        }
        log::debug!("engine config: conv={}", config.conv);
        config
    }
}
