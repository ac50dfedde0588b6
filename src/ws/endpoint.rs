use std::str::FromStr;

use phf::phf_map;
use url::Url;

use crate::Result;
use crate::error::Error;

/// Bybit deployment a stream connects to.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
    Demo,
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "main" => Ok(Self::Main),
            "test" => Ok(Self::Test),
            "demo" => Ok(Self::Demo),
            other => Err(Error::configuration(format!("unknown network `{other}`"))),
        }
    }
}

/// Category of WebSocket stream.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Channel {
    #[default]
    Spot,
    Linear,
    Inverse,
    /// Account, order and position updates. Requires credentials.
    Private,
}

impl Channel {
    #[must_use]
    pub const fn is_private(self) -> bool {
        matches!(self, Self::Private)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "spot" => Ok(Self::Spot),
            "linear" => Ok(Self::Linear),
            "inverse" => Ok(Self::Inverse),
            "private" => Ok(Self::Private),
            other => Err(Error::configuration(format!("unknown channel `{other}`"))),
        }
    }
}

static URLS: phf::Map<&'static str, phf::Map<&'static str, &'static str>> = phf_map! {
    "main" => phf_map! {
        "spot" => "wss://stream.bybit.com/v5/public/spot",
        "linear" => "wss://stream.bybit.com/v5/public/linear",
        "inverse" => "wss://stream.bybit.com/v5/public/inverse",
        "private" => "wss://stream.bybit.com/v5/private",
    },
    "test" => phf_map! {
        "spot" => "wss://stream-testnet.bybit.com/v5/public/spot",
        "linear" => "wss://stream-testnet.bybit.com/v5/public/linear",
        "inverse" => "wss://stream-testnet.bybit.com/v5/public/inverse",
        "private" => "wss://stream-testnet.bybit.com/v5/private",
    },
    "demo" => phf_map! {
        "private" => "wss://stream-demo.bybit.com",
    },
};

/// Resolves `network` × `channel` to its stream URL.
///
/// Combinations the service does not offer (e.g. public channels on [`Network::Demo`]) fail here,
/// before any socket is opened.
pub fn resolve(network: Network, channel: Channel) -> Result<Url> {
    let url = URLS
        .get(network.to_string().as_str())
        .and_then(|channels| channels.get(channel.to_string().as_str()))
        .ok_or_else(|| {
            Error::configuration(format!(
                "endpoint {channel} with net {network} not supported"
            ))
        })?;

    Ok(Url::parse(url)?)
}
