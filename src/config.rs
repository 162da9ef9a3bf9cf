// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the [`GatewayConfig`] loaded
//! from them at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `RPC_URL` | EVM JSON-RPC endpoint | `http://127.0.0.1:8545` |
//! | `NODE_PRIVATE_KEY` | Hex secp256k1 key of the node account | One of the two key variables is required |
//! | `NODE_KEY_PATH` | PEM file holding the node key | One of the two key variables is required |
//! | `DATA_DIR` | Directory holding `records.redb` | `/data` |
//! | `HOST` | Bridge bind address | `0.0.0.0` |
//! | `PORT` | Bridge bind port | `8080` |
//! | `PRESENCE_CONTRACT` | Verifier for clients without a registration | Optional |
//! | `REGISTRY_CONTRACT` | Registry whose events the watcher follows | Optional (watcher off) |
//! | `PIN_INACTIVITY_MS` | Session pin inactivity timeout | `250` |
//! | `PIN_ROTATION_SECS` | Session pin rotation period | `30` |
//! | `MINING_CHECK_INTERVAL_SECS` | Receipt poll interval | `20` |
//! | `MAX_CONFIRMATION_CYCLES` | Receipt polls before giving up | `128` |
//! | `MAX_FRAME_SIZE` | Chunk size of multi-frame transfers | `128` |
//! | `SEND_DELAY_MS` | Delay between acknowledgement and payload | `50` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::codes::DEFAULT_MAX_FRAME_SIZE;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const RPC_URL_ENV: &str = "RPC_URL";
pub const NODE_PRIVATE_KEY_ENV: &str = "NODE_PRIVATE_KEY";
pub const NODE_KEY_PATH_ENV: &str = "NODE_KEY_PATH";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const PRESENCE_CONTRACT_ENV: &str = "PRESENCE_CONTRACT";
pub const REGISTRY_CONTRACT_ENV: &str = "REGISTRY_CONTRACT";
pub const PIN_INACTIVITY_MS_ENV: &str = "PIN_INACTIVITY_MS";
pub const PIN_ROTATION_SECS_ENV: &str = "PIN_ROTATION_SECS";
pub const MINING_CHECK_INTERVAL_SECS_ENV: &str = "MINING_CHECK_INTERVAL_SECS";
pub const MAX_CONFIRMATION_CYCLES_ENV: &str = "MAX_CONFIRMATION_CYCLES";
pub const MAX_FRAME_SIZE_ENV: &str = "MAX_FRAME_SIZE";
pub const SEND_DELAY_MS_ENV: &str = "SEND_DELAY_MS";

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_DATA_DIR: &str = "/data";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("set only one of NODE_PRIVATE_KEY and NODE_KEY_PATH")]
    ConflictingKeys,
}

/// Where the node key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKeySource {
    Hex(String),
    PemFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub rpc_url: String,
    pub node_key: NodeKeySource,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub presence_contract: Option<Address>,
    pub registry_contract: Option<Address>,
    pub pin_inactivity: Duration,
    pub pin_rotation: Duration,
    pub mining_check_interval: Duration,
    pub max_confirmation_cycles: u32,
    pub max_frame_size: usize,
    pub send_delay: Duration,
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let node_key = match (var(NODE_PRIVATE_KEY_ENV), var(NODE_KEY_PATH_ENV)) {
            (Some(hex), None) => NodeKeySource::Hex(hex),
            (None, Some(path)) => NodeKeySource::PemFile(PathBuf::from(path)),
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingKeys),
            (None, None) => return Err(ConfigError::Missing(NODE_PRIVATE_KEY_ENV)),
        };

        Ok(Self {
            rpc_url: var(RPC_URL_ENV).unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            node_key,
            data_dir: PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            host: var(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(PORT_ENV, var(PORT_ENV), DEFAULT_PORT)?,
            presence_contract: parse_opt(PRESENCE_CONTRACT_ENV, var(PRESENCE_CONTRACT_ENV))?,
            registry_contract: parse_opt(REGISTRY_CONTRACT_ENV, var(REGISTRY_CONTRACT_ENV))?,
            pin_inactivity: Duration::from_millis(parse_or(
                PIN_INACTIVITY_MS_ENV,
                var(PIN_INACTIVITY_MS_ENV),
                250,
            )?),
            pin_rotation: Duration::from_secs(parse_or(
                PIN_ROTATION_SECS_ENV,
                var(PIN_ROTATION_SECS_ENV),
                30,
            )?),
            mining_check_interval: Duration::from_secs(parse_or(
                MINING_CHECK_INTERVAL_SECS_ENV,
                var(MINING_CHECK_INTERVAL_SECS_ENV),
                20,
            )?),
            max_confirmation_cycles: parse_or(
                MAX_CONFIRMATION_CYCLES_ENV,
                var(MAX_CONFIRMATION_CYCLES_ENV),
                128,
            )?,
            max_frame_size: positive(
                MAX_FRAME_SIZE_ENV,
                parse_or(
                    MAX_FRAME_SIZE_ENV,
                    var(MAX_FRAME_SIZE_ENV),
                    DEFAULT_MAX_FRAME_SIZE,
                )?,
            )?,
            send_delay: Duration::from_millis(parse_or(
                SEND_DELAY_MS_ENV,
                var(SEND_DELAY_MS_ENV),
                50,
            )?),
        })
    }

    /// Path of the record database.
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::RECORDS_FILE)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_opt<T>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn positive(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
