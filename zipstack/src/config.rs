//! Configuration management

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use zipstack_sqs::SqsLimits;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sqs: SqsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SqsConfig {
    #[serde(default)]
    pub limits: SqsLimits,

    /// Queues created at startup
    #[serde(default = "default_queues")]
    pub queues: Vec<String>,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            limits: SqsLimits::default(),
            queues: default_queues(),
        }
    }
}

fn default_port() -> u16 {
    9324
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_queues() -> Vec<String> {
    vec!["zipkin".to_string()]
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("zipstack").required(false))
            .add_source(config::Environment::with_prefix("ZIPSTACK").separator("__"))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}
