use error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub mod error;

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub network: NetworkConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Address the receiver binds for data packets; the sender's target.
    pub data_addr: String,
    /// Address the sender binds for acknowledgments; the receiver's target.
    pub ack_addr: String,
    /// Address the stream-variant sender listens on.
    pub stream_addr: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    /// Directory holding the source object files.
    pub objects_dir: PathBuf,
    /// Directory reconstructed objects are written into.
    pub output_dir: PathBuf,
    /// Static bound on outstanding packets at the sender.
    pub receive_window: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            data_addr: "127.0.0.1:65432".to_string(),
            ack_addr: "127.0.0.1:65433".to_string(),
            stream_addr: "127.0.0.1:65434".to_string(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            objects_dir: PathBuf::from("objects"),
            output_dir: PathBuf::from("reconstructed"),
            receive_window: 64_000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, addr) in [
            ("network.data_addr", &self.network.data_addr),
            ("network.ack_addr", &self.network.ack_addr),
            ("network.stream_addr", &self.network.stream_addr),
        ] {
            if SocketAddr::from_str(addr).is_err() {
                return Err(ConfigError::Validation(format!(
                    "Invalid {field} '{addr}'. Expected format like 'IP:PORT'."
                )));
            }
        }

        if self.transfer.receive_window == 0 {
            return Err(ConfigError::Validation(
                "Receive window must be at least one packet.".to_string(),
            ));
        }

        Ok(())
    }

    pub fn data_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.network.data_addr)
    }

    pub fn ack_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.network.ack_addr)
    }

    pub fn stream_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr(&self.network.stream_addr)
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr, ConfigError> {
    SocketAddr::from_str(addr)
        .map_err(|_| ConfigError::Validation(format!("Invalid socket address: '{addr}'")))
}

/// Loads `config.toml` from the working directory, writing the defaults out
/// first if no file exists yet.
pub fn handle() -> Result<Config, ConfigError> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);
    if config_path.exists() {
        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&config_content)?;
        config.validate()?;
        Ok(config)
    } else {
        let config = Config::default();
        save(&config, &config_path)?;
        Ok(config)
    }
}

fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let config_content = toml::to_string_pretty(config)?;
    let mut file = fs::File::create(path)?;
    file.write_all(config_content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.data_addr().unwrap().port(), 65432);
        assert_eq!(config.ack_addr().unwrap().port(), 65433);
    }

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.transfer.receive_window, 64_000);
    }

    #[test]
    fn malformed_address_is_rejected() {
        let mut config = Config::default();
        config.network.data_addr = "not-an-address".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = Config::default();
        config.transfer.receive_window = 0;
        assert!(config.validate().is_err());
    }
}
