//! Command-line configuration and validation.

use std::net::IpAddr;
use std::path::PathBuf;

pub use clap::Parser;
use thiserror::Error;

use crate::crypto::{Psk, PskError};

/// A configuration that cannot be acted upon.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ConfigurationError(String);

impl ConfigurationError {
    fn new(msg: &str) -> ConfigurationError {
        ConfigurationError(msg.to_string())
    }
}

/// linkbird command-line configuration.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Configuration {
    /// Enable the passive responder role
    #[arg(long)]
    pub responder: bool,

    /// Local address the responder listens on
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_addr: IpAddr,

    /// UDP port the responder listens on
    #[arg(long, default_value_t = 3322)]
    pub listen_port: u16,

    /// Point-to-point interface to probe (repeatable)
    #[arg(short = 'i', long = "interface")]
    pub interfaces: Vec<String>,

    /// Explicit peer address for an interface, as IFNAME=ADDR (repeatable).
    /// Overrides the interface's destination-address lookup
    #[arg(long = "peer", value_name = "IFNAME=ADDR")]
    pub peers: Vec<String>,

    /// UDP port the remote responders listen on
    #[arg(long, default_value_t = 3322)]
    pub peer_port: u16,

    /// Pings per measurement cycle
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    /// Spacing between pings of one burst, in milliseconds
    #[arg(long, default_value_t = 100)]
    pub ping_interval_ms: u64,

    /// Base timeout for stat retries, in seconds
    #[arg(long, default_value_t = 3)]
    pub stat_timeout: u64,

    /// Seconds between measurement cycles
    #[arg(long, default_value_t = 600)]
    pub test_interval: u64,

    /// Where to write the rendered bird config
    #[arg(long, default_value = "./bird-latency.conf")]
    pub bird_output: PathBuf,

    /// Command to reload bird after writing the config,
    /// e.g. "/usr/bin/birdc configure"
    #[arg(long)]
    pub bird_reload_cmd: Option<String>,

    /// Pre-shared key as a hex string
    #[arg(long, conflicts_with = "psk_file")]
    pub psk: Option<String>,

    /// File containing the pre-shared key (hex or raw bytes)
    #[arg(long)]
    pub psk_file: Option<PathBuf>,

    /// Run a single measurement cycle, print results as JSON and exit
    #[arg(long)]
    pub oneshot: bool,
}

impl Configuration {
    /// Checks cross-field consistency that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.psk.is_none() && self.psk_file.is_none() {
            return Err(ConfigurationError::new(
                "a pre-shared key is required (--psk or --psk-file)",
            ));
        }
        if self.interfaces.is_empty() && !self.responder {
            return Err(ConfigurationError::new(
                "nothing to do: no interfaces to probe and responder disabled",
            ));
        }
        if self.count == 0 {
            return Err(ConfigurationError::new("--count must be at least 1"));
        }
        if self.test_interval == 0 {
            return Err(ConfigurationError::new(
                "--test-interval must be at least 1 second",
            ));
        }
        for entry in &self.peers {
            if parse_peer_entry(entry).is_none() {
                return Err(ConfigurationError(format!(
                    "--peer expects IFNAME=ADDR, got \"{}\"",
                    entry
                )));
            }
        }
        Ok(())
    }

    /// The configured peer address override for `ifname`, if any.
    pub fn peer_override(&self, ifname: &str) -> Option<IpAddr> {
        self.peers
            .iter()
            .filter_map(|entry| parse_peer_entry(entry))
            .find_map(|(name, addr)| (name == ifname).then_some(addr))
    }

    /// Loads the pre-shared key from whichever source is configured.
    ///
    /// # Errors
    /// Propagates key parsing failures; `validate()` already guarantees one
    /// of the two sources is present.
    pub fn load_psk(&self) -> Result<Psk, PskError> {
        if let Some(ref hex_key) = self.psk {
            return Psk::from_hex(hex_key);
        }
        if let Some(ref path) = self.psk_file {
            return Psk::from_file(path);
        }
        Err(PskError::KeyTooShort(0))
    }
}

fn parse_peer_entry(entry: &str) -> Option<(&str, IpAddr)> {
    let (name, addr) = entry.split_once('=')?;
    if name.is_empty() {
        return None;
    }
    Some((name, addr.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_conf() -> Configuration {
        Configuration::parse_from([
            "linkbird",
            "-i",
            "tun0",
            "--psk",
            "0123456789abcdef0123456789abcdef",
        ])
    }

    #[test]
    fn validate_accepts_probing_configuration() {
        let conf = base_conf();
        assert!(conf.validate().is_ok());
        assert_eq!(conf.interfaces, vec!["tun0"]);
        assert_eq!(conf.peer_port, 3322);
        assert_eq!(conf.count, 5);
        assert_eq!(conf.test_interval, 600);
    }

    #[test]
    fn validate_rejects_missing_psk() {
        let conf = Configuration::parse_from(["linkbird", "-i", "tun0"]);
        assert!(conf.validate().is_err());
    }

    #[test]
    fn validate_rejects_idle_configuration() {
        let conf = Configuration::parse_from([
            "linkbird",
            "--psk",
            "0123456789abcdef0123456789abcdef",
        ]);
        assert!(conf.validate().is_err());
    }

    #[test]
    fn validate_accepts_responder_only() {
        let conf = Configuration::parse_from([
            "linkbird",
            "--responder",
            "--psk",
            "0123456789abcdef0123456789abcdef",
        ]);
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_count() {
        let mut conf = base_conf();
        conf.count = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn peer_override_maps_interface_to_address() {
        let conf = Configuration::parse_from([
            "linkbird",
            "-i",
            "tun0",
            "--peer",
            "tun0=10.9.9.2",
            "--psk",
            "0123456789abcdef0123456789abcdef",
        ]);
        assert!(conf.validate().is_ok());
        assert_eq!(
            conf.peer_override("tun0"),
            Some("10.9.9.2".parse().unwrap())
        );
        assert_eq!(conf.peer_override("tun1"), None);
    }

    #[test]
    fn validate_rejects_malformed_peer_entries() {
        for bad in ["tun0", "tun0=not-an-ip", "=10.9.9.2"] {
            let mut conf = base_conf();
            conf.peers = vec![bad.to_string()];
            assert!(conf.validate().is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn load_psk_from_hex() {
        let conf = base_conf();
        let psk = conf.load_psk().unwrap();
        // same key as decoding the hex directly
        let expected = Psk::from_hex("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(psk.tag(b"data"), expected.tag(b"data"));
    }

    #[test]
    fn load_psk_rejects_bad_hex() {
        let mut conf = base_conf();
        conf.psk = Some("zz".to_string());
        assert!(conf.load_psk().is_err());
    }
}
