//! Command-line argument structures for `netloc-trapd`.

use std::net::{IpAddr, SocketAddr};

use clap::Parser;

use crate::config::{DEFAULT_MAX_MESSAGE_SIZE, DispatcherConfig};
use crate::manager::{SecurityProfile, SecuritySettings};
use crate::v3::{AuthProtocol, PrivProtocol};

/// Receive SNMP traps and informs and log them.
#[derive(Debug, Parser)]
#[command(name = "netloc-trapd", version, about)]
pub struct TrapdArgs {
    /// Local address to listen on.
    #[arg(short = 'b', long = "bind", default_value = "0.0.0.0:162")]
    pub bind: SocketAddr,

    /// Source IP to accept traps from. Repeatable.
    #[arg(short = 's', long = "source", value_name = "IP", required = true)]
    pub sources: Vec<IpAddr>,

    /// Largest datagram read from the socket.
    #[arg(long = "max-message-size", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    #[command(flatten)]
    pub v3: V3Args,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl TrapdArgs {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::traps()
            .bind_addr(self.bind)
            .max_message_size(self.max_message_size)
    }
}

/// SNMPv3 security profile for one sending engine.
#[derive(Debug, Parser)]
pub struct V3Args {
    /// Authoritative engine id of the sender, in hex.
    #[arg(short = 'e', long = "engine-id", requires = "username")]
    pub engine_id: Option<String>,

    /// Security name/username.
    #[arg(short = 'u', long = "username", requires = "engine_id")]
    pub username: Option<String>,

    /// Authentication protocol: MD5, SHA, SHA-224, SHA-256, SHA-384, SHA-512.
    #[arg(short = 'a', long = "auth-protocol")]
    pub auth_protocol: Option<AuthProtocol>,

    /// Authentication passphrase.
    #[arg(short = 'A', long = "auth-password")]
    pub auth_password: Option<String>,

    /// Privacy protocol: AES, AES-128, AES-192, AES-256.
    #[arg(short = 'x', long = "priv-protocol")]
    pub priv_protocol: Option<PrivProtocol>,

    /// Privacy passphrase.
    #[arg(short = 'X', long = "priv-password")]
    pub priv_password: Option<String>,
}

impl V3Args {
    pub fn is_v3(&self) -> bool {
        self.username.is_some()
    }

    /// Settings for the registrations. Empty unless a username was given;
    /// v1/v2c traps need none.
    pub fn security_settings(&self) -> Result<SecuritySettings, String> {
        let (Some(engine_id), Some(username)) = (&self.engine_id, &self.username) else {
            return Ok(SecuritySettings::new());
        };

        let mut profile = SecurityProfile::new(username.as_str());
        if let Some(proto) = self.auth_protocol {
            let pass = self
                .auth_password
                .as_ref()
                .ok_or("auth password required")?;
            profile = profile.auth(proto, pass.as_str());
        }
        if let Some(proto) = self.priv_protocol {
            let pass = self
                .priv_password
                .as_ref()
                .ok_or("priv password required")?;
            profile = profile.privacy(proto, pass.as_str());
        }
        SecuritySettings::new()
            .profile_hex(engine_id, profile)
            .map_err(|e| e.to_string())
    }
}

/// Logging flags.
#[derive(Debug, Parser)]
pub struct OutputArgs {
    /// Library debug logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Library trace logging (very verbose).
    #[arg(long = "trace", conflicts_with = "debug")]
    pub trace: bool,
}

impl OutputArgs {
    /// Install the fmt subscriber. `RUST_LOG` wins over the flags.
    pub fn init_tracing(&self) {
        use tracing_subscriber::EnvFilter;

        let default = if self.trace {
            "netloc=trace"
        } else if self.debug {
            "netloc=debug"
        } else {
            "netloc=info"
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
