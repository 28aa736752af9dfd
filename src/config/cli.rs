//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::FileConfig;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mtls-proxy")]
#[command(version, about = "Mutual-TLS terminating proxy with zero-downtime reload", long_about = None)]
pub struct Cli {
    /// Address and port to listen on
    #[arg(long, value_name = "HOST:PORT")]
    pub listen: Option<String>,

    /// Address to forward connections to
    #[arg(long, value_name = "HOST:PORT")]
    pub target: Option<String>,

    /// Expected client organizational unit name (can be repeated)
    #[arg(long = "client", value_name = "OU")]
    pub clients: Vec<String>,

    /// Path to private key file (PEM)
    #[arg(long, value_name = "PATH")]
    pub key: Option<PathBuf>,

    /// Path to certificate chain file (PEM/X509)
    #[arg(long, value_name = "PATH")]
    pub cert: Option<PathBuf>,

    /// Path to certificate authority bundle file (PEM/X509)
    #[arg(long, value_name = "PATH")]
    pub cacert: Option<PathBuf>,

    /// Send logs to syslog instead of stderr
    #[arg(long)]
    pub syslog: bool,

    /// Stop waiting for open connections after this many seconds on shutdown
    #[arg(long, value_name = "SECS")]
    pub drain_timeout: Option<u64>,

    /// TOML file providing defaults for the flags above
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Send SIGTERM to parent after startup (internal)
    #[arg(long, hide = true)]
    pub graceful: bool,
}

impl Cli {
    /// Flags that were actually given, in config-file shape.
    pub fn overrides(&self) -> FileConfig {
        FileConfig {
            listen: self.listen.clone(),
            target: self.target.clone(),
            clients: self.clients.clone(),
            key: self.key.clone(),
            cert: self.cert.clone(),
            cacert: self.cacert.clone(),
            syslog: self.syslog.then_some(true),
            drain_timeout_secs: self.drain_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_clients() {
        let cli = Cli::try_parse_from([
            "mtls-proxy",
            "--listen",
            "127.0.0.1:9443",
            "--target",
            "127.0.0.1:8080",
            "--client",
            "ops",
            "--client",
            "deploy",
            "--key",
            "key.pem",
            "--cert",
            "cert.pem",
            "--cacert",
            "ca.pem",
        ])
        .unwrap();

        assert_eq!(cli.clients, vec!["ops", "deploy"]);
        assert!(!cli.graceful);
        assert!(!cli.syslog);
    }

    #[test]
    fn accepts_hidden_graceful_flag() {
        let cli = Cli::try_parse_from(["mtls-proxy", "--graceful", "--syslog"]).unwrap();
        assert!(cli.graceful);
        assert_eq!(cli.overrides().syslog, Some(true));
    }

    #[test]
    fn absent_syslog_does_not_override_file() {
        let cli = Cli::try_parse_from(["mtls-proxy"]).unwrap();
        assert_eq!(cli.overrides(), FileConfig::default());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
