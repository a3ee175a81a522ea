/*!
 * aiobridge-manager
 *
 * Runs a manager server as its own OS process. Prints the bound address on
 * stdout as `listening on ADDR`, then serves until a client sends shutdown.
 */

use aiobridge::{init_tracing, BridgeConfig, ManagerServer};
use anyhow::{Context as _, Result};
use clap::Parser;
use std::io::Write;
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "aiobridge-manager")]
#[command(about = "Host shared synchronization primitives for other processes", long_about = None)]
#[command(version)]
struct Cli {
    /// Address to listen on, port 0 picks a free one
    /// [default: AIOBRIDGE_MANAGER_BIND or 127.0.0.1:0]
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,
}

impl Cli {
    fn bind_address(&self) -> SocketAddr {
        self.bind.unwrap_or(BridgeConfig::global().manager_bind)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let bind = cli.bind_address();
    let server = ManagerServer::bind(bind).with_context(|| format!("binding manager to {}", bind))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "listening on {}", server.address())?;
    stdout.flush()?;
    drop(stdout);

    info!(address = %server.address(), pid = std::process::id(), "Manager process ready");
    server.serve_forever()?;
    info!("Manager process exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_flag() {
        let cli = Cli::try_parse_from(["aiobridge-manager", "--bind", "127.0.0.1:4567"]).unwrap();
        assert_eq!(cli.bind_address(), "127.0.0.1:4567".parse().unwrap());
    }

    #[test]
    fn test_bind_defaults_to_config() {
        let cli = Cli::try_parse_from(["aiobridge-manager"]).unwrap();
        assert_eq!(cli.bind_address(), BridgeConfig::global().manager_bind);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(Cli::try_parse_from(["aiobridge-manager", "--bind", "nowhere"]).is_err());
        assert!(Cli::try_parse_from(["aiobridge-manager", "--port", "1"]).is_err());
    }
}
