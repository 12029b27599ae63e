//! Command-line parsing.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use nitro_sw_core::Method;
use url::Url;

pub const USAGE: &str = "\
Usage: nitro-sw [--config PATH] [--store DIR] <command>

Commands:
  install              Populate the static and CDN caches
  activate             Delete caches from older versions
  fetch <URL> [METHOD] Handle one request the way the worker would
  route <URL>          Show which policy a URL gets
  caches               List caches and their entries
  bump <static|cdn|all> Advance cache versions in the config file
  help                 Show this message

Environment:
  RUST_LOG             Log filter (default: warn)
  NITRO_SW_LOG_DIR     Also write daily log files to this directory";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpTarget {
    Static,
    Cdn,
    All,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Install,
    Activate,
    Fetch { url: Url, method: Method },
    Route(Url),
    Caches,
    Bump(BumpTarget),
    Help,
}

#[derive(Debug)]
pub struct Args {
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
    pub command: Command,
}

impl Args {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut config = None;
        let mut store = None;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = Some(PathBuf::from(
                        args.next().ok_or_else(|| anyhow!("--config needs a path"))?,
                    ))
                }
                "--store" => {
                    store = Some(PathBuf::from(
                        args.next().ok_or_else(|| anyhow!("--store needs a directory"))?,
                    ))
                }
                "-h" | "--help" => positional.insert(0, "help".to_string()),
                flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
                _ => positional.push(arg),
            }
        }

        let command = Self::command(&positional)?;
        Ok(Self {
            config,
            store,
            command,
        })
    }

    fn command(positional: &[String]) -> Result<Command> {
        let Some((name, rest)) = positional.split_first() else {
            return Ok(Command::Help);
        };
        let command = match (name.as_str(), rest) {
            ("install", []) => Command::Install,
            ("activate", []) => Command::Activate,
            ("caches", []) => Command::Caches,
            ("help", _) => Command::Help,
            ("route", [url]) => Command::Route(parse_url(url)?),
            ("fetch", [url]) => Command::Fetch {
                url: parse_url(url)?,
                method: Method::GET,
            },
            ("fetch", [url, method]) => Command::Fetch {
                url: parse_url(url)?,
                method: Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                    .map_err(|_| anyhow!("Invalid method {}", method))?,
            },
            ("bump", [target]) => Command::Bump(match target.as_str() {
                "static" => BumpTarget::Static,
                "cdn" => BumpTarget::Cdn,
                "all" => BumpTarget::All,
                other => bail!("Unknown bump target {}", other),
            }),
            (name, _) => bail!("Unknown command or wrong arguments: {}", name),
        };
        Ok(command)
    }
}

fn parse_url(value: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| anyhow!("Invalid URL {}: {}", value, e))
}
