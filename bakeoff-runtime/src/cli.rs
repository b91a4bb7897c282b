use bakeoff::Params;
use bakeoff_core::{RunKind, DEFAULT_ROUTER_BASE};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "bakeoff", version, about = "Run HTTP load-test campaigns against competing backends")]
pub struct BakeoffCli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve parameters, run the collector and print the result envelope.
    Run(RunArgs),
    /// Execute a serialized run config and persist its artifact.
    #[command(hide = true)]
    Collect(CollectArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// query, seed, update or bulk
    pub kind: RunKind,

    /// Run parameter, repeatable: `-p reqs=10 -p engine=sql`.
    #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
    pub params: Vec<(String, String)>,

    /// JSON object of parameters, applied over `--param`.
    #[arg(long)]
    pub params_json: Option<String>,

    /// Directory receiving per-run directories.
    #[arg(long, env = "BAKEOFF_WORKDIR", default_value = ".")]
    pub workdir: PathBuf,

    /// Backend base URL, repeatable: `--base laravel=https://laravel-api.ddev.site`.
    #[arg(long = "base", value_parser = parse_base)]
    pub bases: Vec<(String, Url)>,

    #[arg(long, env = "BAKEOFF_BASE_PIMCORE")]
    pub pimcore_base: Option<Url>,

    #[arg(long, env = "BAKEOFF_BASE_SYMFONY")]
    pub symfony_base: Option<Url>,

    /// Send every call to a shared router, selecting the backend by Host header.
    #[arg(long, env = "BAKEOFF_ROUTER", num_args = 0..=1, default_missing_value = DEFAULT_ROUTER_BASE)]
    pub router: Option<Url>,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure_tls: bool,

    /// Collector wall-clock budget (`90`, `5m`), overriding the per-kind default.
    #[arg(long, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,
}

impl RunArgs {
    /// `--param` pairs with `--params-json` merged over them.
    pub fn params(&self) -> Result<Params, String> {
        let mut params: Params = self
            .params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();

        if let Some(json) = &self.params_json {
            match serde_json::from_str::<Value>(json) {
                Ok(Value::Object(extra)) => params.extend(extra),
                Ok(_) => return Err("--params-json must be a JSON object".to_string()),
                Err(err) => return Err(format!("--params-json: {err}")),
            }
        }

        Ok(params)
    }
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub artifact: PathBuf,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_base(s: &str) -> Result<(String, Url), String> {
    let (name, url) = parse_key_value(s)?;
    let url = Url::parse(&url).map_err(|err| format!("invalid URL for {name}: {err}"))?;
    Ok((name, url))
}

/// Bare numbers are seconds.
fn parse_timeout(s: &str) -> Result<Duration, String> {
    match s.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => humantime::parse_duration(s).map_err(|err| err.to_string()),
    }
}
