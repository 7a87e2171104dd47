//! Command-line front end for the `servecheck` binary.
//!
//! Run settings are layered defaults, `.servecheck.toml`, `SERVECHECK_*`
//! environment variables, then flags. Subcommand arguments are merged the
//! same way through their own `cmds` section.

#![expect(
    clippy::shadow_reuse,
    reason = "merged arguments replace the parsed ones"
)]
#![expect(
    clippy::print_stdout,
    reason = "verdicts are the command's user-facing output"
)]

use std::{ffi::OsString, fs, path::Path, process::ExitCode, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::{CommandFactory, Parser};
pub use cli_defs::{CheckConfig, Cli, Commands, EqualArgs, SatisfiesArgs};
use ortho_config::{OrthoConfig, load_and_merge_subcommand_for};
use tracing::info;
use url::Url;

use crate::{
    api::{ApiDescription, ApiNode},
    equivalence::{ResponseEquality, equality_by_name, ignoring_headers, servers_equal},
    generator::cycling_sizes,
    predicate::{Predicate, by_name, never_5xx},
    runner::{CheckOptions, server_satisfies},
};

/// Exit status for fatal errors.
pub const FATAL_EXIT: u8 = 2;

const DEFAULT_EQUALITY: &str = "bytes";

/// Outcome of a completed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The property held for every trial.
    Holds,
    /// A counterexample was found.
    Fails,
}

impl Verdict {
    /// Process exit status for this verdict.
    #[must_use]
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Holds => ExitCode::SUCCESS,
            Self::Fails => ExitCode::from(1),
        }
    }
}

impl From<&CheckConfig> for CheckOptions {
    fn from(config: &CheckConfig) -> Self {
        Self {
            trial_count: config.trial_count,
            max_shrink_steps: config.max_shrink_steps,
            size_schedule: cycling_sizes(config.max_size),
            seed: config.seed,
            stop_on_first_failure: !config.exhaustive,
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
            ..Self::default()
        }
    }
}

/// Parse the process arguments and run the selected check.
///
/// # Errors
///
/// Returns any error from configuration loading, reading the API file or a
/// fatal failure of the run itself.
pub async fn run() -> Result<Verdict> {
    let args: Vec<OsString> = std::env::args_os().collect();
    let cli = Cli::parse_from(&args);
    let config = CheckConfig::load_from_iter(global_args(&args).iter().cloned())
        .context("failed to load run settings")?;
    dispatch(cli.command, &config).await
}

/// Run `command` with the layered `config`.
///
/// # Errors
///
/// See [`run`].
pub async fn dispatch(command: Commands, config: &CheckConfig) -> Result<Verdict> {
    let options = CheckOptions::from(config);
    match command {
        Commands::Satisfies(args) => {
            let args = load_and_merge_subcommand_for::<SatisfiesArgs>(&args)?;
            run_satisfies(args, &options).await
        }
        Commands::Equal(args) => {
            let args = load_and_merge_subcommand_for::<EqualArgs>(&args)?;
            run_equal(args, &options).await
        }
    }
}

/// Arguments preceding the subcommand name, which carry the run settings.
fn global_args(args: &[OsString]) -> &[OsString] {
    let command = Cli::command();
    let end = args
        .iter()
        .skip(1)
        .position(|arg| {
            command
                .get_subcommands()
                .any(|sub| arg.as_os_str() == sub.get_name())
        })
        .map_or(args.len(), |index| index + 1);
    args.get(..end).unwrap_or(args)
}

async fn run_satisfies(args: SatisfiesArgs, options: &CheckOptions) -> Result<Verdict> {
    let description = load_api(&required(args.api, "--api")?)?;
    let url = parse_url(&required(args.url, "--url")?)?;
    let predicate = predicate_from_names(&args.predicates)?;
    info!(
        endpoints = description.endpoints().len(),
        %url,
        predicates = ?predicate.names(),
        "checking server"
    );
    let result = server_satisfies(&description, &url, options, &predicate).await?;
    println!("{result}");
    Ok(if result.is_passed() {
        Verdict::Holds
    } else {
        Verdict::Fails
    })
}

async fn run_equal(args: EqualArgs, options: &CheckOptions) -> Result<Verdict> {
    let description = load_api(&required(args.api, "--api")?)?;
    let left = parse_url(&required(args.url_a, "--url-a")?)?;
    let right = parse_url(&required(args.url_b, "--url-b")?)?;
    let equality = equality_from_args(args.equality.as_deref(), &args.ignore_headers)?;
    info!(endpoints = description.endpoints().len(), %left, %right, "comparing servers");
    let result = servers_equal(&description, &left, &right, options, equality.as_ref()).await?;
    println!("{result}");
    Ok(if result.is_equivalent() {
        Verdict::Holds
    } else {
        Verdict::Fails
    })
}

fn required(value: Option<String>, flag: &str) -> Result<String> {
    value.ok_or_else(|| anyhow!("missing {flag}"))
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid URL {raw}"))
}

/// Read and translate a JSON route tree.
///
/// # Errors
///
/// Fails when the file cannot be read, is not a route tree or describes an
/// API that cannot be translated.
pub fn load_api(path: impl AsRef<Path>) -> Result<ApiDescription> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read API file {}", path.display()))?;
    let root: ApiNode = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid route tree", path.display()))?;
    ApiDescription::build(&root).with_context(|| format!("cannot translate {}", path.display()))
}

fn predicate_from_names(names: &[String]) -> Result<Predicate> {
    if names.is_empty() {
        return Ok(never_5xx());
    }
    names
        .iter()
        .map(|name| by_name(name).ok_or_else(|| anyhow!("unknown predicate {name}")))
        .collect::<Result<Vec<_>>>()
        .map(Predicate::all)
}

fn equality_from_args(
    name: Option<&str>,
    ignored_headers: &[String],
) -> Result<Box<dyn ResponseEquality>> {
    if !ignored_headers.is_empty() {
        if name.is_some_and(|name| name != DEFAULT_EQUALITY) {
            bail!("--ignore-header only combines with the bytes equality");
        }
        return Ok(Box::new(ignoring_headers(ignored_headers.to_vec())));
    }
    let name = name.unwrap_or(DEFAULT_EQUALITY);
    equality_by_name(name).ok_or_else(|| anyhow!("unknown equality {name}"))
}
