//! deploykit - deployment toolkit CLI
//!
//! One-off access to the library operations deployment scripts compose:
//!
//! - `run`: execute a command on a target
//! - `render`: render a `{{ key }}` template
//! - `render-json`: deep-merge a patch into a JSON document
//! - `sync`: rsync a directory up to or down from a target
//! - `config-get`: read a key from a discovered config file
//! - `check-url`: verify a deployed service answers over HTTP
//! - `tag`: create a `deploy/<timestamp>` git tag

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Map, Value};
use tracing::info;

use deploykit_core::{
    render_json_template, render_template, tag_release, ConfigOptions, DeployConfig, HttpProbe,
    RunOptions, Session, SyncOptions, TagOptions, Target, TargetSpec,
};

#[derive(Parser)]
#[command(name = "deploykit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deployment scripting toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a command on a deployment target
    Run {
        /// The command to execute
        command: String,

        /// Deployment target
        #[arg(short, long, value_enum, default_value = "local")]
        target: Target,

        /// Remote host (host or host:port)
        #[arg(long, required_if_eq("target", "remote"))]
        host: Option<String>,

        /// Remote user
        #[arg(long, required_if_eq("target", "remote"))]
        user: Option<String>,

        /// Working directory for the command
        #[arg(short, long)]
        dir: Option<String>,

        /// Environment variables as NAME=VALUE (repeatable)
        #[arg(short, long = "env")]
        env: Vec<String>,

        /// Where this command applies
        #[arg(long, value_enum, default_value = "both")]
        on: TargetSpec,

        /// Report a non-zero exit instead of failing
        #[arg(long)]
        tolerate: bool,

        /// Print the composed command without executing it
        #[arg(long)]
        dry_run: bool,

        /// Timeout in seconds (local execution only, 0 = none)
        #[arg(long, default_value = "0")]
        timeout: u64,
    },

    /// Render a template file with {{ key }} placeholders
    Render {
        /// Template path (file name prefixed with `template_` unless
        /// --output is given)
        template: PathBuf,

        /// Context values as KEY=VALUE (repeatable)
        #[arg(short, long = "set")]
        set: Vec<String>,

        /// Output path (default: template path without the prefix)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Deep-merge a JSON patch into a JSON document
    RenderJson {
        /// Base JSON document
        data: PathBuf,

        /// Patch as an inline JSON object
        #[arg(short, long)]
        patch: String,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// rsync a directory up to or down from a target
    Sync {
        /// Transfer direction
        #[arg(value_enum)]
        direction: Direction,

        /// Source path
        source: String,

        /// Destination path
        dest: String,

        /// Deployment target
        #[arg(short, long, value_enum, default_value = "local")]
        target: Target,

        /// Remote host (host or host:port)
        #[arg(long, required_if_eq("target", "remote"))]
        host: Option<String>,

        /// Remote user
        #[arg(long, required_if_eq("target", "remote"))]
        user: Option<String>,

        /// Exclude pattern (repeatable)
        #[arg(long = "exclude")]
        excludes: Vec<String>,

        /// Delete files missing from the source
        #[arg(long)]
        delete: bool,

        /// Print the rsync invocation without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Read a key from a discovered config file
    ConfigGet {
        /// The key to read
        key: String,

        /// Config file name to discover (or a path to pin)
        #[arg(short, long, default_value = "deploy.toml")]
        file: String,

        /// Apply __devmode overrides
        #[arg(long)]
        devmode: bool,

        /// Directory to start the search from
        #[arg(long)]
        start_dir: Option<PathBuf>,

        /// Maximum parent directories to climb
        #[arg(long)]
        limit: Option<usize>,

        /// Treat the value as a comma-separated list, one item per line
        #[arg(long)]
        csv: bool,
    },

    /// Verify a deployed service answers over HTTP
    CheckUrl {
        /// URL to probe
        url: String,

        /// Expected status code
        #[arg(short, long, default_value = "200")]
        expect: u16,

        /// Seconds to wait before probing
        #[arg(short, long, default_value = "0")]
        delay: f64,
    },

    /// Create a deployment tag in a git repository
    Tag {
        /// Repository path
        #[arg(default_value = ".")]
        repo: PathBuf,

        /// Tag name (default: deploy/<timestamp>)
        #[arg(short, long)]
        name: Option<String>,

        /// Tag message
        #[arg(short, long)]
        message: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    /// From this machine to the target
    Up,
    /// From the target to this machine
    Down,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    deploykit_core::init_tracing(cli.json, cli.verbose);

    match cli.command {
        Commands::Run {
            command,
            target,
            host,
            user,
            dir,
            env,
            on,
            tolerate,
            dry_run,
            timeout,
        } => {
            cmd_run(
                &command,
                target,
                host.as_deref(),
                user.as_deref(),
                dir.as_deref(),
                &env,
                on,
                tolerate,
                dry_run,
                timeout,
            )
            .await
        }
        Commands::Render {
            template,
            set,
            output,
        } => cmd_render(&template, &set, output.as_deref()),
        Commands::RenderJson {
            data,
            patch,
            output,
        } => cmd_render_json(&data, &patch, &output),
        Commands::Sync {
            direction,
            source,
            dest,
            target,
            host,
            user,
            excludes,
            delete,
            dry_run,
        } => {
            cmd_sync(
                direction,
                &source,
                &dest,
                target,
                host.as_deref(),
                user.as_deref(),
                &excludes,
                delete,
                dry_run,
            )
            .await
        }
        Commands::ConfigGet {
            key,
            file,
            devmode,
            start_dir,
            limit,
            csv,
        } => cmd_config_get(&key, &file, devmode, start_dir, limit, csv),
        Commands::CheckUrl { url, expect, delay } => cmd_check_url(&url, expect, delay).await,
        Commands::Tag {
            repo,
            name,
            message,
            yes,
        } => cmd_tag(&repo, name, message, yes),
    }
}

/// Open a session for the requested target.
async fn build_session(target: Target, host: Option<&str>, user: Option<&str>) -> Result<Session> {
    match target {
        Target::Local => Ok(Session::local()),
        Target::Remote => {
            let host = host.context("--host is required for the remote target")?;
            let user = user.context("--user is required for the remote target")?;
            Session::connect(host, user)
                .await
                .with_context(|| format!("could not open ssh session to {user}@{host}"))
        }
    }
}

/// Split NAME=VALUE pairs, rejecting entries without a `=`.
fn parse_env_pairs(pairs: &[String]) -> Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .with_context(|| format!("invalid NAME=VALUE pair: `{pair}`"))
        })
        .collect()
}

/// Build a render context from KEY=VALUE pairs.
fn build_context(pairs: &[String]) -> Result<Map<String, Value>> {
    Ok(parse_env_pairs(pairs)?
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    command: &str,
    target: Target,
    host: Option<&str>,
    user: Option<&str>,
    dir: Option<&str>,
    env: &[String],
    on: TargetSpec,
    tolerate: bool,
    dry_run: bool,
    timeout: u64,
) -> Result<()> {
    let mut session = build_session(target, host, user).await?;
    for (name, value) in parse_env_pairs(env)? {
        session.set_env(&name, &value);
    }
    if let Some(dir) = dir {
        session
            .chdir(dir, on, false)
            .await
            .with_context(|| format!("could not change directory to `{dir}`"))?;
    }

    let mut opts = RunOptions::on(on).timeout(timeout);
    if tolerate {
        opts = opts.tolerant();
    }
    if dry_run {
        opts = opts.dry();
    }

    let res = session
        .run(command, opts)
        .await
        .context("command execution failed")?;

    if res.omitted {
        info!("command omitted for this target");
    } else if !dry_run {
        println!(
            "exit code {} ({}ms)",
            res.exit_code, res.duration_ms
        );
    }
    Ok(())
}

fn cmd_render(template: &PathBuf, set: &[String], output: Option<&std::path::Path>) -> Result<()> {
    let context = build_context(set)?;
    let rendered = render_template(template, &context, output)
        .with_context(|| format!("could not render {:?}", template))?;
    println!("rendered {} bytes from {:?}", rendered.len(), template);
    Ok(())
}

fn cmd_render_json(data: &PathBuf, patch: &str, output: &PathBuf) -> Result<()> {
    let patch: Value = serde_json::from_str(patch).context("--patch is not valid JSON")?;
    render_json_template(data, &patch, output)
        .with_context(|| format!("could not render {:?}", data))?;
    println!("wrote {:?}", output);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_sync(
    direction: Direction,
    source: &str,
    dest: &str,
    target: Target,
    host: Option<&str>,
    user: Option<&str>,
    excludes: &[String],
    delete: bool,
    dry_run: bool,
) -> Result<()> {
    let mut session = build_session(target, host, user).await?;
    let opts = SyncOptions {
        filters: excludes.iter().map(|e| format!("--exclude={e}")).collect(),
        delete,
        dry_run,
        ..SyncOptions::default()
    };

    let res = match direction {
        Direction::Up => session.upload(source, dest, &opts).await,
        Direction::Down => session.download(source, dest, &opts).await,
    }
    .context("sync failed")?;

    if !dry_run {
        println!("sync finished ({}ms)", res.duration_ms);
    }
    Ok(())
}

fn cmd_config_get(
    key: &str,
    file: &str,
    devmode: bool,
    start_dir: Option<PathBuf>,
    limit: Option<usize>,
    csv: bool,
) -> Result<()> {
    let opts = ConfigOptions {
        limit,
        devmode,
        start_dir,
    };
    let config = DeployConfig::discover(file, &opts).context("could not discover config")?;
    if csv {
        for item in config.get_csv(key)? {
            println!("{item}");
        }
    } else {
        println!("{}", config.get(key)?);
    }
    Ok(())
}

async fn cmd_check_url(url: &str, expect: u16, delay: f64) -> Result<()> {
    let probe = HttpProbe::new();
    let outcome = probe.ensure_response(url, expect, delay).await;
    if !outcome.is_ok() {
        anyhow::bail!("{url} did not answer with status {expect}");
    }
    Ok(())
}

fn cmd_tag(repo: &PathBuf, name: Option<String>, message: Option<String>, yes: bool) -> Result<()> {
    let opts = TagOptions {
        name,
        message,
        confirm: !yes,
    };
    match tag_release(repo, &opts).context("tagging failed")? {
        Some(tag) => info!(tag = %tag, "tag created"),
        None => info!("no tag created"),
    }
    Ok(())
}
