use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::convention::{candidates, plan, probe_file};
use crate::path;

/// Command-line interface for the t2 engine
#[derive(Parser)]
#[command(name = "t2ctl")]
#[command(about = "Inspect how t2engine resolves request paths", long_about = None)]
pub struct Cli {
    /// Log filter directives (overrides T2_LOG)
    #[arg(long, global = true)]
    pub log: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available `t2ctl` commands
#[derive(Subcommand)]
pub enum Commands {
    /// Report whether a raw request path is unsafe and show its decoded form
    CheckPath {
        /// Raw request path, escapes included
        path: String,
    },
    /// Print the convention plan and ordered class candidates for a path
    Candidates {
        /// Request path
        path: String,

        /// Configuration file (YAML or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Find the first candidate whose controller file exists on disk
    Probe {
        /// Request path
        path: String,

        /// Root of the default application tree
        #[arg(long)]
        app_root: PathBuf,

        /// Configuration file (YAML or TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn load_config(config: Option<&Path>) -> Result<Config> {
    match config {
        Some(p) => Config::load(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(Config::new()),
    }
}

/// Run a parsed command, writing its report to `out`.
///
/// Returns `Ok(false)` when the command completed but found nothing (an
/// unsafe path, no candidate on disk), so callers can map it to an exit code.
pub fn run_cli(cli: Cli, out: &mut dyn Write) -> Result<bool> {
    match cli.command {
        Commands::CheckPath { path: raw } => {
            let unsafe_path = path::is_unsafe(&raw);
            let decoded = path::decode(&raw)
                .map(|d| d.into_owned())
                .unwrap_or_else(|| "<invalid utf-8>".to_string());
            writeln!(out, "path:    {raw}")?;
            writeln!(out, "decoded: {decoded}")?;
            writeln!(out, "unsafe:  {unsafe_path}")?;
            Ok(!unsafe_path)
        }
        Commands::Candidates { path, config } => {
            let config = load_config(config.as_deref())?;
            let plan = plan(&path, &config);
            writeln!(out, "normalized: {}", plan.normalized)?;
            writeln!(out, "segment:    {:?}", plan.segment)?;
            writeln!(out, "root:       {}", plan.root_ns)?;
            writeln!(out, "suffix:     {:?}", plan.suffix)?;
            writeln!(out, "action index:")?;
            for c in candidates(&plan.root_ns, &plan.segments, &plan.suffix) {
                writeln!(out, "  {c}")?;
            }
            if let Some((action, rest)) = plan.segments.split_last().filter(|_| plan.segments.len() > 1) {
                writeln!(out, "action {action}:")?;
                for c in candidates(&plan.root_ns, rest, &plan.suffix) {
                    writeln!(out, "  {c}")?;
                }
            }
            Ok(true)
        }
        Commands::Probe { path, app_root, config } => {
            let config = load_config(config.as_deref())?;
            let plan = plan(&path, &config);
            let extension = config.str(&plan.segment, "app.controller_extension", "rs");
            let base = match config.alternate_root_path() {
                Some(p) if !plan.segment.is_empty() => PathBuf::from(p),
                _ => app_root,
            };

            let mut attempts = vec![("index".to_string(), plan.segments.clone())];
            if plan.segments.len() > 1 {
                if let Some((action, rest)) = plan.segments.split_last() {
                    attempts.push((action.clone(), rest.to_vec()));
                }
            }
            for (action, segments) in attempts {
                for class in candidates(&plan.root_ns, &segments, &plan.suffix) {
                    if let Some(file) = probe_file(&base, &class, extension) {
                        writeln!(out, "class:  {class}")?;
                        writeln!(out, "action: {action}")?;
                        writeln!(out, "file:   {}", file.display())?;
                        return Ok(true);
                    }
                }
            }
            writeln!(out, "no controller file for {path} under {}", base.display())?;
            Ok(false)
        }
    }
}
