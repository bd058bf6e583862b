//! # CLI Module
//!
//! Operator tooling for inspecting how the engine sees a URL path, without
//! starting a server. The commands are exposed through the `t2ctl` binary.
//!
//! ## Commands
//!
//! ### `check-path`
//!
//! Classify a raw request path and print its decoded form:
//!
//! ```bash
//! t2ctl check-path '/a/%2e%2e/b'
//! ```
//!
//! ### `candidates`
//!
//! Print the convention plan and the ordered controller class candidates:
//!
//! ```bash
//! t2ctl candidates /blog/post/show --config config.yaml
//! ```
//!
//! ### `probe`
//!
//! Walk an application tree the way the resolver does and print the first
//! candidate whose defining file exists:
//!
//! ```bash
//! t2ctl probe /blog/post/show --app-root ./app
//! ```
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use t2engine::cli::{run_cli, Cli};
//! use clap::Parser;
//!
//! let cli = Cli::parse();
//! run_cli(cli, &mut std::io::stdout())?;
//! ```

mod commands;

#[cfg(test)]
mod tests;

pub use commands::{run_cli, Cli, Commands};
