//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;

/// Writes a completion script for the given shell to stdout.
pub fn cmd_completions(shell: Shell) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "fleetmon", &mut std::io::stdout());
}
