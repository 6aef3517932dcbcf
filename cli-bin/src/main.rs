//! cbk CLI entry-point
//!
//! All heavy lifting lives in the `libcbk` crate; this file handles
//! argument parsing, logging and dispatch.

mod cli; // sub-command definitions and argument structs

use libcbk::{logging, Cbk};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use std::{env, io};
use tracing::debug;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    /* ── CLI parsing & logging ────────────────────────────────── */
    let args = Cli::parse();
    if args.verbose {
        env::set_var("RUST_LOG", "debug");
    }
    logging::init();

    /* ── commands that need no registry ───────────────────────── */
    match &args.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "cbk", &mut io::stdout());
            return Ok(());
        }
        Commands::Zip(a) => return cli::archive::zip(a),
        Commands::Unzip { archive, output } => return cli::archive::unzip(archive, output),
        Commands::Init { kind } => {
            let path = cli::task_file::write_template(*kind, &env::current_dir()?)?;
            println!(
                "Wrote {}; edit it, then run `cbk add -f {}`",
                path.display(),
                cli::task_file::TEMPLATE_NAME
            );
            return Ok(());
        }
        _ => {}
    }

    /* ── open registry (runs migrations) ──────────────────────── */
    let cbk = Cbk::open_default()?;
    debug!("registry at {}", cbk.config().db_path.display());

    /* ── command dispatch ─────────────────────────────────────── */
    match &args.command {
        Commands::Completions { .. }
        | Commands::Zip(_)
        | Commands::Unzip { .. }
        | Commands::Init { .. } => {} // handled above

        Commands::Add(a) => cli::task::add(&cbk, a)?,
        Commands::List => cli::task::list(&cbk)?,
        Commands::Show { task } => cli::task::show(&cbk, task)?,
        Commands::Edit(a) => cli::task::edit(&cbk, a)?,
        Commands::Delete(a) => cli::task::delete(&cbk, a)?,
        Commands::Export { task } => cli::task::export(&cbk, task.as_deref())?,
        Commands::Clear { yes } => cli::task::clear(&cbk, *yes)?,

        Commands::Run(a) => cli::run::run(&cbk, a)?,
        Commands::Log(a) => cli::run::log(&cbk, a)?,
        Commands::Unpack { version_id, output } => cli::run::unpack(&cbk, version_id, output)?,
    }

    Ok(())
}
