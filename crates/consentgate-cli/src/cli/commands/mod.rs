use super::args::*;

pub mod cache;
pub mod policy;
pub mod simulate;
mod simulate_script;

use crate::exit_codes::SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Policy(args) => match args.cmd {
            PolicyCommand::Validate(a) => policy::validate(a),
        },
        Command::Cache(args) => match args.cmd {
            CacheCommand::Inspect(a) => cache::inspect(a).await,
            CacheCommand::Purge(a) => cache::purge(a).await,
        },
        Command::Simulate(args) => simulate::run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
