use crate::cli::actions::Action;
use anyhow::Result;
use std::path::PathBuf;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        config: matches
            .get_one::<PathBuf>("config")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --config"))?,
        port: matches.get_one::<u16>("port").copied(),
    })
}
