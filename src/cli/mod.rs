use std::{env, mem};
use structopt::StructOpt;

use crate::{Result, config::Config};

mod server;
mod user;

#[derive(StructOpt)]
struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Start the server
    #[structopt(name = "start")]
    Start,
    /// Manage users
    #[structopt(name = "user")]
    User(user::Opts),
}

pub fn main() -> Result<()> {
    let opts = Opts::from_args();
    let config = crate::config::load()?;

    setup_sentry(&config);
    setup_logging(&config.logging)?;

    // Run validation after sentry and logging setup so that they can catch
    // bugs in validation.
    config.validate()?;

    match opts.command {
        Command::Start => server::start(config),
        Command::User(opts) => user::main(config, opts),
    }
}

fn setup_sentry(config: &Config) {
    if let Some(ref sentry) = config.sentry {
        env::set_var("RUST_BACKTRACE", "1");
        mem::forget(sentry::init((sentry.dsn.as_str(), sentry::ClientOptions {
            trim_backtraces: true,
            debug: cfg!(debug_assertions),
            release: Some(env!("CARGO_PKG_VERSION").into()),
            server_name: Some(config.server.domain.clone().into()),
            .. Default::default()
        })));
        sentry::integrations::panic::register_panic_handler();
    }
}

fn setup_logging(config: &crate::config::Logging) -> Result<()> {
    let mut builder = env_logger::Builder::from_default_env();
    builder.filter_level(config.level);

    if let Some(level) = config.network {
        builder.filter_module("actix_web", level);
    }

    for (module, level) in &config.filters {
        builder.filter_module(&module, *level);
    }

    builder.try_init()?;
    Ok(())
}
