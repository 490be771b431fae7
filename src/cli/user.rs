//! User administration.

use structopt::StructOpt;

use crate::{
    Result,
    audit::Actor,
    config::Config,
    db,
    models::user::User,
    permissions::PermissionBits,
};

#[derive(StructOpt)]
pub struct Opts {
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Add a new user
    #[structopt(name = "add")]
    Add(AddOpts),
    /// List all users
    #[structopt(name = "list")]
    List,
}

#[derive(StructOpt)]
struct AddOpts {
    /// User's email address
    email: String,
    /// User's display name
    #[structopt(long = "name", short = "n")]
    name: String,
    /// This user is an administrator
    #[structopt(long = "administrator")]
    is_super: bool,
    /// This user can approve and reject revisions
    #[structopt(long = "reviewer")]
    reviewer: bool,
}

pub fn main(cfg: &Config, opts: Opts) -> Result<()> {
    match opts.command {
        Command::Add(opts) => add_user(cfg, opts),
        Command::List => list_users(cfg),
    }
}

fn add_user(cfg: &Config, opts: AddOpts) -> Result<()> {
    let db = db::connect(cfg)?;

    let mut permissions = PermissionBits::EDIT_MANUAL;
    if opts.reviewer {
        permissions |= PermissionBits::REVIEW_DECISION;
    }

    let user = User::create(
        &db,
        Actor::System,
        &opts.email,
        &opts.name,
        opts.is_super,
        permissions,
    )?;

    println!("Created user {}", user.id);

    Ok(())
}

fn list_users(cfg: &Config) -> Result<()> {
    let db = db::connect(cfg)?;

    for user in User::all(&db)? {
        println!("{:4} {} <{}>", user.id, user.name, user.email);
    }

    Ok(())
}
