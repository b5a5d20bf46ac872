use std::path::Path;

use clap::Subcommand;
use rand::{Rng, distr::Alphanumeric};

use crate::users::UserStore;

const GENERATED_PASSWORD_LENGTH: usize = 16;

#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Dashboard user related commands
    #[command(subcommand)]
    User(UserCommands),
}

#[derive(Debug, Subcommand)]
pub enum UserCommands {
    /// List all users
    #[clap(visible_alias("ls"))]
    List,
    /// Add a new user with a generated password
    #[clap(visible_alias("a"))]
    Add { username: String },
    /// Remove a user
    #[clap(visible_alias("rm"))]
    Remove { username: String },
    /// Generate a new password for an existing user
    Passwd { username: String },
}

pub async fn admin(command: AdminCommands, users_file: &Path) -> anyhow::Result<()> {
    let mut users = UserStore::load_or_default(users_file).await?;

    match command {
        AdminCommands::User(user_command) => match user_command {
            UserCommands::List => list_users(&users),
            UserCommands::Add { username } => {
                if users.contains(&username) {
                    anyhow::bail!("user '{username}' already exists, use `passwd` to reset");
                }
                let password = set_generated_password(&mut users, &username)?;
                users.save(users_file).await?;
                println!("User '{username}' added successfully.");
                println!("Password: {password}");
            }
            UserCommands::Remove { username } => {
                if users.remove(&username) {
                    users.save(users_file).await?;
                    println!("User '{username}' removed successfully.");
                } else {
                    println!("No user named '{username}'.");
                }
            }
            UserCommands::Passwd { username } => {
                if !users.contains(&username) {
                    anyhow::bail!("no user named '{username}'");
                }
                let password = set_generated_password(&mut users, &username)?;
                users.save(users_file).await?;
                println!("Password for '{username}' changed.");
                println!("Password: {password}");
            }
        },
    }

    Ok(())
}

fn list_users(users: &UserStore) {
    if users.is_empty() {
        println!("No users.");
    }
    for name in users.names() {
        println!("{name}");
    }
}

fn set_generated_password(users: &mut UserStore, username: &str) -> anyhow::Result<String> {
    let password = generate_password();
    users.set_password(username, &password)?;
    Ok(password)
}

fn generate_password() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}
