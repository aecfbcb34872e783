// src/user_cli.rs
use crate::database::{DatabaseConfig, UserDirectory, UserRepository, ROLE_ADMIN, ROLE_USER};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "user-manager")]
#[command(about = "Manage accounts for the LinkData Formatter service")]
pub struct UserCli {
    #[command(subcommand)]
    pub command: UserCommand,

    #[arg(long, default_value = "data/linkform.db")]
    pub database_path: PathBuf,
}

#[derive(Subcommand)]
pub enum UserCommand {
    /// Initialize the database
    Init,
    /// Add a new account
    Add {
        name: String,
        email: String,
        password: String,
        #[arg(long)]
        admin: bool,
    },
    /// Remove an account by email
    Remove { email: String },
    /// List all accounts
    List,
    /// Check whether an email is registered
    Check { email: String },
}

pub async fn handle_user_command(cli: UserCli) -> Result<()> {
    let mut db_config = DatabaseConfig::new(cli.database_path.clone());
    db_config.init_pool().await?;
    db_config.migrate().await?;

    let pool = db_config.pool()?;
    let repo = UserRepository::new(pool);

    match cli.command {
        UserCommand::Init => {
            println!("✓ Database initialized at {}", cli.database_path.display());
        }

        UserCommand::Add {
            name,
            email,
            password,
            admin,
        } => {
            let role = if admin { ROLE_ADMIN } else { ROLE_USER };
            match repo.create(&name, &email, &password, role).await {
                Ok(user) => {
                    println!("✓ Account created:");
                    println!("   Name:  {}", user.name);
                    println!("   Email: {}", user.email);
                    println!("   Role:  {}", user.role);
                }
                Err(e) => {
                    if e.to_string().contains("UNIQUE constraint failed") {
                        println!("✗ Error: email '{}' already exists", email);
                    } else {
                        println!("✗ Error: {}", e);
                    }
                }
            }
        }

        UserCommand::Remove { email } => {
            if repo.remove(&email).await? {
                println!("✓ Removed account for {}", email);
            } else {
                println!("✗ No account found for {}", email);
            }
        }

        UserCommand::List => {
            let users = repo.list_all().await?;
            if users.is_empty() {
                println!("No accounts registered.");
            } else {
                println!("{} account(s):", users.len());
                for user in users {
                    println!(
                        "   {} <{}> role={} status={} processed={}",
                        user.name, user.email, user.role, user.status, user.profiles_processed
                    );
                }
            }

            let stats = UserDirectory::new(pool).stats().await?;
            println!(
                "Totals: {} users, {} active, {} profiles processed",
                stats.total_users, stats.active_users, stats.total_profiles_processed
            );
        }

        UserCommand::Check { email } => match repo.find_by_email(&email).await? {
            Some(user) => println!("✓ {} is registered (role={})", user.email, user.role),
            None => println!("✗ {} is not registered", email),
        },
    }

    Ok(())
}
