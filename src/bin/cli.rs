//! CLI for inspecting and administering a directory node

use backupdir::DirectoryClient;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "backupdir")]
#[command(about = "backupdir directory node CLI")]
#[command(version)]
struct Cli {
    /// Directory server URL
    #[arg(long, default_value = "http://localhost:8000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show registry and store status
    Status,

    /// Ask for the next placement target (advances the cursor)
    NextServer,

    /// Register a storage server
    RegisterServer {
        /// Server id
        #[arg(long)]
        id: u64,

        /// Network address
        #[arg(long)]
        address: String,
    },

    /// Unregister a storage server and drop its file records
    UnregisterServer {
        /// Server id
        #[arg(long)]
        id: u64,
    },

    /// Show stored credentials of an account
    Lookup {
        /// Username
        username: String,
    },

    /// Servers holding primaries for a user
    ActiveServers {
        #[arg(long)]
        user: u64,
    },

    /// List primary files under directory prefixes
    List {
        #[arg(long)]
        user: u64,

        /// Directory prefixes
        #[arg(required = true)]
        prefixes: Vec<String>,
    },

    /// Servers other than the requester holding a backup of a path
    Backups {
        #[arg(long)]
        user: u64,

        #[arg(long)]
        path: String,

        /// Requesting server id
        #[arg(long)]
        requester: u64,
    },

    /// Replica hashes of a path (backups first)
    Hashes {
        #[arg(long)]
        user: u64,

        #[arg(long)]
        path: String,
    },

    /// Remove every replica record of a path
    Remove {
        #[arg(long)]
        user: u64,

        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let client = DirectoryClient::new(cli.server)?;

    match cli.command {
        Commands::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::NextServer => {
            let address = client.next_server().await?;
            if address.is_empty() {
                println!("No storage server registered");
            } else {
                println!("{}", address);
            }
        }

        Commands::RegisterServer { id, address } => {
            let ok = client.register_server(id, &address).await?;
            println!("register server {}: {}", id, if ok { "ok" } else { "rejected" });
        }

        Commands::UnregisterServer { id } => {
            client.unregister_server(id).await?;
            println!("server {} unregistered", id);
        }

        Commands::Lookup { username } => match client.lookup_credentials(&username).await? {
            Some(creds) => {
                println!("id:   {}", creds.id);
                println!("hash: {}", creds.password_hash);
                println!("salt: {}", creds.salt);
            }
            None => println!("No account named {}", username),
        },

        Commands::ActiveServers { user } => {
            for address in client.active_servers_for(user).await? {
                println!("{}", address);
            }
        }

        Commands::List { user, prefixes } => {
            for entry in client.list_files(user, prefixes).await? {
                println!("{}\t{}", entry.last_modified, entry.filename);
            }
        }

        Commands::Backups {
            user,
            path,
            requester,
        } => {
            for address in client.backup_servers_for(requester, user, &path).await? {
                println!("{}", address);
            }
        }

        Commands::Hashes { user, path } => {
            for replica in client.hashes_for(user, &path).await? {
                println!("{}\t{}", replica.hash, replica.address);
            }
        }

        Commands::Remove { user, path } => {
            let ok = client.remove_file(user, &path).await?;
            println!("remove {}: {}", path, if ok { "ok" } else { "failed" });
        }
    }

    Ok(())
}
