//! FileDepot
//!
//! Command-line front end for scoped file operations and share links.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use server::model::Permissions;
use server::router::{ApiRequest, ApiResponse, Method, HOOK_ERROR_HEADER, RESOURCES_PREFIX, SHARE_PREFIX};
use server::{ApiRouter, Config, JsonShareStore, ResourceEngine, ShareService, User, UserStore};
use tracing_subscriber::EnvFilter;

/// FileDepot - path-scoped file operations and share links.
#[derive(Parser, Debug)]
#[command(name = "filedepot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// User to act as
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Manage users
    #[command(subcommand)]
    Users(UsersCommands),

    /// List a directory or describe a file
    Ls {
        /// Scope-relative path
        #[arg(default_value = "/")]
        path: String,

        /// Sort key (name, size)
        #[arg(long)]
        sort: Option<String>,

        /// Sort order (asc, desc)
        #[arg(long)]
        order: Option<String>,

        /// Compute a checksum (md5, sha1, sha256, sha512)
        #[arg(long)]
        checksum: Option<String>,
    },

    /// Upload a file
    Put {
        /// Scope-relative destination path
        path: String,

        /// Local file to read (defaults to stdin)
        #[arg(long, value_name = "FILE")]
        from: Option<PathBuf>,

        /// Replace the file if it exists
        #[arg(long)]
        overwrite: bool,
    },

    /// Create a directory
    Mkdir {
        /// Scope-relative path
        path: String,
    },

    /// Delete a file or directory
    Rm {
        /// Scope-relative path
        path: String,
    },

    /// Rename or move a file or directory
    Mv {
        /// Source path
        src: String,
        /// Destination path
        dst: String,
    },

    /// Copy a file or directory
    Cp {
        /// Source path
        src: String,
        /// Destination path
        dst: String,
    },

    /// Manage share links
    #[command(subcommand)]
    Share(ShareCommands),
}

/// Subcommands for user management.
#[derive(Subcommand, Debug, Clone)]
pub enum UsersCommands {
    /// Add a user
    Add {
        /// Username
        username: String,

        /// Root directory the user is confined to
        #[arg(long)]
        scope: PathBuf,

        /// Password
        #[arg(long)]
        password: Option<String>,

        /// Grant every permission
        #[arg(long)]
        admin: bool,

        /// Permissions to grant (create, rename, modify, delete, share, download, execute)
        #[arg(long, value_delimiter = ',')]
        perm: Vec<String>,

        /// Commands the user may run
        #[arg(long = "command", value_name = "NAME")]
        commands: Vec<String>,
    },

    /// List users
    List,

    /// Remove a user
    Remove {
        /// Username
        username: String,
    },
}

/// Subcommands for share links.
#[derive(Subcommand, Debug, Clone)]
pub enum ShareCommands {
    /// List live links for a path
    List {
        /// Scope-relative path
        path: String,
    },

    /// Create a link for a path
    Create {
        /// Scope-relative path
        path: String,

        /// Expire after this many units
        #[arg(long)]
        expires: Option<String>,

        /// Expiry unit (seconds, minutes, hours, days)
        #[arg(long)]
        unit: Option<String>,
    },

    /// Delete a link by its hash
    Delete {
        /// Link hash
        hash: String,
    },

    /// Look up a live link by its hash
    Show {
        /// Link hash
        hash: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env_overrides();

    // Initialize tracing: RUST_LOG wins over flags and config
    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.server.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;
    tracing::debug!(data_dir = %config.server.data_dir.display(), "Configuration loaded");

    let users = Arc::new(UserStore::new(config.users_path()));
    users.load()?;

    let command = match cli.command {
        Commands::Users(cmd) => return run_users(&users, cmd),
        other => other,
    };

    let store = JsonShareStore::open(config.shares_path())
        .with_context(|| format!("Failed to open share store: {}", config.shares_path().display()))?;
    let shares = ShareService::new(Arc::new(store), config.server.base_url.clone())
        .with_token_bytes(config.share.token_bytes);

    // Public lookups need no user
    if let Commands::Share(ShareCommands::Show { hash }) = &command {
        return show_link(&shares, hash);
    }

    let username = cli
        .user
        .clone()
        .context("--user is required for file and share commands")?;

    let engine = ResourceEngine::new(config.runner()).with_max_text_size(config.files.max_text_size);
    let router = ApiRouter::new(users, engine, Arc::new(shares));

    let request = build_request(command)?.user(username);
    let response = router.route(request).await;
    report(&response)
}

fn run_users(users: &UserStore, cmd: UsersCommands) -> anyhow::Result<()> {
    match cmd {
        UsersCommands::Add {
            username,
            scope,
            password,
            admin,
            perm,
            commands,
        } => {
            let scope = std::path::absolute(&scope)
                .with_context(|| format!("Invalid scope: {}", scope.display()))?;

            let mut permissions = if admin {
                Permissions::all()
            } else {
                parse_permissions(&perm)?
            };
            permissions.commands = commands;

            let mut user = User::new(username, scope).with_permissions(permissions);
            if let Some(password) = password {
                user.set_password(&password)
                    .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?;
            }

            let user = users.add(user)?;
            users.save()?;
            println!(
                "Added user {} (id {}) with scope {}",
                user.username,
                user.id,
                user.scope.display()
            );
        }
        UsersCommands::List => {
            let list = users.list()?;
            if list.is_empty() {
                println!("No users registered.");
            } else {
                println!("Registered users:");
                for user in list {
                    println!(
                        "  {:>3}  {}  {}{}",
                        user.id,
                        user.username,
                        user.scope.display(),
                        if user.perm.admin { "  (admin)" } else { "" }
                    );
                }
            }
        }
        UsersCommands::Remove { username } => match users.remove(&username)? {
            Some(_) => {
                users.save()?;
                println!("Removed user {}", username);
            }
            None => anyhow::bail!("User {} not found", username),
        },
    }
    Ok(())
}

/// Print a live link, or fail if it is unknown or expired.
fn show_link(shares: &ShareService, hash: &str) -> anyhow::Result<()> {
    let link = shares
        .resolve(hash)
        .map_err(|e| anyhow::anyhow!("Failed to look up share link: {}", e))?
        .with_context(|| format!("Share link {} not found or expired", hash))?;

    println!("{}", shares.url_for(&link));
    println!("{}", serde_json::to_string_pretty(&link)?);
    Ok(())
}

/// Parse permission names into flags.
fn parse_permissions(names: &[String]) -> anyhow::Result<Permissions> {
    let mut perm = Permissions::read_only();
    for name in names {
        match name.trim() {
            "create" => perm.create = true,
            "rename" => perm.rename = true,
            "modify" | "edit" => perm.modify = true,
            "delete" => perm.delete = true,
            "share" => perm.share = true,
            "download" => perm.download = true,
            "execute" => perm.execute = true,
            "" => {}
            other => anyhow::bail!("Unknown permission: {}", other),
        }
    }
    Ok(perm)
}

/// Ensure a user-supplied path starts with a separator.
fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Translate a file or share command into an API request.
fn build_request(command: Commands) -> anyhow::Result<ApiRequest> {
    let resource = |path: &str| format!("{}{}", RESOURCES_PREFIX, rooted(path));

    let request = match command {
        Commands::Ls {
            path,
            sort,
            order,
            checksum,
        } => {
            let mut req = ApiRequest::new(Method::Get, resource(&path));
            if let Some(sort) = sort {
                req = req.query("sort", sort);
            }
            if let Some(order) = order {
                req = req.query("order", order);
            }
            if let Some(checksum) = checksum {
                req = req.query("checksum", checksum);
            }
            req
        }
        Commands::Put {
            path,
            from,
            overwrite,
        } => {
            let body = match &from {
                Some(file) => std::fs::read(file)
                    .with_context(|| format!("Failed to read {}", file.display()))?,
                None => {
                    let mut body = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut body)
                        .context("Failed to read stdin")?;
                    body
                }
            };
            let method = if overwrite { Method::Put } else { Method::Post };
            ApiRequest::new(method, resource(&path)).body(body)
        }
        Commands::Mkdir { path } => {
            let path = format!("{}/", rooted(&path).trim_end_matches('/'));
            ApiRequest::new(Method::Post, format!("{}{}", RESOURCES_PREFIX, path))
        }
        Commands::Rm { path } => ApiRequest::new(Method::Delete, resource(&path)),
        Commands::Mv { src, dst } => ApiRequest::new(Method::Patch, resource(&src))
            .query("destination", rooted(&dst))
            .query("action", "rename"),
        Commands::Cp { src, dst } => ApiRequest::new(Method::Patch, resource(&src))
            .query("destination", rooted(&dst))
            .query("action", "copy"),
        Commands::Share(ShareCommands::List { path }) => {
            ApiRequest::new(Method::Get, format!("{}{}", SHARE_PREFIX, rooted(&path)))
        }
        Commands::Share(ShareCommands::Create {
            path,
            expires,
            unit,
        }) => {
            let mut req = ApiRequest::new(Method::Post, format!("{}{}", SHARE_PREFIX, rooted(&path)));
            if let Some(expires) = expires {
                req = req.query("expires", expires);
            }
            if let Some(unit) = unit {
                req = req.query("unit", unit);
            }
            req
        }
        Commands::Share(ShareCommands::Delete { hash }) => {
            ApiRequest::new(Method::Delete, format!("{}/{}", SHARE_PREFIX, hash))
        }
        Commands::Users(_) | Commands::Share(ShareCommands::Show { .. }) => {
            anyhow::bail!("Command is not an API request")
        }
    };

    Ok(request)
}

/// Print a response; non-success statuses become errors.
fn report(response: &ApiResponse) -> anyhow::Result<()> {
    for hook_error in response.header_values(HOOK_ERROR_HEADER) {
        eprintln!("warning: {}", hook_error);
    }

    if !response.is_success() {
        anyhow::bail!("{} ({})", response.body_text(), response.status);
    }

    if let Some(etag) = response.header("ETag") {
        println!("ETag: {}", etag);
    }

    let body = response.body_text();
    if !body.is_empty() {
        println!("{}", body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["filedepot", "--user", "alice", "ls"]).unwrap();
        assert_eq!(cli.user.as_deref(), Some("alice"));
        match cli.command {
            Commands::Ls { path, sort, .. } => {
                assert_eq!(path, "/");
                assert!(sort.is_none());
            }
            _ => panic!("Expected Ls command"),
        }
    }

    #[test]
    fn test_users_add() {
        let cli = Cli::try_parse_from([
            "filedepot",
            "users",
            "add",
            "bob",
            "--scope",
            "/srv/bob",
            "--perm",
            "create,delete",
            "--command",
            "git",
        ])
        .unwrap();
        match cli.command {
            Commands::Users(UsersCommands::Add {
                username,
                scope,
                admin,
                perm,
                commands,
                ..
            }) => {
                assert_eq!(username, "bob");
                assert_eq!(scope, PathBuf::from("/srv/bob"));
                assert!(!admin);
                assert_eq!(perm, vec!["create", "delete"]);
                assert_eq!(commands, vec!["git"]);
            }
            _ => panic!("Expected Users Add command"),
        }
    }

    #[test]
    fn test_users_add_requires_scope() {
        let result = Cli::try_parse_from(["filedepot", "users", "add", "bob"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_command() {
        let cli = Cli::try_parse_from(["filedepot", "rm", "/a", "-u", "alice", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_share_create_flags() {
        let cli = Cli::try_parse_from([
            "filedepot",
            "share",
            "create",
            "docs/a.txt",
            "--expires",
            "10",
            "--unit",
            "minutes",
        ])
        .unwrap();
        let req = build_request(cli.command).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/api/share/docs/a.txt");
        assert_eq!(req.query.get("expires").map(String::as_str), Some("10"));
        assert_eq!(req.query.get("unit").map(String::as_str), Some("minutes"));
    }

    #[test]
    fn test_mkdir_request_has_trailing_separator() {
        let cli = Cli::try_parse_from(["filedepot", "mkdir", "a/b/"]).unwrap();
        let req = build_request(cli.command).unwrap();
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/api/resources/a/b/");
    }

    #[test]
    fn test_mv_and_cp_requests() {
        let cli = Cli::try_parse_from(["filedepot", "mv", "a.txt", "b.txt"]).unwrap();
        let req = build_request(cli.command).unwrap();
        assert_eq!(req.method, Method::Patch);
        assert_eq!(req.path, "/api/resources/a.txt");
        assert_eq!(req.query.get("destination").map(String::as_str), Some("/b.txt"));
        assert_eq!(req.query.get("action").map(String::as_str), Some("rename"));

        let cli = Cli::try_parse_from(["filedepot", "cp", "/a", "/b"]).unwrap();
        let req = build_request(cli.command).unwrap();
        assert_eq!(req.query.get("action").map(String::as_str), Some("copy"));
    }

    #[test]
    fn test_share_delete_request() {
        let cli = Cli::try_parse_from(["filedepot", "share", "delete", "abc123"]).unwrap();
        let req = build_request(cli.command).unwrap();
        assert_eq!(req.method, Method::Delete);
        assert_eq!(req.path, "/api/share/abc123");
    }

    #[test]
    fn test_share_show_is_not_routed() {
        let cli = Cli::try_parse_from(["filedepot", "share", "show", "abc123"]).unwrap();
        match &cli.command {
            Commands::Share(ShareCommands::Show { hash }) => assert_eq!(hash, "abc123"),
            _ => panic!("Expected Share Show command"),
        }
        assert!(build_request(cli.command).is_err());
    }

    #[test]
    fn test_show_link() {
        let store = Arc::new(JsonShareStore::in_memory());
        let shares = ShareService::new(store, "https://files.example.com");
        let user = User::new("alice", "/srv/alice").with_permissions(Permissions::all());
        let created = shares.create(&user, "/a.txt", None, None).unwrap();

        assert!(show_link(&shares, &created.link().hash).is_ok());
        assert!(show_link(&shares, "missing").is_err());
    }

    #[test]
    fn test_parse_permissions() {
        let perm = parse_permissions(&["create".to_string(), "edit".to_string()]).unwrap();
        assert!(perm.create);
        assert!(perm.modify);
        assert!(perm.download);
        assert!(!perm.delete);

        assert!(parse_permissions(&["fly".to_string()]).is_err());
    }

    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["filedepot"]).is_err());
    }
}
