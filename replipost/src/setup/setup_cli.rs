use clap::{Parser, Subcommand};
use replipost::config::Config;
use replipost::duplicator::{Duplicator, LogObserver};
use replipost::helper::{admin_helpers, duplicate_helpers};
use replipost::models::content_types::ContentTypeRegistry;
use replipost::models::db_operations::posts_db_operations::{RedbContentStore, StoreError};
use replipost::models::db_operations::users_db_operations::{self, ROLES};
use replipost::setup::{content_import, db_setup};
use redb::Database;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "Setup and maintenance commands for RepliPost.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the databases. Pass `users` or `posts` to set up only one.
    Setup {
        db_type: Option<String>,
    }
}

#[derive(Subcommand, Debug)]
enum UserAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// One of admin, editor, author.
        #[arg(long, default_value = "editor")]
        role: String,
        /// Grants the capability to edit and duplicate content.
        #[arg(long)]
        can_edit_posts: bool,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum ContentAction {
    /// Imports records, their attributes and terms from a JSON array.
    Import {
        file: PathBuf,
    },
    List {
        #[arg(long)]
        post_type: Option<String>,
    },
    /// Duplicates the given records with the stored settings.
    Duplicate {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Removes the stored duplication settings so the defaults apply.
    Reset,
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup { db_type } => {
                match db_type.as_deref() {
                    Some("users") => setup_users_database(&config),
                    Some("posts") => setup_posts_database(&config),
                    Some(other) => eprintln!("❌ Error: Unknown database type '{}'. Use 'users' or 'posts'.", other),
                    None => {
                        setup_users_database(&config);
                        setup_posts_database(&config);
                    }
                }
            }
        },
        Commands::User { action } => match action {
            UserAction::Create { username, password, role, can_edit_posts } => {
                create_user(&config, username, password, role, *can_edit_posts);
            }
            UserAction::List => list_users(&config),
            UserAction::ChangePassword { username, new_password } => {
                change_password(&config, username, new_password);
            }
        },
        Commands::Content { action } => match action {
            ContentAction::Import { file } => import_content(&config, file),
            ContentAction::List { post_type } => list_content(&config, post_type.as_deref()),
            ContentAction::Duplicate { ids } => duplicate_content(&config, ids),
        },
        Commands::Settings { action } => match action {
            SettingsAction::Show => show_settings(&config),
            SettingsAction::Reset => reset_settings(&config),
        },
    }
}

fn registry(config: &Config) -> ContentTypeRegistry {
    ContentTypeRegistry::new(config.content_types.clone(), config.taxonomies.clone())
}

fn open_users_db(config: &Config) -> Option<Connection> {
    let db_path = config.users_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Users database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening users database: {}", e);
            None
        }
    }
}

fn open_store(config: &Config) -> Option<RedbContentStore> {
    let db_path = config.posts_db_path();
    if !db_path.exists() {
        eprintln!("❌ Error: Posts database not found at '{}'. Please run `setup_cli db setup` first.", db_path.display());
        return None;
    }
    let opened = Database::open(&db_path)
        .map_err(StoreError::from)
        .and_then(|db| RedbContentStore::new(db, registry(config)));
    match opened {
        Ok(store) => Some(store),
        Err(e) => {
            eprintln!("❌ Error opening posts database: {}", e);
            None
        }
    }
}

fn ensure_parent_dir(db_path: &Path) -> bool {
    if let Some(parent_dir) = db_path.parent() {
        if let Err(e) = fs::create_dir_all(parent_dir) {
            eprintln!("❌ Could not create database directory '{}': {}", parent_dir.display(), e);
            return false;
        }
    }
    true
}

fn setup_users_database(config: &Config) {
    let db_path = config.users_db_path();
    if db_path.exists() {
        println!("ℹ️ Users database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up users database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let mut conn = match Connection::open(&db_path) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("❌ Could not create users database file: {}", e);
            return;
        }
    };
    match db_setup::setup_users_db(&mut conn) {
        Ok(_) => println!("✅ Users database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up users database: {}", e),
    }
}

fn setup_posts_database(config: &Config) {
    let db_path = config.posts_db_path();
    if db_path.exists() {
        println!("ℹ️ Posts database already exists at '{}'. Skipping creation.", db_path.display());
        return;
    }
    println!("\nSetting up posts database at '{}'...", db_path.display());
    if !ensure_parent_dir(&db_path) {
        return;
    }

    let db = match Database::create(&db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("❌ Failed to create posts database file: {}", e);
            return;
        }
    };
    match db_setup::setup_posts_db(&db) {
        Ok(_) => println!("✅ Posts database setup completed successfully."),
        Err(e) => eprintln!("❌ Error setting up posts database: {}", e),
    }
}

fn create_user(config: &Config, username: &str, password: &str, role: &str, can_edit_posts: bool) {
    if !ROLES.contains(&role) {
        eprintln!("❌ Error: Unknown role '{}'. Use one of: {}.", role, ROLES.join(", "));
        return;
    }
    let Some(conn) = open_users_db(config) else { return };
    match users_db_operations::create_user(&conn, username, password, role, can_edit_posts) {
        Ok(_) => println!("✅ User '{}' ({}) created successfully.", username, role),
        Err(e) => eprintln!("❌ Error creating user: {}. It might be because the username already exists.", e),
    }
}

fn list_users(config: &Config) {
    let Some(conn) = open_users_db(config) else { return };
    match users_db_operations::read_all_users(&conn) {
        Ok(users) => {
            println!("Listing Users:");
            for user in users {
                println!(
                    "- {} [{}] edit={} active={} last login: {}",
                    user.username,
                    user.role,
                    user.has_edit_capability(),
                    user.is_active,
                    user.last_login_time.as_deref().unwrap_or("never")
                );
            }
        }
        Err(e) => eprintln!("❌ Error fetching users: {}", e),
    }
}

fn change_password(config: &Config, username: &str, new_password: &str) {
    let Some(conn) = open_users_db(config) else { return };
    match users_db_operations::change_password(&conn, username, new_password) {
        Ok(0) => eprintln!("❌ Error: No user named '{}' found.", username),
        Ok(_) => println!("✅ Password for '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}

fn import_content(config: &Config, file: &Path) {
    let json = match fs::read_to_string(file) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("❌ Could not read '{}': {}", file.display(), e);
            return;
        }
    };
    let Some(store) = open_store(config) else { return };
    match content_import::import_posts(&store, &json) {
        Ok(ids) => {
            for id in &ids {
                println!("- {}", id);
            }
            println!("✅ Imported {} record(s).", ids.len());
        }
        Err(e) => eprintln!("❌ Import stopped: {}", e),
    }
}

fn list_content(config: &Config, post_type: Option<&str>) {
    let Some(store) = open_store(config) else { return };
    match store.list_posts(post_type, u32::MAX, 0) {
        Ok(posts) => {
            for post in posts {
                println!(
                    "{}  {:<8} {:<9} {}",
                    post.id,
                    post.post_type,
                    post.status,
                    post.title
                );
            }
        }
        Err(e) => eprintln!("❌ Error listing content: {}", e),
    }
}

fn duplicate_content(config: &Config, ids: &[String]) {
    let Some(conn) = open_users_db(config) else { return };
    let Some(store) = open_store(config) else { return };
    let settings = match admin_helpers::load_duplication_settings(&conn, store.registry()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error reading duplication settings: {}", e);
            return;
        }
    };

    let duplicator = Duplicator::new().with_observer(LogObserver);
    let count = duplicator.duplicate_many(&store, ids, &settings);
    match duplicate_helpers::bulk_notice(count) {
        Some(notice) => println!("✅ {}", notice),
        None => println!("ℹ️ Nothing was duplicated."),
    }
}

fn show_settings(config: &Config) {
    let Some(conn) = open_users_db(config) else { return };
    let settings = match admin_helpers::load_duplication_settings(&conn, &registry(config)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Error reading duplication settings: {}", e);
            return;
        }
    };
    println!("Post types:     {}", settings.post_types.join(", "));
    println!("Title suffix:   {}", settings.title_suffix);
    println!("Default status: {}", settings.default_status);
}

fn reset_settings(config: &Config) {
    let Some(conn) = open_users_db(config) else { return };
    match admin_helpers::reset_duplication_settings(&conn) {
        Ok(removed) => println!("✅ Removed {} stored setting(s); defaults apply from now on.", removed),
        Err(e) => eprintln!("❌ Error resetting settings: {}", e),
    }
}
