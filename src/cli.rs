//! Command-line argument parsing for sqlgate.

use clap::{Args, Parser, Subcommand};
use sqlgate::config::Config;
use sqlgate::query::{SqlRequest, TypedParam};
use std::path::PathBuf;

/// A request-scoped SQL execution gateway.
#[derive(Parser, Debug)]
#[command(name = "sqlgate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to the state directory instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a SQL statement and print the response as JSON
    Query(QueryArgs),

    /// List the exposed tables of a project
    Tables {
        #[arg(short, long)]
        project: String,
    },

    /// List the exposed columns of a project
    Columns {
        #[arg(short, long)]
        project: String,
    },

    /// Manage saved queries
    Saved {
        #[command(subcommand)]
        action: SavedCommand,
    },
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Project to run against
    #[arg(short, long)]
    pub project: String,

    /// Row limit appended when the statement has none
    #[arg(long, default_value_t = 0)]
    pub limit: u32,

    /// Row offset appended when the statement has none
    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    /// Refuse partial results
    #[arg(long)]
    pub no_partial: bool,

    /// Positional parameter as TYPE=VALUE, or TYPE alone for NULL
    #[arg(long = "param", value_name = "TYPE[=VALUE]", value_parser = parse_param)]
    pub params: Vec<TypedParam>,

    /// SQL statement
    pub sql: String,
}

impl QueryArgs {
    /// Builds the gateway request.
    pub fn to_request(&self) -> SqlRequest {
        SqlRequest::new(&self.project, &self.sql)
            .with_params(self.params.clone())
            .with_limit(self.limit)
            .with_offset(self.offset)
            .with_accept_partial(!self.no_partial)
    }
}

#[derive(Subcommand, Debug)]
pub enum SavedCommand {
    /// Save a query
    Save {
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        project: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, env = "USER")]
        creator: Option<String>,
        sql: String,
    },

    /// List queries saved by a creator
    List {
        #[arg(long, env = "USER")]
        creator: String,
    },

    /// Remove a saved query by id
    Remove { id: i64 },
}

/// Parses `TYPE=VALUE`; a bare `TYPE` is a NULL of that type.
fn parse_param(raw: &str) -> std::result::Result<TypedParam, String> {
    match raw.split_once('=') {
        Some((declared_type, _)) if declared_type.trim().is_empty() => {
            Err(format!("Missing parameter type in '{raw}'"))
        }
        Some((declared_type, value)) => Ok(TypedParam::new(declared_type.trim(), value)),
        None if raw.trim().is_empty() => Err("Empty parameter".to_string()),
        None => Ok(TypedParam::null(raw.trim())),
    }
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn test_parse_query_command() {
        let cli = parse_args(&[
            "sqlgate",
            "query",
            "--project",
            "sales",
            "--limit",
            "10",
            "--param",
            "int=3",
            "--param",
            "java.lang.String",
            "SELECT * FROM T WHERE A = ? AND B = ?",
        ]);

        let Command::Query(args) = cli.command else {
            panic!("Expected query command");
        };
        let request = args.to_request();
        assert_eq!(request.project, "sales");
        assert_eq!(request.limit, 10);
        assert_eq!(request.offset, 0);
        assert!(request.accept_partial);
        assert_eq!(
            request.params,
            vec![
                TypedParam::new("int", "3"),
                TypedParam::null("java.lang.String")
            ]
        );
    }

    #[test]
    fn test_parse_no_partial() {
        let cli = parse_args(&["sqlgate", "query", "-p", "sales", "--no-partial", "SELECT 1"]);
        let Command::Query(args) = cli.command else {
            panic!("Expected query command");
        };
        assert!(!args.to_request().accept_partial);
    }

    #[test]
    fn test_param_value_keeps_equals_signs() {
        assert_eq!(
            parse_param("string=a=b").unwrap(),
            TypedParam::new("string", "a=b")
        );
        assert_eq!(parse_param("string=").unwrap(), TypedParam::new("string", ""));
        assert!(parse_param("=1").is_err());
        assert!(parse_param("").is_err());
    }

    #[test]
    fn test_parse_global_config_path() {
        let cli = parse_args(&[
            "sqlgate",
            "tables",
            "--project",
            "sales",
            "--config",
            "/path/to/config.toml",
        ]);
        assert_eq!(cli.config_path(), PathBuf::from("/path/to/config.toml"));
        assert!(!cli.log_file);
    }

    #[test]
    fn test_parse_saved_commands() {
        let cli = parse_args(&["sqlgate", "saved", "list", "--creator", "alice"]);
        match cli.command {
            Command::Saved {
                action: SavedCommand::List { creator },
            } => assert_eq!(creator, "alice"),
            other => panic!("Unexpected command: {other:?}"),
        }

        let cli = parse_args(&["sqlgate", "saved", "remove", "7"]);
        assert!(matches!(
            cli.command,
            Command::Saved {
                action: SavedCommand::Remove { id: 7 }
            }
        ));
    }
}
