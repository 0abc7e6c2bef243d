use std::{ffi::OsString, path::PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

/// Command line tools for BeanHub and Beancount users.
#[derive(Parser, Debug)]
#[command(name = "bh", version, infer_subcommands = true)]
pub struct Args {
    #[arg(
        short,
        long,
        value_enum,
        env = "LOG_LEVEL",
        default_value = "info",
        ignore_case = true,
        global = true
    )]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Verbose => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            // log has no separate fatal level
            LogLevel::Error | LogLevel::Fatal => log::LevelFilter::Error,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Login your BeanHub account
    Login,

    /// BeanHub Connect features, such as sync or dump (login required)
    Connect {
        #[command(subcommand)]
        command: ConnectCommand,
    },

    /// Format Beancount files
    Format(FormatArgs),

    /// Import data into Beancount files based on the import config file
    Import(ImportArgs),

    /// BeanHub inbox features, such as dump (login required) or extract
    Inbox {
        #[command(subcommand)]
        command: InboxCommand,
    },

    /// Validate BeanHub Forms and run a simple web app
    Form {
        #[command(subcommand)]
        command: FormCommand,
    },
}

#[derive(Debug, Subcommand)]
#[command(infer_subcommands = true)]
pub enum ConnectCommand {
    /// Sync transactions for all BeanHub Connect banks
    Sync {
        /// Which repository to run sync on, in "<username>/<repo_name>" format
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Dump transaction CSV files from BeanHub Connect to your local environment
    Dump {
        /// Which repository to run dump on, in "<username>/<repo_name>" format
        #[arg(short, long)]
        repo: Option<String>,

        /// Run sync first before running dump
        #[arg(short, long)]
        sync: bool,

        /// Also download the accounts CSV file to the given path
        #[arg(long, value_name = "PATH")]
        output_accounts: Option<PathBuf>,

        /// Accepted for compatibility, the path safety filter is always applied
        #[arg(long)]
        unsafe_tar_extract: bool,
    },
}

#[derive(Debug, clap::Args)]
pub struct FormatArgs {
    /// Beancount files to format, traverse from main.bean when omitted
    pub files: Vec<PathBuf>,

    /// Suffix of backup file
    #[arg(long, default_value = ".backup")]
    pub backup_suffix: String,

    /// Rename account, e.g. "-ra Assets:Cash Assets:Wallet"
    #[arg(
        long,
        visible_alias = "ra",
        num_args = 2,
        value_names = ["FROM", "TO"],
        action = ArgAction::Append
    )]
    pub rename_account: Vec<String>,

    /// Rename currency, e.g. "-rc BCH BTC"
    #[arg(
        long,
        visible_alias = "rc",
        num_args = 2,
        value_names = ["FROM", "TO"],
        action = ArgAction::Append
    )]
    pub rename_currency: Vec<String>,

    /// Read beancount file data from stdin and output result to stdout
    #[arg(short, long)]
    pub stdin_mode: bool,

    /// Create backup file
    #[arg(short, long)]
    pub backup: bool,
}

#[derive(Debug, clap::Args)]
pub struct ImportArgs {
    /// The path to import config file
    #[arg(short, long, default_value = ".beanhub/imports.yaml")]
    pub config: PathBuf,

    /// The beanhub project path to work on
    #[arg(short, long, default_value = ".")]
    pub workdir: PathBuf,

    /// The path to main entry beancount file
    #[arg(short, long, default_value = "main.bean")]
    pub beanfile: PathBuf,

    /// Remove dangling transactions (previously imported but no longer generated)
    #[arg(long)]
    pub remove_dangling: bool,
}

#[derive(Debug, Subcommand)]
#[command(infer_subcommands = true)]
pub enum InboxCommand {
    /// Extract data from archived email files based on rules defined in the inbox config file
    Extract {
        /// The path to inbox config file
        #[arg(short, long, default_value = ".beanhub/inbox.yaml")]
        config: PathBuf,

        /// The BeanHub project path to work on
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        /// Which Ollama model to use
        #[arg(short, long, default_value = "phi4")]
        model: String,

        /// Keep the thinking log on screen after it's done
        #[arg(short, long)]
        keep_thinking_log: bool,

        /// Output files such as prompt and thinking process to the given folder
        #[arg(short, long)]
        debug_output_folder: Option<PathBuf>,
    },

    /// Dump emails files from BeanHub Inbox to your local environment
    Dump {
        /// Which repository to run dump on, in "<username>/<repo_name>" format
        #[arg(short, long)]
        repo: Option<String>,

        /// The path to inbox config file
        #[arg(short, long, default_value = ".beanhub/inbox.yaml")]
        config: PathBuf,

        /// The BeanHub project path to work on
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
#[command(infer_subcommands = true)]
pub enum FormCommand {
    /// Validate the form document
    Validate {
        /// The BeanHub project path to work on
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,
    },

    /// List the forms defined in the form document
    List {
        /// The BeanHub project path to work on
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,
    },

    /// Run the forms web app
    Server {
        /// Port number for serving the forms web app
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Host for serving the forms web app
        #[arg(long, default_value = "127.0.0.1")]
        host: std::net::IpAddr,

        /// The Beancount project path to work on
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,
    },
}

pub fn parse() -> Args {
    Args::parse_from(expand_rename_shorthands(std::env::args_os()))
}

/// Clap has no multi-letter short flags, so `-ra`/`-rc` after the `format`
/// subcommand are rewritten to their long names
pub fn expand_rename_shorthands<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut in_format = false;
    let mut after_separator = false;
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if after_separator {
                return arg;
            }
            match text {
                "--" => after_separator = true,
                "-ra" if in_format => return OsString::from("--rename-account"),
                "-rc" if in_format => return OsString::from("--rename-currency"),
                _ if !in_format && text.starts_with("forma") && "format".starts_with(text) => {
                    in_format = true;
                }
                _ => {}
            }
            arg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }

    #[test]
    fn format_rename_pairs() {
        let args = Args::try_parse_from([
            "bh",
            "format",
            "--rename-account",
            "Assets:Cash",
            "Assets:Wallet",
            "--rc",
            "BCH",
            "BTC",
            "books.bean",
        ])
        .unwrap();
        let Command::Format(format) = args.command else {
            panic!("Expected format command");
        };
        assert_eq!(vec!["Assets:Cash", "Assets:Wallet"], format.rename_account);
        assert_eq!(vec!["BCH", "BTC"], format.rename_currency);
        assert_eq!(vec![PathBuf::from("books.bean")], format.files);
    }

    #[test]
    fn format_rename_shorthands() {
        let args = Args::try_parse_from(expand_rename_shorthands([
            "bh",
            "format",
            "-ra",
            "Assets:Cash",
            "Assets:Wallet",
            "-rc",
            "BCH",
            "BTC",
            "-ra",
            "Assets:Bank",
            "Assets:Checking",
        ]))
        .unwrap();
        let Command::Format(format) = args.command else {
            panic!("Expected format command");
        };
        assert_eq!(
            vec!["Assets:Cash", "Assets:Wallet", "Assets:Bank", "Assets:Checking"],
            format.rename_account
        );
        assert_eq!(vec!["BCH", "BTC"], format.rename_currency);
    }

    #[test]
    fn shorthands_only_apply_to_format() {
        let unchanged = |args: &[&str]| {
            let expected: Vec<OsString> = args.iter().map(OsString::from).collect();
            assert_eq!(expected, expand_rename_shorthands(args.iter().copied()));
        };
        unchanged(&["bh", "connect", "sync", "-ra"]);
        unchanged(&["bh", "format", "--", "-ra"]);
    }

    #[test]
    fn subcommand_prefix() {
        let args = Args::try_parse_from(["bh", "conn", "sy", "-r", "user/repo"]).unwrap();
        let Command::Connect {
            command: ConnectCommand::Sync { repo },
        } = args.command
        else {
            panic!("Expected connect sync command");
        };
        assert_eq!(Some("user/repo".to_string()), repo);
    }

    #[test]
    fn log_level_ignores_case() {
        let args = Args::try_parse_from(["bh", "-l", "DEBUG", "login"]).unwrap();
        assert_eq!(LogLevel::Debug, args.log_level);
    }
}
