use anyhow::Result;

use crate::args::{Args, Command, ConnectCommand, FormCommand, InboxCommand};
use crate::environment::Environment;
use crate::{connect, format, import, inbox, login};

pub async fn main(args: Args) -> Result<()> {
    let env = Environment::from_env()?;
    match args.command {
        Command::Login => login::main(&env).await,
        Command::Connect { command } => match command {
            ConnectCommand::Sync { repo } => connect::main_sync(&env, repo.as_deref()).await,
            ConnectCommand::Dump {
                repo,
                sync,
                output_accounts,
                unsafe_tar_extract,
            } => {
                let options = connect::DumpOptions {
                    workdir: std::env::current_dir()?,
                    output_accounts,
                    unsafe_tar_extract,
                };
                connect::main_dump(&env, repo.as_deref(), sync, &options).await
            }
        },
        Command::Format(args) => format::main(&args),
        Command::Import(args) => import::main(&args),
        Command::Inbox { command } => match command {
            InboxCommand::Dump {
                repo,
                config,
                workdir,
            } => inbox::main_dump(&env, repo.as_deref(), &config, &workdir).await,
            InboxCommand::Extract {
                config,
                workdir,
                model,
                keep_thinking_log,
                debug_output_folder,
            } => {
                let options = inbox::ExtractOptions {
                    config,
                    workdir,
                    model,
                    keep_thinking_log,
                    debug_output_folder,
                };
                main_inbox_extract(&options).await
            }
        },
        Command::Form { command } => main_form(command).await,
    }
}

#[cfg(feature = "inbox")]
async fn main_inbox_extract(options: &inbox::ExtractOptions) -> Result<()> {
    inbox::main_extract(options).await
}

#[cfg(not(feature = "inbox"))]
async fn main_inbox_extract(_options: &inbox::ExtractOptions) -> Result<()> {
    anyhow::bail!("Inbox extraction is not available, rebuild bh with the \"inbox\" feature")
}

#[cfg(feature = "forms")]
async fn main_form(command: FormCommand) -> Result<()> {
    use crate::forms;

    match command {
        FormCommand::Validate { workdir } => forms::main_validate(&workdir),
        FormCommand::List { workdir } => forms::main_list(&workdir),
        FormCommand::Server {
            port,
            host,
            workdir,
        } => forms::main_server(host, port, &workdir).await,
    }
}

#[cfg(not(feature = "forms"))]
async fn main_form(_command: FormCommand) -> Result<()> {
    anyhow::bail!("Forms are not available, rebuild bh with the \"forms\" feature")
}
