//! Subcommand: `lockwise session` -- interactive event loop.
//!
//! Each stdin line becomes a bus action or a direct vault call, so idle
//! locking, background/foreground and activity tracking can be exercised by
//! hand. Vault notifications are echoed as they arrive.

use std::io::Write as _;

use anyhow::Result;
use lockwise_kernel::{
    Action, CopyField, DataStoreAction, LifecycleEvent, LoginRoute, MainRoute, RouteAction,
    SettingRoute, UserInteractionEvent,
};
use lockwise_vault::VaultRuntime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::commands;

/// A parsed session line.
#[derive(Debug, PartialEq)]
pub enum SessionCommand {
    Publish(Action),
    Status,
    List,
    Autolock(Option<String>),
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> std::result::Result<SessionCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(String::new());
    };
    let arg = words.next().map(str::to_string);

    let command = match verb {
        "bg" | "background" => SessionCommand::Publish(LifecycleEvent::Background.into()),
        "fg" | "foreground" => SessionCommand::Publish(LifecycleEvent::Foreground.into()),
        "lock" => SessionCommand::Publish(DataStoreAction::Lock.into()),
        "unlock" => SessionCommand::Publish(DataStoreAction::Unlock.into()),
        "sync" => SessionCommand::Publish(DataStoreAction::Sync.into()),
        "reset" => SessionCommand::Publish(DataStoreAction::Reset.into()),
        "copy" => {
            let item_id = arg.ok_or("usage: copy <id>")?;
            SessionCommand::Publish(
                UserInteractionEvent::Copy {
                    item_id,
                    field: CopyField::Password,
                }
                .into(),
            )
        }
        "reveal" => {
            SessionCommand::Publish(UserInteractionEvent::RevealPassword { visible: true }.into())
        }
        "open" => {
            let url = arg.ok_or("usage: open <url>")?;
            SessionCommand::Publish(UserInteractionEvent::ExternalLink { url }.into())
        }
        "route" => {
            let route = match arg.as_deref() {
                Some("list") | None => RouteAction::Main(MainRoute::ItemList),
                Some("settings") => RouteAction::Setting(SettingRoute::List),
                Some("welcome") => RouteAction::Login(LoginRoute::Welcome),
                Some(other) => return Err(format!("unknown route: {other}")),
            };
            SessionCommand::Publish(UserInteractionEvent::Route(route).into())
        }
        "status" => SessionCommand::Status,
        "list" => SessionCommand::List,
        "autolock" => SessionCommand::Autolock(arg),
        "help" | "?" => SessionCommand::Help,
        "quit" | "exit" => SessionCommand::Quit,
        other => return Err(format!("unknown command: {other} (try `help`)")),
    };
    Ok(command)
}

const HELP: &str = "\
  bg | fg                 background / foreground the app
  lock | unlock | sync    vault control
  reset                   wipe local data
  copy <id> | reveal      user activity
  open <url>              follow an external link
  route [list|settings|welcome]
  autolock [<setting>]    show or change the idle timeout
  status | list
  quit";

/// Run the loop until `quit` or end of input.
pub async fn run(runtime: &VaultRuntime) -> Result<()> {
    let mut notifications = runtime.notifications.subscribe();
    let echo = tokio::spawn(async move {
        while let Ok(notification) = notifications.recv().await {
            println!("  * {notification:?}");
        }
    });

    println!("Lockwise session. Vault is {}. Type `help` for commands.", runtime.vault.state());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("lockwise> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match parse_line(&line) {
            Ok(command) => command,
            Err(message) => {
                if !message.is_empty() {
                    println!("{message}");
                }
                continue;
            }
        };
        debug!(?command, "session command");

        let outcome = match command {
            SessionCommand::Publish(action) => {
                runtime.publish(action);
                Ok(())
            }
            SessionCommand::Status => commands::status(runtime, false),
            SessionCommand::List => commands::list(runtime).await,
            SessionCommand::Autolock(setting) => commands::autolock(runtime, setting),
            SessionCommand::Help => {
                println!("{HELP}");
                Ok(())
            }
            SessionCommand::Quit => break,
        };
        if let Err(e) = outcome {
            println!("error: {e:#}");
        }
    }

    echo.abort();
    Ok(())
}
