//! parley-chat: terminal client
//!
//! Plain lines are sent as prompts to the selected chat. Commands:
//! `/new`, `/list`, `/select <n>`, `/rename <name>`, `/delete`, `/refresh`, `/quit`.

use parley::client::{
    ChatStore, HttpChatService, NoticeLevel, OptimisticUpdater, StoreEvent, StreamRevealer,
};
use parley::config::ClientConfig;
use parley::model::Role;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the conversation, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::from_env()?;

    let store = ChatStore::new();
    let service = Arc::new(HttpChatService::new(&config.server_url, &config.user_id));
    let revealer = Arc::new(StreamRevealer::new(store.clone(), config.reveal_interval));
    let updater = OptimisticUpdater::new(store.clone(), service, revealer, config.user_id.clone());

    tokio::spawn(render(store.clone()));

    if updater.refresh().await.is_ok() {
        if let Some(first) = store.sessions().first() {
            store.select(&first.id);
        }
        print_sessions(&store);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        let arg = arg.trim();

        match command {
            "/quit" => break,
            "/new" => {
                if let Ok(chat) = updater.create_chat().await {
                    println!("Created {}", chat.name);
                }
            }
            "/list" => print_sessions(&store),
            "/refresh" => {
                if updater.refresh().await.is_ok() {
                    print_sessions(&store);
                }
            }
            "/select" => match arg.parse::<usize>() {
                Ok(n) if n >= 1 => match store.sessions().get(n - 1) {
                    Some(chat) => {
                        store.select(&chat.id);
                        print_transcript(&store);
                    }
                    None => eprintln!("No chat #{n}"),
                },
                _ => eprintln!("Usage: /select <n>"),
            },
            "/rename" => match store.selected_id() {
                Some(id) => {
                    let _ = updater.rename(&id, arg).await;
                }
                None => eprintln!("No chat selected"),
            },
            "/delete" => match store.selected_id() {
                Some(id) => {
                    let _ = updater.delete(&id).await;
                }
                None => eprintln!("No chat selected"),
            },
            cmd if cmd.starts_with('/') => eprintln!("Unknown command {cmd}"),
            _ => {
                let chat_id = match store.selected_id() {
                    Some(id) => id,
                    None => match updater.create_chat().await {
                        Ok(chat) => chat.id,
                        Err(_) => continue,
                    },
                };
                if let Err(e) = updater.send(&chat_id, line).await {
                    tracing::debug!(error = %e, "Send failed");
                }
            }
        }
    }

    Ok(())
}

/// Print reveal frames and notices as the store publishes them
async fn render(store: ChatStore) {
    let mut events = store.subscribe();
    let mut shown = 0usize;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            StoreEvent::MessageAppended { message, .. } if message.role == Role::Assistant => {
                print!("assistant> ");
                shown = 0;
            }
            StoreEvent::MessageUpdated { content, .. } => {
                print!("{}", content.get(shown..).unwrap_or_default());
                shown = content.len();
            }
            StoreEvent::RevealFinished { .. } => {
                println!();
                shown = 0;
            }
            StoreEvent::Notice(notice) => match notice.level {
                NoticeLevel::Info => eprintln!("[info] {}", notice.text),
                NoticeLevel::Error => eprintln!("[error] {}", notice.text),
            },
            _ => {}
        }
        let _ = std::io::stdout().flush();
    }
}

fn print_sessions(store: &ChatStore) {
    let selected = store.selected_id();
    let sessions = store.sessions();
    if sessions.is_empty() {
        println!("No chats yet. Type a prompt to start one.");
    }
    for (i, chat) in sessions.iter().enumerate() {
        let marker = if selected.as_ref() == Some(&chat.id) { '*' } else { ' ' };
        println!("{marker} {}. {} ({} messages)", i + 1, chat.name, chat.messages.len());
    }
}

fn print_transcript(store: &ChatStore) {
    let Some(chat) = store.selected() else {
        return;
    };
    println!("== {} ==", chat.name);
    for message in &chat.messages {
        println!("{}> {}", message.role, message.content);
    }
}
