//! Terminal chat client.
//! Run with: cargo run --bin streamchat

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};

use streamchat::client::{ChatClient, ClientConfig};
use streamchat::conversations::{ConversationStore, SqliteStorage};
use streamchat::render::MarkdownRenderer;
use streamchat::session::{ChatSession, ReplyView};

const HELP: &str = "commands: /new /list /open <id> /delete <id> /retry /news /health /html /quit";

/// Prints the reply as it grows.
#[derive(Default)]
struct TerminalView {
    printed: String,
    show_markup: bool,
}

impl TerminalView {
    fn print_growth(&mut self, text: &str) {
        if let Some(rest) = text.strip_prefix(self.printed.as_str()) {
            print!("{rest}");
        } else {
            print!("\n{text}");
        }
        let _ = std::io::stdout().flush();
        self.printed = text.to_string();
    }
}

impl ReplyView for TerminalView {
    fn show_pending(&mut self) {
        self.printed.clear();
        print!("assistant> ");
        let _ = std::io::stdout().flush();
    }

    fn update(&mut self, text: &str, _markup: &str) {
        self.print_growth(text);
    }

    fn finish(&mut self, text: &str, markup: &str) {
        self.print_growth(text);
        println!();
        if self.show_markup {
            println!("{markup}");
        }
    }

    fn discard(&mut self) {
        println!("(no reply)");
    }

    fn show_error(&mut self, message: &str, retryable: bool) {
        println!();
        println!("error: {message}");
        if retryable {
            println!("type /retry to send it again");
        }
    }
}

enum Command<'a> {
    New,
    List,
    Open(&'a str),
    Delete(&'a str),
    Retry,
    News,
    Health,
    Html,
    Help,
    Quit,
    Message(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let (name, arg) = line.split_once(' ').map_or((line, ""), |(n, a)| (n, a.trim()));
        match name {
            "/new" => Self::New,
            "/list" => Self::List,
            "/open" => Self::Open(arg),
            "/delete" => Self::Delete(arg),
            "/retry" => Self::Retry,
            "/news" => Self::News,
            "/health" => Self::Health,
            "/html" => Self::Html,
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            _ => Self::Message(line),
        }
    }
}

type Session = ChatSession<ChatClient, SqliteStorage>;

fn print_conversation(session: &Session) {
    let Some(conversation) = session.store().current() else {
        return;
    };
    println!("== {} ==", conversation.title);
    for message in &conversation.messages {
        println!("{}> {}", message.role, message.content);
    }
}

fn print_list(session: &Session) {
    for summary in session.store().list_for_display(Utc::now()) {
        let marker = if summary.is_active { '*' } else { ' ' };
        println!(
            "{marker} {}  {}  ({} messages, {})",
            summary.id, summary.title, summary.message_count, summary.updated
        );
    }
}

async fn print_news(session: &Session) {
    match session.backend().get_news().await {
        Ok(news) if news.is_empty() => println!("no news"),
        Ok(news) => {
            for item in news {
                println!("- {}", item.title);
                if !item.content.is_empty() {
                    println!("  {}", item.content);
                }
                if !item.url.is_empty() {
                    println!("  {}", item.url);
                }
            }
        }
        Err(e) => println!("error: {e}"),
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env();
    let history = config.history_path();
    let storage = SqliteStorage::open(&history)
        .with_context(|| format!("cannot open history in {}", history.display()))?;
    let client = ChatClient::new(config.clone()).context("invalid client configuration")?;
    let mut session = ChatSession::new(client, ConversationStore::load(storage), MarkdownRenderer::new()?)
        .with_user_id(config.user_id.clone())
        .with_history_window(config.history_window);

    println!("streamchat -> {}", config.base_url);
    println!("{HELP}");
    print_conversation(&session);

    let mut view = TerminalView::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match Command::parse(&line) {
            Command::New => {
                session.store_mut().create_conversation();
                println!("started a new conversation");
            }
            Command::List => print_list(&session),
            Command::Open(id) => {
                if session.store_mut().select_conversation(id) {
                    print_conversation(&session);
                } else {
                    println!("no conversation {id}");
                }
            }
            Command::Delete(id) => {
                if session.store_mut().delete_conversation(id) {
                    println!("deleted {id}");
                } else {
                    println!("no conversation {id}");
                }
            }
            Command::Retry => {
                session.retry_last_message(&mut view).await;
            }
            Command::News => print_news(&session).await,
            Command::Health => {
                let status = if session.backend().health_check().await { "up" } else { "down" };
                println!("backend is {status}");
            }
            Command::Html => {
                view.show_markup = !view.show_markup;
                println!("markup output {}", if view.show_markup { "on" } else { "off" });
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Message(text) => {
                session.send_message(text, &mut view).await;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
