use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::watch;
use yansi::Paint;

use super::cli::Request;
use super::output;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::AssistantMessage;
use crate::domain::models::Message;
use crate::domain::services::AppState;
use crate::domain::services::CouncilService;
use crate::domain::services::SendOutcome;

fn last_reply(state: &AppState) -> Option<AssistantMessage> {
    return state.current.as_ref().and_then(|current| {
        return current
            .messages
            .iter()
            .rev()
            .find_map(Message::as_assistant)
            .cloned();
    });
}

async fn follow_progress(mut rx: watch::Receiver<AppState>) {
    let mut previous: Option<AssistantMessage> = None;
    while rx.changed().await.is_ok() {
        let reply = last_reply(&rx.borrow_and_update());
        let reply = match reply {
            Some(reply) => reply,
            None => continue,
        };

        let before = previous
            .take()
            .filter(|before| return before.handle == reply.handle)
            .unwrap_or_default();
        for line in output::format_progress(&before, &reply) {
            println!("{}", Paint::cyan(line));
        }

        previous = Some(reply);
    }
}

async fn list(service: &Arc<CouncilService>) -> Result<()> {
    service.load_conversations(0).await;
    service.retries().idle().await;

    let state = service.store().snapshot();
    println!("{}", output::format_summaries(&state.conversations));

    return Ok(());
}

async fn new(service: &Arc<CouncilService>) -> Result<()> {
    let summary = service.create_conversation().await?;
    println!("Created conversation {}", summary.id);

    return Ok(());
}

async fn open(service: &Arc<CouncilService>, id: &str) -> Result<()> {
    service.select_conversation(id).await;
    service.retries().idle().await;

    if service.store().current().is_none() {
        bail!(format!("Failed to load conversation {id}"));
    }

    return Ok(());
}

async fn show(service: &Arc<CouncilService>, id: &str) -> Result<()> {
    open(service, id).await?;

    if let Some(conversation) = service.store().current() {
        println!(
            "{}",
            output::format_conversation(&conversation, &Config::get(ConfigKey::Username))
        );
    }

    return Ok(());
}

fn print_reply(service: &Arc<CouncilService>) {
    if let Some(reply) = last_reply(&service.store().snapshot()) {
        println!("\n{}", output::format_assistant(&reply));
    }
}

async fn ask(service: &Arc<CouncilService>, id: Option<String>, prompt: &str, stream: bool) -> Result<()> {
    match id {
        Some(id) => open(service, &id).await?,
        None => {
            let summary = service.create_conversation().await?;
            service.retries().idle().await;
            println!("{}", Paint::new(format!("Conversation {}", summary.id)).dimmed());
        }
    }

    if !stream {
        if !service.send_message_blocking(prompt).await? {
            bail!("No conversation is loaded to send to.");
        }

        print_reply(service);
        return Ok(());
    }

    let progress = tokio::spawn(follow_progress(service.store().subscribe()));
    let res = service.send_message(prompt).await;
    progress.abort();

    match res? {
        Some(SendOutcome::Completed) => {
            print_reply(service);
            return Ok(());
        }
        Some(SendOutcome::Failed(message)) => {
            print_reply(service);
            bail!(format!("The council failed to answer: {message}"));
        }
        None => bail!("No conversation is loaded to send to."),
    }
}

pub async fn run(service: &Arc<CouncilService>, request: Request) -> Result<()> {
    tracing::debug!(request = ?request, "Running");

    match request {
        Request::List => return list(service).await,
        Request::New => return new(service).await,
        Request::Show { id } => return show(service, &id).await,
        Request::Ask { id, prompt, stream } => return ask(service, id, &prompt, stream).await,
    }
}
