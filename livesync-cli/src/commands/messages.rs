//! One-shot message commands.

use std::io::{self, Write};

use anyhow::Context as _;
use clap::Args;
use shared::models::{SendMessageRequest, SenderRole};
use uuid::Uuid;

use super::{Context, parse_role, render, sender_profile};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Conversation to list
    pub conversation: Uuid,

    /// Maximum number of messages; defaults to `sync.page_size`
    #[arg(long)]
    pub limit: Option<u32>,

    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SenderArgs {
    /// Sender identifier
    #[arg(long)]
    pub sender_id: Option<Uuid>,

    /// Display name carried with the message
    #[arg(long)]
    pub name: Option<String>,

    /// Sender role: mentor, participant, or admin
    #[arg(long, default_value = "participant", value_parser = parse_role)]
    pub role: SenderRole,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Conversation to post into
    pub conversation: Uuid,

    /// Message text
    pub content: String,

    /// Client-side message id; resending the same id is idempotent
    #[arg(long)]
    pub id: Option<Uuid>,

    #[command(flatten)]
    pub sender: SenderArgs,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Message to edit
    pub id: Uuid,

    /// Replacement text
    pub content: String,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Message to delete
    pub id: Uuid,
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Message to mark as read
    pub id: Uuid,
}

pub async fn handle_history(ctx: &Context, args: HistoryArgs) -> anyhow::Result<()> {
    let limit = args.limit.unwrap_or(ctx.config.sync.page_size);
    let page = ctx
        .api()?
        .list(args.conversation, limit)
        .await
        .context("failed to fetch messages")?;

    let mut out = io::stdout().lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &page)?;
        writeln!(out)?;
        return Ok(());
    }

    for item in &page.items {
        render::render_item(&mut out, item)?;
    }
    if page.has_more {
        writeln!(out, "-- more messages available; raise --limit --")?;
    }
    Ok(())
}

pub async fn handle_send(ctx: &Context, args: SendArgs) -> anyhow::Result<()> {
    let request = SendMessageRequest {
        id: args.id,
        sender_id: args.sender.sender_id.unwrap_or_else(Uuid::new_v4),
        sender: sender_profile(args.sender.name, args.sender.role),
        content: args.content,
    };
    let item = ctx
        .api()?
        .send(args.conversation, &request)
        .await
        .context("failed to send message")?;
    println!("sent {}", item.id);
    Ok(())
}

pub async fn handle_edit(ctx: &Context, args: EditArgs) -> anyhow::Result<()> {
    let item = ctx
        .api()?
        .edit(args.id, &args.content)
        .await
        .context("failed to edit message")?;
    render::render_item(&mut io::stdout().lock(), &item)?;
    Ok(())
}

pub async fn handle_delete(ctx: &Context, args: DeleteArgs) -> anyhow::Result<()> {
    ctx.api()?
        .delete(args.id)
        .await
        .context("failed to delete message")?;
    println!("deleted {}", args.id);
    Ok(())
}

pub async fn handle_read(ctx: &Context, args: ReadArgs) -> anyhow::Result<()> {
    let item = ctx
        .api()?
        .mark_read(args.id)
        .await
        .context("failed to mark message as read")?;
    render::render_item(&mut io::stdout().lock(), &item)?;
    Ok(())
}
