//! Live view of one conversation driven by the synchronizer.

use std::{io::Write, sync::Arc};

use clap::Args;
use shared::{
    models::{
        CollectionSnapshot, Item, ItemId, LifecycleState, MessagePayload, PartitionKey,
        SendMessageRequest, SyncError, SyncStatus, Timestamp,
    },
    sync::{LiveCollection, SyncOptions, TracingObserver},
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::task::{JoinError, JoinSet};
use tracing::{info, warn};
use uuid::Uuid;

use super::{Context, messages::SenderArgs, render, sender_profile};
use crate::client::{ApiClient, SseChangeFeed};

const RETRY_COMMAND: &str = "/retry";

#[derive(Args, Debug)]
pub struct FollowArgs {
    /// Conversation to follow
    pub conversation: Uuid,

    /// Post each line read from stdin; `/retry` reloads after a failed load
    #[arg(long)]
    pub send: bool,

    /// Exit after the first complete snapshot has been printed
    #[arg(long)]
    pub once: bool,

    #[command(flatten)]
    pub sender: SenderArgs,
}

type StdinLines = Lines<BufReader<Stdin>>;

async fn next_line(lines: &mut Option<StdinLines>) -> Option<String> {
    match lines {
        Some(reader) => reader.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

type SendOutcome = (ItemId, Result<Item, SyncError>);

/// Renders `content` locally and posts it in the background.
fn post_line(
    sends: &mut JoinSet<SendOutcome>,
    collection: &LiveCollection,
    api: &ApiClient,
    conversation: PartitionKey,
    sender: &SenderArgs,
    sender_id: Uuid,
    content: String,
) {
    let id = Uuid::new_v4();
    let profile = sender_profile(sender.name.clone(), sender.role);
    collection.insert_optimistic(Item {
        id,
        partition_key: conversation,
        sequence_key: Timestamp::now(),
        payload: MessagePayload {
            sender_id,
            sender: profile.clone(),
            content: content.clone(),
            edited: false,
            read: false,
        },
    });

    let request = SendMessageRequest {
        id: Some(id),
        sender_id,
        sender: profile,
        content,
    };
    let api = api.clone();
    sends.spawn(async move { (id, api.send(conversation, &request).await) });
}

/// Withdraws the optimistic copy of a message the server did not accept.
fn settle_send(collection: &LiveCollection, joined: Result<SendOutcome, JoinError>) {
    match joined {
        Ok((_, Ok(_))) => {}
        Ok((id, Err(err))) => {
            warn!(error = %err, message_id = %id, "failed to send message");
            eprintln!("send failed: {err}");
            collection.discard_optimistic(id);
        }
        Err(err) => warn!(error = %err, "send task did not finish"),
    }
}

fn show(snapshot: &CollectionSnapshot) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    render::render_snapshot(&mut out, snapshot)?;
    out.flush()?;
    Ok(())
}

pub async fn handle_follow(ctx: &Context, args: FollowArgs) -> anyhow::Result<()> {
    let api = ctx.api()?;
    let collection = LiveCollection::spawn(
        Arc::new(api.clone()),
        Arc::new(SseChangeFeed::new(api.clone())),
        SyncOptions::from(&ctx.config.sync),
        Arc::new(TracingObserver),
    );
    let mut snapshots = collection.subscribe(args.conversation);
    let sender_id = args.sender.sender_id.unwrap_or_else(Uuid::new_v4);
    let mut lines = args
        .send
        .then(|| BufReader::new(tokio::io::stdin()).lines());
    let mut sends = JoinSet::new();

    info!(conversation = %args.conversation, "following conversation");
    let outcome = loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.partition_key != Some(args.conversation) {
                    continue;
                }
                show(&snapshot)?;

                if snapshot.state == LifecycleState::Error {
                    let reason = snapshot
                        .error
                        .map_or_else(|| "subscription failed".to_string(), |err| err.to_string());
                    break Err(anyhow::anyhow!(reason));
                }
                if args.once {
                    if snapshot.is_ready() && snapshot.state == LifecycleState::Live {
                        break Ok(());
                    }
                    if snapshot.status == SyncStatus::Error
                        && let Some(error) = snapshot.error
                    {
                        break Err(anyhow::anyhow!(error));
                    }
                }
            }
            line = next_line(&mut lines) => {
                match line {
                    Some(text) if text.trim() == RETRY_COMMAND => collection.retry_fetch(),
                    Some(text) if text.trim().is_empty() => {}
                    Some(text) => post_line(
                        &mut sends,
                        &collection,
                        &api,
                        args.conversation,
                        &args.sender,
                        sender_id,
                        text,
                    ),
                    None => lines = None,
                }
            }
            Some(joined) = sends.join_next() => settle_send(&collection, joined),
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    collection.shutdown().await;
    outcome
}
