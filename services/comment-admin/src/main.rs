#![recursion_limit = "256"]
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use content_kit::{Anchor, ClusterAccessor, Comment, CommentStore, CommentsTable, StoreError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "comment-admin")]
#[command(about = "Bootstrap and inspect the media comment store")]
struct Args {
    #[arg(short, long, default_value = "config/comment-admin.yaml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the keyspace and the comments table if missing
    Init,
    /// Add a comment to a media item
    Add {
        #[arg(long)]
        media_item: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        content: String,
        /// RFC 3339 timestamp, defaults to now
        #[arg(long)]
        date: Option<DateTime<chrono::FixedOffset>>,
    },
    /// Show a single comment
    Get { id: Uuid },
    /// List one page of comments of a media item, newest first
    List {
        #[arg(long)]
        media_item: Uuid,
        #[arg(long, default_value_t = 20)]
        page_size: i32,
        /// Hex anchor printed by a previous `list`
        #[arg(long)]
        anchor: Option<String>,
    },
    /// Count comments of a media item
    Count {
        #[arg(long)]
        media_item: Uuid,
    },
    /// Delete a comment
    Delete { id: Uuid },
    /// Drop the whole keyspace
    DropKeyspace,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = config::load_config(&args.config)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "comment_admin={level},content_kit={level}",
                    level = config.observability.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_signal.cancel();
        }
    });

    let accessor = Arc::new(ClusterAccessor::new(&config.database, config.retry)?);
    let comments = CommentsTable::new(accessor.clone());

    run(args.command, &accessor, &comments, &cancel).await
}

async fn run(
    command: Command,
    accessor: &ClusterAccessor,
    store: &dyn CommentStore,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Init => {
            accessor.create_keyspace(cancel).await?;
            store.create(cancel).await?;
            info!("Comment store initialized in keyspace {}", accessor.keyspace());
        }
        Command::Add {
            media_item,
            user,
            content,
            date,
        } => {
            let mut comment = Comment::new(user, media_item, content);
            if let Some(date) = date {
                comment = comment.with_date(date);
            }
            let stored = store.insert(cancel, comment).await?;
            println!("{}", stored.comment_id);
        }
        Command::Get { id } => match store.get(cancel, id).await? {
            Some(comment) => print_comment(&comment),
            None => println!("comment {} not found", id),
        },
        Command::List {
            media_item,
            page_size,
            anchor,
        } => {
            let anchor = match anchor {
                Some(hex_anchor) => Anchor::from(
                    hex::decode(&hex_anchor).context("anchor must be hex encoded")?,
                ),
                None => Anchor::start(),
            };
            let page = store
                .by_media_item(cancel, media_item, page_size, &anchor)
                .await?;
            for comment in &page.items {
                print_comment(comment);
            }
            if page.is_last() {
                println!("-- end of list --");
            } else {
                println!("-- next anchor: {} --", hex::encode(page.next_anchor.as_bytes()));
            }
        }
        Command::Count { media_item } => {
            println!("{}", store.count(cancel, media_item).await?);
        }
        Command::Delete { id } => match store.delete(cancel, id).await {
            Ok(()) => println!("deleted {}", id),
            Err(StoreError::NotFound(_)) => println!("comment {} not found", id),
            Err(e) => return Err(e.into()),
        },
        Command::DropKeyspace => {
            accessor.drop_keyspace(cancel).await?;
        }
    }
    Ok(())
}

fn print_comment(comment: &Comment) {
    println!(
        "{} {} user={} media_item={} {}",
        comment.date.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        comment.comment_id,
        comment.user_id,
        comment.media_item_id,
        comment.content
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_command() {
        let media = Uuid::new_v4();
        let args = Args::try_parse_from([
            "comment-admin",
            "list",
            "--media-item",
            &media.to_string(),
            "--page-size",
            "4",
            "--anchor",
            "0a0b",
        ])
        .unwrap();

        match args.command {
            Command::List {
                media_item,
                page_size,
                anchor,
            } => {
                assert_eq!(media_item, media);
                assert_eq!(page_size, 4);
                assert_eq!(anchor.as_deref(), Some("0a0b"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_add_with_offset_date() {
        let args = Args::try_parse_from([
            "comment-admin",
            "add",
            "--media-item",
            &Uuid::new_v4().to_string(),
            "--user",
            &Uuid::new_v4().to_string(),
            "--content",
            "hello",
            "--date",
            "2024-05-01T12:00:00.750+02:00",
        ])
        .unwrap();

        match args.command {
            Command::Add { date: Some(date), .. } => {
                assert_eq!(date.with_timezone(&Utc).to_rfc3339(), "2024-05-01T10:00:00.750+00:00");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
