use std::path::Path;

use anyhow::Context;
use onedrive_core::{
    ConflictBehavior, DriveClient, DriveItem, ItemLocator, ItemReference, ODataQuery,
    SimpleUploadTarget,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::Command;
use crate::config::CliConfig;

pub async fn run(command: Command, client: &DriveClient, config: &CliConfig) -> anyhow::Result<()> {
    match command {
        Command::Info { item, select } => {
            let query = (!select.is_empty()).then(|| {
                let fields: Vec<&str> = select.iter().map(String::as_str).collect();
                ODataQuery::new().select(&fields)
            });
            print_json(&client.item(&parse_locator(&item), query.as_ref()).await?)
        }
        Command::Ls { folder, all } => {
            let locator = parse_locator(&folder);
            let items = if all {
                client.children_all(&locator, None).await?
            } else {
                client.children(&locator, None).await?.value
            };
            for item in &items {
                println!("{}", listing_line(item));
            }
            Ok(())
        }
        Command::Mkdir {
            parent,
            name,
            conflict,
        } => print_json(
            &client
                .create_folder(&parse_locator(&parent), &name, conflict.into())
                .await?,
        ),
        Command::Mv {
            item,
            parent_id,
            name,
        } => print_json(
            &client
                .move_item(&parse_locator(&item), &parent_id, name.as_deref())
                .await?,
        ),
        Command::Rename { item, name } => {
            print_json(&client.rename(&parse_locator(&item), &name).await?)
        }
        Command::Cp {
            item,
            parent_id,
            drive_id,
            name,
        } => {
            let parent = ItemReference {
                drive_id,
                id: Some(parent_id),
                ..ItemReference::default()
            };
            let monitor = client
                .copy_item(&parse_locator(&item), Some(&parent), name.as_deref())
                .await?;
            match monitor {
                Some(url) => println!("{url}"),
                None => println!("copy accepted"),
            }
            Ok(())
        }
        Command::Rm { item } => {
            client.delete(&parse_locator(&item)).await?;
            Ok(())
        }
        Command::Search { text, folder } => {
            let hits = client.search(&parse_locator(&folder), &text).await?;
            for item in &hits.value {
                println!("{}", listing_line(item));
            }
            Ok(())
        }
        Command::Delta { folder, token } => {
            let query = token.map(|token| ODataQuery::new().param("token", token));
            print_json(&client.delta(&parse_locator(&folder), query.as_ref()).await?)
        }
        Command::Thumbnails { item } => {
            print_json(&client.thumbnails(&parse_locator(&item), None).await?)
        }
        Command::DownloadUrl { item, range } => {
            let url = client
                .download_url(&parse_locator(&item), range, None)
                .await?;
            println!("{url}");
            Ok(())
        }
        Command::Upload {
            local,
            remote,
            conflict,
            session,
        } => upload(client, config, &local, &remote, conflict.into(), session).await,
    }
}

async fn upload(
    client: &DriveClient,
    config: &CliConfig,
    local: &Path,
    remote: &str,
    conflict: ConflictBehavior,
    force_session: bool,
) -> anyhow::Result<()> {
    let size = tokio::fs::metadata(local)
        .await
        .with_context(|| format!("cannot read {}", local.display()))?
        .len();
    let locator = parse_locator(remote);

    if !force_session && size <= config.simple_upload_limit {
        let target = SimpleUploadTarget::Replace(locator);
        let item = client.upload_simple_from_path(&target, local).await?;
        return print_json(&item);
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling upload");
            on_interrupt.cancel();
        }
    });

    tracing::info!(path = %local.display(), size, "starting session upload");
    let report = client
        .upload_large(&locator, local, conflict, config.upload, &cancel)
        .await
        .with_context(|| format!("upload of {} failed", local.display()))?;
    tracing::info!(
        bytes = report.bytes_sent,
        requests = report.requests,
        retries = report.retries,
        "upload finished"
    );
    Ok(())
}

/// `id:<item-id>` selects by id, anything else is a path from the drive root.
pub fn parse_locator(value: &str) -> ItemLocator {
    match value.strip_prefix("id:") {
        Some(id) => ItemLocator::id(id),
        None => ItemLocator::path(value),
    }
}

pub fn parse_range(value: &str) -> Result<(u64, u64), String> {
    let (start, end) = value
        .split_once('-')
        .ok_or_else(|| format!("expected start-end, got {value:?}"))?;
    let start: u64 = start.trim().parse().map_err(|_| format!("bad start in {value:?}"))?;
    let end: u64 = end.trim().parse().map_err(|_| format!("bad end in {value:?}"))?;
    if end < start {
        return Err(format!("range end is before start in {value:?}"));
    }
    Ok((start, end))
}

fn listing_line(item: &DriveItem) -> String {
    let kind = if item.is_folder() { "d" } else { "-" };
    let size = item.size.map(|s| s.to_string()).unwrap_or_default();
    format!(
        "{kind} {size:>12} {}  {}",
        item.id,
        item.name.as_deref().unwrap_or("")
    )
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
