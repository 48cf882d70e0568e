//! Terminal clock display: follows a tournament's clock stream and renders a
//! locally ticking countdown, resynchronizing from a snapshot on every
//! reconnect.

mod sse;

use std::{env, time::Duration};

use anyhow::{Context, bail};
use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use blind_clock_back::{
    dto::{
        clock::{ChangeReasonDto, ClockEventDto, ClockStateView},
        sse::{CLOCK_EVENT, SNAPSHOT_EVENT},
    },
    mirror::{self, MirrorClock, MirrorUpdate},
};

use self::sse::SseDecoder;

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// How a followed stream ended.
enum StreamEnd {
    Cancelled,
    Disconnected,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let base_url = env::var("CLOCK_SERVER_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let tournament_id = env::args()
        .nth(1)
        .or_else(|| env::var("CLOCK_TOURNAMENT_ID").ok())
        .context("usage: clock-display <tournament-id> (or CLOCK_TOURNAMENT_ID)")?;
    let tournament_id = Uuid::parse_str(&tournament_id).context("parsing tournament id")?;

    let (updates_tx, updates_rx) = mpsc::channel(16);
    let (display_tx, display_rx) = watch::channel(None);
    let mirror_task = tokio::spawn(mirror::drive(updates_rx, display_tx, Duration::from_secs(1)));
    let render_task = tokio::spawn(render(display_rx));

    let client = reqwest::Client::new();
    let base_url = base_url.trim_end_matches('/');
    let mut delay = INITIAL_DELAY;

    loop {
        match follow(&client, base_url, tournament_id, &updates_tx).await {
            Ok(StreamEnd::Cancelled) => {
                info!(%tournament_id, "clock cancelled; exiting");
                break;
            }
            Ok(StreamEnd::Disconnected) => {
                warn!(%tournament_id, "clock stream ended; reconnecting");
                delay = INITIAL_DELAY;
            }
            Err(err) => {
                warn!(%tournament_id, error = %err, "clock stream failed; reconnecting");
            }
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }

    drop(updates_tx);
    let _ = mirror_task.await;
    let _ = render_task.await;
    Ok(())
}

/// Fetch a fresh snapshot, then forward stream events to the mirror until the
/// connection drops.
async fn follow(
    client: &reqwest::Client,
    base_url: &str,
    tournament_id: Uuid,
    updates: &mpsc::Sender<MirrorUpdate>,
) -> anyhow::Result<StreamEnd> {
    let snapshot: ClockStateView = client
        .get(format!("{base_url}/tournaments/{tournament_id}/clock"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    updates.send(MirrorUpdate::Snapshot(snapshot)).await?;

    let response = client
        .get(format!("{base_url}/tournaments/{tournament_id}/clock/stream"))
        .send()
        .await?
        .error_for_status()?;
    info!(%tournament_id, "following clock stream");

    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in decoder.push(&chunk) {
            match frame.event.as_deref() {
                Some(SNAPSHOT_EVENT) => {
                    let view: ClockStateView = serde_json::from_str(&frame.data)?;
                    updates.send(MirrorUpdate::Snapshot(view)).await?;
                }
                Some(CLOCK_EVENT) => {
                    let event: ClockEventDto = serde_json::from_str(&frame.data)?;
                    let cancelled = event.reason == ChangeReasonDto::Cancelled;
                    updates.send(MirrorUpdate::Event(event)).await?;
                    if cancelled {
                        return Ok(StreamEnd::Cancelled);
                    }
                }
                other => bail!("unexpected event `{other:?}` on clock stream"),
            }
        }
    }

    Ok(StreamEnd::Disconnected)
}

async fn render(mut display: watch::Receiver<Option<MirrorClock>>) {
    while display.changed().await.is_ok() {
        let Some(clock) = display.borrow_and_update().clone() else {
            continue;
        };
        let blinds = clock
            .current_level
            .as_ref()
            .map(|level| {
                if level.is_pause {
                    "break".to_owned()
                } else {
                    format!("{}/{} ante {}", level.small_blind, level.big_blind, level.ante)
                }
            })
            .unwrap_or_default();
        println!(
            "level {:>2}  {}  {:<24} {:?}",
            clock.current_level_index + 1,
            clock.remaining_label(),
            blinds,
            clock.run_status
        );
    }
}

fn init_tracing() {
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
