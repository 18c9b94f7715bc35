//! Progress bar fed by a controller's byte counters.

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use transfer_core::ProgressSnapshot;

const BAR_TEMPLATE: &str = "{bar:40} {bytes}/{total_bytes} ({percent}%) {msg}";

/// Spawns a progress bar task when `enabled`.
///
/// The task exits when `stop` fires; the caller awaits the returned handle.
pub(crate) fn spawn_progress_ui(
    enabled: bool,
    mut snapshots: watch::Receiver<ProgressSnapshot>,
    label: String,
    stop: CancellationToken,
) -> Option<JoinHandle<()>> {
    if !enabled {
        return None;
    }
    Some(tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(label);

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *snapshots.borrow_and_update();
                    bar.set_length(snapshot.total.max(snapshot.transferred));
                    bar.set_position(snapshot.transferred);
                }
            }
        }

        bar.finish_and_clear();
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_ui_disabled_returns_none() {
        let (_tx, rx) = watch::channel(ProgressSnapshot::default());
        let handle = spawn_progress_ui(false, rx, "a.zip".to_string(), CancellationToken::new());
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_progress_ui_stops_on_signal() {
        let (tx, rx) = watch::channel(ProgressSnapshot::default());
        let stop = CancellationToken::new();
        let handle = spawn_progress_ui(true, rx, "a.zip".to_string(), stop.clone()).unwrap();

        tx.send_replace(ProgressSnapshot {
            transferred: 10,
            total: 100,
        });
        stop.cancel();

        // returns instead of hanging once stop fires
        handle.await.unwrap();
    }
}
