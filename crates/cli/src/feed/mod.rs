//! Request feed: input lines into the dispatcher.

mod request;
mod stats;

use std::path::Path;
use std::time::Duration;

use dispatcher::{DispatchError, DispatcherHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::CliError;

pub use request::NotificationRequest;
pub use stats::{FeedStats, RunStats};

/// Open the request source: a file, or stdin when no path is given
pub async fn open_input(path: Option<&Path>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>, CliError> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

/// Submit every request from `input` until EOF
///
/// Bad lines and refused requests are logged and counted; only read
/// errors and shutdown abort the feed.
pub async fn feed_requests(
    handle: &DispatcherHandle,
    input: Box<dyn AsyncBufRead + Unpin + Send>,
) -> Result<FeedStats, CliError> {
    let mut stats = FeedStats::default();
    let mut lines = input.lines();
    let mut line_no = 0;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let request = match NotificationRequest::parse(&line, line_no) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Skipping input line");
                stats.invalid_lines += 1;
                continue;
            }
        };

        let priority = request.priority();
        match request.submit(handle) {
            Ok(()) => stats.accepted += 1,
            Err(e @ DispatchError::Draining { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(line = line_no, priority = ?priority, error = %e, "Request refused");
                stats.refused += 1;
            }
        }
    }

    info!(
        lines = line_no,
        accepted = stats.accepted,
        refused = stats.refused,
        invalid = stats.invalid_lines,
        "Input exhausted"
    );
    Ok(stats)
}

/// Wait until nothing is queued or buffered, or `limit` passes
pub async fn wait_idle(handle: &DispatcherHandle, limit: Duration, poll: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let status = handle.status();
        if status.queue_depth == 0 && status.pending_groups == 0 {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            debug!(
                queue_depth = status.queue_depth,
                pending_groups = status.pending_groups,
                "Linger period over"
            );
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Log `status()` every `every` until the dispatcher starts draining
pub async fn report_status(handle: DispatcherHandle, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    while !handle.is_draining() {
        ticker.tick().await;
        let status = handle.status();
        info!(
            queue_depth = status.queue_depth,
            breaker = %status.breaker_state,
            blocked_recipients = status.blocked_recipient_count,
            sends_in_window = status.sends_in_current_window,
            pending_groups = status.pending_groups,
            delivered = status.delivered_total,
            dropped = status.dropped_total,
            suppressed = status.suppressed_total,
            "Dispatcher status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DispatcherConfig;
    use dispatcher::{Dispatcher, SimulatedTransport};

    #[tokio::test]
    async fn test_feed_counts_lines() {
        let dispatcher =
            Dispatcher::new(DispatcherConfig::default(), SimulatedTransport::reliable("sim"))
                .unwrap();
        let handle = dispatcher.handle();

        let input = concat!(
            "{\"recipient\":\"chat-1\",\"payload\":\"hello\",\"priority\":\"high\"}\n",
            "\n",
            "not json\n",
            "{\"recipient\":\"\",\"payload\":\"nobody\"}\n",
            "{\"recipient\":\"chat-2\",\"group\":\"joins\",\"event\":\"bob\"}\n",
        );
        let reader: Box<dyn AsyncBufRead + Unpin + Send> =
            Box::new(BufReader::new(input.as_bytes()));

        let stats = feed_requests(&handle, reader).await.unwrap();
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.refused, 1);
        assert_eq!(stats.invalid_lines, 1);

        let status = handle.status();
        assert_eq!(status.queue_depth, 1);
        assert_eq!(status.pending_groups, 1);
    }
}
