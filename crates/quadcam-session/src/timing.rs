use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

const SLICE: Duration = Duration::from_millis(5);

/// Sleep for `duration`, waking early if `cancel` fires.
///
/// Returns false if the token was cancelled.
pub fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLICE));
    }
}
