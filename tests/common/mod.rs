#![allow(dead_code)]

pub mod scripted_gateway;

pub use scripted_gateway::*;

use std::future::Future;
use std::time::Duration;

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Run `future` with a two second limit, panicking on timeout
pub async fn within_deadline<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), future)
        .await
        .expect("operation did not finish in time")
}
