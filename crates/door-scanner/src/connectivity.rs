use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

// ─── Connectivity ─────────────────────────────────────────────────────────

/// Synchronous online/offline signal polled before every verification.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Shared flag updated by [`spawn_probe`] (or directly, in tests).
#[derive(Debug, Clone)]
pub struct ConnectivityFlag {
    online: Arc<AtomicBool>,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Store the new state and return the previous one.
    pub fn set(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::Relaxed)
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }
}

// ─── Probe ────────────────────────────────────────────────────────────────

/// One HEAD request to `url`; true when any HTTP response arrives.
pub async fn probe(client: &reqwest::Client, url: &str) -> bool {
    client.head(url).send().await.is_ok()
}

/// Refresh `flag` every `interval` with a HEAD request to `url`.
///
/// Any HTTP response counts as online; only transport failures count as
/// offline. Transitions are logged once.
pub fn spawn_probe(
    flag: ConnectivityFlag,
    client: reqwest::Client,
    url: String,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = probe(&client, &url).await;
            let was = flag.set(online);
            if was != online {
                if online {
                    tracing::info!(%url, "connectivity restored");
                } else {
                    tracing::warn!(%url, "connectivity lost; scans will report offline");
                }
            }
        }
    })
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_reports_latest_state() {
        let flag = ConnectivityFlag::new(true);
        assert!(flag.is_online());
        assert!(flag.set(false));
        assert!(!flag.is_online());
        let clone = flag.clone();
        clone.set(true);
        assert!(flag.is_online());
    }

    #[tokio::test]
    async fn probe_marks_reachable_origin_online() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("HEAD", "/").with_status(200).create_async().await;

        let flag = ConnectivityFlag::new(false);
        let handle = spawn_probe(
            flag.clone(),
            reqwest::Client::new(),
            format!("{}/", server.url()),
            Duration::from_millis(20),
        );
        for _ in 0..50 {
            if flag.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(flag.is_online());
    }

    #[tokio::test]
    async fn probe_marks_unreachable_origin_offline() {
        // Bind then drop a listener so the port is closed.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let flag = ConnectivityFlag::new(true);
        let handle = spawn_probe(
            flag.clone(),
            reqwest::Client::new(),
            format!("http://127.0.0.1:{port}/"),
            Duration::from_millis(20),
        );
        for _ in 0..50 {
            if !flag.is_online() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();
        assert!(!flag.is_online());
    }
}
