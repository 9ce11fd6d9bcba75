//! Shared test helpers

use crate::sources::types::Candle;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub fn minute(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n)
}

/// A closed one-minute candle starting `n` minutes after 2023-01-01
pub fn candle(symbol: &str, n: i64) -> Candle {
    Candle {
        exchange: "BINANCE".to_string(),
        symbol: symbol.to_string(),
        start: minute(n),
        stop: minute(n + 1) - Duration::milliseconds(1),
        interval: "1m".to_string(),
        trades: Some(10),
        open: 100.0 + n as f64,
        close: 101.0 + n as f64,
        high: 102.0 + n as f64,
        low: 99.0 + n as f64,
        volume: 1.5,
        closed: true,
        timestamp: None,
    }
}

/// In-process stand-in for the InfluxDB write endpoint
pub mod mock_sink {
    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct CapturedWrite {
        pub body: String,
        pub authorization: Option<String>,
        pub query: HashMap<String, String>,
    }

    #[derive(Default)]
    struct Inner {
        writes: Mutex<Vec<CapturedWrite>>,
        responses: Mutex<VecDeque<(u16, String)>>,
    }

    /// Records every write; answers 204 unless a response was queued
    #[derive(Clone, Default)]
    pub struct MockSink {
        inner: Arc<Inner>,
    }

    impl MockSink {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the response for the next unanswered write
        pub fn respond_with(&self, status: u16, body: &str) {
            self.inner
                .responses
                .lock()
                .push_back((status, body.to_string()));
        }

        pub fn writes(&self) -> Vec<CapturedWrite> {
            self.inner.writes.lock().clone()
        }

        pub fn router(&self) -> Router {
            Router::new()
                .route("/api/v2/write", post(handle_write))
                .with_state(self.clone())
        }
    }

    async fn handle_write(
        State(sink): State<MockSink>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: String,
    ) -> (StatusCode, String) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        sink.inner.writes.lock().push(CapturedWrite {
            body,
            authorization,
            query,
        });

        let (status, body) = sink
            .inner
            .responses
            .lock()
            .pop_front()
            .unwrap_or((204, String::new()));
        (StatusCode::from_u16(status).unwrap(), body)
    }
}

/// `LineWriter` that records bodies and fails on chosen calls
pub mod recording {
    use crate::error::{AppError, Result};
    use crate::sink::LineWriter;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    pub struct RecordingWriter {
        bodies: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        /// Zero-based call indexes answered with a 500
        fail_on: HashSet<usize>,
        delay: Option<Duration>,
    }

    impl RecordingWriter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(mut self, calls: &[usize]) -> Self {
            self.fail_on = calls.iter().copied().collect();
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Every body passed to `write`, in call order
        pub fn bodies(&self) -> Vec<String> {
            self.bodies.lock().clone()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LineWriter for RecordingWriter {
        fn address(&self) -> &str {
            "memory://recording"
        }

        async fn write(&mut self, body: String) -> Result<()> {
            let call = {
                let mut bodies = self.bodies.lock();
                bodies.push(body);
                bodies.len() - 1
            };
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            if self.fail_on.contains(&call) {
                return Err(AppError::WriteFailure {
                    address: self.address().to_string(),
                    status: 500,
                    body: "internal error".to_string(),
                });
            }
            Ok(())
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Formatted log output captured on the current thread
pub mod logs {
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    pub struct CapturedLogs {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl CapturedLogs {
        /// Route events on this thread here until the guard drops
        ///
        /// `#[tokio::test]` runs spawned tasks on the test thread, so their
        /// events are captured too.
        pub fn install() -> (Self, DefaultGuard) {
            let logs = Self::default();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(logs.clone())
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .finish();
            let guard = tracing::subscriber::set_default(subscriber);
            (logs, guard)
        }

        pub fn lines(&self) -> Vec<String> {
            String::from_utf8_lossy(&self.buf.lock())
                .lines()
                .map(str::to_string)
                .collect()
        }

        /// Lines logged at error level
        pub fn errors(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|line| line.contains(" ERROR "))
                .collect()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
            self.buf.lock().extend_from_slice(bytes);
            Ok(bytes.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }
}
