// ===============================
// src/throttle.rs
// ===============================
use tokio::time::{sleep, Duration, Instant};

/// Tunggu maksimum per putaran `acquire()`
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Token bucket sederhana: `burst` token, diisi ulang `rate_per_sec` token/detik.
/// `acquire()` menunggu sampai satu token tersedia.
#[derive(Debug)]
pub struct RateLimiter {
    rate_per_sec: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl RateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        let burst = burst.max(1) as f64;
        Self {
            rate_per_sec,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.burst);
        self.last = now;
    }

    /// Waktu tunggu sampai token berikutnya, `None` jika token sudah ada.
    fn wait_needed(&mut self) -> Option<Duration> {
        self.refill();
        if self.tokens >= 1.0 {
            None
        } else {
            let secs = (1.0 - self.tokens) / self.rate_per_sec;
            Some(Duration::try_from_secs_f64(secs).map_or(MAX_WAIT, |d| d.min(MAX_WAIT)))
        }
    }

    pub async fn acquire(&mut self) {
        while let Some(wait) = self.wait_needed() {
            sleep(wait).await;
        }
        self.tokens -= 1.0;
    }
}
