use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const PREFIX: &str = "KickBonk-";

// 2025-01-01T00:00:00Z
const EPOCH: u64 = 1_735_689_600_000;

static LAST_ID: AtomicU64 = AtomicU64::new(0);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH)
        .saturating_sub(EPOCH)
}

/// Time-ordered numeric id: milliseconds since EPOCH in the high bits, a
/// per-millisecond sequence in the low 22 bits. Strictly increasing across threads.
fn next() -> u64 {
    let mut last = LAST_ID.load(Ordering::SeqCst);
    loop {
        let candidate = (now_ms() << 22).max(last + 1);
        match LAST_ID.compare_exchange_weak(last, candidate, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return candidate,
            Err(current) => last = current,
        }
    }
}

/// A fresh `requestID` for an outbound avatar API request.
pub fn generate() -> String {
    format!("{PREFIX}{}", next())
}
