// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed one-second admission window for inbound transactions.
//!
//! The counter resets once the stored deadline has passed, then the request
//! is admitted if the window still has room. Admission is bursty at window
//! edges; this is a soft limit.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    state: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: Instant,
}

impl RateLimiter {
    pub fn per_second(max_per_window: u32) -> Self {
        Self::new(max_per_window, Duration::from_secs(1))
    }

    pub fn new(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            state: Mutex::new(Window {
                count: 0,
                reset_at: Instant::now() + window,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_per_window
    }

    /// Try to admit one request now.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub(crate) fn try_acquire_at(&self, now: Instant) -> bool {
        let mut window = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }
        if window.count >= self.max_per_window {
            return false;
        }
        window.count += 1;
        true
    }
}
