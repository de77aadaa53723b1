/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Local, NaiveTime};
use slog::{error, Logger};

use crate::collector::GarbageCollector;

/// Spawns the daily-scheduled GC trigger (spec.md §4.5.3). Computes the
/// delay until the next occurrence of `at` in local time, then fires every
/// 24 hours after that. Runs until the returned handle is dropped/aborted.
pub fn spawn_daily_trigger(
    collector: Arc<GarbageCollector>,
    at: NaiveTime,
    logger: Logger,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delay = time_until_next(at);
            tokio::time::sleep(delay).await;
            if let Err(e) = collector.run().await {
                error!(logger, "scheduled gc pass failed"; "error" => %e);
            }
        }
    })
}

fn time_until_next(at: NaiveTime) -> StdDuration {
    let now = Local::now();
    let today_target = now.date_naive().and_time(at);
    let target = if now.naive_local() < today_target {
        today_target
    } else {
        today_target + chrono::Duration::days(1)
    };
    let delta = target - now.naive_local();
    StdDuration::from_secs(delta.num_seconds().max(1) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_a_positive_delay_for_a_time_already_passed_today() {
        let midnight = NaiveTime::from_hms_opt(0, 0, 1).unwrap();
        let delay = time_until_next(midnight);
        assert!(delay.as_secs() > 0);
        assert!(delay.as_secs() <= 24 * 3600);
    }
}
