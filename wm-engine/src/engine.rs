//! Engine: the bounded worker pool driving a crawl to completion
//! (spec.md §4.10).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tracing::{info, warn};
use wm_frontier::{Statistics, UrlTable};
use wm_types::{Level, Status};

use crate::processor::Processor;

pub struct Engine<'a> {
    table: &'a UrlTable,
    processor: &'a Processor<'a>,
    stats: &'a Statistics,
    concurrency: usize,
    level_limit: Option<Level>,
    max_tries: u32,
}

impl<'a> Engine<'a> {
    #[must_use]
    pub fn new(
        table: &'a UrlTable,
        processor: &'a Processor<'a>,
        stats: &'a Statistics,
        concurrency: usize,
        level_limit: Option<Level>,
        max_tries: u32,
    ) -> Self {
        Self { table, processor, stats, concurrency: concurrency.max(1), level_limit, max_tries }
    }

    /// Runs every worker to completion and returns the exit code (spec.md
    /// §4.10's severity table, via [`Statistics::exit_code`]).
    pub async fn run(&self) -> u8 {
        match self.table.release() {
            Ok(n) if n > 0 => info!(recovered = n, "reset in-progress records from a prior run"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to release in-progress records at startup"),
        }

        let idle = AtomicUsize::new(0);
        let stop = AtomicBool::new(false);

        let workers = (0..self.concurrency).map(|id| self.worker_loop(id, &idle, &stop));
        futures_util::future::join_all(workers).await;

        self.stats.exit_code()
    }

    async fn worker_loop(&self, _id: usize, idle: &AtomicUsize, stop: &AtomicBool) {
        loop {
            if stop.load(Ordering::Acquire) {
                return;
            }

            match self.check_out_one() {
                Some(record) => {
                    idle.store(0, Ordering::Release);

                    if self.max_tries != 0 && record.try_count >= self.max_tries {
                        let _ = self.table.check_in(&record.url, Status::Skipped, &Default::default());
                        self.stats.record_skipped();
                        continue;
                    }

                    self.processor.process(record).await;
                }
                None => {
                    let now_idle = idle.fetch_add(1, Ordering::AcqRel) + 1;
                    if now_idle >= self.concurrency {
                        stop.store(true, Ordering::Release);
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    fn check_out_one(&self) -> Option<wm_types::UrlRecord> {
        match self.table.check_out(Status::Todo, self.level_limit) {
            Ok(record) => return Some(record),
            Err(_not_found) => {}
        }
        self.table.check_out(Status::Error, self.level_limit).ok()
    }
}
