// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A small cron-style driver.
//!
//! Jobs fire when their schedule comes due, run as spawned tasks with a
//! hard time limit, and are single-flight: a job still running when its
//! next slot arrives is simply skipped. A job that fails keeps its slot
//! and is retried on the next poll, which is also how interrupted pagers
//! resume mid-listing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use futures::future::BoxFuture;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::db::Cache;

pub mod jobs;

pub type JobFuture = BoxFuture<'static, anyhow::Result<()>>;
pub type JobFn = Arc<dyn Fn() -> JobFuture + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// A fixed interval from the previous successful run.
    Every(Duration),
    /// Every hour at the given minute.
    HourlyAt { minute: u32 },
    /// Every day at the given time.
    Daily { hour: u32, minute: u32 },
    /// Every week on the given day and time.
    Weekly {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
    /// Once a day at an hour drawn anew each day from `0..=latest_hour`.
    DailyRandomHour { latest_hour: u32 },
}

impl Schedule {
    /// The first fire time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Every(interval) => now + interval,
            Schedule::HourlyAt { minute } => {
                let candidate = crate::utils::truncate_to_hour(now) + Duration::minutes(minute.into());
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::hours(1)
                }
            }
            Schedule::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)
                    .expect("schedule times are valid");
                let candidate = now.date_naive().and_time(time).and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(1)
                }
            }
            Schedule::Weekly {
                weekday,
                hour,
                minute,
            } => {
                let time = NaiveTime::from_hms_opt(hour, minute, 0)
                    .expect("schedule times are valid");
                let mut candidate = now.date_naive().and_time(time).and_utc();
                while candidate.weekday() != weekday || candidate <= now {
                    candidate += Duration::days(1);
                }
                candidate
            }
            Schedule::DailyRandomHour { latest_hour } => {
                let mut rng = rand::thread_rng();
                let pick = |date: chrono::NaiveDate, rng: &mut rand::rngs::ThreadRng| {
                    let time = NaiveTime::from_hms_opt(
                        rng.gen_range(0..=latest_hour),
                        rng.gen_range(0..60),
                        0,
                    )
                    .expect("schedule times are valid");
                    date.and_time(time).and_utc()
                };
                let today = pick(now.date_naive(), &mut rng);
                if today > now {
                    today
                } else {
                    pick(now.date_naive() + Duration::days(1), &mut rng)
                }
            }
        }
    }
}

pub struct Job {
    pub name: &'static str,
    pub schedule: Schedule,
    /// Kill switch for a wedged run.
    pub hard_limit: StdDuration,
    pub run: JobFn,
}

impl Job {
    pub fn new(
        name: &'static str,
        schedule: Schedule,
        hard_limit: StdDuration,
        run: JobFn,
    ) -> Self {
        Self {
            name,
            schedule,
            hard_limit,
            run,
        }
    }
}

pub struct Scheduler {
    jobs: Vec<Job>,
    cache: Cache,
    poll_interval: StdDuration,
}

impl Scheduler {
    pub fn new(jobs: Vec<Job>, cache: Cache) -> Self {
        Self {
            jobs,
            cache,
            poll_interval: StdDuration::from_secs(30),
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, poll_interval: StdDuration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn next_fire_key(name: &str) -> String {
        format!("scheduler:{name}:next_fire")
    }

    async fn next_fire(&self, job: &Job, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let key = Self::next_fire_key(job.name);
        if let Some(raw) = self.cache.get(&key).await? {
            if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
                return Ok(at.with_timezone(&Utc));
            }
        }
        let at = job.schedule.next_after(now);
        self.cache.set(&key, &at.to_rfc3339(), None).await?;
        Ok(at)
    }

    async fn plan_next(&self, job: &Job, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let at = job.schedule.next_after(now);
        self.cache
            .set(&Self::next_fire_key(job.name), &at.to_rfc3339(), None)
            .await?;
        Ok(at)
    }

    /// Drive the job table forever.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut running: HashMap<&'static str, JoinHandle<anyhow::Result<()>>> = HashMap::new();
        for job in &self.jobs {
            let at = self.next_fire(job, Utc::now()).await?;
            info!(job = job.name, at = %at, "scheduled");
        }

        loop {
            tokio::time::sleep(self.poll_interval).await;
            self.tick(&mut running).await?;
        }
    }

    /// One poll: reap finished runs, fire due jobs.
    async fn tick(
        &self,
        running: &mut HashMap<&'static str, JoinHandle<anyhow::Result<()>>>,
    ) -> anyhow::Result<()> {
        let now = Utc::now();

        for job in &self.jobs {
            if let Some(handle) = running.get(job.name) {
                if !handle.is_finished() {
                    continue;
                }
                let handle = running.remove(job.name).expect("handle is present");
                match handle.await {
                    Ok(Ok(())) => {
                        let at = self.plan_next(job, now).await?;
                        info!(job = job.name, next = %at, "job finished");
                    }
                    Ok(Err(e)) => {
                        // The slot stays due; the next poll retries.
                        warn!(job = job.name, error = %e, "job failed, will retry");
                    }
                    Err(e) => {
                        error!(job = job.name, error = %e, "job panicked, will retry");
                    }
                }
            }

            if running.contains_key(job.name) {
                continue;
            }
            if self.next_fire(job, now).await? > now {
                continue;
            }

            info!(job = job.name, "starting");
            let run = job.run.clone();
            let hard_limit = job.hard_limit;
            let name = job.name;
            running.insert(
                job.name,
                tokio::spawn(async move {
                    match tokio::time::timeout(hard_limit, run()).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("job {name} hit its hard time limit")),
                    }
                }),
            );
        }
        Ok(())
    }
}
