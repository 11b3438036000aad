use chrono::{
    DateTime, Duration as ChronoDuration, LocalResult, NaiveDateTime,
    NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;
use futures::future::join_all;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    configuration::{AppState, State},
    error::Error,
    model::DispatchResult,
};

/// Totals of one reminder firing.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub users: usize,
    pub sent: usize,
    pub failed: usize,
    pub errors: usize,
}

/// Fires the daily reminder at a local wall-clock time.
pub struct ReminderScheduler {
    state: AppState<State>,
    at: NaiveTime,
    timezone: Tz,
}

impl ReminderScheduler {
    pub fn new(state: AppState<State>) -> Result<ReminderScheduler, Error> {
        if !state.dispatcher.is_configured() {
            return Err(Error::ConfigMissing(String::from(
                "VAPID_PRIVATE_KEY and VAPID_PUBLIC_KEY are required for the scheduler",
            )));
        }

        let at = state.config.notification_time;
        let timezone = state.config.timezone;

        Ok(ReminderScheduler {
            state,
            at,
            timezone,
        })
    }

    pub fn next_fire(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        next_fire_after(after, self.at, self.timezone)
    }

    /// Runs until `token` is cancelled. A firing that already started is
    /// always awaited to the end.
    pub async fn run(&self, token: CancellationToken) -> Result<(), Error> {
        info!(
            "Daily reminders at {} {}",
            self.at.format("%H:%M"),
            self.timezone
        );

        self.run_with(token, |now| self.next_fire(now)).await?;
        Ok(())
    }

    /// Loop behind [`run`](Self::run) with the fire-time rule supplied by the
    /// caller. Returns the summary of the last completed firing.
    pub async fn run_with<F>(
        &self,
        token: CancellationToken,
        next_fire: F,
    ) -> Result<Option<RunSummary>, Error>
    where
        F: Fn(DateTime<Utc>) -> DateTime<Utc>,
    {
        let mut last = None;

        loop {
            let next = next_fire(Utc::now());
            info!(
                "Next reminder at {} ({})",
                next.with_timezone(&self.timezone),
                next
            );

            if !sleep_until(next, &token).await {
                info!("Reminder scheduler stopped");
                return Ok(last);
            }

            last = Some(self.run_once().await);
        }
    }

    /// Fires immediately for every user in the store, leaving the recurring
    /// timer alone.
    pub async fn run_once(&self) -> RunSummary {
        let users = self.state.store.users().await;
        self.run_for(users).await
    }

    pub async fn run_for(&self, users: Vec<String>) -> RunSummary {
        let now = Utc::now().with_timezone(&self.timezone);
        info!(
            "Sending reminders at {} to {} users",
            now.format("%H:%M %d.%m.%Y %Z"),
            users.len()
        );

        let config = &self.state.config;
        let results = join_all(users.iter().map(|user| {
            self.state.dispatcher.send(user, config.message_for(user))
        }))
        .await;

        let mut totals = DispatchResult::default();
        let mut errors = 0;

        for (user, result) in users.iter().zip(results) {
            match result {
                Ok(result) => totals += result,
                Err(e) => {
                    error!("Reminder for {} failed: {}", user, e);
                    errors += 1;
                },
            }
        }

        let summary = RunSummary {
            users: users.len(),
            sent: totals.sent,
            failed: totals.failed,
            errors,
        };

        info!(
            "Reminders done: sent {}, failed {}, errors {}",
            summary.sent, summary.failed, summary.errors
        );

        summary
    }
}

/// Sleeps until the wall clock reaches `deadline`. Returns `false` when
/// cancelled first.
async fn sleep_until(deadline: DateTime<Utc>, token: &CancellationToken) -> bool {
    loop {
        let wait = match (deadline - Utc::now()).to_std() {
            Ok(wait) if !wait.is_zero() => wait,
            _ => return !token.is_cancelled(),
        };

        tokio::select! {
            _ = token.cancelled() => return false,
            _ = time::sleep(wait) => {}
        }
    }
}

/// First instant strictly after `after` whose wall-clock time in `timezone`
/// is `at`. Recomputed from the local rule each day, so DST changes move the
/// UTC instant instead of the local time.
pub fn next_fire_after(
    after: DateTime<Utc>,
    at: NaiveTime,
    timezone: Tz,
) -> DateTime<Utc> {
    let today = after.with_timezone(&timezone).date_naive();

    for date in today.iter_days().take(3) {
        let candidate = resolve_local(timezone, date.and_time(at));
        if candidate > after {
            return candidate;
        }
    }

    after + ChronoDuration::days(1)
}

/// Skipped local times (spring forward) move to the first valid minute after
/// the gap; repeated ones (fall back) take the earlier instant.
fn resolve_local(timezone: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match timezone.from_local_datetime(&local) {
        LocalResult::Single(at) => at.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let mut shifted = local;
            for _ in 0..24 * 60 {
                shifted += ChronoDuration::minutes(1);
                if let Some(at) = timezone.from_local_datetime(&shifted).earliest() {
                    return at.with_timezone(&Utc);
                }
            }
            timezone.from_utc_datetime(&local).with_timezone(&Utc)
        },
    }
}
