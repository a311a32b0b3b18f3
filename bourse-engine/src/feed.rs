use crate::error::EngineError;
use bourse_integration::{Publisher, Request, SocketConfig};
use bourse_markets::{Ohlc, Period};
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::sync::Notify;
use tracing::{debug, error};

/// Barrier timing: how long the feed holds the clock waiting for
/// `continue`.
#[derive(Debug, Copy, Clone)]
pub struct BarrierSettings {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for BarrierSettings {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

/// Level-triggered gate holding the simulation clock between bars.
///
/// Cleared on bar entry, released by `continue`. A release arriving before
/// the next bar has been published is consumed by that bar's entry, not
/// buffered.
#[derive(Debug, Default)]
struct DayGate {
    released: Mutex<bool>,
    notify: Notify,
}

impl DayGate {
    fn clear(&self) {
        *self.released.lock() = false;
    }

    fn release(&self) {
        *self.released.lock() = true;
        self.notify.notify_one();
    }

    /// Wait in `attempts` slices of `interval` for a release.
    async fn wait(&self, settings: BarrierSettings) -> bool {
        for _ in 0..settings.attempts {
            if *self.released.lock() {
                return true;
            }
            let _ = tokio::time::timeout(settings.interval, self.notify.notified()).await;
        }
        *self.released.lock()
    }
}

/// The engine's market-data feed: publishes each bar's period snapshot,
/// positions and OHLC bars, then blocks on the per-bar barrier until the
/// controller signals `continue`.
#[derive(Debug)]
pub struct Feed {
    publisher: Publisher,
    gate: DayGate,
    barrier: BarrierSettings,
    day_completed: AtomicBool,
}

impl Feed {
    pub async fn bind(config: SocketConfig, barrier: BarrierSettings) -> Result<Self, EngineError> {
        let publisher = Publisher::bind(config).await?;
        Ok(Self {
            publisher,
            gate: DayGate::default(),
            barrier,
            day_completed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SocketConfig {
        self.publisher.config()
    }

    pub fn day_completed(&self) -> bool {
        self.day_completed.load(Ordering::Acquire)
    }

    /// `continue` handler: release the barrier.
    pub fn release(&self) {
        self.gate.release();
    }

    /// Publish one session's data, then hold the clock at the barrier.
    ///
    /// `day_completed` always follows every `period`/`position`/`ohlc`
    /// message of the session. A barrier timeout aborts the simulation with
    /// [`EngineError::EndOfDay`].
    pub async fn handle_data(&self, period: &Period, bars: &[Ohlc]) -> Result<(), EngineError> {
        self.day_completed.store(false, Ordering::Release);
        self.gate.clear();
        debug!(session = %period.period_close, bars = bars.len(), "publishing session");

        self.publisher
            .publish(&Request::with_data("period", period)?)
            .await?;
        for position in &period.positions {
            self.publisher
                .publish(&Request::with_data("position", position)?)
                .await?;
        }
        for bar in bars {
            self.publisher
                .publish(&Request::with_data("ohlc", bar)?)
                .await?;
        }
        self.publisher.publish(&Request::new("day_completed")).await?;

        if !self.gate.wait(self.barrier).await {
            error!("no continue signal before the barrier deadline");
            return Err(EngineError::EndOfDay);
        }

        self.day_completed.store(true, Ordering::Release);
        Ok(())
    }

    /// Final feed message of a run.
    pub async fn backtest_completed(&self) -> Result<(), EngineError> {
        self.publisher
            .publish(&Request::new("backtest_completed"))
            .await?;
        Ok(())
    }

    /// Tear the feed down: tell subscribers the run is over, then close so
    /// their next receive surfaces `SocketClosed`.
    pub async fn stop(&self) {
        self.gate.release();
        let _ = self.backtest_completed().await;
        self.publisher.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bourse_integration::{SocketPattern, Subscriber};
    use bourse_markets::factories;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn fast_barrier() -> BarrierSettings {
        BarrierSettings {
            attempts: 3,
            interval: Duration::from_millis(20),
        }
    }

    fn session_period(date: NaiveDate) -> Period {
        Period {
            period_open: factories::session_open(date),
            period_close: factories::session_close(date),
            starting_cash: 100_000.0,
            ending_cash: 100_000.0,
            portfolio_value: 100_000.0,
            pnl: 0.0,
            returns: 0.0,
            positions_value: 0.0,
            positions_exposure: 0.0,
            gross_leverage: 0.0,
            net_leverage: 0.0,
            capital_used: 0.0,
            longs_count: 0,
            shorts_count: 0,
            positions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_day_completed_follows_all_session_messages() {
        let feed = Arc::new(
            Feed::bind(
                SocketConfig::listener(SocketPattern::Pub),
                fast_barrier(),
            )
            .await
            .expect("bind"),
        );
        let subscriber = Subscriber::dial(feed.config().to_dialer(SocketPattern::Sub))
            .await
            .expect("dial");
        while feed.publisher.subscriber_count().await < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let date = NaiveDate::from_ymd_opt(2020, 1, 7).unwrap();
        let bars = vec![factories::bar("AAPL", date, 0), factories::bar("TSLA", date, 0)];
        let period = session_period(date);

        let publisher = Arc::clone(&feed);
        let session = tokio::spawn(async move {
            publisher.handle_data(&period, &bars).await
        });

        let mut tasks = Vec::new();
        loop {
            let message = subscriber.recv().await.expect("recv");
            let done = message.task == "day_completed";
            tasks.push(message.task);
            if done {
                break;
            }
        }
        assert_eq!(tasks, ["period", "ohlc", "ohlc", "day_completed"]);

        feed.release();
        session.await.expect("join").expect("handle_data");
        assert!(feed.day_completed());
    }

    #[tokio::test]
    async fn test_barrier_timeout_is_end_of_day() {
        let feed = Feed::bind(
            SocketConfig::listener(SocketPattern::Pub),
            fast_barrier(),
        )
        .await
        .expect("bind");

        let date = NaiveDate::from_ymd_opt(2020, 1, 7).unwrap();
        let error = feed
            .handle_data(&session_period(date), &[])
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::EndOfDay));
        assert!(!feed.day_completed());
    }

    #[tokio::test]
    async fn test_release_before_publish_is_not_buffered() {
        let feed = Feed::bind(
            SocketConfig::listener(SocketPattern::Pub),
            BarrierSettings {
                attempts: 2,
                interval: Duration::from_millis(10),
            },
        )
        .await
        .expect("bind");

        // A continue issued between bars must not pre-release the next bar.
        feed.release();

        let date = NaiveDate::from_ymd_opt(2020, 1, 7).unwrap();
        let error = feed
            .handle_data(&session_period(date), &[])
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::EndOfDay));
    }
}
