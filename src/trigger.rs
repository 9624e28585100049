//! # Trigger モジュール
//!
//! モデルの計算タイミングを決めるトリガー戦略を提供します。
//!
//! - `TimerTrigger`: 専用の tokio ランタイム上で一定間隔ごとに計算
//! - `FrameTrigger`: 描画フレームごとの呼び出しで計算（実経過時間を刻みに使う）
//!
//! どちらもエンジンを `Arc<Mutex<_>>` で共有し、1ステップの計算中は
//! ロックを保持します。ロックを保持したまま await することはありません。

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};
use tokio::{
    runtime::{Builder, Runtime},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};

use crate::error::SimResult;
use crate::simulation::SimulationEngine;

/// トリガーとモデルが共有するエンジン
pub type SharedEngine = Arc<Mutex<SimulationEngine>>;

/// ロックを取得する（他スレッドのパニックで汚染されていても状態はそのまま使う）
pub fn lock_engine(engine: &SharedEngine) -> MutexGuard<'_, SimulationEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 計算タイミングの戦略
pub trait ModelTrigger: Send {
    /// 計算の駆動を開始する
    fn start(&mut self, engine: SharedEngine) -> SimResult<()>;

    /// 計算の駆動を停止する（実行中のステップは完了させる）
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// 描画フレームの通知
    ///
    /// # 戻り値
    ///
    /// このフレームでモデルを計算した場合は true
    fn frame(&mut self, _engine: &SharedEngine, _now: Instant) -> bool {
        false
    }
}

/// 一定間隔でモデルを計算するトリガー
///
/// 各ステップは前のステップの開始から `interval` 後、または前のステップの
/// 計算が長引いた場合はその完了直後に開始します。刻みは常に `interval` です。
pub struct TimerTrigger {
    interval: Duration,
    runtime: Option<Runtime>,
    task: Option<JoinHandle<()>>,
    engine: Option<SharedEngine>,
    running: Arc<AtomicBool>,
}

impl TimerTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            runtime: None,
            task: None,
            engine: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 専用ランタイムを取得（初回のみ作成）
    fn runtime(&mut self) -> SimResult<&Runtime> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => Builder::new_multi_thread()
                .worker_threads(1)
                .enable_time()
                .thread_name("starsim-trigger")
                .build()?,
        };
        Ok(self.runtime.insert(runtime))
    }
}

impl ModelTrigger for TimerTrigger {
    fn start(&mut self, engine: SharedEngine) -> SimResult<()> {
        if self.is_running() {
            return Ok(());
        }
        let interval = self.interval;
        let dt = interval.as_secs_f64();
        // 起動ごとに新しいフラグを使い、停止済みの古いタスクが再開しないようにする
        self.running = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&self.running);
        let task_engine = Arc::clone(&engine);

        let handle = self.runtime()?.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let mut engine = lock_engine(&task_engine);
                // 停止要求の確認はロック内で行う
                if !running.load(Ordering::Acquire) {
                    break;
                }
                engine.compute(dt);
            }
            debug!("TIMER_TASK_EXIT: タイマータスクを終了しました");
        });

        info!(interval_ms = interval.as_millis() as u64, "TRIGGER_START: タイマートリガーを開始しました");
        self.task = Some(handle);
        self.engine = Some(engine);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
            info!("TRIGGER_STOP: タイマートリガーを停止しました");
        }
        // 実行中のステップの完了を待つ
        if let Some(engine) = self.engine.take() {
            drop(lock_engine(&engine));
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TimerTrigger {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// 描画フレームごとにモデルを計算するトリガー
///
/// 刻みは前回計算したフレームからの実経過時間を [dt_min, dt_max] に
/// 丸めたものです。計算されなかったフレームは基準時刻を進めません。
pub struct FrameTrigger {
    enabled: bool,
    last: Instant,
    dt_min: f64,
    dt_max: f64,
}

impl FrameTrigger {
    pub fn new(dt_min: f64, dt_max: f64) -> Self {
        Self {
            enabled: false,
            last: Instant::now(),
            dt_min,
            dt_max,
        }
    }
}

impl ModelTrigger for FrameTrigger {
    fn start(&mut self, _engine: SharedEngine) -> SimResult<()> {
        if !self.enabled {
            self.enabled = true;
            self.last = Instant::now();
            info!("TRIGGER_START: フレームトリガーを開始しました");
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.enabled {
            self.enabled = false;
            info!("TRIGGER_STOP: フレームトリガーを停止しました");
        }
    }

    fn is_running(&self) -> bool {
        self.enabled
    }

    fn frame(&mut self, engine: &SharedEngine, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        let dt = elapsed.clamp(self.dt_min, self.dt_max);
        let computed = lock_engine(engine).compute(dt);
        if computed {
            self.last = now;
        }
        computed
    }
}
