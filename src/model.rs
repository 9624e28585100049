//! # Model モジュール
//!
//! エージェント集団とその計算スケジュールを管理する窓口です。
//!
//! モデルは計算エンジンとトリガー戦略を保持し、描画側やCLIからは
//! `&self` のメソッドだけで操作できます。状態は次の3つです。
//!
//! - `NotInitialized`: トリガーが未設定
//! - `Ready`: トリガー設定済みで停止中
//! - `Running`: トリガーが計算を駆動中
//!
//! 読み出し側はステップ単位で一貫した状態を観測します
//! （計算中のステップの途中状態は見えません）。

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

use crate::error::{SimError, SimResult};
use crate::models::{Agent, Projectile, Vector3};
use crate::simulation::SimulationEngine;
use crate::trigger::{FrameTrigger, ModelTrigger, SharedEngine, TimerTrigger, lock_engine};

/// 計算刻みの下限（秒）
pub const DT_MIN_S: f64 = 0.010;
/// 計算刻みの上限（秒）
pub const DT_MAX_S: f64 = 0.080;
/// 性能計測リングバッファの既定長
pub const PERF_BUFFER_LEN: usize = 100;

/// トリガー戦略の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Timer,
    Frame,
}

/// モデルの設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub trigger: TriggerKind,
    /// タイマートリガーの計算間隔（ミリ秒、[dt_min, dt_max] に丸められる）
    pub step_interval_ms: u64,
    pub collect_performance_data: bool,
    pub dt_min_s: f64,
    pub dt_max_s: f64,
    pub perf_buffer_len: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerKind::Timer,
            step_interval_ms: 40,
            collect_performance_data: true,
            dt_min_s: DT_MIN_S,
            dt_max_s: DT_MAX_S,
            perf_buffer_len: PERF_BUFFER_LEN,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> SimResult<()> {
        if !(self.dt_min_s > 0.0) {
            return Err(SimError::invalid(format!("dt_min_s must be positive, was {}", self.dt_min_s)));
        }
        if !(self.dt_max_s >= self.dt_min_s) {
            return Err(SimError::invalid(format!(
                "dt_max_s ({}) must not be less than dt_min_s ({})",
                self.dt_max_s, self.dt_min_s
            )));
        }
        if self.perf_buffer_len == 0 {
            return Err(SimError::invalid("perf_buffer_len must be positive"));
        }
        Ok(())
    }

    /// タイマートリガーの実際の計算間隔
    pub fn step_interval(&self) -> Duration {
        let secs = (self.step_interval_ms as f64 / 1000.0).clamp(self.dt_min_s, self.dt_max_s);
        Duration::from_secs_f64(secs)
    }
}

/// モデルの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    NotInitialized,
    Ready,
    Running,
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelStatus::NotInitialized => "not initialized",
            ModelStatus::Ready => "ready",
            ModelStatus::Running => "running",
        };
        f.write_str(s)
    }
}

/// シミュレーションモデル
pub struct Model {
    engine: SharedEngine,
    trigger: Mutex<Option<Box<dyn ModelTrigger>>>,
}

impl Model {
    /// 設定に従ったトリガーを持つモデルを作成
    ///
    /// 全エージェントの整合性チェックを行い、失敗した場合はモデルを作成しません。
    pub fn new(agents: Vec<Agent>, config: ModelConfig) -> SimResult<Self> {
        let trigger: Box<dyn ModelTrigger> = match config.trigger {
            TriggerKind::Timer => Box::new(TimerTrigger::new(config.step_interval())),
            TriggerKind::Frame => Box::new(FrameTrigger::new(config.dt_min_s, config.dt_max_s)),
        };
        let model = Self::headless(agents, config)?;
        model.attach_trigger(trigger);
        Ok(model)
    }

    /// トリガーを持たないモデルを作成（`compute` を直接呼んで進める）
    pub fn headless(agents: Vec<Agent>, config: ModelConfig) -> SimResult<Self> {
        config.validate()?;
        let mut engine = SimulationEngine::new(agents, &config);
        engine.validate()?;
        info!(
            agents = engine.agents().len(),
            trigger = ?config.trigger,
            "MODEL_CREATED: モデルを作成しました"
        );
        Ok(Self {
            engine: Arc::new(Mutex::new(engine)),
            trigger: Mutex::new(None),
        })
    }

    /// トリガーを設定（既存のトリガーは停止して置き換える）
    pub fn attach_trigger(&self, trigger: Box<dyn ModelTrigger>) {
        let mut slot = self.trigger_slot();
        if let Some(old) = slot.as_mut() {
            old.stop();
        }
        *slot = Some(trigger);
    }

    fn trigger_slot(&self) -> MutexGuard<'_, Option<Box<dyn ModelTrigger>>> {
        self.trigger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine(&self) -> MutexGuard<'_, SimulationEngine> {
        lock_engine(&self.engine)
    }

    pub fn status(&self) -> ModelStatus {
        match self.trigger_slot().as_ref() {
            None => ModelStatus::NotInitialized,
            Some(trigger) if trigger.is_running() => ModelStatus::Running,
            Some(_) => ModelStatus::Ready,
        }
    }

    /// 計算の駆動を開始（Ready 以外では何もしない）
    pub fn start(&self) -> SimResult<()> {
        let mut slot = self.trigger_slot();
        if let Some(trigger) = slot.as_mut() {
            if !trigger.is_running() {
                trigger.start(Arc::clone(&self.engine))?;
            }
        }
        Ok(())
    }

    /// 計算の駆動を停止（Running 以外では何もしない）
    ///
    /// 戻った時点で新しいステップが始まることはありません。
    pub fn stop(&self) {
        let mut slot = self.trigger_slot();
        if let Some(trigger) = slot.as_mut() {
            if trigger.is_running() {
                trigger.stop();
            }
        }
    }

    /// `dt` 秒分の計算を1ステップ行う
    ///
    /// # 戻り値
    ///
    /// 計算した場合は true。`dt` が最小刻み未満なら何もせず false
    pub fn compute(&self, dt: f64) -> bool {
        self.engine().compute(dt)
    }

    /// 描画フレームの通知（フレームトリガー使用時のみ計算する）
    pub fn frame(&self) -> bool {
        self.frame_at(Instant::now())
    }

    pub fn frame_at(&self, now: Instant) -> bool {
        match self.trigger_slot().as_mut() {
            Some(trigger) => trigger.frame(&self.engine, now),
            None => false,
        }
    }

    pub fn num_agents(&self) -> usize {
        self.engine().agents().len()
    }

    /// 1ステップの平均計算時間（性能計測が無効なら0）
    pub fn average_comp_time(&self) -> Duration {
        self.engine().average_comp_time()
    }

    /// 全エージェントのスナップショット
    pub fn agents(&self) -> Vec<Agent> {
        self.engine().agents().to_vec()
    }

    /// ロックを保持したまま全エージェントを参照する
    pub fn with_agents<R>(&self, f: impl FnOnce(&[Agent]) -> R) -> R {
        f(self.engine().agents())
    }

    /// 飛翔中の弾のスナップショット
    pub fn projectiles(&self) -> Vec<Projectile> {
        self.engine().projectiles().to_vec()
    }

    pub fn center(&self) -> Vector3 {
        self.engine().center()
    }

    pub fn mean_velocity(&self) -> Vector3 {
        self.engine().mean_velocity()
    }

    pub fn step_count(&self) -> u64 {
        self.engine().step_count()
    }

    /// 経過シミュレーション時間（秒）
    pub fn current_time(&self) -> f64 {
        self.engine().current_time()
    }

    /// 固定刻みで指定ステップ数だけ計算する
    pub fn run(&self, dt: f64, steps: u64, progress_every: u64) -> u64 {
        self.engine().run(dt, steps, progress_every)
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&*self.engine(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentStats, Faction, StarfighterStats};

    fn agents() -> Vec<Agent> {
        vec![
            Agent::starfighter(
                StarfighterStats::new(12.5, 10000.0, 100.0, 400.0),
                Vector3::ZERO,
                Vector3::new(-96.0, -22.0, -327.0),
            )
            .unwrap()
            .with_name("Rogue 1")
            .with_faction(Faction::RebelAlliance),
            Agent::capital_ship(
                AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
                Vector3::new(-370.0, -140.0, -4020.0),
                Vector3::new(0.0, 0.0, 5.0),
            )
            .unwrap()
            .with_name("Chimaera")
            .with_group(3)
            .with_faction(Faction::Empire),
        ]
    }

    fn frame_config() -> ModelConfig {
        ModelConfig {
            trigger: TriggerKind::Frame,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_status_transitions() {
        let model = Model::headless(agents(), ModelConfig::default()).unwrap();
        assert_eq!(model.status(), ModelStatus::NotInitialized);
        // トリガーがなければ開始しても変化しない
        model.start().unwrap();
        assert_eq!(model.status(), ModelStatus::NotInitialized);

        model.attach_trigger(Box::new(FrameTrigger::new(DT_MIN_S, DT_MAX_S)));
        assert_eq!(model.status(), ModelStatus::Ready);
        model.start().unwrap();
        assert_eq!(model.status(), ModelStatus::Running);
        model.stop();
        assert_eq!(model.status(), ModelStatus::Ready);
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let model = Model::new(agents(), ModelConfig::default()).unwrap();
        assert_eq!(model.status(), ModelStatus::Ready);
        model.stop();
        assert_eq!(model.status(), ModelStatus::Ready);

        model.start().unwrap();
        model.start().unwrap();
        assert_eq!(model.status(), ModelStatus::Running);
        std::thread::sleep(Duration::from_millis(120));
        model.stop();
        model.stop();
        assert_eq!(model.status(), ModelStatus::Ready);

        let steps = model.step_count();
        assert!(steps > 0);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(model.step_count(), steps);
    }

    #[test]
    fn test_frame_callbacks_only_drive_frame_trigger() {
        let timer = Model::new(agents(), ModelConfig::default()).unwrap();
        timer.start().unwrap();
        let before = timer.step_count();
        // タイマー駆動のモデルはフレーム通知では計算しない
        assert!(!timer.frame());
        timer.stop();
        assert!(timer.step_count() >= before);

        let framed = Model::new(agents(), frame_config()).unwrap();
        assert!(!framed.frame());
        framed.start().unwrap();
        let now = Instant::now();
        assert!(framed.frame_at(now + Duration::from_millis(30)));
        assert!(framed.frame_at(now + Duration::from_millis(60)));
        assert_eq!(framed.step_count(), 2);
        framed.stop();
        assert!(!framed.frame());
    }

    #[test]
    fn test_invalid_agent_fails_model_creation() {
        let colinear = Agent::capital_ship(
            AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
            Vector3::ZERO,
            Vector3::new(0.0, 5.0, 0.0),
        )
        .unwrap();
        let result = Model::new(vec![colinear], ModelConfig::default());
        assert!(matches!(result, Err(SimError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_compute_and_snapshot() {
        let model = Model::headless(agents(), ModelConfig::default()).unwrap();
        assert_eq!(model.num_agents(), 2);
        assert!(!model.compute(0.001));
        assert!(model.compute(0.04));
        assert_eq!(model.step_count(), 1);
        assert!(model.to_string().starts_with("Model: t=40ms, 1 steps, 2 agents, avg "));

        let names = model.with_agents(|agents| agents.iter().map(|a| a.name().to_string()).collect::<Vec<_>>());
        assert_eq!(names, vec!["Rogue 1", "Chimaera"]);
        assert_eq!(model.agents()[1].position(), Vector3::new(-370.0, -140.0, -4019.8));
    }

    #[test]
    fn test_step_interval_is_clamped() {
        let mut config = ModelConfig::default();
        config.step_interval_ms = 1;
        assert_eq!(config.step_interval(), Duration::from_millis(10));
        config.step_interval_ms = 500;
        assert_eq!(config.step_interval(), Duration::from_millis(80));
        config.step_interval_ms = 25;
        assert_eq!(config.step_interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_config_from_yaml_uses_defaults() {
        let config: ModelConfig = serde_yaml::from_str("trigger: frame\nstep_interval_ms: 20\n").unwrap();
        assert_eq!(config.trigger, TriggerKind::Frame);
        assert_eq!(config.step_interval_ms, 20);
        assert_eq!(config.dt_min_s, DT_MIN_S);
        assert_eq!(config.perf_buffer_len, PERF_BUFFER_LEN);
    }
}
