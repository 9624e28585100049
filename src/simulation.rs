//! # Simulation モジュール
//!
//! 宇宙戦闘シミュレーションの中核となる計算エンジンを提供します。
//!
//! エンジンは全エージェントと飛翔中の弾を所有し、1ステップごとに
//! 全エージェントを配列順に1回ずつ計算します。
//!
//! ## ステップの処理順序
//!
//! 1. **弾の移動**: 飛翔中の弾を進め、寿命切れの弾を除去
//! 2. **エージェント計算**: 配列順に計算（後のエージェントは前のエージェントの
//!    今ステップ更新後の状態を参照する）
//! 3. **着弾処理**: 射撃側の計算直後に目標へダメージを適用
//! 4. **集計**: 移動可能で生存しているエージェントの平均位置・平均速度
//! 5. **性能記録**: 計算時間をリングバッファへ記録
//!
//! 同じ初期状態と同じ dt 列からは常に同じ結果が得られます。

use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::model::ModelConfig;
use crate::models::{Agent, Neighbors, Projectile, Vector3};

pub struct SimulationEngine {
    agents: Vec<Agent>,
    projectiles: Vec<Projectile>,
    /// 経過シミュレーション時間（秒）
    current_time: f64,
    step_count: u64,
    dt_min: f64,
    center: Vector3,
    mean_velocity: Vector3,
    /// 計算時間のリングバッファ（性能計測が無効なら `None`）
    perf: Option<Vec<Duration>>,
}

impl SimulationEngine {
    pub fn new(agents: Vec<Agent>, config: &ModelConfig) -> Self {
        let perf = config
            .collect_performance_data
            .then(|| vec![Duration::ZERO; config.perf_buffer_len.max(1)]);
        let mut engine = Self {
            agents,
            projectiles: Vec::new(),
            current_time: 0.0,
            step_count: 0,
            dt_min: config.dt_min_s,
            center: Vector3::ZERO,
            mean_velocity: Vector3::ZERO,
            perf,
        };
        engine.update_aggregates();
        engine
    }

    /// `dt` 秒後の状態を計算する
    ///
    /// # 引数
    ///
    /// * `dt` - 前回のステップからの経過時間（秒）
    ///
    /// # 戻り値
    ///
    /// 計算した場合は true。`dt` が最小刻み未満なら何もせず false
    pub fn compute(&mut self, dt: f64) -> bool {
        if !(dt >= self.dt_min) || !dt.is_finite() {
            trace!(dt, dt_min = self.dt_min, "STEP_SKIPPED: 時間刻みが最小値未満です");
            return false;
        }
        let started = Instant::now();

        self.process_projectiles(dt);
        self.process_agents(dt);
        self.update_aggregates();

        self.current_time += dt;
        self.step_count += 1;
        if let Some(perf) = &mut self.perf {
            let slot = (self.step_count % perf.len() as u64) as usize;
            perf[slot] = started.elapsed();
        }
        true
    }

    fn process_projectiles(&mut self, dt: f64) {
        for projectile in &mut self.projectiles {
            projectile.advance(dt);
        }
        self.projectiles.retain(|p| !p.is_expired());
    }

    fn process_agents(&mut self, dt: f64) {
        for i in 0..self.agents.len() {
            let (before, rest) = self.agents.split_at_mut(i);
            let Some((agent, after)) = rest.split_first_mut() else {
                break;
            };
            let outcome = agent.compute(dt, &Neighbors::new(before, after));

            if let Some(projectile) = outcome.projectile {
                self.projectiles.push(projectile);
            }
            if let Some(hit) = outcome.hit {
                let target = if hit.target < i {
                    before.get_mut(hit.target)
                } else if hit.target > i {
                    after.get_mut(hit.target - i - 1)
                } else {
                    None
                };
                if let Some(target) = target {
                    let destroyed = target.hit(hit.damage);
                    debug!(
                        shooter = %agent.name(),
                        target = %target.name(),
                        damage = hit.damage,
                        destroyed,
                        "PROJECTILE_HIT: 着弾しました"
                    );
                }
            }
        }
    }

    fn update_aggregates(&mut self) {
        let mut center = Vector3::ZERO;
        let mut velocity = Vector3::ZERO;
        let mut n = 0usize;
        for agent in self.agents.iter().filter(|a| a.stats().is_moveable() && a.is_alive()) {
            center += agent.position();
            velocity += agent.velocity();
            n += 1;
        }
        if n > 0 {
            let scale = 1.0 / n as f64;
            self.center = center * scale;
            self.mean_velocity = velocity * scale;
        } else {
            self.center = Vector3::ZERO;
            self.mean_velocity = Vector3::ZERO;
        }
    }

    /// 全エージェントの整合性チェック
    pub fn validate(&mut self) -> crate::error::SimResult<()> {
        for agent in &mut self.agents {
            agent.validate()?;
        }
        Ok(())
    }

    /// 1ステップの平均計算時間（記録のあるサンプルのみで平均）
    pub fn average_comp_time(&self) -> Duration {
        let Some(perf) = &self.perf else {
            return Duration::ZERO;
        };
        let samples: Vec<Duration> = perf.iter().copied().filter(|d| !d.is_zero()).collect();
        if samples.is_empty() {
            return Duration::ZERO;
        }
        samples.iter().sum::<Duration>() / samples.len() as u32
    }

    pub fn collects_performance_data(&self) -> bool {
        self.perf.is_some()
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn projectiles(&self) -> &[Projectile] {
        &self.projectiles
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// 移動可能で生存しているエージェントの平均位置
    pub fn center(&self) -> Vector3 {
        self.center
    }

    /// 移動可能で生存しているエージェントの平均速度
    pub fn mean_velocity(&self) -> Vector3 {
        self.mean_velocity
    }

    /// 固定刻みで指定ステップ数だけ計算する（ヘッドレス実行用）
    ///
    /// # 戻り値
    ///
    /// 実際に計算されたステップ数
    pub fn run(&mut self, dt: f64, steps: u64, progress_every: u64) -> u64 {
        info!(dt, steps, agents = self.agents.len(), "RUN_START: シミュレーション実行開始");
        let mut computed = 0;
        for _ in 0..steps {
            if !self.compute(dt) {
                break;
            }
            computed += 1;
            if progress_every > 0 && self.step_count % progress_every == 0 {
                let alive = self.agents.iter().filter(|a| a.is_alive()).count();
                info!(
                    step = self.step_count,
                    time_s = self.current_time,
                    alive,
                    projectiles = self.projectiles.len(),
                    "PROGRESS: 進行状況"
                );
            }
        }
        info!(steps = computed, time_s = self.current_time, "RUN_COMPLETE: シミュレーション完了");
        computed
    }
}

impl std::fmt::Display for SimulationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Model: t={}ms, {} steps, {} agents",
            (self.current_time * 1000.0).round() as i64,
            self.step_count,
            self.agents.len()
        )?;
        if self.perf.is_some() {
            write!(f, ", avg {:.3}ms", self.average_comp_time().as_secs_f64() * 1000.0)?;
        }
        Ok(())
    }
}
