//! # Benchmark モジュール
//!
//! ファクトリから新しいモデルを作り、固定刻みで指定ステップ数を計算して
//! 所要時間を測定します。

use std::time::{Duration, Instant};
use tracing::info;

use crate::error::SimError;
use crate::scenario::{ModelFactory, ScenarioError};

/// ベンチマーク結果
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkResult {
    pub agents: usize,
    pub steps: u64,
    /// 時間刻み（秒）
    pub dt: f64,
    pub runtime: Duration,
}

impl BenchmarkResult {
    /// 1ステップあたりの平均所要時間
    pub fn average(&self) -> Duration {
        if self.steps == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.runtime.as_nanos() / self.steps as u128) as u64)
    }
}

impl std::fmt::Display for BenchmarkResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} agents, {} steps, {} ms ({:.3} ms/step)",
            self.agents,
            self.steps,
            self.runtime.as_millis(),
            self.average().as_secs_f64() * 1000.0
        )
    }
}

/// モデルのベンチマーク
pub struct ModelBenchmark<'a> {
    factory: &'a dyn ModelFactory,
    runs: u64,
    dt: f64,
}

impl<'a> ModelBenchmark<'a> {
    /// # 引数
    ///
    /// * `factory` - モデルを作成するファクトリ
    /// * `runs` - 計算するステップ数（正の値）
    /// * `dt` - 1ステップの時間刻み（秒）
    pub fn new(factory: &'a dyn ModelFactory, runs: u64, dt: f64) -> Result<Self, SimError> {
        if runs == 0 {
            return Err(SimError::invalid("number of benchmark runs must be positive"));
        }
        Ok(Self { factory, runs, dt })
    }

    /// 新しいモデルを作成して計算する
    pub fn run(&self) -> Result<BenchmarkResult, ScenarioError> {
        let model = self.factory.create_headless_model()?;
        let started = Instant::now();
        let mut steps = 0;
        for _ in 0..self.runs {
            if model.compute(self.dt) {
                steps += 1;
            }
        }
        let result = BenchmarkResult {
            agents: model.num_agents(),
            steps,
            dt: self.dt,
            runtime: started.elapsed(),
        };
        info!(
            agents = result.agents,
            steps = result.steps,
            runtime_ms = result.runtime.as_millis() as u64,
            "BENCHMARK_COMPLETE: ベンチマーク完了"
        );
        Ok(result)
    }
}

impl std::fmt::Display for ModelBenchmark<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} steps of {} ms", self.runs, (self.dt * 1000.0).round() as i64)
    }
}
