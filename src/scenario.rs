//! # Scenario モジュール
//!
//! YAML シナリオの読み込みと、シナリオからモデルを組み立てるファクトリを提供します。
//!
//! シナリオは次の要素で構成されます。
//!
//! - `meta`: 名前・説明・バージョン
//! - `sim`: モデル設定と、ヘッドレス実行の刻み・ステップ数・乱数シード
//! - `factions`: カスタム陣営（省略可）
//! - `vessels`: 機種の性能諸元
//! - `squadrons`: 配置する編隊（機種・陣営・グループ・機数・位置・速度）
//!
//! 編隊内の各機の位置はシード付き乱数でばらつかせるため、
//! 同じシナリオからは常に同じ初期配置が得られます。

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::SimError;
use crate::model::{Model, ModelConfig};
use crate::models::{
    Agent, AgentStats, Cannon, ColorRgb, Faction, StarfighterStats, SteeringTuning, Vector3,
    cannon::{DEFAULT_PROJECTILE_COLOR, DEFAULT_PROJECTILE_SIZE},
};

/// 組み込みの既定シナリオ
pub const DEFAULT_SCENARIO_YAML: &str = include_str!("../scenarios/default.yaml");

/// シナリオメタデータ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(flatten)]
    pub model: ModelConfig,
    /// ヘッドレス実行の時間刻み（秒）
    #[serde(default = "default_dt_s")]
    pub dt_s: f64,
    /// ヘッドレス実行のステップ数
    #[serde(default = "default_steps")]
    pub steps: u64,
    /// 配置用乱数のシード
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_dt_s() -> f64 {
    0.04
}

fn default_steps() -> u64 {
    1500
}

fn default_seed() -> u64 {
    2000
}

/// カスタム陣営の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FactionConfig {
    pub name: String,
    #[serde(default = "default_faction_color")]
    pub color: [f32; 3],
    /// 省略時は「自分でも中立でもなければ敵」
    #[serde(default)]
    pub enemies: Option<Vec<String>>,
}

fn default_faction_color() -> [f32; 3] {
    [0.8, 0.8, 0.8]
}

/// 機種の振る舞い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VesselKind {
    Starfighter,
    Capital,
    Stationary,
}

/// 砲の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CannonConfig {
    pub speed_s: f64,
    pub projectile_velocity: f64,
    pub damage: f64,
    pub ttl_s: f64,
    pub size: f64,
    pub color: [f32; 3],
}

impl Default for CannonConfig {
    fn default() -> Self {
        let c = DEFAULT_PROJECTILE_COLOR;
        Self {
            speed_s: 1.0,
            projectile_velocity: 300.0,
            damage: 3400.0,
            ttl_s: 2.0,
            size: DEFAULT_PROJECTILE_SIZE,
            color: [c.r, c.g, c.b],
        }
    }
}

impl CannonConfig {
    pub fn build(&self) -> Result<Cannon, SimError> {
        let [r, g, b] = self.color;
        Ok(Cannon::new(self.speed_s, self.projectile_velocity, self.damage, self.ttl_s)?
            .with_projectile_size(self.size)?
            .with_projectile_color(ColorRgb::new(r, g, b)))
    }
}

/// 機種の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VesselConfig {
    pub name: String,
    pub kind: VesselKind,
    pub length: f64,
    /// 省略時は移動しない物体として全長から算出
    #[serde(default)]
    pub mass: Option<f64>,
    #[serde(default)]
    pub vmin: f64,
    #[serde(default)]
    pub vmax: f64,
    #[serde(default)]
    pub health: Option<f64>,
    #[serde(default)]
    pub bounds: Option<f64>,
    /// 戦闘機の操舵パラメータ（指定した項目のみ既定値を上書き）
    #[serde(default)]
    pub tuning: Option<SteeringTuning>,
    #[serde(default)]
    pub cannon: Option<CannonConfig>,
}

impl VesselConfig {
    /// 基本諸元を組み立てる
    pub fn stats(&self) -> AgentStats {
        let mut stats = match (self.kind, self.mass) {
            (VesselKind::Stationary, None) => AgentStats::immovable(self.length),
            (VesselKind::Stationary, Some(mass)) => AgentStats::new(self.length, mass, 0.0, 0.0),
            (_, mass) => AgentStats::new(self.length, mass.unwrap_or(self.length * 5.0), self.vmin, self.vmax),
        };
        if let Some(health) = self.health {
            stats = stats.with_health(health);
        }
        if let Some(bounds) = self.bounds {
            stats = stats.with_bounds(bounds);
        }
        stats
    }

    pub fn starfighter_stats(&self) -> Result<StarfighterStats, SimError> {
        let cannon = self.cannon.clone().unwrap_or_default().build()?;
        Ok(StarfighterStats {
            base: self.stats(),
            tuning: self.tuning.clone().unwrap_or_default(),
            cannon,
        })
    }
}

/// 番号付けの設定（例: prefix "PK-4", first 1, width 2 → PK-401, PK-402, ...）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NumberingConfig {
    #[serde(default = "default_first_number")]
    pub first: u32,
    #[serde(default)]
    pub width: usize,
}

fn default_first_number() -> u32 {
    1
}

/// 編隊の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SquadronConfig {
    pub name: String,
    pub vessel: String,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub numbering: Option<NumberingConfig>,
    #[serde(default)]
    pub group: i32,
    #[serde(default = "default_faction_name")]
    pub faction: String,
    pub center: Vector3,
    /// 各軸の配置ばらつき幅（m）
    #[serde(default)]
    pub spread: f64,
    pub velocity: Vector3,
    #[serde(default)]
    pub up: Option<Vector3>,
}

fn default_count() -> u32 {
    1
}

fn default_faction_name() -> String {
    "neutral".to_string()
}

impl SquadronConfig {
    /// i 番目（0始まり）の機体名
    pub fn member_name(&self, i: u32) -> String {
        match &self.numbering {
            Some(n) => format!("{}{:0width$}", self.name, n.first + i, width = n.width),
            None if self.count > 1 => format!("{} {}", self.name, i + 1),
            None => self.name.clone(),
        }
    }
}

/// 完全なシナリオ設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub factions: Vec<FactionConfig>,
    pub vessels: Vec<VesselConfig>,
    pub squadrons: Vec<SquadronConfig>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig =
            serde_yaml::from_str(&contents).map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;
        Ok(config)
    }

    /// YAML文字列からシナリオ設定を読み込み
    pub fn from_yaml(yaml: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig =
            serde_yaml::from_str(yaml).map_err(|e| ScenarioError::ParseError("<inline>".into(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 組み込みの既定シナリオ
    pub fn builtin_default() -> Result<Self, ScenarioError> {
        Self::from_yaml(DEFAULT_SCENARIO_YAML)
    }

    /// 設定の基本的な検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        self.sim.model.validate()?;
        if !(self.sim.dt_s >= self.sim.model.dt_min_s) {
            return Err(ScenarioError::ValidationError(format!(
                "dt_s ({}) must be at least dt_min_s ({})",
                self.sim.dt_s, self.sim.model.dt_min_s
            )));
        }

        let mut vessel_names = HashSet::new();
        for vessel in &self.vessels {
            if !vessel_names.insert(vessel.name.as_str()) {
                return Err(ScenarioError::ValidationError(format!("Duplicate vessel {}", vessel.name)));
            }
        }

        let mut faction_names = HashSet::new();
        for faction in &self.factions {
            if Faction::builtin(&faction.name).is_some() || !faction_names.insert(faction.name.as_str()) {
                return Err(ScenarioError::ValidationError(format!(
                    "Faction {} is already defined",
                    faction.name
                )));
            }
        }

        for squadron in &self.squadrons {
            if !vessel_names.contains(squadron.vessel.as_str()) {
                return Err(ScenarioError::ValidationError(format!(
                    "Squadron {} uses unknown vessel {}",
                    squadron.name, squadron.vessel
                )));
            }
            if Faction::builtin(&squadron.faction).is_none() && !faction_names.contains(squadron.faction.as_str()) {
                return Err(ScenarioError::ValidationError(format!(
                    "Squadron {} uses unknown faction {}",
                    squadron.name, squadron.faction
                )));
            }
            if squadron.count == 0 {
                return Err(ScenarioError::ValidationError(format!(
                    "Squadron {} must have at least one member",
                    squadron.name
                )));
            }
            if !(squadron.spread >= 0.0) {
                return Err(ScenarioError::ValidationError(format!(
                    "Squadron {} spread must not be negative",
                    squadron.name
                )));
            }
        }

        Ok(())
    }

    pub fn total_agents(&self) -> u32 {
        self.squadrons.iter().map(|s| s.count).sum()
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("トリガー: {:?} ({}ms)", self.sim.model.trigger, self.sim.model.step_interval().as_millis());
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("ステップ数: {} ({:.1}秒)", self.sim.steps, self.sim.steps as f64 * self.sim.dt_s);
        println!("シード値: {}", self.sim.seed);
        println!();

        println!("=== 配置 ===");
        println!("機種数: {}", self.vessels.len());
        println!("総機数: {}機", self.total_agents());
        for squadron in &self.squadrons {
            println!(
                "  {}: {} x{} (陣営: {}, グループ: {})",
                squadron.member_name(0),
                squadron.vessel,
                squadron.count,
                squadron.faction,
                squadron.group
            );
        }
    }
}

/// モデルを組み立てるファクトリ
pub trait ModelFactory {
    /// 初期状態のエージェント一覧を作成
    fn create_agents(&self) -> Result<Vec<Agent>, ScenarioError>;

    fn model_config(&self) -> ModelConfig;

    /// 設定されたトリガーを持つモデルを作成
    fn create_model(&self) -> Result<Model, ScenarioError> {
        Ok(Model::new(self.create_agents()?, self.model_config())?)
    }

    /// トリガーを持たないモデルを作成
    fn create_headless_model(&self) -> Result<Model, ScenarioError> {
        Ok(Model::headless(self.create_agents()?, self.model_config())?)
    }
}

/// シナリオ設定からモデルを組み立てるファクトリ
pub struct ScenarioFactory {
    config: ScenarioConfig,
    factions: HashMap<String, Faction>,
}

impl ScenarioFactory {
    pub fn new(config: ScenarioConfig) -> Result<Self, ScenarioError> {
        config.validate()?;
        let factions = config
            .factions
            .iter()
            .map(|f| {
                let [r, g, b] = f.color;
                let faction = Faction::custom(f.name.clone(), ColorRgb::new(r, g, b), f.enemies.clone());
                (f.name.clone(), faction)
            })
            .collect();
        Ok(Self { config, factions })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    fn faction(&self, name: &str) -> Result<Faction, ScenarioError> {
        if let Some(faction) = self.factions.get(name) {
            return Ok(faction.clone());
        }
        Faction::builtin(name).ok_or_else(|| ScenarioError::ValidationError(format!("Unknown faction {}", name)))
    }

    fn vessel(&self, name: &str) -> Result<&VesselConfig, ScenarioError> {
        self.config
            .vessels
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| ScenarioError::ValidationError(format!("Unknown vessel {}", name)))
    }
}

impl ModelFactory for ScenarioFactory {
    fn create_agents(&self) -> Result<Vec<Agent>, ScenarioError> {
        // 毎回同じ配置になるよう乱数を初期化し直す
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.sim.seed);
        let mut agents = Vec::with_capacity(self.config.total_agents() as usize);

        for squadron in &self.config.squadrons {
            let vessel = self.vessel(&squadron.vessel)?;
            let faction = self.faction(&squadron.faction)?;

            for i in 0..squadron.count {
                let position = squadron.center + jitter(&mut rng, squadron.spread);
                let agent = match vessel.kind {
                    VesselKind::Starfighter => Agent::starfighter(vessel.starfighter_stats()?, position, squadron.velocity)?,
                    VesselKind::Capital => Agent::capital_ship(vessel.stats(), position, squadron.velocity)?,
                    VesselKind::Stationary => Agent::stationary(vessel.stats(), position, squadron.velocity)?,
                };
                let agent = match squadron.up {
                    Some(up) => agent.with_up(up),
                    None => agent,
                };
                agents.push(
                    agent
                        .with_name(squadron.member_name(i))
                        .with_group(squadron.group)
                        .with_faction(faction.clone()),
                );
            }
            debug!(
                squadron = %squadron.name,
                vessel = %vessel.name,
                count = squadron.count,
                faction = %faction,
                "SQUADRON_CREATED: 編隊を配置しました"
            );
        }

        info!(
            scenario = %self.config.meta.name,
            agents = agents.len(),
            seed = self.config.sim.seed,
            "AGENTS_CREATED: エージェントを配置しました"
        );
        Ok(agents)
    }

    fn model_config(&self) -> ModelConfig {
        self.config.sim.model.clone()
    }
}

/// 各軸 U[0,1)·spread − spread/2 のばらつき
fn jitter(rng: &mut ChaCha8Rng, spread: f64) -> Vector3 {
    if spread <= 0.0 {
        return Vector3::ZERO;
    }
    let mut axis = || rng.gen_range(0.0..1.0) * spread - spread / 2.0;
    let x = axis();
    let y = axis();
    let z = axis();
    Vector3::new(x, y, z)
}

/// シナリオ読み込みエラー
#[derive(Debug)]
pub enum ScenarioError {
    FileNotFound(std::path::PathBuf),
    IoError(std::path::PathBuf, std::io::Error),
    ParseError(std::path::PathBuf, serde_yaml::Error),
    ValidationError(String),
    Simulation(SimError),
}

impl std::fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScenarioError::FileNotFound(path) => {
                write!(f, "シナリオファイルが見つかりません: {}", path.display())
            }
            ScenarioError::IoError(path, err) => {
                write!(f, "ファイル読み込みエラー {}: {}", path.display(), err)
            }
            ScenarioError::ParseError(path, err) => {
                write!(f, "YAML解析エラー {}: {}", path.display(), err)
            }
            ScenarioError::ValidationError(msg) => {
                write!(f, "設定検証エラー: {}", msg)
            }
            ScenarioError::Simulation(err) => {
                write!(f, "モデル構築エラー: {}", err)
            }
        }
    }
}

impl std::error::Error for ScenarioError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScenarioError::IoError(_, err) => Some(err),
            ScenarioError::ParseError(_, err) => Some(err),
            ScenarioError::Simulation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SimError> for ScenarioError {
    fn from(err: SimError) -> Self {
        ScenarioError::Simulation(err)
    }
}
