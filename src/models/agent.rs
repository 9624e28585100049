//! # Agent モジュール
//!
//! シミュレーション内のすべての物体（戦闘機、主力艦、惑星などの背景物体）を表します。
//!
//! 振る舞いは `AgentKind` で切り替えます。
//!
//! - `Stationary`: 移動しない（速度ベクトルは向きとしてのみ使用）
//! - `Inertial`: 一定速度で直進する（主力艦の推測航法）
//! - `Steering`: 群れ行動と戦闘AIで操舵する（戦闘機）

use tracing::{info, warn};

use crate::error::{SimError, SimResult};
use crate::models::{
    cannon::Projectile,
    common::Vector3,
    faction::Faction,
    starfighter::{Starfighter, StarfighterStats},
    stats::{AgentStats, MIN_VMIN, ValidationWarning},
};

/// 上方向と速度ベクトルのなす角の許容範囲（ラジアン）
const MIN_UP_ANGLE: f64 = 0.01;
const MAX_UP_ANGLE: f64 = 3.135;

/// 位置・速度・上方向
///
/// 速度ベクトルは機体の向きも兼ねます。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    pub position: Vector3,
    pub velocity: Vector3,
    pub up: Vector3,
}

/// エージェントの振る舞い
#[derive(Debug, Clone)]
pub enum AgentKind {
    Stationary(AgentStats),
    Inertial(AgentStats),
    Steering(Box<Starfighter>),
}

/// 1ティック分の計算結果
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    /// 今回発射した弾
    pub projectile: Option<Projectile>,
    /// 今回着弾した攻撃
    pub hit: Option<Hit>,
}

/// 着弾したダメージ
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// 被弾したエージェントのインデックス
    pub target: usize,
    pub damage: f64,
}

/// 計算中のエージェントから見た他の全エージェント
///
/// 自分より前のエージェント（今ティック更新済み）と後ろのエージェント
/// （未更新）のスライスを保持し、モデル全体でのインデックスを復元します。
#[derive(Debug, Clone, Copy)]
pub struct Neighbors<'a> {
    before: &'a [Agent],
    after: &'a [Agent],
}

impl<'a> Neighbors<'a> {
    pub fn new(before: &'a [Agent], after: &'a [Agent]) -> Self {
        Self { before, after }
    }

    /// 計算中のエージェント自身のインデックス
    pub fn own_index(&self) -> usize {
        self.before.len()
    }

    /// 自分以外のエージェント数
    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// モデル内インデックスで取得（自分自身は `None`）
    pub fn get(&self, index: usize) -> Option<&'a Agent> {
        let own = self.own_index();
        if index < own {
            self.before.get(index)
        } else if index == own {
            None
        } else {
            self.after.get(index - own - 1)
        }
    }

    /// (モデル内インデックス, エージェント) を順に返す
    pub fn iter(&self) -> impl Iterator<Item = (usize, &'a Agent)> + 'a {
        let (before, after) = (self.before, self.after);
        let offset = before.len() + 1;
        before
            .iter()
            .enumerate()
            .chain(after.iter().enumerate().map(move |(i, a)| (i + offset, a)))
    }
}

/// エージェント
#[derive(Debug, Clone)]
pub struct Agent {
    name: String,
    body: Body,
    kind: AgentKind,
    health: f64,
    faction: Faction,
    group: i32,
    collided: bool,
    warnings: Vec<ValidationWarning>,
}

impl Agent {
    /// 移動しない物体を作成
    pub fn stationary(stats: AgentStats, position: Vector3, orientation: Vector3) -> SimResult<Self> {
        Self::build(AgentKind::Stationary(stats), position, orientation)
    }

    /// 既定の諸元（全長1、質量1、速度上限は初期速度の大きさ）で移動しない物体を作成
    pub fn marker(position: Vector3, orientation: Vector3) -> SimResult<Self> {
        let vmax = orientation.length().max(MIN_VMIN);
        Self::stationary(AgentStats::new(1.0, 1.0, MIN_VMIN, vmax), position, orientation)
    }

    /// 一定速度で直進する主力艦を作成
    pub fn capital_ship(stats: AgentStats, position: Vector3, velocity: Vector3) -> SimResult<Self> {
        Self::build(AgentKind::Inertial(stats), position, velocity)
    }

    /// 戦闘機を作成
    pub fn starfighter(stats: StarfighterStats, position: Vector3, velocity: Vector3) -> SimResult<Self> {
        Self::build(AgentKind::Steering(Box::new(Starfighter::new(stats))), position, velocity)
    }

    fn build(mut kind: AgentKind, position: Vector3, velocity: Vector3) -> SimResult<Self> {
        if !position.is_finite() {
            return Err(SimError::invalid("position must be finite"));
        }
        if !velocity.is_finite() {
            return Err(SimError::invalid("velocity must be finite"));
        }
        let mut warnings = match &mut kind {
            AgentKind::Stationary(stats) | AgentKind::Inertial(stats) => stats.validate()?,
            AgentKind::Steering(fighter) => fighter.stats_mut().validate()?,
        };
        let health = match &kind {
            AgentKind::Stationary(stats) | AgentKind::Inertial(stats) => stats.health,
            AgentKind::Steering(fighter) => fighter.stats().base.health,
        };
        let mut agent = Self {
            name: String::new(),
            body: Body {
                position,
                velocity,
                up: Vector3::new(0.0, 1.0, 0.0),
            },
            kind,
            health,
            faction: Faction::Neutral,
            group: 0,
            collided: false,
            warnings: Vec::new(),
        };
        if velocity.is_zero() {
            return Err(SimError::invalid("velocity must not be zero"));
        }
        if let Some(adjusted) = agent.limit_velocity() {
            warnings.push(adjusted);
        }
        for w in &warnings {
            warn!(warning = %w, "STATS_ADJUSTED: 性能諸元を補正しました");
        }
        agent.warnings = warnings;
        Ok(agent)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_group(mut self, group: i32) -> Self {
        self.group = group;
        self
    }

    pub fn with_faction(mut self, faction: Faction) -> Self {
        self.faction = faction;
        self
    }

    /// 上方向ベクトルを設定
    ///
    /// 速度ベクトルとの角度は `validate` で検査されます。
    pub fn with_up(mut self, up: Vector3) -> Self {
        self.body.up = up;
        self
    }

    /// 状態の整合性チェック
    ///
    /// 上方向が速度とほぼ平行な場合や速度が0の場合はエラーになります。
    /// 速度の大きさが [vmin, vmax] の範囲外なら補正して警告を返します。
    pub fn validate(&mut self) -> SimResult<Vec<ValidationWarning>> {
        if !self.body.position.is_finite() || !self.body.velocity.is_finite() || !self.body.up.is_finite() {
            return Err(SimError::invalid(format!("{}: state vectors must be finite", self.name)));
        }
        if self.body.velocity.is_zero() {
            return Err(SimError::invalid(format!("{}: velocity must not be zero", self.name)));
        }
        let angle = self.body.velocity.angle(&self.body.up);
        if !(MIN_UP_ANGLE..=MAX_UP_ANGLE).contains(&angle) {
            return Err(SimError::invalid(format!(
                "{}: up vector is colinear with velocity (angle {:.4} rad)",
                self.name, angle
            )));
        }
        let mut warnings = Vec::new();
        if let Some(adjusted) = self.limit_velocity() {
            warn!(agent = %self.name, warning = %adjusted, "VELOCITY_ADJUSTED: 速度を補正しました");
            warnings.push(adjusted);
        }
        Ok(warnings)
    }

    /// 速度の大きさを [vmin, vmax] に収める（移動しないエージェントは対象外）
    fn limit_velocity(&mut self) -> Option<ValidationWarning> {
        let stats = self.stats();
        if !stats.is_moveable() {
            return None;
        }
        let (vmin, vmax) = (stats.vmin, stats.vmax);
        let vl = self.body.velocity.length();
        let to = if vl > vmax {
            vmax
        } else if vl < vmin {
            vmin
        } else {
            return None;
        };
        self.body.velocity = self.body.velocity * (to / vl);
        Some(ValidationWarning::VelocityAdjusted { from: vl, to })
    }

    /// 1ティック分の計算
    ///
    /// # 引数
    ///
    /// * `dt` - 経過時間（秒）
    /// * `neighbors` - 自分以外の全エージェント
    ///
    /// # 戻り値
    ///
    /// 発射した弾と、着弾したダメージ
    pub fn compute(&mut self, dt: f64, neighbors: &Neighbors) -> StepOutcome {
        match &mut self.kind {
            AgentKind::Stationary(_) => StepOutcome::default(),
            AgentKind::Inertial(_) => {
                self.body.position += self.body.velocity * dt;
                StepOutcome::default()
            }
            AgentKind::Steering(fighter) => {
                fighter.compute(dt, &mut self.body, self.health, &self.faction, self.group, neighbors)
            }
        }
    }

    /// ダメージを受ける
    ///
    /// # 戻り値
    ///
    /// この攻撃で撃破された場合のみ true（撃破済みの相手への追撃は false）
    pub fn hit(&mut self, damage: f64) -> bool {
        if !(damage >= 0.0) {
            warn!(agent = %self.name, damage, "NEGATIVE_DAMAGE: 負のダメージは無視します");
            return false;
        }
        let died = self.health > 0.0 && damage >= self.health;
        self.health -= damage;
        if died {
            info!(
                agent = %self.name,
                faction = %self.faction,
                damage,
                "AGENT_DESTROYED: エージェントが撃破されました"
            );
            self.faction = Faction::Neutral;
            self.health = 0.0;
        }
        died
    }

    /// 衝突を記録する
    pub fn collision(&mut self, _other: &Agent) {
        self.collided = true;
    }

    pub fn collided(&self) -> bool {
        self.collided
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn position(&self) -> Vector3 {
        self.body.position
    }

    pub fn velocity(&self) -> Vector3 {
        self.body.velocity
    }

    /// 機体の向き（速度ベクトル）
    pub fn orientation(&self) -> Vector3 {
        self.body.velocity
    }

    pub fn up(&self) -> Vector3 {
        self.body.up
    }

    pub fn kind(&self) -> &AgentKind {
        &self.kind
    }

    pub fn stats(&self) -> &AgentStats {
        match &self.kind {
            AgentKind::Stationary(stats) | AgentKind::Inertial(stats) => stats,
            AgentKind::Steering(fighter) => &fighter.stats().base,
        }
    }

    pub fn as_starfighter(&self) -> Option<&Starfighter> {
        match &self.kind {
            AgentKind::Steering(fighter) => Some(fighter),
            _ => None,
        }
    }

    pub fn as_starfighter_mut(&mut self) -> Option<&mut Starfighter> {
        match &mut self.kind {
            AgentKind::Steering(fighter) => Some(fighter),
            _ => None,
        }
    }

    pub fn health(&self) -> f64 {
        self.health
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0.0
    }

    pub fn faction(&self) -> &Faction {
        &self.faction
    }

    pub fn group(&self) -> i32 {
        self.group
    }

    /// 生成・検証時に自動補正された項目
    pub fn validation_warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// 状態表示用テキスト
    pub fn status_text(&self) -> String {
        match &self.kind {
            AgentKind::Steering(fighter) => fighter.status_text(self.health),
            _ if !self.is_alive() => "dead".to_string(),
            _ => "idle".to_string(),
        }
    }
}

impl std::fmt::Display for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}) at {}", self.name, self.faction, self.body.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xwing() -> Agent {
        Agent::starfighter(
            StarfighterStats::new(12.5, 10000.0, 100.0, 400.0).with_health(3400.0),
            Vector3::ZERO,
            Vector3::new(0.0, 0.0, -300.0),
        )
        .unwrap()
        .with_name("Rogue 1")
        .with_faction(Faction::RebelAlliance)
    }

    #[test]
    fn test_negative_damage_is_ignored() {
        let mut agent = xwing();
        assert!(!agent.hit(-5.0));
        assert_eq!(agent.health(), 3400.0);
        assert_eq!(agent.faction(), &Faction::RebelAlliance);
    }

    #[test]
    fn test_exact_lethal_damage_kills_and_neutralizes() {
        let mut agent = xwing();
        assert!(agent.hit(3400.0));
        assert_eq!(agent.health(), 0.0);
        assert!(agent.faction().is_neutral());
        assert!(!agent.is_alive());
        assert_eq!(agent.status_text(), "dead");
        // 撃破済みの相手への追撃は撃破扱いにならない
        assert!(!agent.hit(3400.0));
    }

    #[test]
    fn test_partial_damage_keeps_agent_alive() {
        let mut agent = xwing();
        assert!(!agent.hit(1000.0));
        assert_eq!(agent.health(), 2400.0);
        assert!(agent.is_alive());
        assert!(agent.hit(5000.0));
        assert_eq!(agent.health(), 0.0);
    }

    #[test]
    fn test_colinear_up_is_rejected() {
        let mut agent = Agent::capital_ship(
            AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
            Vector3::ZERO,
            Vector3::new(0.0, 5.0, 0.0),
        )
        .unwrap();
        assert!(agent.validate().is_err());

        let mut agent = agent.with_up(Vector3::new(0.0, 0.0, 1.0));
        assert!(agent.validate().is_ok());

        let mut reversed = Agent::marker(Vector3::ZERO, Vector3::new(0.0, -1.0, 0.0)).unwrap();
        assert!(reversed.validate().is_err());
    }

    #[test]
    fn test_zero_velocity_is_rejected() {
        let result = Agent::capital_ship(AgentStats::new(10.0, 100.0, 1.0, 40.0), Vector3::ZERO, Vector3::ZERO);
        assert!(matches!(result, Err(SimError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let result = Agent::marker(Vector3::new(f64::NAN, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0));
        assert!(result.is_err());
    }

    #[test]
    fn test_velocity_out_of_range_is_adjusted() {
        let agent = Agent::capital_ship(
            AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
            Vector3::ZERO,
            Vector3::new(0.0, 0.0, 0.5),
        )
        .unwrap();
        assert_eq!(agent.velocity(), Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(
            agent.validation_warnings(),
            &[ValidationWarning::VelocityAdjusted { from: 0.5, to: 1.0 }]
        );

        let fast = Agent::capital_ship(
            AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
            Vector3::ZERO,
            Vector3::new(0.0, 0.0, 80.0),
        )
        .unwrap();
        assert_eq!(fast.velocity().length(), 40.0);
    }

    #[test]
    fn test_immovable_keeps_orientation() {
        let sprite = Agent::stationary(
            AgentStats::immovable(1000.0),
            Vector3::new(0.0, 0.0, -8000.0),
            Vector3::new(0.0, 0.0, 3.0),
        )
        .unwrap();
        assert_eq!(sprite.velocity(), Vector3::new(0.0, 0.0, 3.0));
        assert!(sprite.validation_warnings().is_empty());
    }

    #[test]
    fn test_stats_are_copied_per_agent() {
        let stats = StarfighterStats::new(6.0, 10000.0, 200.0, 400.0);
        let mut a = Agent::starfighter(stats.clone(), Vector3::ZERO, Vector3::new(0.0, 0.0, 300.0)).unwrap();
        let b = Agent::starfighter(stats, Vector3::ZERO, Vector3::new(0.0, 0.0, 300.0)).unwrap();
        a.as_starfighter_mut().unwrap().stats_mut().cannon.set_damage(1.0).unwrap();
        assert_eq!(b.as_starfighter().unwrap().cannon().damage(), 3400.0);
    }

    #[test]
    fn test_capital_ship_dead_reckoning() {
        let mut isd = Agent::capital_ship(
            AgentStats::new(1600.0, 1_000_000.0, 1.0, 40.0),
            Vector3::new(-370.0, -140.0, -4020.0),
            Vector3::new(0.0, 0.0, 5.0),
        )
        .unwrap();
        let outcome = isd.compute(2.0, &Neighbors::new(&[], &[]));
        assert!(outcome.projectile.is_none());
        assert_eq!(isd.position(), Vector3::new(-370.0, -140.0, -4010.0));
    }

    #[test]
    fn test_neighbors_indexing() {
        let agents: Vec<Agent> = (0..4)
            .map(|i| Agent::marker(Vector3::new(i as f64, 0.0, 0.0), Vector3::new(0.0, 0.0, 1.0)).unwrap())
            .collect();
        let (before, rest) = agents.split_at(2);
        let neighbors = Neighbors::new(before, &rest[1..]);
        assert_eq!(neighbors.own_index(), 2);
        assert_eq!(neighbors.len(), 3);
        let indices: Vec<usize> = neighbors.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1, 3]);
        assert!(neighbors.get(2).is_none());
        assert_eq!(neighbors.get(3).map(|a| a.position().x), Some(3.0));
    }

    #[test]
    fn test_collision_flag() {
        let mut a = xwing();
        let b = xwing();
        assert!(!a.collided());
        a.collision(&b);
        assert!(a.collided());
    }
}
