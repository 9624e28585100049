//! # Starfighter モジュール
//!
//! 戦闘機の操舵・戦闘AIを提供します。
//!
//! 各ティックで全エージェントを1回走査し、次の操舵要素を合成します。
//!
//! - **群れ行動**: 同一グループ機との分離・結合・整列
//! - **衝突回避**: 速度に応じた前方円錐内の最も近い障害物を回避
//! - **索敵・攻撃**: 攻撃範囲内の敵を目標として固定し、追尾・射撃
//! - **レーダー追跡**: 目標がない場合はレーダー範囲内の敵の推定位置へ向かう
//!
//! ダメージは弾の位置とは無関係に、発射時に計算した着弾予定時間が
//! 経過した時点で記録した目標へ直接適用されます。

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, trace};

use crate::error::{SimError, SimResult};
use crate::models::{
    agent::{Body, Hit, Neighbors, StepOutcome},
    cannon::Cannon,
    common::{Vector3, math_utils},
    faction::Faction,
    stats::{AgentStats, ValidationWarning},
};

/// 計算上意味のある最小距離（m）
pub const MIN_CALC_DIST: f64 = 1.0;

/// 操舵・戦闘の調整パラメータ
///
/// 角度はすべてラジアンです。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SteeringTuning {
    /// 機動性の総合評価（操舵力の倍率）
    pub agility: f64,
    /// ロール能力（上方向ベクトルの追従率）
    pub roll_agility: f64,
    /// 衝突回避で考慮する前方円錐の角度
    pub avoid_angle: f64,
    /// この角度（ψ）未満の障害物に対して回避行動をとる
    pub avoid_angle2: f64,
    pub avoid_weight: f64,
    /// 速度に応じた衝突回避の先読み距離係数
    pub avoid_dist_factor: f64,
    pub separation_distance: f64,
    pub cohesion_distance: f64,
    pub alignment_distance: f64,
    pub separation_angle: f64,
    pub cohesion_angle: f64,
    pub alignment_angle: f64,
    pub separation_weight: f64,
    pub cohesion_weight: f64,
    pub alignment_weight: f64,
    /// 敵を探知できる距離
    pub radar_range: f64,
    pub radar_angle: f64,
    /// 敵を探しに行く欲求の強さ
    pub enemy_seek_weight: f64,
    /// 敵を能動的に攻撃する距離
    pub attack_range: f64,
    pub attack_angle: f64,
    /// 目標方向へ飛ぶ重み
    pub attack_weight: f64,
    /// 目標の進行方向に揃える重み
    pub attack_alignment_weight: f64,
    /// 正面の敵を側方の敵より優先する度合い
    pub attack_frontal_priority: f64,
    /// 射撃可能な角度
    pub fire_angle: f64,
}

impl Default for SteeringTuning {
    fn default() -> Self {
        Self {
            agility: 2.0,
            roll_agility: 0.6,
            avoid_angle: 1.5,
            avoid_angle2: 0.8,
            avoid_weight: 0.5,
            avoid_dist_factor: 1.0,
            separation_distance: 40.0,
            cohesion_distance: 150.0,
            alignment_distance: 180.0,
            separation_angle: 3.0,
            cohesion_angle: PI * 2.0 / 3.0,
            alignment_angle: PI * 5.0 / 8.0,
            separation_weight: 0.2,
            cohesion_weight: 0.2,
            alignment_weight: 0.2,
            radar_range: 1800.0,
            radar_angle: 2.8,
            enemy_seek_weight: 4.0,
            attack_range: 300.0,
            attack_angle: 0.5,
            attack_weight: 0.1,
            attack_alignment_weight: 0.3,
            attack_frontal_priority: 20.0,
            fire_angle: 0.4,
        }
    }
}

impl SteeringTuning {
    pub fn validate(&self) -> SimResult<()> {
        let angles = [
            ("separation_angle", self.separation_angle),
            ("cohesion_angle", self.cohesion_angle),
            ("alignment_angle", self.alignment_angle),
            ("avoid_angle", self.avoid_angle),
            ("avoid_angle2", self.avoid_angle2),
            ("radar_angle", self.radar_angle),
            ("attack_angle", self.attack_angle),
            ("fire_angle", self.fire_angle),
        ];
        for (name, angle) in angles {
            if !math_utils::is_valid_angle(angle) {
                return Err(SimError::invalid(format!(
                    "{} was {}, must be between 0 and {}",
                    name, angle, PI
                )));
            }
        }
        if self.attack_angle > self.radar_angle {
            return Err(SimError::invalid("attack_angle must not be greater than radar_angle"));
        }
        if self.fire_angle > self.attack_angle {
            return Err(SimError::invalid("fire_angle must not be greater than attack_angle"));
        }
        Ok(())
    }
}

/// 戦闘機の性能諸元
///
/// 基本諸元に操舵パラメータと搭載砲を加えたものです。
#[derive(Debug, Clone, PartialEq)]
pub struct StarfighterStats {
    pub base: AgentStats,
    pub tuning: SteeringTuning,
    pub cannon: Cannon,
}

impl StarfighterStats {
    pub fn new(length: f64, mass: f64, vmin: f64, vmax: f64) -> Self {
        Self {
            base: AgentStats::new(length, mass, vmin, vmax),
            tuning: SteeringTuning::default(),
            cannon: Cannon::default(),
        }
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.base.health = health;
        self
    }

    pub fn with_tuning(mut self, tuning: SteeringTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_cannon(mut self, cannon: Cannon) -> Self {
        self.cannon = cannon;
        self
    }

    /// 整合性チェック
    ///
    /// 戦闘機は常に移動するため、vmin または vmax が0の諸元はエラーになります。
    pub fn validate(&mut self) -> SimResult<Vec<ValidationWarning>> {
        if !self.base.is_moveable() {
            return Err(SimError::invalid(format!(
                "starfighter must be moveable, vmin={} vmax={}",
                self.base.vmin, self.base.vmax
            )));
        }
        let warnings = self.base.validate()?;
        self.tuning.validate()?;
        Ok(warnings)
    }
}

/// 固定中の攻撃目標
#[derive(Debug, Clone, PartialEq)]
pub struct TargetLock {
    pub index: usize,
    pub name: String,
}

/// 発射済みで着弾待ちの弾
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingShot {
    target: Option<usize>,
}

/// 1ティック分の知覚結果
///
/// 計算ごとにスタック上で作られ、エージェント間で共有されることはありません。
#[derive(Debug, Clone)]
pub struct Perception {
    /// 分離力の合計（重み付け前）
    pub separation: Vector3,
    /// 結合対象の位置合計（自機を含む）
    pub flock_center: Vector3,
    /// 結合対象の数（自機を含む）
    pub n_cohesive: u32,
    /// 整列対象の速度合計（自機を含む）
    pub flock_velocity: Vector3,
    /// 衝突回避の先読み距離
    pub avoid_threshold: f64,
    /// 最も近い障害物までの距離（障害物がなければ先読み距離）
    pub avoid_dist: f64,
    pub avoid_danger: f64,
    /// 障害物への変位
    pub avoid: Vector3,
    pub enemy_seek: Vector3,
    pub enemies_on_radar: u32,
    /// 今回のパスで新たに選んだ目標
    pub new_target: Option<usize>,
}

impl Perception {
    pub fn has_hazard(&self) -> bool {
        self.avoid_dist < self.avoid_threshold
    }
}

/// 戦闘機の操舵状態
#[derive(Debug, Clone)]
pub struct Starfighter {
    stats: StarfighterStats,
    target: Option<TargetLock>,
    enemies_on_radar: u32,
    wait_before_next_shot: f64,
    projectile_hit_in: f64,
    pending_shot: Option<PendingShot>,
}

impl Starfighter {
    pub fn new(stats: StarfighterStats) -> Self {
        Self {
            stats,
            target: None,
            enemies_on_radar: 0,
            wait_before_next_shot: 0.0,
            projectile_hit_in: 0.0,
            pending_shot: None,
        }
    }

    pub fn stats(&self) -> &StarfighterStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut StarfighterStats {
        &mut self.stats
    }

    pub fn cannon(&self) -> &Cannon {
        &self.stats.cannon
    }

    pub fn target(&self) -> Option<&TargetLock> {
        self.target.as_ref()
    }

    pub fn enemies_on_radar(&self) -> u32 {
        self.enemies_on_radar
    }

    pub fn has_pending_shot(&self) -> bool {
        self.pending_shot.is_some()
    }

    /// 周囲のエージェントを走査して知覚結果を作る
    pub fn perceive(&self, body: &Body, faction: &Faction, group: i32, neighbors: &Neighbors) -> Perception {
        let tuning = &self.stats.tuning;
        let vl = body.velocity.length();
        let avoid_threshold = (vl + self.stats.base.length) * tuning.avoid_dist_factor;
        let avoid_rho = avoid_threshold * avoid_threshold / tuning.avoid_angle;
        let locked = self.target.is_some();

        let mut p = Perception {
            separation: Vector3::ZERO,
            flock_center: body.position,
            n_cohesive: 1,
            flock_velocity: body.velocity,
            avoid_threshold,
            avoid_dist: avoid_threshold,
            avoid_danger: f64::MAX,
            avoid: Vector3::ZERO,
            enemy_seek: Vector3::ZERO,
            enemies_on_radar: 0,
            new_target: None,
        };
        let mut target_rating = tuning.attack_range + tuning.attack_angle * tuning.attack_frontal_priority;

        for (index, other) in neighbors.iter() {
            let d = other.position() - body.position;
            let both_bounds = self.stats.base.bounds + other.stats().bounds;
            let dist = (d.length() - both_bounds).max(MIN_CALC_DIST);
            let angle = d.angle(&body.velocity);

            if other.group() == group && other.is_alive() {
                // 僚機: 群れ行動
                if dist < tuning.separation_distance && angle < tuning.separation_angle {
                    p.separation += d * (-1.0 / (dist * dist * dist));
                }
                if dist < tuning.cohesion_distance && angle < tuning.cohesion_angle {
                    p.n_cohesive += 1;
                    p.flock_center += other.position();
                }
                if dist < tuning.alignment_distance && angle < tuning.alignment_angle {
                    p.flock_velocity += other.velocity();
                }
            } else if angle < tuning.avoid_angle
                && (dist < p.avoid_dist || (p.has_hazard() && dist == p.avoid_dist))
            {
                // 衝突回避
                let psi = angle - both_bounds / (dist + both_bounds);
                if psi < tuning.avoid_angle2 {
                    let danger = psi * psi + dist * dist / avoid_rho + 1.0;
                    if dist < p.avoid_dist || danger < p.avoid_danger {
                        p.avoid_dist = dist;
                        p.avoid_danger = danger;
                        p.avoid = d;
                    }
                }
            } else if !locked && faction.is_enemy(other.faction()) {
                if dist < tuning.attack_range && angle < tuning.attack_angle {
                    let rating = dist + angle * tuning.attack_frontal_priority;
                    if rating < target_rating {
                        target_rating = rating;
                        p.new_target = Some(index);
                    }
                }
                if p.new_target.is_none() && dist < tuning.radar_range && angle < tuning.radar_angle {
                    // 距離で重み付けした敵の推定位置
                    p.enemy_seek += other.velocity() * (dist / tuning.radar_range);
                    p.enemy_seek += other.position();
                    p.enemies_on_radar += 1;
                }
            }
        }
        p
    }

    /// 1ティック分の操舵・戦闘計算
    ///
    /// # 引数
    ///
    /// * `dt` - 経過時間（秒）
    /// * `body` - 自機の位置・速度・上方向
    /// * `health` - 自機の現在耐久値
    /// * `faction` - 自機の陣営
    /// * `group` - 自機のグループ
    /// * `neighbors` - 自機以外の全エージェント
    pub fn compute(
        &mut self,
        dt: f64,
        body: &mut Body,
        health: f64,
        faction: &Faction,
        group: i32,
        neighbors: &Neighbors,
    ) -> StepOutcome {
        let alive = health > 0.0;
        let heading = body.velocity.normalize();
        let perception = self.perceive(body, faction, group, neighbors);
        let mut outcome = StepOutcome::default();

        if !alive {
            self.target = None;
        }
        if let Some(index) = perception.new_target.filter(|_| alive) {
            if let Some(target) = neighbors.get(index) {
                debug!(
                    target_index = index,
                    target_name = %target.name(),
                    "TARGET_LOCKED: 攻撃目標を固定しました"
                );
                self.target = Some(TargetLock { index, name: target.name().to_string() });
            }
        }
        self.enemies_on_radar = perception.enemies_on_radar;

        let tuning = &self.stats.tuning;
        let cannon = &self.stats.cannon;
        let mut force = Vector3::ZERO;

        // 攻撃
        self.wait_before_next_shot -= dt;
        self.projectile_hit_in -= dt;
        if let Some(lock) = &self.target {
            let engaged = neighbors.get(lock.index).and_then(|target| {
                let t = target.position() - body.position;
                let dist = t.length() - (self.stats.base.bounds + target.stats().bounds) - 1.0;
                let angle = t.angle(&body.velocity);
                let in_envelope = dist <= tuning.attack_range && angle <= tuning.attack_angle && target.is_alive();
                in_envelope.then(|| (t, dist, angle, target.velocity()))
            });
            match engaged {
                None => {
                    debug!(target_index = lock.index, "TARGET_LOST: 攻撃目標を見失いました");
                    self.target = None;
                }
                Some((t, dist, angle, target_velocity)) => {
                    // 目標方向へ飛び、目標の進行方向に揃える
                    force = t.normalize() * tuning.attack_weight;
                    force += target_velocity.normalize() * tuning.attack_alignment_weight;

                    if angle < tuning.fire_angle && self.wait_before_next_shot <= 0.0 {
                        outcome.projectile = Some(cannon.fire(body.position, body.velocity, Some(lock.index)));
                        self.projectile_hit_in = dist / cannon.projectile_velocity();
                        self.wait_before_next_shot = cannon.speed().max(self.projectile_hit_in);
                        self.pending_shot = Some(PendingShot { target: Some(lock.index) });
                        trace!(
                            target_index = lock.index,
                            distance = dist,
                            hit_in = self.projectile_hit_in,
                            "CANNON_FIRED: 射撃しました"
                        );
                    }
                }
            }
        }

        // 着弾判定（弾の位置ではなく着弾予定時間で判定する）
        if let Some(shot) = self.pending_shot {
            if self.projectile_hit_in <= 0.0 {
                if let Some(target) = shot.target {
                    outcome.hit = Some(Hit { target, damage: cannon.damage() });
                }
                self.pending_shot = None;
            }
        }

        if self.target.is_none() {
            // 結合
            if perception.n_cohesive > 1 {
                let center = perception.flock_center * (1.0 / perception.n_cohesive as f64);
                force += (center - body.position).normalize() * tuning.cohesion_weight;
            }
            // 整列（方向のみ）
            force += (perception.flock_velocity.normalize() - heading) * tuning.alignment_weight;
        }

        // 分離
        force += perception.separation * tuning.separation_weight;

        if perception.has_hazard() {
            let away = (heading - perception.avoid.normalize()).normalize();
            force += away * (tuning.avoid_weight / perception.avoid_danger);
        } else if perception.enemies_on_radar > 0 && self.target.is_none() {
            let estimate = perception.enemy_seek * (1.0 / perception.enemies_on_radar as f64);
            force += (estimate - body.position).normalize() * tuning.enemy_seek_weight;
        }

        // 積分
        force = force * tuning.agility;
        if alive {
            body.velocity += force;
        }
        self.limit_speed(body, heading);

        if !force.is_zero() {
            // バンク角の近似
            let roll = body.up.normalize() - force.normalize();
            body.up += roll * tuning.roll_agility;
        }

        body.position += body.velocity * dt;
        outcome
    }

    /// 速度を [vmin, vmax] に収める
    fn limit_speed(&self, body: &mut Body, previous_heading: Vector3) {
        let base = &self.stats.base;
        if !base.is_moveable() {
            return;
        }
        let vl = body.velocity.length();
        if vl > base.vmax {
            body.velocity = body.velocity * (base.vmax / vl);
        } else if vl < base.vmin {
            if vl > 0.0 {
                body.velocity = body.velocity * (base.vmin / vl);
            } else {
                body.velocity = previous_heading * base.vmin;
            }
        }
    }

    /// 状態表示用テキスト
    pub fn status_text(&self, health: f64) -> String {
        if health <= 0.0 {
            "dead".to_string()
        } else if let Some(lock) = &self.target {
            format!("attacking {}", lock.name)
        } else if self.enemies_on_radar > 0 {
            "pursuit".to_string()
        } else {
            "idle".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::agent::Agent;

    fn fighter_stats() -> StarfighterStats {
        StarfighterStats::new(12.5, 10000.0, 100.0, 400.0)
    }

    fn fighter(name: &str, position: Vector3, velocity: Vector3, group: i32, faction: Faction) -> Agent {
        Agent::starfighter(fighter_stats(), position, velocity)
            .unwrap()
            .with_name(name)
            .with_group(group)
            .with_faction(faction)
    }

    #[test]
    fn test_tuning_defaults_are_valid() {
        assert!(SteeringTuning::default().validate().is_ok());
        assert!(fighter_stats().validate().is_ok());
    }

    #[test]
    fn test_immovable_starfighter_is_rejected() {
        let velocity = Vector3::new(0.0, 0.0, -50.0);
        let stats = StarfighterStats::new(10.0, 100.0, 0.0, 0.0);
        assert!(stats.clone().validate().is_err());
        assert!(Agent::starfighter(stats, Vector3::ZERO, velocity).is_err());
        assert!(Agent::starfighter(StarfighterStats::new(10.0, 100.0, 0.0, 400.0), Vector3::ZERO, velocity).is_err());
    }

    #[test]
    fn test_speed_limit_skipped_for_immovable_stats() {
        let mut fighter = Starfighter::new(StarfighterStats::new(10.0, 100.0, 0.0, 0.0));
        let mut body = Body {
            position: Vector3::ZERO,
            velocity: Vector3::new(0.0, 0.0, -50.0),
            up: Vector3::new(0.0, 1.0, 0.0),
        };
        let outcome = fighter.compute(0.04, &mut body, 100.0, &Faction::Empire, 0, &Neighbors::new(&[], &[]));
        assert!(outcome.projectile.is_none());
        assert!(body.velocity.length() > 0.0);
    }

    #[test]
    fn test_tuning_angle_ordering_is_enforced() {
        let mut tuning = SteeringTuning::default();
        tuning.fire_angle = 0.6;
        assert!(tuning.validate().is_err());

        let mut tuning = SteeringTuning::default();
        tuning.attack_angle = 2.9;
        assert!(tuning.validate().is_err());

        let mut tuning = SteeringTuning::default();
        tuning.cohesion_angle = 4.0;
        assert!(tuning.validate().is_err());

        let mut tuning = SteeringTuning::default();
        tuning.separation_angle = -0.1;
        assert!(tuning.validate().is_err());
    }

    #[test]
    fn test_separation_grows_as_clearance_shrinks() {
        let velocity = Vector3::new(0.0, 0.0, -300.0);
        let me = fighter("A", Vector3::ZERO, velocity, 0, Faction::RebelAlliance);
        let Some(sf) = me.as_starfighter() else { panic!("not a starfighter") };

        let mut magnitudes = Vec::new();
        // 境界球の合計は12.5なので、距離40→クリアランス27.5、以降縮めていく
        for distance in [40.0, 30.0, 20.0, 14.0, 13.0] {
            let mate = fighter("B", Vector3::new(distance, 0.0, 0.0), velocity, 0, Faction::RebelAlliance);
            let others = [mate];
            let neighbors = Neighbors::new(&[], &others);
            let p = sf.perceive(me.body(), me.faction(), me.group(), &neighbors);
            // 僚機から離れる向き
            assert!(p.separation.x < 0.0);
            magnitudes.push(p.separation.length());
        }
        for pair in magnitudes.windows(2) {
            assert!(pair[1] > pair[0], "separation did not grow: {:?}", magnitudes);
        }

        // クリアランスは1で頭打ちになる
        let touching = fighter("C", Vector3::new(12.0, 0.0, 0.0), velocity, 0, Faction::RebelAlliance);
        let others = [touching];
        let p = sf.perceive(me.body(), me.faction(), me.group(), &Neighbors::new(&[], &others));
        assert!(math_utils::approx_eq(p.separation.length(), 12.0, 1e-9));
    }

    #[test]
    fn test_separation_is_mutual() {
        let a = fighter("A", Vector3::ZERO, Vector3::new(0.0, 0.0, -300.0), 0, Faction::Empire);
        let b = fighter("B", Vector3::new(20.0, 0.0, 0.0), Vector3::new(0.0, 0.0, -300.0), 0, Faction::Empire);
        let sa = a.as_starfighter().unwrap();
        let sb = b.as_starfighter().unwrap();
        let pa = sa.perceive(a.body(), a.faction(), a.group(), &Neighbors::new(&[], std::slice::from_ref(&b)));
        let pb = sb.perceive(b.body(), b.faction(), b.group(), &Neighbors::new(std::slice::from_ref(&a), &[]));
        assert!(pa.separation.x < 0.0);
        assert!(pb.separation.x > 0.0);
        assert!(math_utils::approx_eq(pa.separation.length(), pb.separation.length(), 1e-12));
    }

    #[test]
    fn test_enemy_in_attack_envelope_is_locked_next_compute() {
        // 低速なので衝突回避の先読み距離（112.5m）は目標より手前
        let velocity = Vector3::new(0.0, 0.0, -100.0);
        let mut imperial = fighter("PK-401", Vector3::ZERO, velocity, 1, Faction::Empire);
        let rebel = fighter("Rogue 1", Vector3::new(0.0, 0.0, -200.0), velocity, 0, Faction::RebelAlliance);
        assert!(imperial.as_starfighter().unwrap().target().is_none());

        let others = [rebel];
        let outcome = imperial.compute(0.04, &Neighbors::new(&[], &others));

        let lock = imperial.as_starfighter().unwrap().target().cloned();
        assert_eq!(lock, Some(TargetLock { index: 1, name: "Rogue 1".to_string() }));
        assert_eq!(imperial.status_text(), "attacking Rogue 1");
        // 真正面なので即座に射撃する
        let projectile = outcome.projectile.expect("fired");
        assert_eq!(projectile.target, Some(1));
    }

    #[test]
    fn test_destroyed_fighter_does_not_engage() {
        let velocity = Vector3::new(0.0, 0.0, -100.0);
        let mut imperial = fighter("PK-401", Vector3::ZERO, velocity, 1, Faction::Empire);
        let rebel = fighter("Rogue 1", Vector3::new(0.0, 0.0, -200.0), velocity, 0, Faction::RebelAlliance);
        assert!(imperial.hit(20000.0));

        let others = [rebel];
        let outcome = imperial.compute(0.04, &Neighbors::new(&[], &others));
        assert!(imperial.as_starfighter().unwrap().target().is_none());
        assert!(outcome.projectile.is_none());
        assert!(outcome.hit.is_none());
    }

    #[test]
    fn test_lowest_rating_candidate_wins() {
        let velocity = Vector3::new(0.0, 0.0, -100.0);
        let mut imperial = fighter("PK-401", Vector3::ZERO, velocity, 1, Faction::Empire);
        // 近いが側方の敵と、やや遠いが正面の敵
        let side = fighter("Rogue 1", Vector3::new(70.0, 0.0, -140.0), velocity, 0, Faction::RebelAlliance);
        let front = fighter("Rogue 2", Vector3::new(0.0, 0.0, -165.0), velocity, 0, Faction::RebelAlliance);
        let others = [side, front];
        imperial.compute(0.04, &Neighbors::new(&[], &others));
        assert_eq!(imperial.as_starfighter().unwrap().target().map(|t| t.index), Some(2));
    }

    #[test]
    fn test_enemy_outside_attack_range_only_shows_on_radar() {
        let velocity = Vector3::new(0.0, 0.0, -100.0);
        let mut imperial = fighter("PK-401", Vector3::ZERO, velocity, 1, Faction::Empire);
        let rebel = fighter("Rogue 1", Vector3::new(0.0, 0.0, -1000.0), velocity, 0, Faction::RebelAlliance);
        let others = [rebel];
        imperial.compute(0.04, &Neighbors::new(&[], &others));
        let sf = imperial.as_starfighter().unwrap();
        assert!(sf.target().is_none());
        assert_eq!(sf.enemies_on_radar(), 1);
        assert_eq!(imperial.status_text(), "pursuit");
    }

    #[test]
    fn test_deferred_hit_is_reported_when_timer_elapses() {
        let mut imperial = fighter("PK-401", Vector3::ZERO, Vector3::new(0.0, 0.0, -100.0), 1, Faction::Empire);
        // 敵は計算しないのでその場に留まる
        let rebel = fighter("Rogue 1", Vector3::new(0.0, 0.0, -150.0), Vector3::new(0.0, 0.0, -100.0), 0, Faction::RebelAlliance);
        let others = [rebel];
        let neighbors = Neighbors::new(&[], &others);

        let first = imperial.compute(0.01, &neighbors);
        assert!(first.projectile.is_some());
        assert!(first.hit.is_none());
        assert!(imperial.as_starfighter().unwrap().has_pending_shot());

        // 距離 150 - 12.5 - 1 = 136.5m、弾速300 → 約0.455秒後に着弾
        let mut hit = None;
        let mut ticks = 0;
        for _ in 0..100 {
            ticks += 1;
            let outcome = imperial.compute(0.01, &neighbors);
            if outcome.hit.is_some() {
                hit = outcome.hit;
                break;
            }
        }
        let hit = hit.expect("hit must resolve");
        assert_eq!(ticks, 46);
        assert!(!imperial.as_starfighter().unwrap().has_pending_shot());
        assert_eq!(hit.target, 1);
        assert_eq!(hit.damage, 3400.0);
    }

    #[test]
    fn test_speed_stays_within_limits() {
        let velocity = Vector3::new(0.0, 0.0, -300.0);
        let mut agents: Vec<Agent> = (0..6)
            .map(|i| {
                fighter(
                    &format!("F{}", i),
                    Vector3::new(i as f64 * 15.0, 0.0, 0.0),
                    velocity,
                    i % 2,
                    if i % 2 == 0 { Faction::RebelAlliance } else { Faction::Empire },
                )
            })
            .collect();
        for _ in 0..50 {
            for i in 0..agents.len() {
                let (before, rest) = agents.split_at_mut(i);
                let (me, after) = rest.split_first_mut().unwrap();
                me.compute(0.04, &Neighbors::new(before, after));
                let speed = me.velocity().length();
                assert!(speed >= 100.0 - 1e-9 && speed <= 400.0 + 1e-9, "speed {}", speed);
            }
        }
    }
}
