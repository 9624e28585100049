use crate::error::{SimError, SimResult};
use crate::models::common::{ColorRgb, Vector3};

/// 弾の既定色（緑）
pub const DEFAULT_PROJECTILE_COLOR: ColorRgb = ColorRgb::new(0.0, 1.0, 0.0);

/// 弾の既定サイズ
pub const DEFAULT_PROJECTILE_SIZE: f64 = 8.0;

/// 砲
///
/// 弾を生成する兵装の諸元です。ダメージは弾の空間的な接触ではなく、
/// 発射した機体側のタイマーで適用されます（`Starfighter` 参照）。
#[derive(Debug, Clone, PartialEq)]
pub struct Cannon {
    /// 次弾までの最小待ち時間（秒）
    speed: f64,
    /// 命中時のダメージ量
    damage: f64,
    /// 弾の寿命（秒）
    ttl: f64,
    /// 弾速（m/s）
    projectile_velocity: f64,
    /// 弾の表示サイズ
    projectile_size: f64,
    /// 弾の表示色
    projectile_color: ColorRgb,
}

impl Cannon {
    /// 新しい砲を作成
    ///
    /// # 引数
    ///
    /// * `speed` - 次弾までの最小待ち時間（秒）
    /// * `projectile_velocity` - 弾速（m/s）
    /// * `damage` - 命中時のダメージ量
    /// * `ttl` - 弾の寿命（秒）
    pub fn new(speed: f64, projectile_velocity: f64, damage: f64, ttl: f64) -> SimResult<Self> {
        if !(speed >= 0.0) {
            return Err(SimError::invalid(format!("cannon speed must not be negative, was {}", speed)));
        }
        if !(projectile_velocity > 0.0) {
            return Err(SimError::invalid(format!(
                "projectile velocity must be > 0, was {}",
                projectile_velocity
            )));
        }
        if !(damage > 0.0) {
            return Err(SimError::invalid(format!("damage must be > 0, was {}", damage)));
        }
        if !(ttl > 0.0) {
            return Err(SimError::invalid(format!("ttl must be > 0, was {}", ttl)));
        }
        Ok(Self {
            speed,
            damage,
            ttl,
            projectile_velocity,
            projectile_size: DEFAULT_PROJECTILE_SIZE,
            projectile_color: DEFAULT_PROJECTILE_COLOR,
        })
    }

    pub fn with_projectile_color(mut self, color: ColorRgb) -> Self {
        self.projectile_color = color;
        self
    }

    pub fn with_projectile_size(mut self, size: f64) -> SimResult<Self> {
        if !(size > 0.0) {
            return Err(SimError::invalid(format!("projectile size must be > 0, was {}", size)));
        }
        self.projectile_size = size;
        Ok(self)
    }

    /// 次弾までの最小待ち時間（秒）
    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn damage(&self) -> f64 {
        self.damage
    }

    pub fn set_damage(&mut self, damage: f64) -> SimResult<()> {
        if !(damage > 0.0) {
            return Err(SimError::invalid(format!("damage must be > 0, was {}", damage)));
        }
        self.damage = damage;
        Ok(())
    }

    pub fn ttl(&self) -> f64 {
        self.ttl
    }

    pub fn projectile_velocity(&self) -> f64 {
        self.projectile_velocity
    }

    pub fn projectile_size(&self) -> f64 {
        self.projectile_size
    }

    pub fn projectile_color(&self) -> ColorRgb {
        self.projectile_color
    }

    /// 弾を発射
    ///
    /// 弾の速度は `normalize(direction) × projectile_velocity` です。
    ///
    /// # 引数
    ///
    /// * `position` - 発射位置
    /// * `direction` - 発射方向（長さは無視される）
    /// * `target` - 狙った相手のインデックス
    pub fn fire(&self, position: Vector3, direction: Vector3, target: Option<usize>) -> Projectile {
        Projectile {
            position,
            velocity: direction.normalize() * self.projectile_velocity,
            target,
            ttl_remaining: self.ttl,
            size: self.projectile_size,
            color: self.projectile_color,
        }
    }
}

impl Default for Cannon {
    /// 戦闘機の標準砲（1秒間隔、弾速300、ダメージ3400、寿命2秒）
    fn default() -> Self {
        Self {
            speed: 1.0,
            damage: 3400.0,
            ttl: 2.0,
            projectile_velocity: 300.0,
            projectile_size: DEFAULT_PROJECTILE_SIZE,
            projectile_color: DEFAULT_PROJECTILE_COLOR,
        }
    }
}

impl std::fmt::Display for Cannon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "speed={}s, damage={}, ttl={}s", self.speed, self.damage, self.ttl)
    }
}

/// 発射された弾
///
/// 描画側が毎ティック読み取れる弾道状態です。寿命が尽きると消滅します。
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub position: Vector3,
    pub velocity: Vector3,
    /// 狙った相手（モデル内のエージェントインデックス）
    pub target: Option<usize>,
    /// 残り寿命（秒）
    pub ttl_remaining: f64,
    pub size: f64,
    pub color: ColorRgb,
}

impl Projectile {
    /// 弾道を `dt` 秒進める
    ///
    /// # 戻り値
    ///
    /// まだ生存している場合は true
    pub fn advance(&mut self, dt: f64) -> bool {
        if self.is_expired() {
            return false;
        }
        self.position += self.velocity * dt;
        self.ttl_remaining -= dt;
        !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.ttl_remaining <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::common::math_utils::approx_eq;

    #[test]
    fn test_invalid_cannons_are_rejected() {
        assert!(Cannon::new(-1.0, 300.0, 10.0, 1.0).is_err());
        assert!(Cannon::new(1.0, 0.0, 10.0, 1.0).is_err());
        assert!(Cannon::new(1.0, 300.0, 0.0, 1.0).is_err());
        assert!(Cannon::new(1.0, 300.0, 10.0, 0.0).is_err());
        assert!(Cannon::new(0.0, 300.0, 10.0, 1.0).is_ok());
    }

    #[test]
    fn test_fire_velocity_ignores_direction_magnitude() {
        let cannon = Cannon::new(1.0, 250.0, 10.0, 2.0).unwrap();
        for direction in [
            Vector3::new(0.001, 0.0, 0.0),
            Vector3::new(3.0, -4.0, 12.0),
            Vector3::new(-1e6, 2e6, 5.0),
        ] {
            let p = cannon.fire(Vector3::ZERO, direction, None);
            assert!(approx_eq(p.velocity.length(), 250.0, 1e-9));
            assert!(p.velocity.angle(&direction) < 1e-6);
        }
    }

    #[test]
    fn test_projectile_expires_after_ttl() {
        let cannon = Cannon::new(1.0, 100.0, 10.0, 0.1).unwrap();
        let mut p = cannon.fire(Vector3::ZERO, Vector3::new(1.0, 0.0, 0.0), Some(3));
        assert_eq!(p.target, Some(3));
        assert!(p.advance(0.04));
        assert!(approx_eq(p.position.x, 4.0, 1e-9));
        assert!(p.advance(0.04));
        assert!(!p.advance(0.04));
        assert!(p.is_expired());
        // 消滅後は移動しない
        let pos = p.position;
        assert!(!p.advance(0.04));
        assert_eq!(p.position, pos);
    }

    #[test]
    fn test_set_damage() {
        let mut cannon = Cannon::default();
        assert_eq!(cannon.damage(), 3400.0);
        cannon.set_damage(100.0).unwrap();
        assert_eq!(cannon.damage(), 100.0);
        assert!(cannon.set_damage(-1.0).is_err());
        assert_eq!(cannon.damage(), 100.0);
    }
}
