use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// 速度の絶対下限（m/s）
///
/// 速度ベクトルは機体の向きとしても使われるため0にはできません。
/// 全く動かないエージェントは vmin = vmax = 0 で表現します。
pub const MIN_VMIN: f64 = 0.01;

/// 質量の絶対下限（kg）
pub const MIN_MASS: f64 = 1.0;

/// 検証時に自動補正された項目
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// vmin が下限未満だったため引き上げた
    VminRaised { from: f64, to: f64 },
    /// 初期速度が [vmin, vmax] の範囲外だったため補正した
    VelocityAdjusted { from: f64, to: f64 },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::VminRaised { from, to } => {
                write!(f, "vmin を {} から {} に引き上げました", from, to)
            }
            ValidationWarning::VelocityAdjusted { from, to } => {
                write!(f, "速度を {:.2} m/s から {:.2} m/s に補正しました", from, to)
            }
        }
    }
}

/// エージェント種別ごとの性能諸元
///
/// エージェント生成時にディープコピーされるため、実行中の調整が
/// 他のインスタンスに波及することはありません。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentStats {
    /// 全長（m）
    pub length: f64,
    /// 衝突判定用の境界球半径（m）。通常は length / 2
    pub bounds: f64,
    /// 質量（kg）
    pub mass: f64,
    /// 速度下限（m/s）
    pub vmin: f64,
    /// 速度上限（m/s）
    pub vmax: f64,
    /// 耐久値。既定では質量と同じ（1kg → 1HP）
    pub health: f64,
}

impl AgentStats {
    pub fn new(length: f64, mass: f64, vmin: f64, vmax: f64) -> Self {
        Self {
            length,
            bounds: length / 2.0,
            mass,
            vmin,
            vmax,
            health: mass,
        }
    }

    /// 移動しないエージェント用の諸元
    pub fn immovable(length: f64) -> Self {
        Self::new(length, length * 5.0, 0.0, 0.0)
    }

    pub fn with_health(mut self, health: f64) -> Self {
        self.health = health;
        self
    }

    pub fn with_bounds(mut self, bounds: f64) -> Self {
        self.bounds = bounds;
        self
    }

    /// 移動可能かどうか
    ///
    /// 移動できないエージェントは速度制限処理を一切スキップします。
    pub fn is_moveable(&self) -> bool {
        self.vmin != 0.0 && self.vmax != 0.0
    }

    /// 整合性チェック
    ///
    /// 下限未満の vmin だけは自動補正し、警告として返します。
    /// それ以外の違反は `InvalidConfiguration` になります。
    pub fn validate(&mut self) -> SimResult<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();
        if self.is_moveable() {
            if self.vmax <= 0.0 {
                return Err(SimError::invalid("vmax must be positive"));
            }
            if self.vmin < MIN_VMIN {
                warnings.push(ValidationWarning::VminRaised { from: self.vmin, to: MIN_VMIN });
                self.vmin = MIN_VMIN;
            }
            if self.vmin > self.vmax {
                return Err(SimError::invalid(format!(
                    "vmin ({}) must not be greater than vmax ({})",
                    self.vmin, self.vmax
                )));
            }
        }
        if !(self.mass >= MIN_MASS) {
            return Err(SimError::invalid(format!("mass must be at least {} kg, was {}", MIN_MASS, self.mass)));
        }
        if !(self.length > 0.0) {
            return Err(SimError::invalid(format!("length must be positive, was {}", self.length)));
        }
        if !(self.health > 0.0) {
            return Err(SimError::invalid(format!("health must be positive, was {}", self.health)));
        }
        if !(self.bounds >= 0.0) {
            return Err(SimError::invalid(format!("bounds must not be negative, was {}", self.bounds)));
        }
        Ok(warnings)
    }
}

impl std::fmt::Display for AgentStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "length={}, mass={}, vmin={}, vmax={}",
            self.length, self.mass, self.vmin, self.vmax
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_length_and_mass() {
        let stats = AgentStats::new(12.5, 10000.0, 100.0, 400.0);
        assert_eq!(stats.bounds, 6.25);
        assert_eq!(stats.health, 10000.0);
        assert!(stats.is_moveable());

        let rock = AgentStats::immovable(1000.0);
        assert_eq!(rock.mass, 5000.0);
        assert!(!rock.is_moveable());
    }

    #[test]
    fn test_vmin_below_floor_is_raised_with_warning() {
        let mut stats = AgentStats::new(10.0, 100.0, 0.001, 50.0);
        let warnings = stats.validate().unwrap();
        assert_eq!(stats.vmin, MIN_VMIN);
        assert_eq!(warnings, vec![ValidationWarning::VminRaised { from: 0.001, to: MIN_VMIN }]);
    }

    #[test]
    fn test_invalid_stats_are_rejected() {
        assert!(AgentStats::new(10.0, 0.5, 1.0, 10.0).validate().is_err());
        assert!(AgentStats::new(0.0, 10.0, 1.0, 10.0).validate().is_err());
        assert!(AgentStats::new(10.0, 10.0, 20.0, 10.0).validate().is_err());
        assert!(AgentStats::new(10.0, 10.0, 1.0, -5.0).validate().is_err());
        assert!(AgentStats::new(10.0, 10.0, 1.0, 10.0).with_health(0.0).validate().is_err());
    }

    #[test]
    fn test_immovable_skips_velocity_checks() {
        let mut rock = AgentStats::immovable(10.0);
        assert_eq!(rock.validate().unwrap(), Vec::new());
        assert_eq!(rock.vmin, 0.0);
    }
}
