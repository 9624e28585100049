// 基本的なデータ型と数学ユーティリティ
pub mod common;

// 陣営と敵対関係
pub mod faction;

// 性能諸元
pub mod stats;

// 兵装
pub mod cannon;

// 各エージェントモデルの実装
pub mod agent;
pub mod starfighter;

// 便利な re-export
pub use agent::{Agent, AgentKind, Body, Hit, Neighbors, StepOutcome};
pub use cannon::{Cannon, Projectile};
pub use common::*;
pub use faction::{CustomFaction, Faction};
pub use starfighter::{Perception, Starfighter, StarfighterStats, SteeringTuning, TargetLock};
pub use stats::{AgentStats, ValidationWarning};
