//! # starsim
//!
//! 宇宙戦闘のエージェントベースシミュレーションです。
//!
//! 戦闘機は群れ行動・衝突回避・索敵・射撃を組み合わせて操舵し、
//! 主力艦は推測航法で直進します。モデルはタイマーまたは描画フレームを
//! トリガーとして全エージェントを時間発展させます。

pub mod benchmark;
pub mod error;
pub mod logging;
pub mod model;
pub mod models;
pub mod scenario;
pub mod simulation;
pub mod trigger;

pub use error::{SimError, SimResult};
pub use model::{Model, ModelConfig, ModelStatus, TriggerKind};
