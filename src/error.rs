//! # Error モジュール
//!
//! シミュレーションコアが返すエラー型を定義します。
//!
//! エージェント・性能諸元・砲の構築時に検出された不整合はすべて
//! `InvalidConfiguration` として報告され、そのエンティティの生成は失敗します。

/// シミュレーションコアのエラー
#[derive(Debug)]
pub enum SimError {
    /// 不正な設定値（性能諸元、砲、位置・速度ベクトルなど）
    InvalidConfiguration(String),
    /// スケジューラ用ランタイムの起動失敗
    Runtime(std::io::Error),
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimError::InvalidConfiguration(msg.into())
    }
}

impl std::fmt::Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimError::InvalidConfiguration(msg) => {
                write!(f, "invalid configuration: {}", msg)
            }
            SimError::Runtime(err) => {
                write!(f, "スケジューラの起動に失敗しました: {}", err)
            }
        }
    }
}

impl std::error::Error for SimError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimError::Runtime(err) => Some(err),
            SimError::InvalidConfiguration(_) => None,
        }
    }
}

impl From<std::io::Error> for SimError {
    fn from(err: std::io::Error) -> Self {
        SimError::Runtime(err)
    }
}

pub type SimResult<T> = Result<T, SimError>;
