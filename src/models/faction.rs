use std::sync::Arc;

use crate::models::common::ColorRgb;

/// 陣営
///
/// 敵対関係は対称である必要はありません。組み込みの3陣営はそれぞれ独自の
/// 判定を持ち、カスタム陣営は既定ルール（自分でも中立でもなければ敵）か
/// 明示的な敵リストのどちらかで判定します。
#[derive(Debug, Clone, Default)]
pub enum Faction {
    /// 惑星などの中立物体。誰の敵にもならない
    #[default]
    Neutral,
    /// 反乱同盟軍。帝国のみを敵とみなす
    RebelAlliance,
    /// 銀河帝国。反乱同盟軍のみを敵とみなす
    Empire,
    /// シナリオで定義された陣営
    Custom(Arc<CustomFaction>),
}

/// シナリオ定義の陣営
#[derive(Debug, Clone, PartialEq)]
pub struct CustomFaction {
    pub name: String,
    pub color: ColorRgb,
    /// `None` の場合は既定ルールを使う
    pub enemies: Option<Vec<String>>,
}

impl Faction {
    pub fn custom(name: impl Into<String>, color: ColorRgb, enemies: Option<Vec<String>>) -> Self {
        Faction::Custom(Arc::new(CustomFaction {
            name: name.into(),
            color,
            enemies,
        }))
    }

    /// 名前から組み込み陣営を取得
    pub fn builtin(name: &str) -> Option<Faction> {
        match name.to_lowercase().as_str() {
            "neutral" => Some(Faction::Neutral),
            "rebel" | "rebelalliance" | "rebel_alliance" => Some(Faction::RebelAlliance),
            "empire" | "imp" => Some(Faction::Empire),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Faction::Neutral => "Neutral",
            Faction::RebelAlliance => "Rebel",
            Faction::Empire => "Empire",
            Faction::Custom(c) => &c.name,
        }
    }

    pub fn color(&self) -> ColorRgb {
        match self {
            Faction::Neutral => ColorRgb::new(0.8, 0.8, 0.8),
            Faction::RebelAlliance => ColorRgb::new(1.0, 0.0, 0.0),
            Faction::Empire => ColorRgb::new(0.0, 0.0, 0.8),
            Faction::Custom(c) => c.color,
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Faction::Neutral)
    }

    /// この陣営が `other` を敵とみなすかどうか
    pub fn is_enemy(&self, other: &Faction) -> bool {
        match self {
            Faction::Neutral => false,
            Faction::RebelAlliance => matches!(other, Faction::Empire),
            Faction::Empire => matches!(other, Faction::RebelAlliance),
            Faction::Custom(c) => {
                if self == other || other.is_neutral() {
                    return false;
                }
                match &c.enemies {
                    None => true,
                    Some(list) => list.iter().any(|n| n.eq_ignore_ascii_case(other.name())),
                }
            }
        }
    }

    /// この陣営が `other` と同盟関係にあるかどうか（同一陣営のみ）
    pub fn is_ally(&self, other: &Faction) -> bool {
        self == other
    }
}

impl PartialEq for Faction {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Faction::Neutral, Faction::Neutral) => true,
            (Faction::RebelAlliance, Faction::RebelAlliance) => true,
            (Faction::Empire, Faction::Empire) => true,
            (Faction::Custom(a), Faction::Custom(b)) => Arc::ptr_eq(a, b) || a.name == b.name,
            _ => false,
        }
    }
}

impl Eq for Faction {}

impl std::fmt::Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
