use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Delivery cycle of a futures contract relative to its siblings on the same underlying.
///
/// Mirrors the exchange `alias` field: `this_week`, `next_week`, `quarter`, `next_quarter`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryClass {
    Near,
    Mid,
    Far,
}

impl ExpiryClass {
    /// Map an exchange contract alias to an [`ExpiryClass`].
    ///
    /// Both quarterly aliases map to [`ExpiryClass::Far`].
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "this_week" => Some(Self::Near),
            "next_week" => Some(Self::Mid),
            "quarter" | "next_quarter" => Some(Self::Far),
            _ => None,
        }
    }
}

impl Display for ExpiryClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ExpiryClass::Near => "near",
                ExpiryClass::Mid => "mid",
                ExpiryClass::Far => "far",
            }
        )
    }
}
