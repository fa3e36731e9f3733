#![forbid(unsafe_code)]

//! Instrument definitions for cross-expiry futures arbitrage.
//!
//! A cross-expiry arbitrage trades two delivery futures on the same underlying
//! asset (eg/ `BTC-USD-250131` against `BTC-USD-250328`). This crate defines the
//! identifiers and immutable metadata the rest of the workspace keys its state by:
//!
//! - [`InstrumentId`]: exchange instrument identifier.
//! - [`Instrument`]: contract metadata (expiry class, contract value, leverage).
//! - [`Instruments`]: the immutable instrument set built once at startup.
//! - [`PositionSide`] / [`OrderAction`]: which side a leg holds and how an order
//!   opens or closes it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Immutable instrument set and ordered instrument pairs.
pub mod index;

/// [`Instrument`] metadata and [`InstrumentId`].
pub mod instrument;

pub use index::{IndexError, InstrumentPair, Instruments, InstrumentsBuilder};
pub use instrument::{Instrument, InstrumentId, kind::ExpiryClass};

/// Side of a futures position.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl Display for PositionSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PositionSide::Long => "long",
                PositionSide::Short => "short",
            }
        )
    }
}

/// Order book side a price is read from.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSide {
    Bid,
    Ask,
}

/// Futures order action: opening or closing a long or short position.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
}

impl OrderAction {
    /// Action that opens a position on the provided side.
    pub fn open(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Self::OpenLong,
            PositionSide::Short => Self::OpenShort,
        }
    }

    /// Action that closes a position on the provided side.
    pub fn close(side: PositionSide) -> Self {
        match side {
            PositionSide::Long => Self::CloseLong,
            PositionSide::Short => Self::CloseShort,
        }
    }

    /// Position side the action operates on.
    pub fn position_side(&self) -> PositionSide {
        match self {
            Self::OpenLong | Self::CloseLong => PositionSide::Long,
            Self::OpenShort | Self::CloseShort => PositionSide::Short,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::OpenLong | Self::OpenShort)
    }

    /// Whether the action buys contracts (opening a long or closing a short).
    pub fn is_buy(&self) -> bool {
        matches!(self, Self::OpenLong | Self::CloseShort)
    }

    /// Book side a marketable order for this action would take liquidity from.
    pub fn taker_side(&self) -> BookSide {
        if self.is_buy() { BookSide::Ask } else { BookSide::Bid }
    }
}

impl Display for OrderAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OrderAction::OpenLong => "open_long",
                OrderAction::OpenShort => "open_short",
                OrderAction::CloseLong => "close_long",
                OrderAction::CloseShort => "close_short",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_action_sides() {
        assert_eq!(OrderAction::open(PositionSide::Long), OrderAction::OpenLong);
        assert_eq!(OrderAction::close(PositionSide::Short), OrderAction::CloseShort);
        assert_eq!(OrderAction::CloseLong.position_side(), PositionSide::Long);
        assert!(OrderAction::OpenShort.is_open());
        assert!(!OrderAction::CloseShort.is_open());
    }

    #[test]
    fn test_order_action_buy_sell() {
        assert!(OrderAction::OpenLong.is_buy());
        assert!(OrderAction::CloseShort.is_buy());
        assert!(!OrderAction::OpenShort.is_buy());
        assert!(!OrderAction::CloseLong.is_buy());
        assert_eq!(OrderAction::OpenLong.taker_side(), BookSide::Ask);
        assert_eq!(OrderAction::CloseLong.taker_side(), BookSide::Bid);
    }

    #[test]
    fn test_display() {
        assert_eq!(OrderAction::OpenShort.to_string(), "open_short");
        assert_eq!(PositionSide::Long.opposite().to_string(), "short");
    }
}
