use serde::Serialize;

/// OKX WebSocket channel name.
///
/// See docs: <https://www.okx.com/docs-v5/en/#order-book-trading-market-data-ws-order-book-channel>
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
pub struct OkxChannel(pub &'static str);

impl OkxChannel {
    /// Public 5 level depth snapshots, pushed at most every 100ms when the book changes.
    pub const BOOKS5: Self = Self("books5");

    /// Private order updates for the logged in account.
    ///
    /// See docs: <https://www.okx.com/docs-v5/en/#order-book-trading-trade-ws-order-channel>
    pub const ORDERS: Self = Self("orders");
}

impl AsRef<str> for OkxChannel {
    fn as_ref(&self) -> &str {
        self.0
    }
}
