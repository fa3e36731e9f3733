/// Depth pub/sub keyed by instrument id.
pub mod book;

pub use book::{BookListener, BookSubscription, DepthResponder};
