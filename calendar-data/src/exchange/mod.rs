/// OKX v5 public market data.
pub mod okx;
