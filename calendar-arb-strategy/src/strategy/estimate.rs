use crate::fees::FeeCalculator;
use rand::Rng;
use rust_decimal::Decimal;

/// Resolution of sampled convergence splits.
const SPLIT_STEPS: u32 = 1_000;

/// Inputs of the convergence profit estimate for one prospective position.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceInput {
    /// Entry price of the long leg (its ask).
    pub long_entry: Decimal,
    /// Entry price of the short leg (its bid).
    pub short_entry: Decimal,
    /// Spread move to the convergence target, `target - (long_entry - short_entry)`.
    pub gap: Decimal,
    pub contract_value: Decimal,
    pub volume: u32,
    pub fee_rate: Decimal,
}

impl ConvergenceInput {
    /// Net profit if the long leg captures `split` of the gap and the short leg the rest.
    pub fn profit(&self, split: Decimal) -> Decimal {
        FeeCalculator::net_profit(
            self.fee_rate,
            self.contract_value,
            self.volume,
            self.long_entry,
            self.gap * split,
            self.short_entry,
            self.gap * (Decimal::ONE - split),
        )
    }
}

/// Minimum net profit over the convergence paths.
///
/// The two extreme paths (one leg stays still while the other moves the whole gap) are
/// always evaluated, then `samples` random splits drawn from `rng`.
pub fn worst_case_profit<R>(input: &ConvergenceInput, samples: u32, rng: &mut R) -> Decimal
where
    R: Rng + ?Sized,
{
    let extremes = [Decimal::ZERO, Decimal::ONE];
    let sampled = (0..samples)
        .map(|_| Decimal::from(rng.random_range(0..=SPLIT_STEPS)) / Decimal::from(SPLIT_STEPS));

    extremes
        .into_iter()
        .chain(sampled)
        .map(|split| input.profit(split))
        .min()
        .unwrap_or(Decimal::ZERO)
}
