use thiserror::Error;

mod wide {
    #![allow(clippy::assign_op_pattern)]
    #![allow(clippy::ptr_offset_with_cast)]
    #![allow(clippy::manual_range_contains)]

    uint::construct_uint! {
        /// 256-bit unsigned integer for ray intermediates.
        pub struct U256(4);
    }
}

pub use wide::U256;

/// A value scaled by [`RAY`].
pub type Ray = u128;

/// 1.0 in ray precision (10^27).
pub const RAY: Ray = 1_000_000_000_000_000_000_000_000_000;

/// 1.0 in wad precision (10^18). Rates handed in by governance tooling are wads.
pub const WAD: u128 = 1_000_000_000_000_000_000;

const WAD_RAY_RATIO: u128 = 1_000_000_000;

/// Linear accrual uses a 365 day year.
pub const SECONDS_PER_YEAR: u64 = 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("division by zero")]
    DivByZero,
    #[error("arithmetic overflow")]
    Overflow,
}

fn narrow(value: U256) -> Result<u128, MathError> {
    if value > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(value.as_u128())
}

/// floor(a * b / c)
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivByZero);
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(MathError::Overflow)?;
    narrow(product / U256::from(c))
}

/// ceil(a * b / c)
pub fn mul_div_ceil(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
    if c == 0 {
        return Err(MathError::DivByZero);
    }
    let product = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or(MathError::Overflow)?;
    let divisor = U256::from(c);
    let quotient = product / divisor;
    if (product % divisor).is_zero() {
        narrow(quotient)
    } else {
        narrow(quotient + U256::one())
    }
}

/// floor(a * b / RAY)
pub fn ray_mul(a: u128, b: Ray) -> Result<u128, MathError> {
    mul_div(a, b, RAY)
}

/// ceil(a * b / RAY)
pub fn ray_mul_ceil(a: u128, b: Ray) -> Result<u128, MathError> {
    mul_div_ceil(a, b, RAY)
}

/// floor(a * RAY / b)
pub fn ray_div(a: u128, b: Ray) -> Result<u128, MathError> {
    mul_div(a, RAY, b)
}

/// ceil(a * RAY / b)
pub fn ray_div_ceil(a: u128, b: Ray) -> Result<u128, MathError> {
    mul_div_ceil(a, RAY, b)
}

/// Growth factor of a yearly `rate` held for `elapsed` seconds: `RAY + rate * elapsed / year`.
pub fn linear_growth_factor(rate: Ray, elapsed: u64) -> Result<Ray, MathError> {
    let accrued = mul_div(rate, elapsed as u128, SECONDS_PER_YEAR as u128)?;
    RAY.checked_add(accrued).ok_or(MathError::Overflow)
}

/// Advances `index` by a yearly `rate` over `elapsed` seconds with linear (simple) interest.
///
/// `index + index * rate * elapsed / (RAY * SECONDS_PER_YEAR)`, floored. The result is never
/// smaller than `index`.
pub fn accrue_linear(index: Ray, rate: Ray, elapsed: u64) -> Result<Ray, MathError> {
    if rate == 0 || elapsed == 0 {
        return Ok(index);
    }
    let numerator = U256::from(index)
        .checked_mul(U256::from(rate))
        .and_then(|v| v.checked_mul(U256::from(elapsed)))
        .ok_or(MathError::Overflow)?;
    let denominator = U256::from(RAY) * U256::from(SECONDS_PER_YEAR);
    let growth = narrow(numerator / denominator)?;
    index.checked_add(growth).ok_or(MathError::Overflow)
}

/// Converts an 18-decimal wad rate into ray precision.
pub fn wad_to_ray(wad: u128) -> Result<Ray, MathError> {
    wad.checked_mul(WAD_RAY_RATIO).ok_or(MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETHER: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn ray_mul_and_div_floor() {
        assert_eq!(ray_mul(10, RAY / 3).unwrap(), 3);
        assert_eq!(ray_div(10, 3 * RAY).unwrap(), 3);
        assert_eq!(ray_mul(ETHER, RAY).unwrap(), ETHER);
        assert_eq!(ray_div(ETHER, RAY).unwrap(), ETHER);
    }

    #[test]
    fn ceil_variants_round_up_only_with_remainder() {
        assert_eq!(ray_mul_ceil(10, RAY / 3).unwrap(), 4);
        assert_eq!(ray_div_ceil(10, 3 * RAY).unwrap(), 4);
        assert_eq!(ray_div_ceil(9, 3 * RAY).unwrap(), 3);
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(ray_div(1, 0), Err(MathError::DivByZero));
        assert_eq!(mul_div_ceil(1, 1, 0), Err(MathError::DivByZero));
    }

    #[test]
    fn products_beyond_u128_use_the_wide_intermediate() {
        // 10^27 * 10^27 overflows u128 but the quotient fits.
        let big = 500_000 * ETHER;
        assert_eq!(ray_mul(big, 2 * RAY).unwrap(), 2 * big);
        assert_eq!(ray_mul(u128::MAX, 2 * RAY), Err(MathError::Overflow));
    }

    #[test]
    fn accrual_over_a_year_matches_the_rate() {
        let rate = RAY / 20; // 5%
        let index = accrue_linear(RAY, rate, SECONDS_PER_YEAR).unwrap();
        assert_eq!(index, RAY + RAY / 20);
        assert_eq!(
            linear_growth_factor(rate, SECONDS_PER_YEAR).unwrap(),
            RAY + RAY / 20
        );
    }

    #[test]
    fn accrual_is_monotonic_and_idle_without_rate() {
        let rate = RAY / 20;
        let one_day = accrue_linear(RAY, rate, 86_400).unwrap();
        assert!(one_day > RAY);
        assert!(accrue_linear(one_day, rate, 86_400).unwrap() > one_day);
        assert_eq!(accrue_linear(one_day, 0, 86_400).unwrap(), one_day);
        assert_eq!(accrue_linear(one_day, rate, 0).unwrap(), one_day);
    }

    #[test]
    fn wad_rates_convert_to_ray() {
        assert_eq!(wad_to_ray(WAD / 20).unwrap(), RAY / 20);
    }
}
