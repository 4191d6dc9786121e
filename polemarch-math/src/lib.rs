//! Ray (27-decimal) fixed-point arithmetic used by the exchequer ledger.
//!
//! Every product and quotient is evaluated in a 256-bit intermediate and
//! narrowed back to `u128` with an explicit overflow check.

pub mod ray;

pub use ray::{
    accrue_linear, linear_growth_factor, mul_div, mul_div_ceil, ray_div, ray_div_ceil, ray_mul,
    ray_mul_ceil, wad_to_ray, MathError, Ray, U256, RAY, SECONDS_PER_YEAR, WAD,
};
