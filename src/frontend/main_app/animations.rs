pub mod capture_flash;
pub mod countdown_circle;

#[cfg(feature = "fast_animations")]
const LENGTH_DIVISOR: u64 = 10;
#[cfg(not(feature = "fast_animations"))]
const LENGTH_DIVISOR: u64 = 1;
