//! Reconciliation.
//!
//! The server broadcasts at its tick rate while the client simulates every
//! frame. Remote aircraft are eased toward the reported position instead of
//! snapped, and the view scroll speed is scaled until the client's scroll
//! matches the server's.

use airfront_shared::math::Vec2;

/// Fraction of the remaining distance covered per received update.
pub const POSITION_SMOOTHING: f32 = 0.1;

/// `current + (received - current) * POSITION_SMOOTHING`.
pub fn blend_position(current: Vec2, received: Vec2) -> Vec2 {
    current + (received - current) * POSITION_SMOOTHING
}

/// Ratio of the client's view line to the server's battlefield line.
///
/// Above 1 the client lags and scrolls faster; below 1 it slows down. A
/// degenerate server value leaves the speed unchanged.
pub fn scroll_compensation(view_position: f32, server_position: f32) -> f32 {
    let ratio = view_position / server_position;
    if server_position == 0.0 || !ratio.is_finite() {
        1.0
    } else {
        ratio
    }
}
