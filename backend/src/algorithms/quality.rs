//! Per-event quality screening.

use crate::models::EventTable;

/// Events at or below this wavelength are never science photons.
pub const WAVELENGTH_FLOOR: f64 = 500.0;

/// Whether event `i` passes the quality screen.
///
/// An event is good when none of its DQ bits intersect `sdqflags`, its
/// wavelength is above [`WAVELENGTH_FLOOR`] and both detector coordinates are
/// non-negative.
#[inline]
pub fn is_good_event(events: &EventTable, i: usize, sdqflags: u32) -> bool {
    (events.dq[i] & sdqflags) == 0
        && events.wavelength[i] > WAVELENGTH_FLOOR
        && events.xcorr[i] >= 0.0
        && events.ycorr[i] >= 0.0
}

/// Indices of the events that pass the quality screen, in table order.
///
/// An empty result is not an error; callers decide what an exposure without
/// good events means for them.
pub fn good_event_indices(events: &EventTable, sdqflags: u32) -> Vec<usize> {
    (0..events.len())
        .filter(|&i| is_good_event(events, i, sdqflags))
        .collect()
}
