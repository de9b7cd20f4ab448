pub mod events;
pub mod lightcurve;
pub mod macros;

pub use events::*;
pub use lightcurve::*;
