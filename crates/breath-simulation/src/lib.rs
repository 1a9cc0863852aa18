//! Breath-Simulation: breathing-belt signal generation and device simulation
//!
//! Provides realistic belt signals and a simulated acquisition device for
//! testing and development without hardware.

pub mod belt_simulator;
pub mod device;
pub mod signal_patterns;

pub use belt_simulator::*;
pub use device::*;
pub use signal_patterns::*;
