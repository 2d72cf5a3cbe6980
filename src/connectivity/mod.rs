//! Connectivity tracking and online/offline mode control

mod controller;
mod signal;

pub use controller::{Mode, ModeController, ModeError};
pub use signal::{
    ConnectivityEvent, ConnectivityHub, ConnectivitySource, HttpProbe, SimulatedConnectivity,
    Subscription,
};
