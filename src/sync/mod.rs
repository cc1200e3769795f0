//! Reconnection handling.
//!
//! `ConnectivitySignal` carries the online/offline state the proxy and the
//! reconciler observe. The reconciler drains the pending queue when triggered,
//! either explicitly or by an offline to online transition.

mod connectivity;
mod reconciler;

pub use connectivity::{probe, spawn_probe, Connectivity, ConnectivitySignal};
pub use reconciler::{Reconciler, TriggerOutcome};
