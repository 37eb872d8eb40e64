#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod alerts;
pub mod connection;
pub mod endpoint;
pub mod events;
pub mod messages;
pub mod monitor;
pub mod rpc;
pub mod subscription;
pub mod tracker;

pub use alerts::{AlertDispatcher, AlertEvent, DeliveryReport, Severity};
pub use connection::{ConnectError, ConnectionManager, RetryWindow};
pub use endpoint::{Endpoint, mask_endpoint};
pub use monitor::{MonitorError, MonitorSettings, RewardMonitor};
pub use tracker::{RoundState, RoundTracker, TrackerOptions};
