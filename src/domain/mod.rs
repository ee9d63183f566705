pub mod events;
pub mod jobs;
pub mod money;
pub mod order;
pub mod payout;
pub mod ports;
pub mod webhook;
