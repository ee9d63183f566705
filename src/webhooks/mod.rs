//! Outbound webhooks: rendering payloads from user templates, queueing signed
//! deliveries, and recording what each endpoint answered.

pub mod caller;
pub mod dispatcher;
pub mod recorder;
pub mod render;
