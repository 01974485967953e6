pub mod attendance;
pub mod error;
pub mod event_checkin;
pub mod flags;
pub mod geo;
pub mod network;
pub mod schedule;
pub mod verification;
