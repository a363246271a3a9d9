//! Service layer: the per-operation facade and the background reclaimer.

pub mod reclaimer;
pub mod resource_service;
