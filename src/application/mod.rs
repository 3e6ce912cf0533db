//! Application Layer
//!
//! Contains business logic services, data transfer objects (DTOs) and the
//! realtime events services publish. This layer orchestrates the flow of
//! data between the presentation and domain layers.

pub mod dto;
pub mod events;
pub mod services;
