//! # Domain Layer
//!
//! The domain layer contains the core business rules of the chat and call
//! server. It is independent of any external frameworks or infrastructure
//! concerns.
//!
//! ## Structure
//!
//! - **entities**: Core domain entities (User, Conversation, Message, Call, etc.)
//! - **services**: Domain services for rules spanning several entities
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Repository traits define data access contracts
//! - Entities encapsulate domain behavior

pub mod entities;
pub mod services;

pub use entities::*;
pub use services::{AccessPolicy, PolicyViolation};
