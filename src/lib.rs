//! # Chat & Call Server Library
//!
//! Backend for one-to-one and group messaging with friend management and
//! WebRTC call signaling:
//! - RESTful HTTP API under `/api/v1`
//! - STOMP over WebSocket at `/ws` for realtime events and signaling
//! - PostgreSQL for persistent storage
//! - Redis for typing indicators and presence markers
//!
//! ## Architecture
//!
//! - **Domain Layer**: Core business entities, repository traits and rules
//! - **Application Layer**: Business logic services, DTOs and realtime events
//! - **Infrastructure Layer**: Database, cache and metrics implementations
//! - **Presentation Layer**: HTTP handlers and the STOMP gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_call_server/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities, repository traits, domain services
//! +-- application/    Application services, DTOs, realtime events
//! +-- infrastructure/ Database, cache and metrics implementations
//! +-- presentation/   HTTP routes, middleware, WebSocket gateway
//! +-- shared/         Common utilities (errors, pagination, validation)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
