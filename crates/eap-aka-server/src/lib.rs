//! EAP-AKA / EAP-AKA' Authentication Server
//!
//! This crate runs the server side of EAP-AKA (RFC 4187) and EAP-AKA'
//! (RFC 5448) on top of the `eap-aka-proto` codec and key derivation.
//!
//! # Features
//!
//! - Concurrent session registry with per-session expiry timers
//! - Protocol state machine with Nak negotiation and PLMN filtering
//! - Pluggable authentication vector sources
//! - JSON configuration and audit log
//! - Reference UDP frontend
//!
//! # Example
//!
//! ```rust,no_run
//! use eap_aka_server::{AkaEngine, Config, EapServer, SessionRegistry, StaticVectorSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let vectors = StaticVectorSource::from_config(&config.subscribers)?;
//!
//!     let engine = AkaEngine::new(&config, SessionRegistry::new(), Arc::new(vectors));
//!     let server = EapServer::new(config.socket_addr()?, Arc::new(engine)).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod engine;
pub mod plmn;
pub mod registry;
pub mod server;
pub mod vector;

pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use config::{Config, ConfigError, Subscriber, TimeoutConfig};
pub use engine::{AkaEngine, AkaError, Reply, SuccessContext};
pub use plmn::{imsi_from_identity, PlmnFilter};
pub use registry::{
    EvictionListener, Session, SessionGuard, SessionRegistry, SessionState, SessionStats,
    TimerClass,
};
pub use server::{decode_frame, encode_frame, EapServer, ServerError};
pub use vector::{AuthVector, StaticVectorSource, VectorError, VectorSource};
