//! Hemmer provider for Azure DevOps.
//!
//! Manages ArgoCD and incoming-webhook service endpoints and Git repository
//! permissions through the Azure DevOps REST API, served over the Hemmer
//! provider protocol (gRPC with a stdout handshake).
//!
//! # Resources
//!
//! | Type | Module |
//! |------|--------|
//! | `azuredevops_serviceendpoint_argocd` | [`resources::serviceendpoint::argocd`] |
//! | `azuredevops_serviceendpoint_incomingwebhook` | [`resources::serviceendpoint::incoming_webhook`] |
//! | `azuredevops_git_permissions` | [`resources::permissions::git`] |
//!
//! # Handshake Protocol
//!
//! When the provider starts via [`serve`], it prints a handshake line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr.
//!
//! # Secrets in state
//!
//! The service never returns secrets. Every sensitive attribute `x` has a
//! computed companion `x_hash` holding the SHA-256 of the value last applied,
//! which the planner compares against configuration (see [`secret`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod secret;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::AzureDevOpsProvider;
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_on_with_options, serve_with_options, ProviderService, ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{validate, validate_result};
