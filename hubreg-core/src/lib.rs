//! Hubreg library exports
//!
//! Client for bootstrapping a catalog hub: locate it, detect its route
//! style, resolve remote index documents, wait for readiness, and run the
//! add-remote / ingest / install registration workflow.

pub mod config;
pub mod error;
pub mod hub;
pub mod index;
pub mod manifest;
pub mod readiness;
pub mod registration;
pub mod retry;
pub mod transport;
pub mod uid;

pub use config::HubConfig;
pub use error::{HubError, Result};
pub use hub::{HubSession, RouteStyle};
pub use index::{derive_index_url, IndexDocument, IndexResolver, IndexShape};
pub use manifest::{Manifest, ManifestRef};
pub use readiness::{check_readiness, ReadinessOptions, ReadinessReport};
pub use registration::{
    ProbeReport, Registrar, RegistrationPlan, RegistrationReport, RegistrationState, Stage,
};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, HubTransport};
pub use uid::EntityUid;
