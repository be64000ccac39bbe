//! Downstream delivery adapter
//!
//! Wraps transformed bundles in an envelope and posts them to the downstream
//! service with refreshed credentials.

pub mod credentials;
pub mod envelope;
pub mod sender;

pub use credentials::{
    provider_from_config, CredentialProvider, CredentialRefresher, KeycloakPasswordGrant,
    NoCredentials, StaticBearer,
};
pub use envelope::{build_envelope, unwrap_envelope, Envelope, EnvelopeSource};
pub use sender::{EnvelopeSender, HttpEnvelopeSender};
