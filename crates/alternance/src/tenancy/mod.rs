//! Tenants, users, roles and the credentials that map a request onto an [`AccessScope`].

pub mod access;
pub mod credentials;
pub mod domain;

pub use access::{AccessError, AccessScope};
pub use credentials::{
    ApiKey, CredentialError, IssuedApiKey, IssuedMagicToken, MagicToken, SigningGrant,
};
pub use domain::{Permission, Role, Tenant, TenancyError, User, UserDraft};
