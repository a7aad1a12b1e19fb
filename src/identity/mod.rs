//! Token lifecycle: signed access/refresh credential pairs recorded in a revocable
//! session registry. Keep the public surface thin and split implementation across sub-modules.

mod credentials;
mod signer;
mod registry;
mod request_context;
mod manager;

pub use credentials::{CredentialPair, TokenResponse};
pub use signer::{CredentialSigner, SignerError, TokenClaims, TokenPurpose};
pub use registry::{SessionRegistry, KvSessionRegistry, RegistryError};
pub use request_context::{bearer_token, extract_token, RequestId};
pub use manager::{TokenManager, TokenPolicy};
