pub mod api;
pub mod config;
pub mod flow;
mod persist;
pub mod pkce;
pub mod session;

// Re-exports for convenience
pub use api::{ApiError, SsoApiClient, TokenResponse};
pub use config::{AppConfig, ConfigManager};
pub use flow::{AuthorizationFlow, CallbackOutcome, FlowError, RejectReason, TokenExchanger};
pub use pkce::{
    CallbackParams, FileStorage, MemoryStorage, PkceError, PkceParams, PkceStore, SessionStorage,
    build_authorization_url, generate_pkce_params, parse_callback_url, validate_state,
};
pub use session::{AuthService, UserSession};
