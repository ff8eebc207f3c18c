// Credential slots and their backing stores
pub mod credentials;

// Expiry checks, refresh and the token accessor
pub mod token;

// Provider registry, code exchange and CSRF state
pub mod oauth;

// HTTP API
pub mod api;

// API bearer token checks
pub mod auth;

// TOML configuration
pub mod config;
