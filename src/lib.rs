// OAuth credential lifecycle and candidate matching service

// Domain errors
pub mod error;

// Configuration loading
pub mod config;

// Encrypted token storage
pub mod credentials;

// Authorization code flow
pub mod oauth;

// API session tokens
pub mod auth;

// Requirement matching and ranking
pub mod matching;

// Duplicate suppression
pub mod dedup;

// Search pipeline and candidate sources
pub mod search;

// HTTP API
pub mod api;
