//! HTTP API for presenting and cleaning up DNS-01 challenges.
//!
//! Every endpoint except `/healthcheck` requires HTTP Basic credentials of a principal. Failed
//! calls answer with a JSON body of the form `{"outcome": "...", "error": "..."}`, where
//! `outcome` is one of `PermissionDenied`, `StorageError`, `ProviderError` or `ChallengeError`,
//! or `null` for malformed requests, bad credentials and principal management errors.
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/present` (POST)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   {
//!     "domain": "www.example.com",
//!     "token": "...",
//!     "keyAuth": "...",
//!     "dnstarget_a": "192.0.2.1",
//!     "dnstarget_aaaa": "",
//!     "dnstarget_cname": ""
//!   }
//!   ```
//!
//!   Points `domain` at the given targets, claiming it for the caller if nobody owns it yet, and
//!   presents the challenge. Empty or missing targets are ignored; a CNAME target is only used
//!   when no address target is given. Returns `{"outcome":"success"}` on success.
//!
//! ## `/cleanup` (POST)
//!
//!   Expects `domain`, `token` and `keyAuth` like `/present` and removes the challenge record.
//!   The domain's targets are left as they are.
//!
//! ## `/principals` (POST, admin)
//!
//!   Expects `{"name": "...", "secret": "..."}` and creates a principal. Returns HTTP 201.
//!
//! ## `/principals/:name` (DELETE, admin)
//!
//!   Deletes a principal. Returns HTTP 204, or HTTP 409 while it still owns hosts.

mod api_error;
mod auth;
mod model;
mod routes;
pub mod server;

pub use server::new;
pub use server::router;
