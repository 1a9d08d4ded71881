//! acmehost
//!
//! A multi-tenant [DNS-01] challenge solver that also manages the records a domain points at.
//!
//! Authenticated principals ask acmehost to present or clean up [RFC-8555][RFC-8555] [DNS-01]
//! challenges for their domains, optionally pointing the domain at new `A`, `AAAA` or `CNAME`
//! targets in the same call. The first principal to use a domain owns it; other principals are
//! refused. Records are managed through a pluggable [DNS provider][provider::DnsProvider], and the
//! built-in `"local"` provider serves its zones from an [embedded DNS server][dns].
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod auth;
pub mod challenge;
pub mod config;
pub mod dns;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod reconcile;
pub mod state_file;
pub mod store;
pub mod sync;

pub use api::new as new_http;
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use orchestrator::Orchestrator;
pub use store::memory::InMemoryStore;
