//! Embedded authoritative DNS server for the zones of the `"local"` provider.
//!
//! The server answers from the provider's live
//! [`RecordTable`][crate::provider::local::RecordTable], so records and challenge responses set
//! through the [HTTP API][crate::api] are visible as soon as the provider applied them. Queries
//! for names outside the served zones are refused.
//!
//! # A/AAAA/CNAME
//!
//! Host targets applied through [`/present`][crate::api#present-post] are served as `A`, `AAAA`
//! or `CNAME` records. A name holding a `CNAME` answers `A` and `AAAA` queries with it.
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 www.example.com +short A
//! 192.0.2.1
//! ```
//!
//! # TXT
//!
//! Challenge responses are served at `_acme-challenge.<domain>` while presented:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +tcp +short _acme-challenge.www.example.com TXT
//! "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"
//! ```
//!
//! # NS
//!
//! `NS` queries are answered from the config
//! [`DnsConfig::ns_records`][crate::config::DnsConfig::ns_records] map. A zone apex without an
//! entry answers with [`DnsConfig::ns_domain`][crate::config::DnsConfig::ns_domain].
//!
//! # SOA
//!
//! `SOA` queries for a zone apex are answered using `ns_domain` and `ns_admin`. The serial is
//! of the form `YYYYMMDDnn` and advances whenever the provider is refreshed after a change.
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 example.com +short SOA
//! ns1.example.com. dns-admin.example.com. 2026101801 86400 7200 3600000 172800
//! ```

mod handlers;
pub mod server;

pub use server::new;
