//! # nvdl-rs
//!
//! A Rust compiler for NVDL (Namespace-based Validation Dispatching Language,
//! ISO/IEC 19757-4) rule sets.
//!
//! NVDL lets an author declare which schema validates which namespace-qualified
//! subtree of an XML document. This crate turns a declarative rule set (modes,
//! rules, triggers, actions) into a resolved, cycle-free dispatch graph usable
//! at validation time, together with the namespace-wildcard matching predicate
//! the dispatch depends on.
//!
//! The crate does not parse the NVDL XML grammar itself: an external parser
//! builds the [`model::RuleSet`] object model, and the concrete schema
//! validators (RELAX NG, XSD, ...) are supplied through the
//! [`config::ValidatorProvider`] registry.
//!
//! ## Example
//!
//! ```rust,ignore
//! use nvdl::compile::CompileContext;
//! use nvdl::config::{FileResolver, NullMessageSink, NvdlConfig};
//!
//! let rule_set = my_parser::parse("rules.nvdl")?;
//! let config = NvdlConfig::new().with_provider(my_relaxng_provider);
//! let compiled = CompileContext::new(
//!     &rule_set,
//!     &config,
//!     &FileResolver::new(),
//!     &NullMessageSink,
//! )
//! .compile()?;
//!
//! let start = compiled.start_mode();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compile;
pub mod config;
pub mod error;
pub mod matching;
pub mod model;

// Re-exports for convenience
pub use error::{Error, Result};

/// Version of the nvdl-rs library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// NVDL structure namespace
pub const NVDL_NAMESPACE: &str = "http://purl.oclc.org/dsdl/nvdl/ns/structure/1.0";

/// Namespace of the NVDL built-in schema types
pub const BUILT_IN_VALIDATION_NAMESPACE: &str =
    "http://purl.oclc.org/dsdl/nvdl/ns/predefinedSchema/1.0";

/// NVDL instance namespace (placeholder elements in validation results)
pub const INSTANCE_NAMESPACE: &str = "http://purl.oclc.org/dsdl/nvdl/ns/instance/1.0";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
