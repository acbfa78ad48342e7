//! Compiler configuration and collaborator interfaces
//!
//! The compiler never validates documents, fetches schemas, or formats
//! diagnostics itself; those concerns belong to collaborators supplied by
//! the caller through an explicit [`NvdlConfig`] plus resolver and sink
//! parameters. There is no process-wide default configuration.

use std::any::Any;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::error::{Error, Result};
use crate::model::{Message, SchemaSource, ValidateOption};

/// Opaque capability to validate a document subtree.
///
/// Created by a [`ValidatorProvider`] during compilation and carried on the
/// compiled `validate` action; the compiler only decides which provider,
/// schema, and options apply to which subtree and hands off.
pub trait SubtreeValidator: fmt::Debug + Send + Sync {
    /// Downcasting hook for the runtime driver that owns the provider
    fn as_any(&self) -> &dyn Any;
}

/// Everything a provider needs to build a validator for one `validate` action
pub struct ValidatorRequest<'a> {
    /// Schema type identifier (rule-set default already applied)
    pub schema_type: &'a str,
    /// Schema reference or inline body
    pub schema: &'a SchemaSource,
    /// Base URI for resolving a relative schema reference
    pub base_uri: Option<&'a Url>,
    /// Validator options, in declaration order
    pub options: &'a [ValidateOption],
    /// Resolver for dereferencing the schema
    pub resolver: &'a dyn SchemaResolver,
    /// Sink for diagnostics emitted while building the validator
    pub sink: &'a dyn MessageSink,
}

/// Factory for validators of one or more schema types.
///
/// Returns `Ok(None)` when the requested schema type is not supported, so
/// the registry can move on to the next provider. Provider-internal failures
/// surface as [`Error::Resolution`] and abort the compilation; the compiler
/// never retries on a provider's behalf.
pub trait ValidatorProvider: fmt::Debug + Send + Sync {
    /// Create a validator for the request, or `None` if the schema type is
    /// not handled by this provider
    fn create_validator(
        &self,
        request: &ValidatorRequest<'_>,
    ) -> Result<Option<Arc<dyn SubtreeValidator>>>;
}

/// Registry of validator providers, asked in registration order
#[derive(Debug, Clone, Default)]
pub struct NvdlConfig {
    providers: Vec<Arc<dyn ValidatorProvider>>,
}

impl NvdlConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider (builder form)
    pub fn with_provider(mut self, provider: Arc<dyn ValidatorProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Register a provider
    pub fn add_provider(&mut self, provider: Arc<dyn ValidatorProvider>) {
        self.providers.push(provider);
    }

    /// Registered providers, in registration order
    pub fn providers(&self) -> &[Arc<dyn ValidatorProvider>] {
        &self.providers
    }

    /// Create a validator through the first provider that supports the
    /// request's schema type
    pub fn create_validator(
        &self,
        request: &ValidatorRequest<'_>,
    ) -> Result<Arc<dyn SubtreeValidator>> {
        for provider in &self.providers {
            if let Some(validator) = provider.create_validator(request)? {
                return Ok(validator);
            }
        }
        Err(Error::Resolution(format!(
            "no validator provider supports schema type '{}'",
            request.schema_type
        )))
    }
}

/// Dereferences schema documents.
///
/// Given an optional base URI and a (possibly relative) schema reference,
/// returns the schema bytes. Caching, retries, and network semantics are
/// entirely the implementation's concern; resolution may block on I/O.
pub trait SchemaResolver {
    /// Resolve and read the referenced schema
    fn resolve(&self, base: Option<&Url>, reference: &str) -> Result<Vec<u8>>;
}

/// Resolver over the local filesystem and `file:` URLs
#[derive(Debug, Clone, Default)]
pub struct FileResolver;

impl FileResolver {
    /// Create a file resolver
    pub fn new() -> Self {
        Self
    }

    fn read_path(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            Error::Resolution(format!(
                "failed to read schema '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

impl SchemaResolver for FileResolver {
    fn resolve(&self, base: Option<&Url>, reference: &str) -> Result<Vec<u8>> {
        // absolute URL references stand on their own
        if let Ok(url) = Url::parse(reference) {
            return match url.to_file_path() {
                Ok(path) => self.read_path(&path),
                Err(()) => Err(Error::Resolution(format!(
                    "unsupported schema URL scheme '{}'",
                    url.scheme()
                ))),
            };
        }

        if let Some(base) = base {
            let resolved = base.join(reference)?;
            return match resolved.to_file_path() {
                Ok(path) => self.read_path(&path),
                Err(()) => Err(Error::Resolution(format!(
                    "base URI '{}' does not resolve to a file path",
                    base
                ))),
            };
        }

        self.read_path(Path::new(reference))
    }
}

/// Receives declarative `message` payloads associated with actions.
///
/// The compiler passes messages through verbatim; interpretation and
/// formatting are the sink's concern.
pub trait MessageSink {
    /// Deliver one message
    fn message(&self, message: &Message);
}

/// Sink that discards all messages
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMessageSink;

impl MessageSink for NullMessageSink {
    fn message(&self, _message: &Message) {}
}

/// Sink that records messages for later inspection
#[derive(Debug, Default)]
pub struct CollectingMessageSink {
    messages: Mutex<Vec<Message>>,
}

impl CollectingMessageSink {
    /// Create an empty collecting sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received so far
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("message sink poisoned").clone()
    }
}

impl MessageSink for CollectingMessageSink {
    fn message(&self, message: &Message) {
        self.messages
            .lock()
            .expect("message sink poisoned")
            .push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[derive(Debug)]
    struct FakeValidator(&'static str);

    impl SubtreeValidator for FakeValidator {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct FakeProvider {
        schema_type: &'static str,
        label: &'static str,
    }

    impl ValidatorProvider for FakeProvider {
        fn create_validator(
            &self,
            request: &ValidatorRequest<'_>,
        ) -> Result<Option<Arc<dyn SubtreeValidator>>> {
            if request.schema_type == self.schema_type {
                Ok(Some(Arc::new(FakeValidator(self.label))))
            } else {
                Ok(None)
            }
        }
    }

    fn request<'a>(
        schema_type: &'a str,
        schema: &'a SchemaSource,
        resolver: &'a FileResolver,
        sink: &'a NullMessageSink,
    ) -> ValidatorRequest<'a> {
        ValidatorRequest {
            schema_type,
            schema,
            base_uri: None,
            options: &[],
            resolver,
            sink,
        }
    }

    #[test]
    fn test_first_supporting_provider_wins() {
        let config = NvdlConfig::new()
            .with_provider(Arc::new(FakeProvider {
                schema_type: "relaxng",
                label: "first",
            }))
            .with_provider(Arc::new(FakeProvider {
                schema_type: "relaxng",
                label: "second",
            }));

        let schema = SchemaSource::Uri("a.rng".to_string());
        let resolver = FileResolver::new();
        let sink = NullMessageSink;
        let validator = config
            .create_validator(&request("relaxng", &schema, &resolver, &sink))
            .unwrap();

        let fake = validator.as_any().downcast_ref::<FakeValidator>().unwrap();
        assert_eq!(fake.0, "first");
    }

    #[test]
    fn test_unsupported_schema_type_is_resolution_error() {
        let config = NvdlConfig::new().with_provider(Arc::new(FakeProvider {
            schema_type: "relaxng",
            label: "only",
        }));

        let schema = SchemaSource::Uri("a.xsd".to_string());
        let resolver = FileResolver::new();
        let sink = NullMessageSink;
        let err = config
            .create_validator(&request("xsd", &schema, &resolver, &sink))
            .unwrap_err();

        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("xsd"));
    }

    #[test]
    fn test_file_resolver_reads_plain_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "<grammar/>").unwrap();

        let resolver = FileResolver::new();
        let bytes = resolver
            .resolve(None, file.path().to_str().unwrap())
            .unwrap();
        assert_eq!(bytes, b"<grammar/>");
    }

    #[test]
    fn test_file_resolver_joins_relative_reference() {
        let dir = tempfile::tempdir().unwrap();
        let schema_path = dir.path().join("inner.rng");
        fs::write(&schema_path, b"<grammar/>").unwrap();

        let base = Url::from_directory_path(dir.path()).unwrap();
        let resolver = FileResolver::new();
        let bytes = resolver.resolve(Some(&base), "inner.rng").unwrap();
        assert_eq!(bytes, b"<grammar/>");
    }

    #[test]
    fn test_file_resolver_rejects_remote_scheme() {
        let resolver = FileResolver::new();
        let err = resolver
            .resolve(None, "http://example.com/schema.rng")
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_missing_file_is_resolution_error() {
        let resolver = FileResolver::new();
        let err = resolver
            .resolve(None, "/nonexistent/schema.rng")
            .unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
    }

    #[test]
    fn test_collecting_sink_records_messages() {
        let sink = CollectingMessageSink::new();
        sink.message(&Message::new("first"));
        sink.message(&Message::new("zweite").with_lang("de"));

        let seen = sink.messages();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].lang.as_deref(), Some("de"));
    }
}
