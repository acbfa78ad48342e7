//! End-to-end compilation tests
//!
//! These tests drive the public API the way an embedding validator driver
//! would: build a declarative rule set, compile it with a real file resolver
//! and a provider that actually dereferences schemas, then query the
//! resulting dispatch graph.

use std::any::Any;
use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use url::Url;

use nvdl::compile::{CompileContext, CompiledAction, CompiledMatcher, CompiledRuleSet};
use nvdl::config::{
    FileResolver, NullMessageSink, NvdlConfig, SubtreeValidator, ValidatorProvider,
    ValidatorRequest,
};
use nvdl::model::{Action, Mode, ModeUsage, Rule, RuleSet, SchemaSource, Trigger};
use nvdl::{Error, Result};

#[derive(Debug)]
struct RecordingValidator {
    schema_type: String,
    schema_bytes: Vec<u8>,
}

impl SubtreeValidator for RecordingValidator {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Provider that dereferences the schema through the request's resolver, the
/// way a real RELAX NG or XSD provider would
#[derive(Debug)]
struct DereferencingProvider {
    schema_type: &'static str,
}

impl ValidatorProvider for DereferencingProvider {
    fn create_validator(
        &self,
        request: &ValidatorRequest<'_>,
    ) -> Result<Option<Arc<dyn SubtreeValidator>>> {
        if request.schema_type != self.schema_type {
            return Ok(None);
        }
        let schema_bytes = match request.schema {
            SchemaSource::Uri(uri) => request.resolver.resolve(request.base_uri, uri)?,
            SchemaSource::Inline(body) => body.clone().into_bytes(),
        };
        Ok(Some(Arc::new(RecordingValidator {
            schema_type: request.schema_type.to_string(),
            schema_bytes,
        })))
    }
}

fn relaxng_config() -> NvdlConfig {
    NvdlConfig::new().with_provider(Arc::new(DereferencingProvider {
        schema_type: "relaxng",
    }))
}

fn compile(rule_set: &RuleSet, config: &NvdlConfig) -> Result<CompiledRuleSet> {
    CompileContext::new(rule_set, config, &FileResolver::new(), &NullMessageSink).compile()
}

/// Two-namespace rule set: validate "http://ex" subtrees, allow everything
/// else through an anyNamespace fallback
fn two_namespace_rule_set() -> RuleSet {
    RuleSet::new()
        .with_schema_type("relaxng")
        .with_rule(
            Rule::namespace("http://ex")
                .with_action(Action::validate(SchemaSource::Inline("<grammar/>".to_string()))),
        )
        .with_rule(Rule::any_namespace().with_action(Action::allow()))
}

#[test]
fn test_dispatch_by_namespace() {
    let rule_set = two_namespace_rule_set();
    let compiled = compile(&rule_set, &relaxng_config()).unwrap();
    let start = compiled.start_mode();

    let rule = start.find_element_rule("http://ex").unwrap();
    assert!(matches!(
        &rule.matcher,
        CompiledMatcher::Namespace { ns, wildcard: None } if ns == "http://ex"
    ));
    match &rule.actions[0] {
        CompiledAction::Validate(validate) => {
            assert_eq!(validate.schema_type, "relaxng");
            let recording = validate
                .validator
                .as_any()
                .downcast_ref::<RecordingValidator>()
                .unwrap();
            assert_eq!(recording.schema_bytes, b"<grammar/>");
        }
        other => panic!("expected a validate action, got {:?}", other),
    }

    // an unknown namespace falls through to the anyNamespace rule
    let fallback = compiled.start_mode().find_element_rule("http://other").unwrap();
    assert!(matches!(fallback.matcher, CompiledMatcher::AnyNamespace));
    assert!(matches!(fallback.actions[0], CompiledAction::Allow { .. }));
}

#[test]
fn test_no_rule_matches_without_fallback() {
    let rule_set = RuleSet::new()
        .with_rule(Rule::namespace("http://ex").with_action(Action::allow()));
    let compiled = compile(&rule_set, &relaxng_config()).unwrap();

    assert!(compiled.start_mode().find_element_rule("http://other").is_none());
}

#[test]
fn test_schema_resolved_against_base_uri() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("book.rng"), b"<grammar>book</grammar>").unwrap();

    let rule_set = RuleSet::new().with_schema_type("relaxng").with_rule(
        Rule::namespace("http://book")
            .with_action(Action::validate(SchemaSource::Uri("book.rng".to_string()))),
    );

    let base = Url::from_directory_path(dir.path()).unwrap();
    let config = relaxng_config();
    let compiled = CompileContext::new(
        &rule_set,
        &config,
        &FileResolver::new(),
        &NullMessageSink,
    )
    .with_base_uri(base)
    .compile()
    .unwrap();

    match &compiled.start_mode().rules[0].actions[0] {
        CompiledAction::Validate(validate) => {
            let recording = validate
                .validator
                .as_any()
                .downcast_ref::<RecordingValidator>()
                .unwrap();
            assert_eq!(recording.schema_type, "relaxng");
            assert_eq!(recording.schema_bytes, b"<grammar>book</grammar>");
        }
        other => panic!("expected a validate action, got {:?}", other),
    }
}

#[test]
fn test_unresolvable_schema_aborts_compilation() {
    let rule_set = RuleSet::new().with_schema_type("relaxng").with_rule(
        Rule::namespace("http://book").with_action(Action::validate(SchemaSource::Uri(
            "/nonexistent/book.rng".to_string(),
        ))),
    );

    let err = compile(&rule_set, &relaxng_config()).unwrap_err();
    assert!(matches!(err, Error::Resolution(_)));
}

#[test]
fn test_structural_error_aborts_whole_compilation() {
    // one healthy mode does not save a rule set with an inclusion cycle
    let rule_set = RuleSet::new()
        .with_start_mode("doc")
        .with_mode(
            Mode::new("doc")
                .with_include("loop")
                .with_rule(Rule::any_namespace().with_action(Action::allow())),
        )
        .with_mode(Mode::new("loop").with_include("loop"));

    let err = compile(&rule_set, &relaxng_config()).unwrap_err();
    assert!(matches!(err, Error::Structural(_)));
    assert!(err.to_string().contains("cyclic mode inclusion"));
}

#[test]
fn test_attach_continues_dispatch_in_referenced_mode() {
    let rule_set = RuleSet::new()
        .with_start_mode("doc")
        .with_mode(
            Mode::new("doc").with_rule(
                Rule::namespace("http://docbook")
                    .with_action(Action::attach(ModeUsage::named("inline"))),
            ),
        )
        .with_mode(
            Mode::new("inline")
                .with_rule(Rule::namespace("http://mathml").with_action(Action::allow()))
                .with_rule(Rule::any_namespace().with_action(Action::reject())),
        );

    let compiled = compile(&rule_set, &relaxng_config()).unwrap();
    let start = compiled.start_mode();
    assert_eq!(start.name.as_deref(), Some("doc"));

    let usage = match &start.find_element_rule("http://docbook").unwrap().actions[0] {
        CompiledAction::Result(result) => &result.mode_usage,
        other => panic!("expected a result action, got {:?}", other),
    };
    let inline = compiled.mode(usage.mode).unwrap();
    assert_eq!(inline.name.as_deref(), Some("inline"));
    assert!(inline.find_element_rule("http://mathml").is_some());
    assert!(matches!(
        inline.find_element_rule("http://svg").unwrap().actions[0],
        CompiledAction::Reject { .. }
    ));
}

#[test]
fn test_trigger_selects_sections() {
    let rule_set = two_namespace_rule_set()
        .with_trigger(Trigger::from_name_list("http://ex", "book article"));

    let compiled = compile(&rule_set, &relaxng_config()).unwrap();
    let trigger = compiled.trigger_for("http://ex", "article").unwrap();
    assert_eq!(trigger.mode, compiled.start_mode().id);
    assert!(compiled.trigger_for("http://ex", "para").is_none());
}

fn graph_shape(compiled: &CompiledRuleSet) -> Vec<(Option<String>, Vec<CompiledMatcher>)> {
    let mut shape: Vec<(Option<String>, Vec<CompiledMatcher>)> = compiled
        .modes()
        .map(|mode| {
            (
                mode.name.clone(),
                mode.rules.iter().map(|r| r.matcher.clone()).collect(),
            )
        })
        .collect();
    shape.sort_by(|a, b| a.0.cmp(&b.0));
    shape
}

#[test]
fn test_compilation_is_deterministic() {
    let rule_set = RuleSet::new()
        .with_start_mode("doc")
        .with_mode(Mode::new("base").with_rule(Rule::namespace("urn:base-*").with_wildcard("*").with_action(Action::allow())))
        .with_mode(
            Mode::new("doc")
                .with_include("base")
                .with_rule(
                    Rule::namespace("http://docbook")
                        .with_action(Action::attach(ModeUsage::named("doc"))),
                )
                .with_rule(Rule::any_namespace().with_action(Action::reject())),
        );

    let config = relaxng_config();
    let first = compile(&rule_set, &config).unwrap();
    let second = compile(&rule_set, &config).unwrap();

    assert_eq!(graph_shape(&first), graph_shape(&second));
    assert_eq!(first.start_mode().name, second.start_mode().name);
    assert_eq!(
        first.cancelled_rules().len(),
        second.cancelled_rules().len()
    );
}
