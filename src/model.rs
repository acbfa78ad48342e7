//! Declarative NVDL object model
//!
//! This module defines the rule-set object model that an external parser
//! constructs from the NVDL XML grammar and hands to the compiler. The model
//! is plain immutable data: deep class hierarchies of the NVDL grammar are
//! flattened into closed tagged unions dispatched via pattern matching.
//!
//! Attribute values that NVDL defines as name tokens (mode names, `startMode`,
//! `useMode`, `schemaType`) are whitespace-trimmed by the constructors, so a
//! parser can pass raw attribute values through.

use std::fmt;

/// Whitespace characters NVDL strips from name-token attribute values
const NVDL_WHITESPACE: &[char] = &[' ', '\r', '\n', '\t'];

fn trim_token(value: impl Into<String>) -> String {
    value.into().trim_matches(NVDL_WHITESPACE).to_string()
}

/// Position of a declarative node in its source document.
///
/// Line and column are 1-based; zero means unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    /// 1-based line number, 0 when unknown
    pub line: u32,
    /// 1-based column number, 0 when unknown
    pub column: u32,
    /// URI of the source document, when known
    pub source_uri: Option<String>,
}

impl SourceLocation {
    /// Create a location from line and column
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            source_uri: None,
        }
    }

    /// An unknown location
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Set the source document URI
    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    /// Whether line information is present
    pub fn has_line_info(&self) -> bool {
        self.line > 0 && self.column > 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_uri, self.has_line_info()) {
            (Some(uri), true) => write!(f, "{}:{}:{}", uri, self.line, self.column),
            (Some(uri), false) => write!(f, "{}", uri),
            (None, true) => write!(f, "line {}, column {}", self.line, self.column),
            (None, false) => write!(f, "unknown location"),
        }
    }
}

/// A complete declarative NVDL rule set.
///
/// The NVDL grammar allows either top-level rules (an implicit start mode) or
/// a `startMode` attribute with named modes; both shapes are representable and
/// the compiler selects between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Default schema type for `validate` actions that do not set one
    pub schema_type: Option<String>,
    /// Document triggers, in declaration order
    pub triggers: Vec<Trigger>,
    /// Top-level rules (implicit start mode), in declaration order
    pub rules: Vec<Rule>,
    /// Named modes, in declaration order
    pub modes: Vec<Mode>,
    /// Name of the start mode, when declared
    pub start_mode: Option<String>,
    /// Source location of the `rules` element
    pub location: SourceLocation,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default schema type
    pub fn with_schema_type(mut self, schema_type: impl Into<String>) -> Self {
        self.schema_type = Some(trim_token(schema_type));
        self
    }

    /// Add a trigger
    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    /// Add a top-level rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add a named mode
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.modes.push(mode);
        self
    }

    /// Set the start mode name
    pub fn with_start_mode(mut self, name: impl Into<String>) -> Self {
        self.start_mode = Some(trim_token(name));
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// A trigger: namespace plus root local names that select the start mode for
/// whole-document dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    /// Namespace URI of the triggering elements
    pub ns: String,
    /// Local names of the triggering elements
    pub name_list: Vec<String>,
    /// Source location
    pub location: SourceLocation,
}

impl Trigger {
    /// Create a trigger for a namespace and a set of local names
    pub fn new<I, S>(ns: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ns: ns.into(),
            name_list: names.into_iter().map(trim_token).collect(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create a trigger from a whitespace-separated `nameList` attribute value
    pub fn from_name_list(ns: impl Into<String>, name_list: &str) -> Self {
        Self::new(ns, name_list.split_whitespace())
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// A named mode: included-mode references plus declared rules.
///
/// Inclusion references form a directed graph over the rule set's named
/// modes; cycles are rejected at compile time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    /// Mode name, unique within the rule set
    pub name: String,
    /// Names of included modes, in declaration order
    pub includes: Vec<String>,
    /// Declared rules, in declaration order
    pub rules: Vec<Rule>,
    /// Source location
    pub location: SourceLocation,
}

impl Mode {
    /// Create an empty named mode
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: trim_token(name),
            includes: Vec::new(),
            rules: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Include another mode by name
    pub fn with_include(mut self, name: impl Into<String>) -> Self {
        self.includes.push(trim_token(name));
        self
    }

    /// Add a declared rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// An anonymous mode owned by a mode usage or context override
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NestedMode {
    /// Names of included modes, in declaration order
    pub includes: Vec<String>,
    /// Declared rules, in declaration order
    pub rules: Vec<Rule>,
    /// Source location
    pub location: SourceLocation,
}

impl NestedMode {
    /// Create an empty nested mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Include a named mode
    pub fn with_include(mut self, name: impl Into<String>) -> Self {
        self.includes.push(trim_token(name));
        self
    }

    /// Add a declared rule
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// What a rule matches: a literal namespace pattern or any namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleMatcher {
    /// `namespace` rule: literal namespace string plus optional wildcard.
    ///
    /// The wildcard is kept as the raw attribute string (empty = absent); the
    /// compiler rejects strings longer than one character.
    Namespace {
        /// Namespace pattern
        ns: String,
        /// Raw `wildCard` attribute value, empty when absent
        wildcard: String,
    },
    /// `anyNamespace` rule: always matches
    AnyNamespace,
}

/// Which node kind a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleTarget {
    /// Elements only (the NVDL default)
    #[default]
    Elements,
    /// Attributes only
    Attributes,
    /// Both elements and attributes
    Both,
}

impl RuleTarget {
    /// Parse from an NVDL `match` attribute value
    pub fn from_match_attr(value: &str) -> Option<Self> {
        match value.trim_matches(NVDL_WHITESPACE) {
            "elements" => Some(Self::Elements),
            "attributes" => Some(Self::Attributes),
            "elements attributes" | "attributes elements" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether this target applies to elements
    pub fn covers_elements(&self) -> bool {
        matches!(self, Self::Elements | Self::Both)
    }

    /// Whether this target applies to attributes
    pub fn covers_attributes(&self) -> bool {
        matches!(self, Self::Attributes | Self::Both)
    }
}

/// A declarative dispatch rule: a matcher plus an ordered action list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// What the rule matches
    pub matcher: RuleMatcher,
    /// Which node kind the rule applies to
    pub target: RuleTarget,
    /// Actions, in declaration order
    pub actions: Vec<Action>,
    /// Source location
    pub location: SourceLocation,
}

impl Rule {
    /// Create a `namespace` rule without a wildcard
    pub fn namespace(ns: impl Into<String>) -> Self {
        Self {
            matcher: RuleMatcher::Namespace {
                ns: ns.into(),
                wildcard: String::new(),
            },
            target: RuleTarget::default(),
            actions: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create an `anyNamespace` rule
    pub fn any_namespace() -> Self {
        Self {
            matcher: RuleMatcher::AnyNamespace,
            target: RuleTarget::default(),
            actions: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Set the raw `wildCard` attribute value (namespace rules only)
    pub fn with_wildcard(mut self, wildcard: impl Into<String>) -> Self {
        if let RuleMatcher::Namespace { wildcard: ref mut w, .. } = self.matcher {
            *w = wildcard.into();
        }
        self
    }

    /// Set the match target
    pub fn with_target(mut self, target: RuleTarget) -> Self {
        self.target = target;
        self
    }

    /// Append an action
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// Where a `validate` action's schema comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    /// URI to be dereferenced through the schema resolver
    Uri(String),
    /// Inline foreign-namespace fragment, carried verbatim as the schema body
    Inline(String),
}

/// Option on a `validate` action, handed through to the validator provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidateOption {
    /// Option name (a URI in NVDL)
    pub name: String,
    /// Option argument, when present
    pub arg: Option<String>,
    /// Whether the provider is required to support the option
    pub must_support: bool,
    /// Source location
    pub location: SourceLocation,
}

impl ValidateOption {
    /// Create an option with no argument
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arg: None,
            must_support: false,
            location: SourceLocation::unknown(),
        }
    }

    /// Set the argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    /// Mark the option as must-support
    pub fn with_must_support(mut self, must_support: bool) -> Self {
        self.must_support = must_support;
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// Language-tagged diagnostic text attached to an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message text
    pub text: String,
    /// `xml:lang` tag, when present
    pub lang: Option<String>,
    /// Source location
    pub location: SourceLocation,
}

impl Message {
    /// Create a message without a language tag
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: None,
            location: SourceLocation::unknown(),
        }
    }

    /// Set the language tag
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }
}

/// How descendant content of a matched subtree continues to be dispatched.
///
/// Either a reference to a named mode, an owned anonymous mode, or neither
/// (continue in the rule's enclosing mode), plus zero or more context
/// overrides redirecting matching descendant subtrees to a different mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeUsage {
    /// Referenced mode name (`useMode`), when present
    pub use_mode: Option<String>,
    /// Owned anonymous mode, when present
    pub nested_mode: Option<NestedMode>,
    /// Context overrides, in declaration order
    pub contexts: Vec<Context>,
}

impl ModeUsage {
    /// Usage that continues in the rule's enclosing mode
    pub fn current() -> Self {
        Self::default()
    }

    /// Usage of a named mode
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            use_mode: Some(trim_token(name)),
            ..Self::default()
        }
    }

    /// Usage of an owned anonymous mode
    pub fn nested(mode: NestedMode) -> Self {
        Self {
            nested_mode: Some(mode),
            ..Self::default()
        }
    }

    /// Add a context override
    pub fn with_context(mut self, context: Context) -> Self {
        self.contexts.push(context);
        self
    }
}

/// Context override: path pattern plus the mode governing matching subtrees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// Path pattern selecting descendant subtrees
    pub path: String,
    /// Referenced mode name, when present
    pub use_mode: Option<String>,
    /// Owned anonymous mode, when present
    pub nested_mode: Option<NestedMode>,
    /// Source location
    pub location: SourceLocation,
}

impl Context {
    /// Create a context override for a path pattern
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            use_mode: None,
            nested_mode: None,
            location: SourceLocation::unknown(),
        }
    }

    /// Redirect to a named mode
    pub fn with_use_mode(mut self, name: impl Into<String>) -> Self {
        self.use_mode = Some(trim_token(name));
        self
    }

    /// Redirect to an owned anonymous mode
    pub fn with_nested_mode(mut self, mode: NestedMode) -> Self {
        self.nested_mode = Some(mode);
        self
    }

    /// Set the source location
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }
}

/// Effect triggered when a rule matches.
///
/// `Cancel` carries no payload; `Allow`/`Reject` carry only messages;
/// `Validate` binds a schema application; the three result actions share a
/// mode usage plus messages and differ only in how validated nodes are
/// reattached to the result tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `cancelNestedActions`: stop inheriting ambient actions for this subtree
    Cancel {
        /// Source location
        location: SourceLocation,
    },
    /// `allow`: accept the matched subtree without validation
    Allow {
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Source location
        location: SourceLocation,
    },
    /// `reject`: reject the matched subtree
    Reject {
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Source location
        location: SourceLocation,
    },
    /// `validate`: validate the matched subtree against a schema
    Validate {
        /// Schema type; falls back to the rule set default when unset
        schema_type: Option<String>,
        /// Schema reference or inline body
        schema: SchemaSource,
        /// Validator options, in declaration order
        options: Vec<ValidateOption>,
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Governs content validated as part of this schema application
        mode_usage: Option<ModeUsage>,
        /// Source location
        location: SourceLocation,
    },
    /// `attach`: keep validated nodes verbatim in the result tree
    Attach {
        /// Governs descendant dispatch
        mode_usage: ModeUsage,
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Source location
        location: SourceLocation,
    },
    /// `attachPlaceholder`: replace the validated subtree by a placeholder
    AttachPlaceholder {
        /// Governs descendant dispatch
        mode_usage: ModeUsage,
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Source location
        location: SourceLocation,
    },
    /// `unwrap`: discard the matched element in favor of its children
    Unwrap {
        /// Governs descendant dispatch
        mode_usage: ModeUsage,
        /// Diagnostic messages
        messages: Vec<Message>,
        /// Source location
        location: SourceLocation,
    },
}

impl Action {
    /// Create a cancel action
    pub fn cancel() -> Self {
        Self::Cancel {
            location: SourceLocation::unknown(),
        }
    }

    /// Create an allow action
    pub fn allow() -> Self {
        Self::Allow {
            messages: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create a reject action
    pub fn reject() -> Self {
        Self::Reject {
            messages: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create a validate action for a schema source
    pub fn validate(schema: SchemaSource) -> Self {
        Self::Validate {
            schema_type: None,
            schema,
            options: Vec::new(),
            messages: Vec::new(),
            mode_usage: None,
            location: SourceLocation::unknown(),
        }
    }

    /// Create an attach action
    pub fn attach(mode_usage: ModeUsage) -> Self {
        Self::Attach {
            mode_usage,
            messages: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create an attach-placeholder action
    pub fn attach_placeholder(mode_usage: ModeUsage) -> Self {
        Self::AttachPlaceholder {
            mode_usage,
            messages: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Create an unwrap action
    pub fn unwrap_action(mode_usage: ModeUsage) -> Self {
        Self::Unwrap {
            mode_usage,
            messages: Vec::new(),
            location: SourceLocation::unknown(),
        }
    }

    /// Source location of the action
    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::Cancel { location }
            | Self::Allow { location, .. }
            | Self::Reject { location, .. }
            | Self::Validate { location, .. }
            | Self::Attach { location, .. }
            | Self::AttachPlaceholder { location, .. }
            | Self::Unwrap { location, .. } => location,
        }
    }

    /// Whether this is a result action (attach, attach-placeholder, unwrap)
    pub fn is_result(&self) -> bool {
        matches!(
            self,
            Self::Attach { .. } | Self::AttachPlaceholder { .. } | Self::Unwrap { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_tokens_are_trimmed() {
        let rule_set = RuleSet::new()
            .with_start_mode(" doc \n")
            .with_schema_type("\trelaxng ");

        assert_eq!(rule_set.start_mode.as_deref(), Some("doc"));
        assert_eq!(rule_set.schema_type.as_deref(), Some("relaxng"));

        let mode = Mode::new(" m ").with_include("\nbase\t");
        assert_eq!(mode.name, "m");
        assert_eq!(mode.includes, vec!["base".to_string()]);
    }

    #[test]
    fn test_trigger_from_name_list() {
        let trigger = Trigger::from_name_list("http://docbook.org/ns", "book  article\tchapter");
        assert_eq!(
            trigger.name_list,
            vec!["book".to_string(), "article".to_string(), "chapter".to_string()]
        );
    }

    #[test]
    fn test_rule_target_from_match_attr() {
        assert_eq!(RuleTarget::from_match_attr("elements"), Some(RuleTarget::Elements));
        assert_eq!(RuleTarget::from_match_attr("attributes"), Some(RuleTarget::Attributes));
        assert_eq!(
            RuleTarget::from_match_attr("elements attributes"),
            Some(RuleTarget::Both)
        );
        assert_eq!(RuleTarget::from_match_attr("comments"), None);

        assert!(RuleTarget::Both.covers_elements());
        assert!(RuleTarget::Both.covers_attributes());
        assert!(!RuleTarget::Attributes.covers_elements());
    }

    #[test]
    fn test_namespace_rule_builder() {
        let rule = Rule::namespace("urn:x-books")
            .with_wildcard("*")
            .with_target(RuleTarget::Both)
            .with_action(Action::allow());

        match &rule.matcher {
            RuleMatcher::Namespace { ns, wildcard } => {
                assert_eq!(ns, "urn:x-books");
                assert_eq!(wildcard, "*");
            }
            RuleMatcher::AnyNamespace => panic!("expected a namespace matcher"),
        }
        assert_eq!(rule.actions.len(), 1);
    }

    #[test]
    fn test_wildcard_ignored_on_any_namespace() {
        let rule = Rule::any_namespace().with_wildcard("*");
        assert_eq!(rule.matcher, RuleMatcher::AnyNamespace);
    }

    #[test]
    fn test_mode_usage_shapes() {
        let named = ModeUsage::named(" doc ");
        assert_eq!(named.use_mode.as_deref(), Some("doc"));
        assert!(named.nested_mode.is_none());

        let nested = ModeUsage::nested(NestedMode::new().with_rule(Rule::any_namespace()));
        assert!(nested.use_mode.is_none());
        assert_eq!(nested.nested_mode.as_ref().map(|m| m.rules.len()), Some(1));

        let current = ModeUsage::current();
        assert!(current.use_mode.is_none() && current.nested_mode.is_none());
    }

    #[test]
    fn test_source_location_display() {
        let loc = SourceLocation::new(4, 17).with_source_uri("rules.nvdl");
        assert_eq!(loc.to_string(), "rules.nvdl:4:17");
        assert_eq!(SourceLocation::new(4, 17).to_string(), "line 4, column 17");
        assert_eq!(SourceLocation::unknown().to_string(), "unknown location");
    }

    #[test]
    fn test_action_location_accessor() {
        let action = Action::Reject {
            messages: vec![Message::new("not allowed").with_lang("en")],
            location: SourceLocation::new(9, 2),
        };
        assert_eq!(action.location().line, 9);
        assert!(!action.is_result());
        assert!(Action::attach(ModeUsage::current()).is_result());
    }
}
