//! Rule-set compilation
//!
//! This module turns a declarative [`RuleSet`] into an immutable dispatch
//! graph: every mode reachable from the start mode (directly or through rule
//! actions) is flattened into a [`CompiledMode`] holding its ordered,
//! deduplicated rule sequence, produced exactly once per distinct mode
//! identity.
//!
//! Identity is structural, not referential: a pre-pass assigns a stable
//! integer token to every mode-bearing node ([`ModeId`]) — each named mode,
//! each mode-usage's nested mode, each context's nested mode — and to every
//! declared rule ([`RuleId`]), and all caches are keyed by token. The
//! cancellation set is keyed by declarative rule identity, because
//! cancellation semantics are defined relative to the source structure, not
//! the compiled form.
//!
//! Mode inclusion may form cycles in malformed input; flattening guards each
//! mode with an in-progress marker and reports a structural error instead of
//! recursing. A mode *usage* pointing back at a mode currently being compiled
//! is legal (the continue-in-same-mode idiom), which is why compiled usages
//! hold [`ModeId`] handles into the output's mode table rather than owned
//! references.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use url::Url;

use crate::config::{MessageSink, NvdlConfig, SchemaResolver, SubtreeValidator, ValidatorRequest};
use crate::error::{Error, Result, StructuralError};
use crate::matching::pattern_matches_uri;
use crate::model::{
    Action, Message, Mode, ModeUsage, NestedMode, Rule, RuleMatcher, RuleSet, RuleTarget,
    SchemaSource, SourceLocation, ValidateOption,
};

/// Stable identity token of a mode-bearing node.
///
/// Assigned during the identity pre-pass; indexes into the compiled output's
/// mode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(u32);

/// Stable identity token of a declarative rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(u32);

/// Compiled matcher: the wildcard string validated down to at most one char
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledMatcher {
    /// Literal namespace pattern with optional wildcard character
    Namespace {
        /// Namespace pattern
        ns: String,
        /// Designated wildcard character, when declared
        wildcard: Option<char>,
    },
    /// Unconditional match
    AnyNamespace,
}

/// How a validated subtree's nodes are reattached to the result tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultType {
    /// Keep validated nodes verbatim
    Attach,
    /// Replace the validated subtree by a placeholder element
    AttachPlaceholder,
    /// Discard the matched element in favor of its children
    Unwrap,
}

/// Compiled mode usage: a handle to the governing mode plus context overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModeUsage {
    /// The usage's base mode
    pub mode: ModeId,
    /// Context overrides, in declaration order
    pub contexts: Vec<CompiledContext>,
}

/// Compiled context override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContext {
    /// Path pattern selecting descendant subtrees
    pub path: String,
    /// Mode governing matching subtrees
    pub mode: ModeId,
}

/// Compiled `validate` action binding
#[derive(Debug, Clone)]
pub struct CompiledValidate {
    /// Effective schema type (rule-set default applied)
    pub schema_type: String,
    /// Schema reference or inline body
    pub schema: SchemaSource,
    /// Validator options, in declaration order
    pub options: Vec<ValidateOption>,
    /// Diagnostic messages
    pub messages: Vec<Message>,
    /// Governs content validated as part of this schema application
    pub mode_usage: Option<CompiledModeUsage>,
    /// Validator created by the provider registry
    pub validator: Arc<dyn SubtreeValidator>,
}

/// Compiled result action (attach, attach-placeholder, unwrap)
#[derive(Debug, Clone)]
pub struct CompiledResultAction {
    /// Result-shaping tag
    pub result_type: ResultType,
    /// Governs descendant dispatch
    pub mode_usage: CompiledModeUsage,
    /// Diagnostic messages
    pub messages: Vec<Message>,
}

/// Compiled action, bound and ready for dispatch
#[derive(Debug, Clone)]
pub enum CompiledAction {
    /// Stop inheriting ambient actions for this subtree
    Cancel,
    /// Accept without validation
    Allow {
        /// Diagnostic messages
        messages: Vec<Message>,
    },
    /// Reject the matched subtree
    Reject {
        /// Diagnostic messages
        messages: Vec<Message>,
    },
    /// Validate against a schema
    Validate(CompiledValidate),
    /// Reshape the result tree and continue dispatch in another mode
    Result(CompiledResultAction),
}

/// A rule bound for dispatch: matcher, target, and compiled actions
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Identity of the originating declarative rule
    pub source: RuleId,
    /// Source location of the originating rule
    pub location: SourceLocation,
    /// Compiled matcher
    pub matcher: CompiledMatcher,
    /// Which node kind the rule applies to
    pub target: RuleTarget,
    /// Compiled actions, in declaration order
    pub actions: Vec<CompiledAction>,
}

impl CompiledRule {
    fn matches_ns(&self, ns: &str) -> bool {
        match &self.matcher {
            CompiledMatcher::AnyNamespace => true,
            CompiledMatcher::Namespace { ns: pattern, wildcard } => {
                pattern_matches_uri(pattern, *wildcard, ns)
            }
        }
    }

    /// Whether this rule applies to an element in the given namespace
    pub fn matches_element(&self, ns: &str) -> bool {
        self.target.covers_elements() && self.matches_ns(ns)
    }

    /// Whether this rule applies to an attribute in the given namespace
    pub fn matches_attribute(&self, ns: &str) -> bool {
        self.target.covers_attributes() && self.matches_ns(ns)
    }
}

/// The resolved, ordered, deduplicated rule sequence of one mode.
///
/// Produced exactly once per distinct mode identity regardless of how many
/// inclusion paths reach it, and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CompiledMode {
    /// Identity token of the mode
    pub id: ModeId,
    /// Mode name, `None` for anonymous modes
    pub name: Option<String>,
    /// Rules in dispatch-precedence order: included-mode rules first, the
    /// mode's own declared rules last
    pub rules: Vec<Arc<CompiledRule>>,
}

impl CompiledMode {
    /// First rule applying to an element in the given namespace
    pub fn find_element_rule(&self, ns: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.matches_element(ns))
    }

    /// First rule applying to an attribute in the given namespace
    pub fn find_attribute_rule(&self, ns: &str) -> Option<&Arc<CompiledRule>> {
        self.rules.iter().find(|r| r.matches_attribute(ns))
    }
}

/// Compiled trigger: namespace plus root local names, bound to its target mode
#[derive(Debug, Clone)]
pub struct CompiledTrigger {
    /// Namespace URI of the triggering elements
    pub ns: String,
    /// Local names of the triggering elements
    pub name_list: Vec<String>,
    /// Mode entered for a triggered section
    pub mode: ModeId,
}

impl CompiledTrigger {
    /// Whether the trigger fires for the given element
    pub fn fires_for(&self, ns: &str, local_name: &str) -> bool {
        self.ns == ns && self.name_list.iter().any(|n| n == local_name)
    }
}

/// The compiled dispatch graph of one rule set.
///
/// Immutable and safely shareable for concurrent read-only use by multiple
/// validation runs.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    start: Arc<CompiledMode>,
    triggers: Vec<CompiledTrigger>,
    modes: HashMap<ModeId, Arc<CompiledMode>>,
    cancelled: HashSet<RuleId>,
}

impl CompiledRuleSet {
    /// The start mode
    pub fn start_mode(&self) -> &Arc<CompiledMode> {
        &self.start
    }

    /// Look up a compiled mode by identity token
    pub fn mode(&self, id: ModeId) -> Option<&Arc<CompiledMode>> {
        self.modes.get(&id)
    }

    /// All compiled modes reachable from the start mode and triggers
    pub fn modes(&self) -> impl Iterator<Item = &Arc<CompiledMode>> {
        self.modes.values()
    }

    /// Compiled triggers, in declaration order
    pub fn triggers(&self) -> &[CompiledTrigger] {
        &self.triggers
    }

    /// First trigger firing for the given root element
    pub fn trigger_for(&self, ns: &str, local_name: &str) -> Option<&CompiledTrigger> {
        self.triggers.iter().find(|t| t.fires_for(ns, local_name))
    }

    /// Whether the declarative rule carries a cancel action
    pub fn is_cancelled(&self, rule: RuleId) -> bool {
        self.cancelled.contains(&rule)
    }

    /// Cancellation set, keyed by declarative rule identity
    pub fn cancelled_rules(&self) -> &HashSet<RuleId> {
        &self.cancelled
    }
}

/// The build-time environment of one compilation.
///
/// A context spans exactly one compilation of one rule set; `compile`
/// consumes it so a context can never be reused.
pub struct CompileContext<'a> {
    rule_set: &'a RuleSet,
    config: &'a NvdlConfig,
    resolver: &'a dyn SchemaResolver,
    sink: &'a dyn MessageSink,
    base_uri: Option<Url>,
}

impl<'a> CompileContext<'a> {
    /// Create a context for one compilation
    pub fn new(
        rule_set: &'a RuleSet,
        config: &'a NvdlConfig,
        resolver: &'a dyn SchemaResolver,
        sink: &'a dyn MessageSink,
    ) -> Self {
        Self {
            rule_set,
            config,
            resolver,
            sink,
            base_uri: None,
        }
    }

    /// Base URI for resolving relative schema references.
    ///
    /// Defaults to the rule set's source URI when that parses as a URL.
    pub fn with_base_uri(mut self, base: Url) -> Self {
        self.base_uri = Some(base);
        self
    }

    /// Compile the rule set into its dispatch graph.
    ///
    /// Any structural error aborts the whole compilation; no partial graph is
    /// produced.
    pub fn compile(self) -> Result<CompiledRuleSet> {
        let base_uri = self.base_uri.clone().or_else(|| {
            self.rule_set
                .location
                .source_uri
                .as_ref()
                .and_then(|uri| Url::parse(uri).ok())
        });

        let (table, start) = IdentityTable::build(self.rule_set)?;
        let mode_count = table.modes.len();

        let mut compiler = Compiler {
            rule_set: self.rule_set,
            config: self.config,
            resolver: self.resolver,
            sink: self.sink,
            base_uri,
            table,
            flatten_states: vec![FlattenState::Unvisited; mode_count],
            mode_states: vec![ModeState::Unvisited; mode_count],
            compiled_modes: HashMap::new(),
            compiled_rules: HashMap::new(),
            cancelled: HashSet::new(),
        };

        compiler.compile_mode(start)?;

        let triggers = self
            .rule_set
            .triggers
            .iter()
            .map(|t| CompiledTrigger {
                ns: t.ns.clone(),
                name_list: t.name_list.clone(),
                mode: start,
            })
            .collect();

        let start_mode = compiler
            .compiled_modes
            .get(&start)
            .cloned()
            .ok_or_else(|| structural("start mode was not compiled", &SourceLocation::unknown()))?;

        Ok(CompiledRuleSet {
            start: start_mode,
            triggers,
            modes: compiler.compiled_modes,
            cancelled: compiler.cancelled,
        })
    }
}

fn structural(message: impl Into<String>, location: &SourceLocation) -> Error {
    Error::Structural(StructuralError::new(message).with_location(location))
}

/// One mode-bearing node, normalized for compilation
struct ModeEntry<'a> {
    name: Option<&'a str>,
    includes: &'a [String],
    rules: Vec<RuleId>,
    location: &'a SourceLocation,
}

#[derive(Clone, Copy)]
struct RuleEntry<'a> {
    rule: &'a Rule,
    /// The rule's lexically enclosing mode-bearing node
    owner: ModeId,
}

/// Result of the identity pre-pass: every mode-bearing node and every rule
/// addressed by a stable integer token
struct IdentityTable<'a> {
    modes: Vec<ModeEntry<'a>>,
    rules: Vec<RuleEntry<'a>>,
    by_name: IndexMap<&'a str, ModeId>,
    /// Node address of each nested mode to its pre-assigned token; valid only
    /// for the lifetime of the borrowed, immutable rule set
    nested_ids: HashMap<usize, ModeId>,
}

impl<'a> IdentityTable<'a> {
    fn build(rule_set: &'a RuleSet) -> Result<(Self, ModeId)> {
        if rule_set.start_mode.is_some() && !rule_set.rules.is_empty() {
            return Err(structural(
                "rule set declares both top-level rules and a start mode",
                &rule_set.location,
            ));
        }

        let mut table = Self {
            modes: Vec::new(),
            rules: Vec::new(),
            by_name: IndexMap::new(),
            nested_ids: HashMap::new(),
        };

        for mode in &rule_set.modes {
            table.add_named_mode(mode)?;
        }

        let start = match &rule_set.start_mode {
            Some(name) => table.by_name.get(name.as_str()).copied().ok_or_else(|| {
                structural(
                    format!("start mode '{}' is not declared", name),
                    &rule_set.location,
                )
            })?,
            None if !rule_set.rules.is_empty() => {
                // top-level rules form the implicit start mode
                table.push_mode(None, &[], &rule_set.rules, &rule_set.location)?
            }
            None => {
                return Err(structural(
                    "rule set declares neither top-level rules nor a start mode",
                    &rule_set.location,
                ));
            }
        };

        Ok((table, start))
    }

    fn add_named_mode(&mut self, mode: &'a Mode) -> Result<ModeId> {
        if self.by_name.contains_key(mode.name.as_str()) {
            return Err(structural(
                format!("duplicate mode name '{}'", mode.name),
                &mode.location,
            ));
        }
        let id = ModeId(self.modes.len() as u32);
        self.by_name.insert(mode.name.as_str(), id);
        self.push_mode(Some(mode.name.as_str()), &mode.includes, &mode.rules, &mode.location)
    }

    fn add_nested_mode(&mut self, mode: &'a NestedMode) -> Result<ModeId> {
        let id = self.push_mode(None, &mode.includes, &mode.rules, &mode.location)?;
        self.nested_ids
            .insert(mode as *const NestedMode as usize, id);
        Ok(id)
    }

    fn push_mode(
        &mut self,
        name: Option<&'a str>,
        includes: &'a [String],
        rules: &'a [Rule],
        location: &'a SourceLocation,
    ) -> Result<ModeId> {
        let id = ModeId(self.modes.len() as u32);
        self.modes.push(ModeEntry {
            name,
            includes,
            rules: Vec::new(),
            location,
        });

        for rule in rules {
            let rule_id = RuleId(self.rules.len() as u32);
            self.rules.push(RuleEntry { rule, owner: id });
            self.modes[id.0 as usize].rules.push(rule_id);
            self.register_rule_usages(rule)?;
        }

        Ok(id)
    }

    fn register_rule_usages(&mut self, rule: &'a Rule) -> Result<()> {
        for action in &rule.actions {
            if let Some(usage) = action_mode_usage(action) {
                if let Some(nested) = &usage.nested_mode {
                    self.add_nested_mode(nested)?;
                }
                for context in &usage.contexts {
                    if let Some(nested) = &context.nested_mode {
                        self.add_nested_mode(nested)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn nested_id(&self, mode: &NestedMode) -> Option<ModeId> {
        self.nested_ids
            .get(&(mode as *const NestedMode as usize))
            .copied()
    }
}

fn action_mode_usage(action: &Action) -> Option<&ModeUsage> {
    match action {
        Action::Validate { mode_usage, .. } => mode_usage.as_ref(),
        Action::Attach { mode_usage, .. }
        | Action::AttachPlaceholder { mode_usage, .. }
        | Action::Unwrap { mode_usage, .. } => Some(mode_usage),
        Action::Cancel { .. } | Action::Allow { .. } | Action::Reject { .. } => None,
    }
}

#[derive(Clone)]
enum FlattenState {
    Unvisited,
    InProgress,
    Done(Vec<RuleId>),
}

#[derive(Clone, Copy, PartialEq)]
enum ModeState {
    Unvisited,
    InProgress,
    Compiled,
}

struct Compiler<'a> {
    rule_set: &'a RuleSet,
    config: &'a NvdlConfig,
    resolver: &'a dyn SchemaResolver,
    sink: &'a dyn MessageSink,
    base_uri: Option<Url>,
    table: IdentityTable<'a>,
    flatten_states: Vec<FlattenState>,
    mode_states: Vec<ModeState>,
    compiled_modes: HashMap<ModeId, Arc<CompiledMode>>,
    compiled_rules: HashMap<RuleId, Arc<CompiledRule>>,
    cancelled: HashSet<RuleId>,
}

impl<'a> Compiler<'a> {
    /// Flatten a mode's inclusion graph into its ordered, deduplicated rule
    /// sequence: included-mode rules first (each contributing its fully
    /// flattened sequence, in declared order), the mode's own rules last.
    fn flatten(&mut self, id: ModeId) -> Result<Vec<RuleId>> {
        let idx = id.0 as usize;
        match &self.flatten_states[idx] {
            FlattenState::Done(sequence) => return Ok(sequence.clone()),
            FlattenState::InProgress => {
                let entry = &self.table.modes[idx];
                let description = entry
                    .name
                    .map(|n| format!("mode '{}'", n))
                    .unwrap_or_else(|| "anonymous mode".to_string());
                return Err(structural(
                    format!("cyclic mode inclusion through {}", description),
                    entry.location,
                ));
            }
            FlattenState::Unvisited => {}
        }
        self.flatten_states[idx] = FlattenState::InProgress;

        let includes = self.table.modes[idx].includes;
        let own_rules = self.table.modes[idx].rules.clone();
        let location = self.table.modes[idx].location;

        let mut sequence = Vec::new();
        let mut seen = HashSet::new();
        for name in includes {
            let included = self.lookup_mode(name, location)?;
            for rule in self.flatten(included)? {
                if seen.insert(rule) {
                    sequence.push(rule);
                }
            }
        }
        for rule in own_rules {
            if seen.insert(rule) {
                sequence.push(rule);
            }
        }

        self.flatten_states[idx] = FlattenState::Done(sequence.clone());
        Ok(sequence)
    }

    fn lookup_mode(&self, name: &str, location: &SourceLocation) -> Result<ModeId> {
        self.table.by_name.get(name).copied().ok_or_else(|| {
            structural(format!("mode '{}' is not declared", name), location)
        })
    }

    /// Compile a mode and, transitively, every mode reachable from it.
    ///
    /// An in-progress mode is left alone: a usage referencing it is legal and
    /// its compiled form is cached when the outer call finishes.
    fn compile_mode(&mut self, id: ModeId) -> Result<()> {
        let idx = id.0 as usize;
        match self.mode_states[idx] {
            ModeState::Compiled | ModeState::InProgress => return Ok(()),
            ModeState::Unvisited => {}
        }
        self.mode_states[idx] = ModeState::InProgress;

        let sequence = self.flatten(id)?;

        // materialize included modes so every resolved mode identity has a
        // compiled counterpart in the output table
        let includes = self.table.modes[idx].includes;
        let location = self.table.modes[idx].location;
        for name in includes {
            let included = self.lookup_mode(name, location)?;
            self.compile_mode(included)?;
        }

        let mut rules = Vec::with_capacity(sequence.len());
        for rule_id in sequence {
            rules.push(self.compile_rule(rule_id)?);
        }

        let name = self.table.modes[idx].name.map(str::to_string);
        self.compiled_modes
            .insert(id, Arc::new(CompiledMode { id, name, rules }));
        self.mode_states[idx] = ModeState::Compiled;
        Ok(())
    }

    /// Compile one declarative rule, cached per rule identity
    fn compile_rule(&mut self, id: RuleId) -> Result<Arc<CompiledRule>> {
        if let Some(compiled) = self.compiled_rules.get(&id) {
            return Ok(compiled.clone());
        }

        let entry = self.table.rules[id.0 as usize];
        let rule = entry.rule;

        let matcher = self.compile_matcher(rule)?;
        self.check_action_combination(rule)?;

        let mut actions = Vec::with_capacity(rule.actions.len());
        for action in &rule.actions {
            actions.push(self.compile_action(id, action, entry.owner)?);
        }

        let compiled = Arc::new(CompiledRule {
            source: id,
            location: rule.location.clone(),
            matcher,
            target: rule.target,
            actions,
        });
        self.compiled_rules.insert(id, compiled.clone());
        Ok(compiled)
    }

    fn compile_matcher(&self, rule: &Rule) -> Result<CompiledMatcher> {
        match &rule.matcher {
            RuleMatcher::AnyNamespace => Ok(CompiledMatcher::AnyNamespace),
            RuleMatcher::Namespace { ns, wildcard } => {
                let mut chars = wildcard.chars();
                let first = chars.next();
                if chars.next().is_some() {
                    return Err(structural(
                        format!(
                            "wildCard '{}' contains more than one character",
                            wildcard
                        ),
                        &rule.location,
                    ));
                }
                Ok(CompiledMatcher::Namespace {
                    ns: ns.clone(),
                    wildcard: first,
                })
            }
        }
    }

    fn check_action_combination(&self, rule: &Rule) -> Result<()> {
        let has_cancel = rule
            .actions
            .iter()
            .any(|a| matches!(a, Action::Cancel { .. }));
        if has_cancel && rule.actions.len() > 1 {
            return Err(structural(
                "cancelNestedActions cannot be combined with other actions",
                &rule.location,
            ));
        }
        let result_actions = rule.actions.iter().filter(|a| a.is_result()).count();
        if result_actions > 1 {
            return Err(structural(
                "a rule can carry at most one result action",
                &rule.location,
            ));
        }
        Ok(())
    }

    fn compile_action(
        &mut self,
        rule_id: RuleId,
        action: &'a Action,
        owner: ModeId,
    ) -> Result<CompiledAction> {
        match action {
            Action::Cancel { .. } => {
                self.cancelled.insert(rule_id);
                Ok(CompiledAction::Cancel)
            }
            Action::Allow { messages, .. } => Ok(CompiledAction::Allow {
                messages: messages.clone(),
            }),
            Action::Reject { messages, .. } => Ok(CompiledAction::Reject {
                messages: messages.clone(),
            }),
            Action::Validate {
                schema_type,
                schema,
                options,
                messages,
                mode_usage,
                location,
            } => {
                let effective_type = schema_type
                    .as_deref()
                    .or(self.rule_set.schema_type.as_deref())
                    .ok_or_else(|| {
                        structural(
                            "validate action has no schema type and the rule set declares no default",
                            location,
                        )
                    })?
                    .to_string();

                let compiled_usage = match mode_usage {
                    Some(usage) => Some(self.compile_usage(usage, owner, location)?),
                    None => None,
                };

                let validator = self.config.create_validator(&ValidatorRequest {
                    schema_type: &effective_type,
                    schema,
                    base_uri: self.base_uri.as_ref(),
                    options,
                    resolver: self.resolver,
                    sink: self.sink,
                })?;

                Ok(CompiledAction::Validate(CompiledValidate {
                    schema_type: effective_type,
                    schema: schema.clone(),
                    options: options.clone(),
                    messages: messages.clone(),
                    mode_usage: compiled_usage,
                    validator,
                }))
            }
            Action::Attach {
                mode_usage,
                messages,
                location,
            } => self.compile_result(ResultType::Attach, mode_usage, messages, owner, location),
            Action::AttachPlaceholder {
                mode_usage,
                messages,
                location,
            } => self.compile_result(
                ResultType::AttachPlaceholder,
                mode_usage,
                messages,
                owner,
                location,
            ),
            Action::Unwrap {
                mode_usage,
                messages,
                location,
            } => self.compile_result(ResultType::Unwrap, mode_usage, messages, owner, location),
        }
    }

    fn compile_result(
        &mut self,
        result_type: ResultType,
        mode_usage: &'a ModeUsage,
        messages: &[Message],
        owner: ModeId,
        location: &SourceLocation,
    ) -> Result<CompiledAction> {
        Ok(CompiledAction::Result(CompiledResultAction {
            result_type,
            mode_usage: self.compile_usage(mode_usage, owner, location)?,
            messages: messages.to_vec(),
        }))
    }

    /// Resolve a mode usage to compiled-mode handles: its base mode (named,
    /// owned nested, or the rule's enclosing mode; naming a mode and owning a
    /// nested one at once is malformed) and every context override's mode.
    fn compile_usage(
        &mut self,
        usage: &'a ModeUsage,
        owner: ModeId,
        location: &SourceLocation,
    ) -> Result<CompiledModeUsage> {
        let base = match (&usage.use_mode, &usage.nested_mode) {
            (Some(_), Some(_)) => {
                return Err(structural(
                    "a mode usage cannot carry both useMode and a nested mode",
                    location,
                ));
            }
            (Some(name), None) => self.lookup_mode(name, location)?,
            (None, Some(nested)) => self.table.nested_id(nested).ok_or_else(|| {
                structural("nested mode missing from the identity pre-pass", location)
            })?,
            (None, None) => owner,
        };
        self.compile_mode(base)?;

        let mut contexts = Vec::with_capacity(usage.contexts.len());
        for context in &usage.contexts {
            let mode = match (&context.use_mode, &context.nested_mode) {
                (Some(_), Some(_)) => {
                    return Err(structural(
                        "a context cannot carry both useMode and a nested mode",
                        &context.location,
                    ));
                }
                (Some(name), None) => self.lookup_mode(name, &context.location)?,
                (None, Some(nested)) => self.table.nested_id(nested).ok_or_else(|| {
                    structural(
                        "nested mode missing from the identity pre-pass",
                        &context.location,
                    )
                })?,
                (None, None) => base,
            };
            self.compile_mode(mode)?;
            contexts.push(CompiledContext {
                path: context.path.clone(),
                mode,
            });
        }

        Ok(CompiledModeUsage { mode: base, contexts })
    }
}
