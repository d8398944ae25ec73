//! Scope-chain, priority-ordered routing rule evaluation.
//!
//! Generalizes the teacher's `gateway/router.rs` "exact rules, then prefix
//! rules, then defaults" cascade from model-prefix matching to
//! scope-ordered, expression-gated matching.

use crate::error::GovernanceError;
use crate::expr::{ExprVariables, ExpressionRuntime};
use crate::model::Scope;
use crate::store::GovernanceStore;

#[derive(Clone, Debug, Default)]
pub struct RoutingContext {
    pub provider: String,
    pub model: String,
    pub virtual_key_id: Option<String>,
    pub team_id: Option<String>,
    pub customer_id: Option<String>,
    pub vars: ExprVariables,
}

#[derive(Clone, Debug)]
pub struct RoutingDecision {
    pub provider: String,
    pub model: String,
    pub fallbacks: Vec<String>,
    pub matched_rule_id: String,
    pub matched_rule_name: String,
}

impl RoutingDecision {
    fn default_for(ctx: &RoutingContext) -> Self {
        Self {
            provider: ctx.provider.clone(),
            model: ctx.model.clone(),
            fallbacks: Vec::new(),
            matched_rule_id: "0".into(),
            matched_rule_name: String::new(),
        }
    }
}

pub struct RoutingEngine<'a> {
    store: &'a GovernanceStore,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(store: &'a GovernanceStore) -> Self {
        Self { store }
    }

    /// Walks `virtual_key → team → customer → global`, skipping absent
    /// links, and returns the first enabled rule (lowest `priority` first
    /// within a scope) whose expression evaluates true. A scope earlier in
    /// the chain always shadows a later one, regardless of priority.
    pub fn route(&self, ctx: &RoutingContext) -> RoutingDecision {
        let chain: [(Scope, Option<&str>); 4] = [
            (Scope::VirtualKey, ctx.virtual_key_id.as_deref()),
            (Scope::Team, ctx.team_id.as_deref()),
            (Scope::Customer, ctx.customer_id.as_deref()),
            (Scope::Global, None),
        ];

        for (scope, scope_id) in chain {
            if scope != Scope::Global && scope_id.is_none() {
                continue;
            }
            for rule in self.store.rules_for_scope(scope, scope_id) {
                let program = match self
                    .store
                    .expr_runtime()
                    .compile_and_cache(&rule.id, &rule.cel_expression)
                {
                    Ok(program) => program,
                    Err(_) => continue,
                };
                let matched = ExpressionRuntime::evaluate(Some(&program), &ctx.vars)
                    .unwrap_or(false);
                if matched {
                    return RoutingDecision {
                        provider: rule.provider.clone(),
                        model: rule.model.clone(),
                        fallbacks: rule.fallbacks.clone(),
                        matched_rule_id: rule.id.clone(),
                        matched_rule_name: rule.name.clone(),
                    };
                }
            }
        }

        RoutingDecision::default_for(ctx)
    }
}

/// Validates a rule's routing targets before it is stored. `provider` is
/// always required; `model` may be blank, meaning the rule rewrites only
/// the provider and leaves the request's original model untouched (see
/// `apply_routing_decision`).
pub fn validate_routing_decision(decision: &RoutingDecision) -> Result<(), GovernanceError> {
    if decision.provider.trim().is_empty() {
        return Err(GovernanceError::InvalidRoutingDecision);
    }
    Ok(())
}

/// Returns a new context with `provider` and `model` overwritten; the
/// caller's context is never mutated. A blank `decision.model` keeps the
/// original context's model rather than clearing it.
pub fn apply_routing_decision(ctx: &RoutingContext, decision: &RoutingDecision) -> RoutingContext {
    let mut next = ctx.clone();
    next.provider = decision.provider.clone();
    if !decision.model.is_empty() {
        next.model = decision.model.clone();
    }
    next
}
