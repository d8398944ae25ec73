use std::collections::HashMap;

use cel_interpreter::Context;

use crate::error::GovernanceError;

use super::HeaderMap;

/// The fixed variable schema bound into the expression environment for
/// every evaluation. Bound once per `evaluate` call rather than cached in
/// the `Context`, since the values differ per request.
#[derive(Clone, Debug, Default)]
pub struct ExprVariables {
    pub model: String,
    pub provider: String,
    pub headers: HeaderMap,
    pub params: HeaderMap,
    pub virtual_key_id: String,
    pub virtual_key_name: String,
    pub team_id: String,
    pub team_name: String,
    pub customer_id: String,
    pub customer_name: String,
    pub budget_used: f64,
    pub tokens_used: f64,
    pub request: f64,
    pub rate_limit: HashMap<String, f64>,
    pub budget: HashMap<String, f64>,
}

impl ExprVariables {
    pub fn bind(&self, context: &mut Context) -> Result<(), GovernanceError> {
        let bind_err = |err: cel_interpreter::ExecutionError| {
            GovernanceError::InvalidExpression(err.to_string())
        };

        context
            .add_variable("model", self.model.clone())
            .map_err(bind_err)?;
        context
            .add_variable("provider", self.provider.clone())
            .map_err(bind_err)?;
        context
            .add_variable("headers", self.headers.clone())
            .map_err(bind_err)?;
        context
            .add_variable("params", self.params.clone())
            .map_err(bind_err)?;
        context
            .add_variable("virtual_key_id", self.virtual_key_id.clone())
            .map_err(bind_err)?;
        context
            .add_variable("virtual_key_name", self.virtual_key_name.clone())
            .map_err(bind_err)?;
        context
            .add_variable("team_id", self.team_id.clone())
            .map_err(bind_err)?;
        context
            .add_variable("team_name", self.team_name.clone())
            .map_err(bind_err)?;
        context
            .add_variable("customer_id", self.customer_id.clone())
            .map_err(bind_err)?;
        context
            .add_variable("customer_name", self.customer_name.clone())
            .map_err(bind_err)?;
        context
            .add_variable("budget_used", self.budget_used)
            .map_err(bind_err)?;
        context
            .add_variable("tokens_used", self.tokens_used)
            .map_err(bind_err)?;
        context
            .add_variable("request", self.request)
            .map_err(bind_err)?;
        context
            .add_variable("rate_limit", self.rate_limit.clone())
            .map_err(bind_err)?;
        context
            .add_variable("budget", self.budget.clone())
            .map_err(bind_err)?;
        Ok(())
    }
}
