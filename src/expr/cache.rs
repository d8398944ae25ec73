use std::sync::Arc;

use dashmap::DashMap;

use super::CompiledProgram;

/// Single write-rare, read-hot map keyed by `(rule_id, expression)`.
/// `DashMap` gives per-shard locking: lookup is effectively lock-free,
/// compilation only ever contends with other writers touching the same
/// shard — matching the spec's "lookup is shared, compilation is
/// exclusive per key" contract.
#[derive(Default)]
pub struct ProgramCache {
    entries: DashMap<(String, String), Arc<CompiledProgram>>,
}

impl ProgramCache {
    pub fn get(&self, rule_id: &str, expression: &str) -> Option<Arc<CompiledProgram>> {
        self.entries
            .get(&(rule_id.to_string(), expression.to_string()))
            .map(|entry| entry.clone())
    }

    pub fn insert(
        &self,
        rule_id: &str,
        expression: &str,
        program: CompiledProgram,
    ) -> Arc<CompiledProgram> {
        let program = Arc::new(program);
        self.entries
            .insert((rule_id.to_string(), expression.to_string()), program.clone());
        program
    }

    pub fn invalidate(&self, rule_id: &str) {
        self.entries.retain(|(id, _), _| id != rule_id);
    }
}
