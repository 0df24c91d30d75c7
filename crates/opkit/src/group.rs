//! Group composition (spec §4.4, §9): prefixes (fan-out), operation
//! modifiers, and appended middleware/transformer chains, composing
//! transitively through a parent group, built on the same `Arc`/builder
//! idiom used throughout this crate.

use std::sync::Arc;

use crate::contracts::{Middleware, Transformer};
use crate::operation::Operation;

/// `(op, next)`: may call `next` zero, one, or many times. Many calls is
/// the prefix fan-out primitive generalized to arbitrary rewrites (e.g.
/// splitting one declared operation into per-locale copies).
pub type Modifier = Arc<dyn Fn(Operation, &mut dyn FnMut(Operation)) + Send + Sync>;

#[derive(Clone)]
pub struct Group {
    prefixes: Vec<String>,
    modifiers: Vec<Modifier>,
    middleware: Vec<Arc<dyn Middleware>>,
    transformers: Vec<Arc<dyn Transformer>>,
    parent: Option<Arc<Group>>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    pub fn new() -> Self {
        Self {
            prefixes: Vec::new(),
            modifiers: Vec::new(),
            middleware: Vec::new(),
            transformers: Vec::new(),
            parent: None,
        }
    }

    pub fn child(parent: Arc<Group>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new()
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn prefixes(mut self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn modifier(mut self, m: Modifier) -> Self {
        self.modifiers.push(m);
        self
    }

    pub fn middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.middleware.push(mw);
        self
    }

    pub fn transformer(mut self, t: Arc<dyn Transformer>) -> Self {
        self.transformers.push(t);
        self
    }

    /// Full middleware chain for an operation registered through this
    /// group: outer groups before inner, group middleware before the
    /// operation's own (spec §4.4 precedence).
    pub fn full_middleware_chain(&self, op_middleware: &[Arc<dyn Middleware>]) -> Vec<Arc<dyn Middleware>> {
        let mut chain = match &self.parent {
            Some(parent) => parent.full_middleware_chain(&[]),
            None => Vec::new(),
        };
        chain.extend(self.middleware.iter().cloned());
        chain.extend(op_middleware.iter().cloned());
        chain
    }

    /// Full transformer chain: API-level (outermost root) first, then
    /// group-level outer-to-inner.
    pub fn full_transformer_chain(&self) -> Vec<Arc<dyn Transformer>> {
        let mut chain = match &self.parent {
            Some(parent) => parent.full_transformer_chain(),
            None => Vec::new(),
        };
        chain.extend(self.transformers.iter().cloned());
        chain
    }

    /// Applies prefix fan-out then the modifier chain (in registration
    /// order) to `op`, returning every resulting `Operation` this group
    /// wants registered. Idempotent: running it twice over the same
    /// input yields the same (structurally identical) set.
    pub fn apply(&self, op: Operation) -> Vec<Operation> {
        let fanned = self.fan_out_prefixes(op);
        self.modifiers.iter().fold(fanned, |ops, modifier| {
            let mut next = Vec::new();
            for op in ops {
                let mut collected = Vec::new();
                modifier(op, &mut |o| collected.push(o));
                next.extend(collected);
            }
            next
        })
    }

    fn fan_out_prefixes(&self, op: Operation) -> Vec<Operation> {
        if self.prefixes.is_empty() {
            return vec![op];
        }
        self.prefixes
            .iter()
            .map(|prefix| {
                let mut copy = op.clone();
                let slug = slugify(prefix);
                copy.path = format!("{}{}", prefix.trim_end_matches('/'), op.path);
                copy.id = format!("{slug}-{}", op.id);
                copy.tags.push(slug);
                copy
            })
            .collect()
    }
}

fn slugify(prefix: &str) -> String {
    prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ResponseDescriptor;
    use http::Method;
    use indexmap::IndexMap;

    fn sample() -> Operation {
        let mut responses = IndexMap::new();
        responses.insert(200, ResponseDescriptor::new(200, "ok"));
        Operation {
            id: "getUser".to_string(),
            method: Method::GET,
            path: "/users/{id}".to_string(),
            responses,
            ..Operation::default()
        }
    }

    #[test]
    fn prefix_fan_out_produces_one_copy_per_prefix() {
        // spec §8 scenario 5
        let group = Group::new().prefixes(["/v1", "/v2"]);
        let ops = group.apply(sample());
        assert_eq!(ops.len(), 2);

        let ids: Vec<&str> = ops.iter().map(|o| o.id.as_str()).collect();
        assert!(ids.contains(&"v1-getUser"));
        assert!(ids.contains(&"v2-getUser"));

        let paths: Vec<&str> = ops.iter().map(|o| o.path.as_str()).collect();
        assert!(paths.contains(&"/v1/users/{id}"));
        assert!(paths.contains(&"/v2/users/{id}"));

        assert!(ops.iter().any(|o| o.tags.contains(&"v1".to_string())));
        assert!(ops.iter().any(|o| o.tags.contains(&"v2".to_string())));
    }

    #[test]
    fn no_prefixes_passes_operation_through_unchanged() {
        let group = Group::new();
        let ops = group.apply(sample());
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].id, "getUser");
    }

    #[test]
    fn applying_modifier_chain_twice_is_idempotent() {
        let group = Group::new().prefixes(["/v1"]);
        let first = group.apply(sample());
        let second = group.apply(sample());
        assert_eq!(first.len(), second.len());
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].path, second[0].path);
    }

    #[test]
    fn nested_group_middleware_runs_outer_before_inner() {
        let outer = Arc::new(Group::new());
        let inner = Group::child(outer.clone());
        // Neither group has middleware installed here; this just checks
        // the chain composes without panicking and preserves op ordering.
        let chain = inner.full_middleware_chain(&[]);
        assert!(chain.is_empty());
    }
}
