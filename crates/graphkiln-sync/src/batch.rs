//! Grouping plans into update requests
//!
//! Batch boundaries always fall between documents. A batch holds as many
//! whole plans as fit under the operation limit; a plan over the limit goes
//! out alone.

use graphkiln_core::SyncPlan;

/// Plans sent together in one request (or one delete/insert pair)
#[derive(Debug, Clone, Default)]
pub struct Batch {
    plans: Vec<SyncPlan>,
    operations: usize,
}

impl Batch {
    /// Plans in this batch
    pub fn plans(&self) -> &[SyncPlan] {
        &self.plans
    }

    /// Take the plans back
    pub fn into_plans(self) -> Vec<SyncPlan> {
        self.plans
    }

    /// Total triple operations
    pub fn operation_count(&self) -> usize {
        self.operations
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    fn push(&mut self, plan: SyncPlan) {
        self.operations += plan.operation_count();
        self.plans.push(plan);
    }

    /// Split into single-document batches
    pub fn into_singles(self) -> Vec<Batch> {
        self.plans.into_iter().map(Batch::single).collect()
    }

    /// Batch of one plan
    pub fn single(plan: SyncPlan) -> Batch {
        let mut batch = Batch::default();
        batch.push(plan);
        batch
    }
}

/// Pack non-empty plans into batches of at most `limit` operations, in order
///
/// Empty plans are dropped: they need no request.
pub fn pack(plans: impl IntoIterator<Item = SyncPlan>, limit: usize) -> Vec<Batch> {
    let limit = limit.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::default();

    for plan in plans.into_iter().filter(|plan| !plan.is_empty()) {
        if !current.is_empty() && current.operations + plan.operation_count() > limit {
            batches.push(std::mem::take(&mut current));
        }
        current.push(plan);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphkiln_core::{DocumentId, PlanKind, Term, Triple};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn plan(id: &str, inserts: usize) -> SyncPlan {
        SyncPlan {
            document_id: DocumentId::from(id),
            graph_uri: "urn:g".to_string(),
            to_delete: BTreeSet::new(),
            to_insert: (0..inserts)
                .map(|n| {
                    Triple::new(
                        Term::iri(format!("urn:doc:{id}")),
                        Term::iri("urn:p:n"),
                        Term::literal(n.to_string()),
                    )
                })
                .collect(),
            protected: BTreeSet::new(),
            consistency_risk: None,
            kind: PlanKind::Insert,
        }
    }

    fn shape(batches: &[Batch]) -> Vec<Vec<String>> {
        batches
            .iter()
            .map(|b| b.plans().iter().map(|p| p.document_id.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_whole_documents_only() {
        let batches = pack([plan("a", 3), plan("b", 3), plan("c", 2), plan("d", 9), plan("e", 1)], 5);
        assert_eq!(
            shape(&batches),
            vec![vec!["a"], vec!["b", "c"], vec!["d"], vec!["e"]]
        );
        assert_eq!(batches[2].operation_count(), 9);
    }

    #[test]
    fn test_empty_plans_need_no_batch() {
        assert!(pack([plan("a", 0), plan("b", 0)], 10).is_empty());
        assert_eq!(Batch::single(plan("a", 2)).into_singles().len(), 1);
    }

    proptest! {
        #[test]
        fn prop_batches_respect_limit_and_keep_order(
            sizes in prop::collection::vec(0usize..12, 0..30),
            limit in 1usize..20,
        ) {
            let plans: Vec<SyncPlan> = sizes
                .iter()
                .enumerate()
                .map(|(n, size)| plan(&format!("doc{n:02}"), *size))
                .collect();
            let expected: Vec<String> = plans
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| p.document_id.to_string())
                .collect();

            let batches = pack(plans, limit);
            for batch in &batches {
                prop_assert!(!batch.is_empty());
                prop_assert!(batch.len() == 1 || batch.operation_count() <= limit);
            }
            let flattened: Vec<String> = shape(&batches).into_iter().flatten().collect();
            prop_assert_eq!(flattened, expected);
        }
    }
}
