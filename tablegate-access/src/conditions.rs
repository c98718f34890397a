//! Row-filter merging

use tablegate_common::clause::Clause;
use tablegate_common::grant::Grant;

/// Combine grant-mandated clauses with the caller's clauses.
///
/// The result is an implicit AND. Grant clauses come first and are never
/// replaced or dropped.
pub fn merge(request: &[Clause], grant: &[Clause]) -> Vec<Clause> {
    let mut merged = Vec::with_capacity(grant.len() + request.len());
    merged.extend_from_slice(grant);
    merged.extend_from_slice(request);
    merged
}

/// Merge against an optional grant; admins and ungated tables have none
pub fn merge_with_grant(request: &[Clause], grant: Option<&Grant>) -> Vec<Clause> {
    match grant {
        Some(grant) => merge(request, &grant.where_conditions),
        None => request.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablegate_common::clause::Operator;

    #[test]
    fn test_grant_clauses_come_first() {
        let merged = merge(
            &[Clause::leaf("age", Operator::Gt, 25)],
            &[Clause::eq("user_id", 7)],
        );

        assert_eq!(
            merged,
            vec![Clause::eq("user_id", 7), Clause::leaf("age", Operator::Gt, 25)]
        );
    }

    #[test]
    fn test_caller_cannot_drop_grant_scope() {
        let grant = Grant::new(7, "orders").with_condition(Clause::eq("user_id", 7));

        let merged = merge_with_grant(&[], Some(&grant));
        assert_eq!(merged, vec![Clause::eq("user_id", 7)]);

        // A contradicting caller clause is added alongside, not substituted
        let merged = merge_with_grant(&[Clause::eq("user_id", 8)], Some(&grant));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], Clause::eq("user_id", 7));
    }

    #[test]
    fn test_composites_kept_intact() {
        let or = Clause::Or(vec![Clause::eq("status", "open"), Clause::eq("status", "held")]);
        let merged = merge(&[or.clone()], &[Clause::eq("user_id", 1)]);
        assert_eq!(merged[1], or);
    }

    #[test]
    fn test_no_grant() {
        let request = vec![Clause::eq("id", 3)];
        assert_eq!(merge_with_grant(&request, None), request);
        assert!(merge_with_grant(&[], None).is_empty());
    }
}
