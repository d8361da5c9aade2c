//! Per-field de-duplication of extracted records. First occurrence wins.

use std::collections::HashSet;

use crate::{config::model::DedupPolicy, model::record::StructuralRecord};

/// Applies `policy` to `rec` in place. A no-op policy leaves the record as
/// the extractor produced it.
pub fn apply_dedup(rec: &mut StructuralRecord, policy: &DedupPolicy) {
    if policy.imports {
        let mut seen = HashSet::new();
        rec.imported_modules
            .retain(|i| seen.insert((i.module.clone(), i.alias.clone())));
    }
    if policy.types {
        let mut seen = HashSet::new();
        rec.types.retain(|t| seen.insert((t.kind, t.name.clone())));
    }
    if policy.callables {
        let mut seen = HashSet::new();
        rec.callables
            .retain(|c| seen.insert((c.owner.clone(), c.name.clone())));
        for t in &mut rec.types {
            let mut seen = HashSet::new();
            t.methods
                .retain(|c| seen.insert((c.owner.clone(), c.name.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        language::LanguageKind,
        record::{Callable, CallableKind, ImportRef, TypeDecl, TypeKind},
    };

    fn sample() -> StructuralRecord {
        let mut rec = StructuralRecord::new("a.java", LanguageKind::Java);
        rec.imported_modules = vec![
            ImportRef::module("java.util.List"),
            ImportRef::module("java.util.List"),
            ImportRef::module("java.util.List").with_alias(Some("L".into())),
        ];
        rec.types = vec![
            TypeDecl::new("A", TypeKind::Class, 1),
            TypeDecl::new("A", TypeKind::Class, 9),
            TypeDecl::new("A", TypeKind::Interface, 12),
        ];
        rec.callables = vec![
            Callable::new("run", CallableKind::Function, 2),
            Callable::new("run", CallableKind::Function, 3),
        ];
        rec
    }

    #[test]
    fn default_policy_keeps_duplicates() {
        let mut rec = sample();
        apply_dedup(&mut rec, &DedupPolicy::default());
        assert_eq!(rec.imported_modules.len(), 3);
        assert_eq!(rec.types.len(), 3);
        assert_eq!(rec.callables.len(), 2);
    }

    #[test]
    fn enabled_fields_keep_first_occurrence() {
        let mut rec = sample();
        let policy = DedupPolicy {
            imports: true,
            types: true,
            callables: false,
        };
        apply_dedup(&mut rec, &policy);
        assert_eq!(rec.imported_modules.len(), 2);
        assert_eq!(rec.types.len(), 2);
        assert_eq!(rec.types[0].line, 1);
        assert_eq!(rec.callables.len(), 2);
    }
}
