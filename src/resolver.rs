//! Component resolver
//!
//! Binds every named reference in the arena by iterating to a fixed point.
//! Each pass collects the components still `Unresolved` and tries each one:
//! a worker claims the component with a compare-and-set on its state, binds
//! whatever references the registry can already answer, and either completes
//! the component or releases it for the next pass. A component is complete
//! once its own direct references are bound; the targets may still be
//! resolving, which is what makes structural recursion legal here.
//!
//! References into a namespace that was imported but not loaded yet trigger
//! an on-demand fetch through the [`SchemaRetriever`] between passes. When a
//! pass makes no progress and nothing new was loaded, every remaining
//! component fails and every missing reference is reported.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::builder::SchemaBuilder;
use crate::components::{describe, ComponentId, ResolutionState};
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::loaders::{RetrievalRequest, SchemaRetriever};
use crate::registry::{NamespaceRegistry, SchemaArena};

/// Summary of a resolution run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    /// Passes over a non-empty work-set
    pub passes: usize,
    /// Components moved to `Resolved`
    pub resolved: usize,
    /// Namespaces loaded on demand
    pub imports_loaded: usize,
}

/// What happened to one component in one pass
enum Outcome {
    /// Claimed by someone else or no longer unresolved
    Skipped,
    Resolved,
    /// Released; the namespaces it still needs loaded
    Pending(Vec<Option<String>>),
}

/// Fixed-point resolver over a built arena
pub struct Resolver<'a> {
    arena: &'a mut SchemaArena,
    registry: &'a NamespaceRegistry,
    retriever: Option<&'a dyn SchemaRetriever>,
    limits: &'a Limits,
    parallel: bool,
}

impl<'a> Resolver<'a> {
    /// Create a sequential resolver without a retriever
    pub fn new(arena: &'a mut SchemaArena, registry: &'a NamespaceRegistry, limits: &'a Limits) -> Self {
        Self {
            arena,
            registry,
            retriever: None,
            limits,
            parallel: false,
        }
    }

    /// Set the collaborator used for on-demand imports
    pub fn with_retriever(mut self, retriever: &'a dyn SchemaRetriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Drain each pass with the rayon pool
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run to the fixed point; errors are every failure found along the way
    pub fn resolve(mut self) -> (ResolutionReport, Vec<Error>) {
        let mut report = ResolutionReport::default();
        let mut errors = Vec::new();
        let mut failed_imports: BTreeSet<Option<String>> = BTreeSet::new();

        loop {
            let pending: Vec<ComponentId> = self
                .arena
                .component_ids()
                .into_iter()
                .filter(|id| self.arena.info(*id).state.get() == ResolutionState::Unresolved)
                .collect();
            if pending.is_empty() {
                break;
            }
            report.passes += 1;

            let (resolved, needed) = self.pass(&pending);
            report.resolved += resolved;
            debug!(pass = report.passes, pending = pending.len(), resolved, "resolver pass");

            let mut loaded = 0;
            for namespace in needed {
                if failed_imports.contains(&namespace) || self.registry.is_loaded(namespace.as_deref()) {
                    continue;
                }
                match self.load_import(namespace.as_deref(), &mut errors) {
                    Ok(()) => loaded += 1,
                    Err(e) => {
                        warn!(error = %e, "on-demand import failed");
                        errors.push(e);
                        failed_imports.insert(namespace);
                    }
                }
            }
            report.imports_loaded += loaded;

            if resolved == 0 && loaded == 0 {
                self.fail_remaining(&pending, &failed_imports, &mut errors);
                break;
            }
        }
        (report, errors)
    }

    fn pass(&self, pending: &[ComponentId]) -> (usize, BTreeSet<Option<String>>) {
        let arena: &SchemaArena = &*self.arena;
        let registry = self.registry;
        let outcomes: Vec<Outcome> = if self.parallel {
            pending
                .par_iter()
                .map(|id| resolve_component(arena, registry, *id))
                .collect()
        } else {
            pending
                .iter()
                .map(|id| resolve_component(arena, registry, *id))
                .collect()
        };

        let mut resolved = 0;
        let mut needed = BTreeSet::new();
        for outcome in outcomes {
            match outcome {
                Outcome::Resolved => resolved += 1,
                Outcome::Pending(namespaces) => needed.extend(namespaces),
                Outcome::Skipped => {}
            }
        }
        (resolved, needed)
    }

    fn load_import(&mut self, namespace: Option<&str>, errors: &mut Vec<Error>) -> Result<()> {
        let unavailable = |reason: String| Error::ImportUnavailable {
            namespace: namespace.map(String::from),
            reason,
        };
        let retriever = self
            .retriever
            .ok_or_else(|| unavailable("no retriever configured".to_string()))?;
        let request = self
            .registry
            .imports_of(namespace)
            .into_iter()
            .find_map(|edge| edge.location)
            .map(RetrievalRequest::Location)
            .unwrap_or_else(|| RetrievalRequest::Namespace(namespace.map(String::from)));

        debug!(%request, "loading imported namespace");
        let document = retriever
            .fetch(&request)
            .map_err(|e| unavailable(e.to_string()))?;

        let mut builder = SchemaBuilder::new(&mut *self.arena, self.registry, self.limits).with_retriever(retriever);
        let result = builder.build_imported(&document, namespace);
        errors.extend(builder.take_errors());
        result.map(|_| ())
    }

    fn fail_remaining(
        &self,
        pending: &[ComponentId],
        failed_imports: &BTreeSet<Option<String>>,
        errors: &mut Vec<Error>,
    ) {
        for id in pending {
            let info = self.arena.info(*id);
            if !info.state.fail() {
                continue;
            }
            let location = self
                .registry
                .document(info.document)
                .map(|d| d.location.as_string())
                .unwrap_or_default();
            let referenced_from = format!("{} in {}", describe(id.category(), info), location);

            self.arena.for_each_reference(*id, &mut |reference| {
                if reference.is_bound() {
                    return;
                }
                let name = reference.name();
                let namespace = name.namespace();
                let reason = if !self.registry.is_visible(info.document, namespace) {
                    Some(format!(
                        "namespace '{}' is not imported by the referencing document",
                        namespace.unwrap_or("##local")
                    ))
                } else if failed_imports.contains(&namespace.map(String::from)) {
                    Some("the import of its namespace failed".to_string())
                } else if !self.registry.is_loaded(namespace) {
                    Some("no schema document was loaded for its namespace".to_string())
                } else {
                    None
                };
                errors.push(Error::UnresolvableReference {
                    name: name.clone(),
                    category: reference.category(),
                    referenced_from: referenced_from.clone(),
                    reason,
                });
            });
        }
    }
}

fn resolve_component(arena: &SchemaArena, registry: &NamespaceRegistry, id: ComponentId) -> Outcome {
    let info = arena.info(id);
    if !info.state.try_claim() {
        return Outcome::Skipped;
    }

    let mut complete = true;
    let mut needed = Vec::new();
    arena.for_each_reference(id, &mut |reference| {
        if reference.is_bound() {
            return;
        }
        let namespace = reference.name().namespace();
        if !registry.is_visible(info.document, namespace) {
            complete = false;
            return;
        }
        match registry.get(reference.name(), reference.category()) {
            Some(target) if reference.bind(target) => {}
            Some(_) => complete = false,
            None => {
                complete = false;
                if !registry.is_loaded(namespace) {
                    needed.push(namespace.map(String::from));
                }
            }
        }
    });

    if complete {
        info.state.complete();
        Outcome::Resolved
    } else {
        info.state.release();
        Outcome::Pending(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Category;
    use crate::documents::Document;
    use crate::loaders::MemoryRetriever;
    use crate::locations::Location;
    use crate::namespaces::QName;
    use crate::registry::bootstrap;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn run(xml: &str, retriever: Option<&dyn SchemaRetriever>, parallel: bool) -> (SchemaArena, ResolutionReport, Vec<Error>) {
        let (mut arena, registry) = bootstrap().unwrap();
        let limits = Limits::default();
        let doc = Document::parse_str(xml, Location::Memory("main.xsd".into())).unwrap();
        {
            let mut builder = SchemaBuilder::new(&mut arena, &registry, &limits);
            builder.build(&doc).unwrap();
            assert!(builder.take_errors().is_empty());
        }
        let mut resolver = Resolver::new(&mut arena, &registry, &limits).with_parallelism(parallel);
        if let Some(r) = retriever {
            resolver = resolver.with_retriever(r);
        }
        let (report, errors) = resolver.resolve();
        (arena, report, errors)
    }

    #[test]
    fn test_single_pass_with_forward_references() {
        let xml = format!(
            r#"<xs:schema {} xmlns:t="urn:t" targetNamespace="urn:t">
                 <xs:element name="root" type="t:Later"/>
                 <xs:complexType name="Later">
                   <xs:sequence><xs:element ref="t:root" minOccurs="0"/></xs:sequence>
                 </xs:complexType>
               </xs:schema>"#,
            XS
        );
        for parallel in [false, true] {
            let (arena, report, errors) = run(&xml, None, parallel);
            assert!(errors.is_empty(), "{:?}", errors);
            assert_eq!(report.passes, 1);
            assert!(arena
                .component_ids()
                .into_iter()
                .all(|id| arena.info(id).state.get() == ResolutionState::Resolved));
        }
    }

    #[test]
    fn test_reports_every_missing_reference() {
        let xml = format!(
            r#"<xs:schema {}>
                 <xs:element name="a" type="Missing1"/>
                 <xs:complexType name="T">
                   <xs:sequence>
                     <xs:element ref="missing2"/>
                     <xs:group ref="missing3"/>
                   </xs:sequence>
                 </xs:complexType>
               </xs:schema>"#,
            XS
        );
        let (_, _, errors) = run(&xml, None, false);
        let mut missing: Vec<(String, Category)> = errors
            .iter()
            .filter_map(|e| match e {
                Error::UnresolvableReference { name, category, .. } => Some((name.local_name.clone(), *category)),
                _ => None,
            })
            .collect();
        missing.sort();
        assert_eq!(
            missing,
            vec![
                ("Missing1".to_string(), Category::Type),
                ("missing2".to_string(), Category::Element),
                ("missing3".to_string(), Category::Group),
            ]
        );
    }

    #[test]
    fn test_foreign_namespace_must_be_imported() {
        let xml = format!(
            r#"<xs:schema {} xmlns:o="urn:o"><xs:element name="a" type="o:T"/></xs:schema>"#,
            XS
        );
        let (_, _, errors) = run(&xml, None, false);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            Error::UnresolvableReference { reason: Some(reason), .. } => assert!(reason.contains("not imported")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_on_demand_import() {
        let imported = format!(
            r#"<xs:schema {} targetNamespace="urn:o"><xs:simpleType name="Code"><xs:restriction base="xs:token"/></xs:simpleType></xs:schema>"#,
            XS
        );
        let retriever = MemoryRetriever::new().with_document("o.xsd", imported);
        let xml = format!(
            r#"<xs:schema {} xmlns:o="urn:o">
                 <xs:import namespace="urn:o" schemaLocation="o.xsd"/>
                 <xs:element name="a" type="o:Code"/>
               </xs:schema>"#,
            XS
        );
        let (arena, report, errors) = run(&xml, Some(&retriever), false);
        assert!(errors.is_empty(), "{:?}", errors);
        assert_eq!(report.imports_loaded, 1);
        assert_eq!(report.passes, 2);
        let code = arena
            .type_ids()
            .find(|id| arena.type_def(*id).name() == Some(&QName::namespaced("urn:o", "Code")));
        assert!(code.is_some());
    }

    #[test]
    fn test_import_unavailable() {
        let xml = format!(
            r#"<xs:schema {} xmlns:o="urn:o">
                 <xs:import namespace="urn:o"/>
                 <xs:element name="a" type="o:Code"/>
               </xs:schema>"#,
            XS
        );
        let retriever = MemoryRetriever::new();
        let (_, _, errors) = run(&xml, Some(&retriever), false);
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::ImportUnavailable { namespace: Some(ns), .. } if ns == "urn:o")));
        assert!(errors.iter().any(|e| matches!(
            e,
            Error::UnresolvableReference { reason: Some(reason), .. } if reason.contains("import")
        )));
    }

    #[test]
    fn test_imported_namespace_mismatch() {
        let imported = format!(r#"<xs:schema {} targetNamespace="urn:wrong"/>"#, XS);
        let retriever = MemoryRetriever::new().with_document("o.xsd", imported);
        let xml = format!(
            r#"<xs:schema {} xmlns:o="urn:o">
                 <xs:import namespace="urn:o" schemaLocation="o.xsd"/>
                 <xs:element name="a" type="o:Code"/>
               </xs:schema>"#,
            XS
        );
        let (_, _, errors) = run(&xml, Some(&retriever), false);
        assert!(errors
            .iter()
            .any(|e| matches!(e, Error::ImportUnavailable { reason, .. } if reason.contains("urn:wrong"))));
    }
}
