//! Cross-application lib dependency resolution.
//!
//! A unit's `deps` names libs of other applications (or its own). This
//! module resolves those references through the [`ProjectStore`] and
//! computes the transitive closure of static libraries a unit links.
//!
//! The closure is ordered for the linker: every lib comes before the libs
//! it depends on, and independent libs keep their declaration order.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::errors::BundlexError;
use crate::core::project::{DepRef, Interface, Project, Unit, UnitKey};
use crate::core::store::ProjectStore;

/// A lib pulled into a unit's link.
#[derive(Debug, Clone)]
pub struct ResolvedLib {
    pub key: UnitKey,
    /// Project declaring the lib
    pub project: Arc<Project>,
    pub unit: Unit,
}

impl ResolvedLib {
    pub fn app(&self) -> &str {
        &self.project.app
    }
}

/// Resolves lib references through a project store.
pub struct DepGraphResolver<'a> {
    store: &'a ProjectStore,
}

struct Walk {
    /// Consumer interface every lib in the closure is linked into
    interface: Option<Interface>,
    stack: Vec<UnitKey>,
    done: HashSet<UnitKey>,
    post_order: Vec<ResolvedLib>,
}

impl<'a> DepGraphResolver<'a> {
    pub fn new(store: &'a ProjectStore) -> Self {
        DepGraphResolver { store }
    }

    /// Look up one lib of `dep.app` usable from a unit built for
    /// `interface`. Natives are never considered.
    pub fn resolve_ref(
        &self,
        dep: &DepRef,
        name: &str,
        interface: Option<Interface>,
    ) -> Result<ResolvedLib, BundlexError> {
        let project = self.store.get(&dep.app)?;
        let unit = project
            .find_lib(name, interface)
            .cloned()
            .ok_or_else(|| BundlexError::UnknownDependency {
                app: dep.app.clone(),
                name: name.to_string(),
            })?;

        Ok(ResolvedLib {
            key: unit.key(&project.app),
            project,
            unit,
        })
    }

    /// Direct lib dependencies of `unit`, in declaration order.
    pub fn direct(
        &self,
        project: &Project,
        unit: &Unit,
    ) -> Result<Vec<ResolvedLib>, BundlexError> {
        let mut libs = Vec::new();
        for dep in &unit.config.deps {
            for name in &dep.names {
                let lib = self
                    .resolve_ref(dep, name, unit.interface)
                    .map_err(|e| e.in_unit(&project.app, &unit.name))?;
                libs.push(lib);
            }
        }
        Ok(libs)
    }

    /// Transitive lib closure of `unit`.
    pub fn closure(
        &self,
        project: &Project,
        unit: &Unit,
    ) -> Result<Vec<ResolvedLib>, BundlexError> {
        self.closure_for(project, unit, unit.interface)
    }

    /// Transitive lib closure of `unit` when linked into a unit built for
    /// `interface`.
    pub fn closure_for(
        &self,
        project: &Project,
        unit: &Unit,
        interface: Option<Interface>,
    ) -> Result<Vec<ResolvedLib>, BundlexError> {
        let mut walk = Walk {
            interface,
            stack: vec![unit.key(&project.app)],
            done: HashSet::new(),
            post_order: Vec::new(),
        };

        self.visit_deps(&mut walk, &project.app, unit)?;

        walk.post_order.reverse();
        Ok(walk.post_order)
    }

    /// Visit the deps of `unit` in reverse declaration order, so that the
    /// reversed post-order lists siblings in declaration order.
    fn visit_deps(&self, walk: &mut Walk, app: &str, unit: &Unit) -> Result<(), BundlexError> {
        let refs: Vec<(&DepRef, &String)> = unit
            .config
            .deps
            .iter()
            .flat_map(|dep| dep.names.iter().map(move |name| (dep, name)))
            .collect();

        for (dep, name) in refs.into_iter().rev() {
            let lib = self
                .resolve_ref(dep, name, walk.interface)
                .map_err(|e| e.in_unit(app, &unit.name))?;

            if walk.done.contains(&lib.key) {
                continue;
            }

            if let Some(start) = walk.stack.iter().position(|key| *key == lib.key) {
                let mut chain: Vec<String> =
                    walk.stack[start..].iter().map(ToString::to_string).collect();
                chain.push(lib.key.to_string());
                return Err(BundlexError::CyclicDependency { chain }.in_unit(app, &unit.name));
            }

            walk.stack.push(lib.key.clone());
            let lib_app = lib.project.app.clone();
            let lib_unit = lib.unit.clone();
            self.visit_deps(walk, &lib_app, &lib_unit)?;
            walk.stack.pop();

            walk.done.insert(lib.key.clone());
            walk.post_order.push(lib);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::ProjectParser;
    use crate::core::platform::Family;
    use crate::core::project::UnitKind;
    use crate::test_support::MockLoader;

    fn store(loader: MockLoader) -> ProjectStore {
        ProjectStore::new(Arc::new(loader), ProjectParser::new(Family::Linux))
    }

    fn names(libs: &[ResolvedLib]) -> Vec<String> {
        libs.iter().map(|lib| lib.key.to_string()).collect()
    }

    #[test]
    fn test_closure_is_transitive_and_ordered() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = "nif"
deps = { shared = ["ring", "codec"] }
"#,
                )
                .with_project(
                    "shared",
                    r#"
[project.libs.ring]
deps = { base = "alloc" }

[project.libs.codec]
deps = { base = "alloc" }
"#,
                )
                .with_project("base", "[project.libs.alloc]\n"),
        );

        let project = store.get("root_app").unwrap();
        let unit = &project.natives[0];
        let libs = DepGraphResolver::new(&store).closure(&project, unit).unwrap();

        assert_eq!(
            names(&libs),
            vec!["shared:lib:ring", "shared:lib:codec", "base:lib:alloc"]
        );
    }

    #[test]
    fn test_variant_selection_follows_interface() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = ["nif", "port"]
deps = { shared = ["ring", "alloc"] }
"#,
                )
                .with_project(
                    "shared",
                    r#"
[project.libs.ring]
interface = ["nif", "port"]

[project.libs.alloc]
sources = ["alloc.c"]
"#,
                ),
        );

        let project = store.get("root_app").unwrap();
        let resolver = DepGraphResolver::new(&store);

        let nif = project
            .find_unit(UnitKind::Native, "decoder", Some(Interface::Nif))
            .unwrap();
        let libs = resolver.closure(&project, nif).unwrap();
        assert_eq!(names(&libs), vec!["shared:lib:ring(nif)", "shared:lib:alloc"]);

        let port = project
            .find_unit(UnitKind::Native, "decoder", Some(Interface::Port))
            .unwrap();
        let libs = resolver.closure(&project, port).unwrap();
        assert_eq!(names(&libs), vec!["shared:lib:ring(port)", "shared:lib:alloc"]);
    }

    #[test]
    fn test_natives_are_not_dependencies() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = "nif"
deps = { shared = "helper" }
"#,
                )
                .with_project(
                    "shared",
                    r#"
[project.natives.helper]
interface = "nif"
"#,
                ),
        );

        let project = store.get("root_app").unwrap();
        let err = DepGraphResolver::new(&store)
            .closure(&project, &project.natives[0])
            .unwrap_err();

        assert!(matches!(
            err.root_cause(),
            BundlexError::UnknownDependency { app, name } if app == "shared" && name == "helper"
        ));
        assert!(matches!(
            err,
            BundlexError::InUnit { ref app, ref unit, .. } if app == "root_app" && unit == "decoder"
        ));
    }

    #[test]
    fn test_incompatible_interface_variant_is_unknown() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = "nif"
deps = { shared = "ring" }
"#,
                )
                .with_project(
                    "shared",
                    r#"
[project.libs.ring]
interface = "cnode"
"#,
                ),
        );

        let project = store.get("root_app").unwrap();
        let err = DepGraphResolver::new(&store)
            .closure(&project, &project.natives[0])
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            BundlexError::UnknownDependency { .. }
        ));
    }

    #[test]
    fn test_unknown_application_is_tagged() {
        let store = store(MockLoader::new().with_project(
            "root_app",
            r#"
[project.natives.decoder]
interface = "nif"
deps = { missing_app = "ring" }
"#,
        ));

        let project = store.get("root_app").unwrap();
        let err = DepGraphResolver::new(&store)
            .direct(&project, &project.natives[0])
            .unwrap_err();
        assert!(matches!(
            err.root_cause(),
            BundlexError::UnknownApplication { app } if app == "missing_app"
        ));
        assert!(err.to_string().contains("in `root_app` unit `decoder`"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = "nif"
deps = { a = "left" }
"#,
                )
                .with_project("a", "[project.libs.left]\ndeps = { b = \"right\" }\n")
                .with_project("b", "[project.libs.right]\ndeps = { a = \"left\" }\n"),
        );

        let project = store.get("root_app").unwrap();
        let err = DepGraphResolver::new(&store)
            .closure(&project, &project.natives[0])
            .unwrap_err();

        match err.root_cause() {
            BundlexError::CyclicDependency { chain } => {
                assert_eq!(chain, &vec!["a:lib:left", "b:lib:right", "a:lib:left"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_shared_lib_deduplicated() {
        let store = store(
            MockLoader::new()
                .with_project(
                    "root_app",
                    r#"
[project.natives.decoder]
interface = "nif"
deps = { shared = ["ring", "ring"] }
"#,
                )
                .with_project("shared", "[project.libs.ring]\n"),
        );

        let project = store.get("root_app").unwrap();
        let libs = DepGraphResolver::new(&store)
            .closure(&project, &project.natives[0])
            .unwrap();
        assert_eq!(libs.len(), 1);
    }
}
