//! Implementation of `bundlex plan`.
//!
//! Planning resolves every unit of an application into a [`UnitPlan`]:
//! lib closure, OS dependencies, composed flags, source files and output
//! paths. Libs pulled in from other applications are planned too, so the
//! resulting [`ProjectPlan`] is self-contained.

use std::collections::HashSet;

use anyhow::{bail, Context, Result};
use rayon::prelude::*;

use crate::builder::context::BuildContext;
use crate::builder::dep_graph::{DepGraphResolver, ResolvedLib};
use crate::builder::flags::{ComposedFlags, FlagInput};
use crate::builder::plan::{order_units, ProjectPlan, UnitPlan};
use crate::builder::provider::ResolvedDependency;
use crate::core::errors::BundlexError;
use crate::core::project::{Interface, Project, Unit};
use crate::util::fs::glob_files;

/// Options for planning.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Application to plan
    pub app: String,

    /// Unit names to plan (empty = all)
    pub units: Vec<String>,
}

/// A planned unit plus the libs it links.
struct Planned {
    plan: UnitPlan,
    libs: Vec<ResolvedLib>,
    interface: Option<Interface>,
}

/// Plan an application.
pub fn plan(ctx: &BuildContext, opts: &PlanOptions) -> Result<ProjectPlan> {
    match ctx.jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("failed to create thread pool")?;
            pool.install(|| plan_in_pool(ctx, opts))
        }
        None => plan_in_pool(ctx, opts),
    }
}

fn plan_in_pool(ctx: &BuildContext, opts: &PlanOptions) -> Result<ProjectPlan> {
    let project = ctx.store.get(&opts.app)?;
    let units = select_units(&project, &opts.units)?;

    tracing::debug!("planning {} unit(s) of `{}`", units.len(), project.app);

    let own: Vec<Planned> = units
        .par_iter()
        .map(|unit| plan_unit(ctx, &project, unit, unit.interface))
        .collect::<Result<_>>()?;

    let mut seen: HashSet<_> = own.iter().map(|p| p.plan.key.clone()).collect();
    let mut pending: Vec<(ResolvedLib, Option<Interface>)> = Vec::new();
    for planned in &own {
        for lib in &planned.libs {
            if seen.insert(lib.key.clone()) {
                pending.push((lib.clone(), planned.interface));
            }
        }
    }

    // The closure of each unit is complete, so pulled-in libs only need
    // their own plans.
    let pulled: Vec<Planned> = pending
        .par_iter()
        .map(|(lib, interface)| plan_unit(ctx, &lib.project, &lib.unit, *interface))
        .collect::<Result<_>>()?;

    let plans = own
        .into_iter()
        .chain(pulled)
        .map(|planned| planned.plan)
        .collect();

    Ok(ProjectPlan {
        app: project.app.clone(),
        target: ctx.target.to_string(),
        family: ctx.family,
        units: order_units(plans)?,
    })
}

fn select_units<'a>(project: &'a Project, filter: &[String]) -> Result<Vec<&'a Unit>> {
    if filter.is_empty() {
        return Ok(project.units().collect());
    }

    for name in filter {
        if !project.units().any(|unit| unit.name == *name) {
            let available: Vec<_> = project.units().map(|u| u.name.as_str()).collect();
            bail!(
                "unknown unit `{}` in `{}`\n\
                 available units: {}",
                name,
                project.app,
                if available.is_empty() {
                    "(none)".to_string()
                } else {
                    available.join(", ")
                }
            );
        }
    }

    Ok(project
        .units()
        .filter(|unit| filter.contains(&unit.name))
        .collect())
}

/// Resolve the OS dependencies of `unit` and of every lib it links.
///
/// Each lib's dependencies are resolved on behalf of the lib's own
/// application, so the disable policy applies per declaring app.
pub fn resolve_os_deps(
    ctx: &BuildContext,
    project: &Project,
    unit: &Unit,
    libs: &[ResolvedLib],
) -> Result<ResolvedDependency, BundlexError> {
    let providers = ctx.providers();

    let mut resolved = providers
        .resolve_all(&project.app, &unit.config.os_deps)
        .map_err(|e| e.in_unit(&project.app, &unit.name))?;

    for lib in libs {
        let lib_deps = providers
            .resolve_all(lib.app(), &lib.unit.config.os_deps)
            .map_err(|e| e.in_unit(lib.app(), &lib.unit.name))?;
        resolved.extend(lib_deps);
    }

    Ok(resolved)
}

/// Compose the final flags of one unit.
pub fn unit_flags(
    ctx: &BuildContext,
    project: &Project,
    unit: &Unit,
) -> Result<ComposedFlags, BundlexError> {
    let libs = DepGraphResolver::new(&ctx.store).closure(project, unit)?;
    let os_deps = resolve_os_deps(ctx, project, unit, &libs)?;
    Ok(ctx.composer.compose(FlagInput {
        project,
        unit,
        os_deps: &os_deps,
        dep_libs: &libs,
    }))
}

fn plan_unit(
    ctx: &BuildContext,
    project: &Project,
    unit: &Unit,
    interface: Option<Interface>,
) -> Result<Planned> {
    let key = unit.key(&project.app);

    let libs = DepGraphResolver::new(&ctx.store).closure_for(project, unit, interface)?;
    let os_deps = resolve_os_deps(ctx, project, unit, &libs)?;
    let flags = ctx.composer.compose(FlagInput {
        project,
        unit,
        os_deps: &os_deps,
        dep_libs: &libs,
    });

    let sources = glob_files(&project.unit_src_dir(unit), &unit.config.sources)
        .with_context(|| format!("failed to resolve sources of {}", key))?;

    let plan = UnitPlan {
        language: unit.config.language,
        sources,
        includes: flags.includes,
        lib_dirs: flags.lib_dirs,
        libs: flags.libs,
        compiler_flags: flags.compiler_flags,
        linker_flags: flags.linker_flags,
        dep_artifacts: libs.iter().map(|lib| ctx.layout.artifact(&lib.key)).collect(),
        depends_on: libs.iter().map(|lib| lib.key.clone()).collect(),
        object_dir: ctx.layout.object_dir(&key),
        output: ctx.layout.artifact(&key),
        key,
    };

    Ok(Planned {
        plan,
        libs,
        interface,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::builder::provider::DisablePolicy;
    use crate::core::platform::Target;
    use crate::core::project::UnitKind;
    use crate::sources::pkg_config::PkgConfigFlags;
    use crate::sources::precompiled::ArtifactAcquirer;
    use crate::test_support::{tarball, MockLoader, MockPkgConfig, MockTransport};

    const FFMPEG_URL: &str = "https://example.com/ffmpeg-linux.tar.gz";

    fn context(
        loader: MockLoader,
        pkg_config: MockPkgConfig,
        transport: Arc<MockTransport>,
        cache: &std::path::Path,
    ) -> BuildContext {
        BuildContext::new(
            Target::parse("x86_64-pc-linux-gnu").unwrap(),
            Arc::new(loader),
            Arc::new(pkg_config),
            ArtifactAcquirer::new(cache, transport),
            "/out",
        )
        .unwrap()
    }

    fn opts(app: &str) -> PlanOptions {
        PlanOptions {
            app: app.to_string(),
            units: Vec::new(),
        }
    }

    fn codec_loader() -> MockLoader {
        MockLoader::new()
            .with_project(
                "my_app",
                r#"
[project.natives.codec]
interface = ["nif", "port"]
sources = ["codec.c"]
deps = { shared = "ring" }

[project.natives.codec.os_deps]
ffmpeg = [
    { pkg_config = "libavcodec" },
    { precompiled = { linux = "https://example.com/ffmpeg-linux.tar.gz" }, libs = ["avcodec"] },
]
"#,
            )
            .with_project(
                "shared",
                r#"
[project.libs.ring]
sources = ["ring.c"]
"#,
            )
    }

    #[test]
    fn test_nif_and_port_share_flags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let transport = Arc::new(
            MockTransport::new()
                .with_archive(FFMPEG_URL, tarball(&[("include/libavcodec/avcodec.h", "")])),
        );
        let ctx = context(
            codec_loader(),
            MockPkgConfig::new(),
            Arc::clone(&transport),
            tmp.path(),
        );

        let plan = plan(&ctx, &opts("my_app")).unwrap();

        let nif = plan
            .own_units()
            .find(|u| u.key.interface == Some(Interface::Nif))
            .unwrap();
        let port = plan
            .own_units()
            .find(|u| u.key.interface == Some(Interface::Port))
            .unwrap();

        assert_eq!(nif.includes, port.includes);
        assert_eq!(nif.libs, port.libs);
        assert_eq!(nif.libs, vec!["avcodec"]);
        assert_ne!(nif.output, port.output);
        assert_eq!(nif.output, PathBuf::from("/out/my_app/nif/codec.so"));
        assert_eq!(port.output, PathBuf::from("/out/my_app/port/codec"));
        assert!(nif.linker_flags.contains(&"-shared".to_string()));
        assert!(!port.linker_flags.contains(&"-shared".to_string()));

        // Both variants resolved the same archive, which was fetched once.
        assert_eq!(transport.download_count(FFMPEG_URL), 1);
    }

    #[test]
    fn test_nif_and_port_share_pkg_config_flags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg_config = MockPkgConfig::new().with_package(
            "libavcodec",
            PkgConfigFlags {
                includes: vec![PathBuf::from("/usr/include/ffmpeg")],
                libs: vec!["avcodec".to_string()],
                ..PkgConfigFlags::default()
            },
        );
        let transport = Arc::new(MockTransport::new());
        let ctx = context(codec_loader(), pkg_config, Arc::clone(&transport), tmp.path());

        let plan = plan(&ctx, &opts("my_app")).unwrap();
        let variants: Vec<&UnitPlan> = plan.own_units().collect();
        assert_eq!(variants.len(), 2);
        let (nif, port) = (variants[0], variants[1]);

        assert_eq!(nif.key.interface, Some(Interface::Nif));
        assert_eq!(port.key.interface, Some(Interface::Port));
        assert_eq!(nif.includes, port.includes);
        assert!(nif.includes.contains(&PathBuf::from("/usr/include/ffmpeg")));
        assert_eq!(nif.libs, port.libs);
        assert_eq!(nif.libs, vec!["avcodec"]);
        assert_ne!(nif.output, port.output);

        // pkg-config succeeded, so the precompiled fallback never ran.
        assert_eq!(transport.total_downloads(), 0);
    }

    #[test]
    fn test_lib_linked_into_nif_after_port_is_position_independent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loader = MockLoader::new()
            .with_project(
                "my_app",
                r#"
[project.natives.codec]
interface = ["port", "nif"]
deps = { shared = "ring" }
"#,
            )
            .with_project("shared", "[project.libs.ring]\nsources = [\"ring.c\"]\n");
        let ctx = context(loader, MockPkgConfig::new(), Arc::new(MockTransport::new()), tmp.path());

        let plan = plan(&ctx, &opts("my_app")).unwrap();
        let ring = plan.units.iter().find(|u| u.key.name == "ring").unwrap();
        assert!(ring.compiler_flags.contains(&"-fPIC".to_string()));

        let nif = plan
            .own_units()
            .find(|u| u.key.interface == Some(Interface::Nif))
            .unwrap();
        assert_eq!(nif.dep_artifacts, vec![ring.output.clone()]);
    }

    #[test]
    fn test_own_lib_linked_into_nif_is_position_independent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loader = MockLoader::new().with_project(
            "my_app",
            r#"
[project.libs.ring]
sources = ["ring.c"]

[project.natives.decoder]
interface = "nif"
deps = { my_app = "ring" }
"#,
        );
        let ctx = context(loader, MockPkgConfig::new(), Arc::new(MockTransport::new()), tmp.path());

        let plan = plan(&ctx, &opts("my_app")).unwrap();
        assert_eq!(plan.units.len(), 2);
        let ring = &plan.units[0];
        assert_eq!(ring.key.name, "ring");
        assert_eq!(ring.compiler_flags, vec!["-std=c11", "-fPIC"]);
        assert_eq!(plan.units[1].depends_on, vec![ring.key.clone()]);
    }

    #[test]
    fn test_pulled_in_libs_come_first() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg_config = MockPkgConfig::new().with_package(
            "libavcodec",
            PkgConfigFlags {
                libs: vec!["avcodec".to_string()],
                ..PkgConfigFlags::default()
            },
        );
        let ctx = context(
            codec_loader(),
            pkg_config,
            Arc::new(MockTransport::new()),
            tmp.path(),
        );

        let plan = plan(&ctx, &opts("my_app")).unwrap();
        let keys: Vec<String> = plan.units.iter().map(|u| u.key.to_string()).collect();

        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0], "shared:lib:ring");
        let ring = &plan.units[0];
        assert_eq!(ring.sources, vec![PathBuf::from("/apps/shared/c_src/shared/ring.c")]);
        assert_eq!(ring.output, PathBuf::from("/out/shared/lib/libring.a"));

        for unit in plan.own_units() {
            assert_eq!(unit.key.kind, UnitKind::Native);
            assert_eq!(unit.dep_artifacts, vec![ring.output.clone()]);
            assert_eq!(unit.depends_on, vec![ring.key.clone()]);
        }
    }

    #[test]
    fn test_plan_is_deterministic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg_config = || {
            MockPkgConfig::new().with_package(
                "libavcodec",
                PkgConfigFlags {
                    includes: vec![PathBuf::from("/usr/include/ffmpeg")],
                    libs: vec!["avcodec".to_string()],
                    ..PkgConfigFlags::default()
                },
            )
        };

        let first = plan(
            &context(codec_loader(), pkg_config(), Arc::new(MockTransport::new()), tmp.path()),
            &opts("my_app"),
        )
        .unwrap();
        let second = plan(
            &context(codec_loader(), pkg_config(), Arc::new(MockTransport::new()), tmp.path())
                .with_jobs(Some(1)),
            &opts("my_app"),
        )
        .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_lib_os_deps_follow_declaring_app_policy() {
        let tmp = tempfile::TempDir::new().unwrap();
        let loader = MockLoader::new()
            .with_project(
                "my_app",
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
os_deps = { ffmpeg = { precompiled = "https://example.com/ffmpeg-linux.tar.gz", libs = ["avcodec"] } }
"#,
            );
        let transport = Arc::new(
            MockTransport::new().with_archive(FFMPEG_URL, tarball(&[("lib/libavcodec.a", "")])),
        );

        let ctx = context(loader, MockPkgConfig::new(), Arc::clone(&transport), tmp.path())
            .with_policy(DisablePolicy::new().with_app("shared"));
        let err = plan(&ctx, &opts("my_app")).unwrap_err();

        let err = err.downcast_ref::<BundlexError>().unwrap();
        assert!(matches!(
            err.root_cause(),
            BundlexError::NoProviderSucceeded { dependency, .. } if dependency == "ffmpeg"
        ));
        assert!(err.to_string().contains("in `shared` unit `ring`"));
        assert_eq!(transport.total_downloads(), 0);
    }

    #[test]
    fn test_unknown_unit_filter() {
        let tmp = tempfile::TempDir::new().unwrap();
        let ctx = context(
            codec_loader(),
            MockPkgConfig::new(),
            Arc::new(MockTransport::new()),
            tmp.path(),
        );
        let err = plan(
            &ctx,
            &PlanOptions {
                app: "my_app".to_string(),
                units: vec!["missing".to_string()],
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown unit `missing`"));
        assert!(err.to_string().contains("codec"));
    }

    #[test]
    fn test_unit_flags() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pkg_config = MockPkgConfig::new().with_package(
            "libavcodec",
            PkgConfigFlags {
                libs: vec!["avcodec".to_string()],
                ..PkgConfigFlags::default()
            },
        );
        let ctx = context(
            codec_loader(),
            pkg_config,
            Arc::new(MockTransport::new()),
            tmp.path(),
        );

        let project = ctx.store.get("my_app").unwrap();
        let unit = project
            .find_unit(UnitKind::Native, "codec", Some(Interface::Port))
            .unwrap();
        let flags = unit_flags(&ctx, &project, unit).unwrap();

        assert_eq!(flags.libs, vec!["avcodec"]);
        assert_eq!(flags.includes, vec![PathBuf::from("/apps/shared/c_src/shared")]);
    }
}
