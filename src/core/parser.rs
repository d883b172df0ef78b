//! Project declaration parser.
//!
//! Turns the raw `[project]` table of a `bundlex.toml` into a [`Project`].
//! Every scalar-or-list field is normalized into a list here, provider specs
//! are decoded into [`Provider`] values, and platform-conditional archive
//! URLs are evaluated against the current [`Family`], so nothing downstream
//! ever sees the loose declaration shapes.

use std::path::{Path, PathBuf};

use toml::{Table, Value};
use url::Url;

use crate::core::errors::BundlexError;
use crate::core::platform::Family;
use crate::core::preprocessor::PreprocessorRegistry;
use crate::core::project::{
    DepRef, Interface, Language, OsDependency, Project, Provider, Unit, UnitConfig, UnitKind,
};
use crate::util::fs::is_plain_name;

/// Default source directory, relative to the application root.
pub const DEFAULT_SRC_PATH: &str = "c_src";

/// Keys of the `[project]` table.
const PROJECT_KEYS: &[&str] = &["app", "src_path", "natives", "libs"];

/// Family keys accepted in a platform-conditional `precompiled` table.
const URL_TABLE_KEYS: &[&str] = &[
    "linux",
    "freebsd",
    "macos_intel",
    "macos_arm",
    "macos",
    "windows32",
    "windows64",
    "windows",
    "embedded",
];

/// Parses project declarations for one platform family.
#[derive(Debug, Clone)]
pub struct ProjectParser {
    family: Family,
    preprocessors: PreprocessorRegistry,
}

impl ProjectParser {
    pub fn new(family: Family) -> Self {
        ProjectParser {
            family,
            preprocessors: PreprocessorRegistry::new(),
        }
    }

    pub fn with_preprocessors(mut self, preprocessors: PreprocessorRegistry) -> Self {
        self.preprocessors = preprocessors;
        self
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// Parse the declaration of `app`, rooted at `root`.
    pub fn parse(
        &self,
        app: &str,
        root: &Path,
        declaration: &Value,
    ) -> Result<Project, BundlexError> {
        let invalid = |reason: String| BundlexError::InvalidProjectSpecification {
            app: app.to_string(),
            reason,
        };

        let table = declaration.as_table().ok_or_else(|| {
            invalid(format!(
                "project declaration must be a table, found {}",
                declaration.type_str()
            ))
        })?;

        if let Some(declared) = table.get("app") {
            let declared = declared
                .as_str()
                .ok_or_else(|| invalid("`app` must be a string".to_string()))?;
            if declared != app {
                return Err(invalid(format!(
                    "project declares app `{}` but was requested as `{}`",
                    declared, app
                )));
            }
        }

        for key in table.keys() {
            if !PROJECT_KEYS.contains(&key.as_str()) {
                tracing::debug!("{}: ignoring unknown project key `{}`", app, key);
            }
        }

        let src_path = match table.get("src_path") {
            Some(Value::String(path)) => PathBuf::from(path),
            Some(other) => {
                return Err(invalid(format!(
                    "`src_path` must be a string, found {}",
                    other.type_str()
                )))
            }
            None => PathBuf::from(DEFAULT_SRC_PATH),
        };
        let src_path = if src_path.is_absolute() {
            src_path
        } else {
            root.join(src_path)
        };

        let natives = self.parse_section(app, UnitKind::Native, table).map_err(invalid)?;
        let libs = self.parse_section(app, UnitKind::Lib, table).map_err(invalid)?;

        Ok(Project {
            app: app.to_string(),
            root: root.to_path_buf(),
            src_path,
            natives,
            libs,
        })
    }

    fn parse_section(
        &self,
        app: &str,
        kind: UnitKind,
        project: &Table,
    ) -> Result<Vec<Unit>, String> {
        let section = kind.section();
        let units = match project.get(section) {
            None => return Ok(Vec::new()),
            Some(Value::Table(units)) => units,
            Some(other) => {
                return Err(format!(
                    "`{}` must be a table of named units, found {}",
                    section,
                    other.type_str()
                ))
            }
        };

        let mut out = Vec::new();
        for (name, unit) in units {
            if !is_plain_name(name) {
                return Err(format!("{}: invalid unit name `{}`", section, name));
            }
            let unit = unit.as_table().ok_or_else(|| {
                format!(
                    "{}.{}: unit must be a table, found {}",
                    section,
                    name,
                    unit.type_str()
                )
            })?;
            out.extend(
                self.parse_unit(app, kind, name, unit)
                    .map_err(|reason| format!("{}.{}: {}", section, name, reason))?,
            );
        }
        Ok(out)
    }

    fn parse_unit(
        &self,
        app: &str,
        kind: UnitKind,
        name: &str,
        unit: &Table,
    ) -> Result<Vec<Unit>, String> {
        let interfaces = parse_interfaces(unit.get("interface"))?;
        if kind == UnitKind::Native && interfaces.is_empty() {
            return Err("natives require an `interface` (nif, cnode or port)".to_string());
        }

        let config = self.parse_config(unit)?;
        let config = self
            .preprocessors
            .apply(kind, name, config, app)
            .map_err(|missing| format!("unknown preprocessor `{}`", missing))?;

        if interfaces.is_empty() {
            return Ok(vec![Unit {
                name: name.to_string(),
                kind,
                interface: None,
                config,
            }]);
        }

        Ok(interfaces
            .into_iter()
            .map(|interface| Unit {
                name: name.to_string(),
                kind,
                interface: Some(interface),
                config: config.clone(),
            })
            .collect())
    }

    fn parse_config(&self, unit: &Table) -> Result<UnitConfig, String> {
        let mut config = UnitConfig::default();

        for (key, value) in unit {
            let field = |e: String| format!("field `{}`: {}", key, e);
            match key.as_str() {
                "interface" => {}
                "sources" => config.sources = string_list(value).map_err(field)?,
                "includes" => config.includes = path_list(value).map_err(field)?,
                "lib_dirs" => config.lib_dirs = path_list(value).map_err(field)?,
                "libs" => config.libs = string_list(value).map_err(field)?,
                "os_deps" => config.os_deps = self.parse_os_deps(value).map_err(field)?,
                "deps" => config.deps = parse_deps(value).map_err(field)?,
                "src_base" => {
                    config.src_base = Some(
                        value
                            .as_str()
                            .ok_or_else(|| field(expected("a string", value)))?
                            .to_string(),
                    )
                }
                "compiler_flags" => config.compiler_flags = string_list(value).map_err(field)?,
                "linker_flags" => config.linker_flags = string_list(value).map_err(field)?,
                "language" => {
                    config.language = value
                        .as_str()
                        .ok_or_else(|| field(expected("a string", value)))?
                        .parse::<Language>()
                        .map_err(field)?
                }
                "preprocessors" => config.preprocessors = string_list(value).map_err(field)?,
                _ => {
                    config.extra.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(config)
    }

    fn parse_os_deps(&self, value: &Value) -> Result<Vec<OsDependency>, String> {
        let deps = value
            .as_table()
            .ok_or_else(|| expected("a table of dependency name to providers", value))?;

        let mut out = Vec::with_capacity(deps.len());
        for (name, spec) in deps {
            if !is_plain_name(name) {
                return Err(format!("invalid os dependency name `{}`", name));
            }
            let providers = match spec {
                Value::Array(specs) if specs.is_empty() => {
                    return Err(format!("os dependency `{}` lists no providers", name))
                }
                Value::Array(specs) => specs
                    .iter()
                    .map(|s| self.parse_provider(name, s))
                    .collect::<Result<Vec<_>, _>>()?,
                single => vec![self.parse_provider(name, single)?],
            };
            out.push(OsDependency {
                name: name.clone(),
                providers,
            });
        }
        Ok(out)
    }

    fn parse_provider(&self, dep: &str, spec: &Value) -> Result<Provider, String> {
        let bad = |e: String| format!("os dependency `{}`: {}", dep, e);

        match spec {
            Value::String(kind) if kind == "pkg_config" => Ok(Provider::PkgConfig {
                names: vec![dep.to_string()],
            }),
            Value::String(kind) if kind == "precompiled" => {
                Err(bad("the precompiled provider needs a url".to_string()))
            }
            Value::String(kind) => Err(bad(format!("unknown provider `{}`", kind))),

            Value::Table(table) => {
                let has_pkg_config = table.contains_key("pkg_config");
                let has_precompiled = table.contains_key("precompiled");
                if has_pkg_config == has_precompiled {
                    return Err(bad(
                        "a provider table needs exactly one of `pkg_config` or `precompiled`"
                            .to_string(),
                    ));
                }

                if has_pkg_config {
                    if let Some(key) = table.keys().find(|k| *k != "pkg_config") {
                        return Err(bad(format!("unexpected key `{}` for pkg_config", key)));
                    }
                    let names = match &table["pkg_config"] {
                        Value::Boolean(true) => vec![dep.to_string()],
                        other => string_list(other).map_err(bad)?,
                    };
                    if names.is_empty() {
                        return Err(bad("pkg_config lists no names".to_string()));
                    }
                    return Ok(Provider::PkgConfig { names });
                }

                if let Some(key) = table.keys().find(|k| *k != "precompiled" && *k != "libs") {
                    return Err(bad(format!("unexpected key `{}` for precompiled", key)));
                }
                let url = self.select_url(&table["precompiled"]).map_err(bad)?;
                let libs = match table.get("libs") {
                    Some(libs) => string_list(libs).map_err(bad)?,
                    None => vec![dep.to_string()],
                };
                Ok(Provider::Precompiled { url, libs })
            }

            other => Err(bad(format!(
                "unrecognized provider shape ({})",
                other.type_str()
            ))),
        }
    }

    /// Pick the archive URL for the current family.
    fn select_url(&self, value: &Value) -> Result<Option<String>, String> {
        match value {
            Value::String(url) => validate_url(url).map(Some),
            Value::Boolean(false) => Ok(None),
            Value::Table(by_family) => {
                for (key, url) in by_family {
                    if !URL_TABLE_KEYS.contains(&key.as_str()) {
                        return Err(format!("unknown platform `{}` in precompiled urls", key));
                    }
                    if !url.is_str() {
                        return Err(format!(
                            "precompiled url for `{}` must be a string, found {}",
                            key,
                            url.type_str()
                        ));
                    }
                }

                let url = by_family
                    .get(self.family.as_str())
                    .or_else(|| self.family.group().and_then(|g| by_family.get(g)))
                    .and_then(Value::as_str);
                url.map(validate_url).transpose()
            }
            other => Err(expected("a url or a table of urls by platform", other)),
        }
    }
}

fn parse_interfaces(value: Option<&Value>) -> Result<Vec<Interface>, String> {
    let names = match value {
        None => return Ok(Vec::new()),
        Some(value) => string_list(value).map_err(|e| format!("field `interface`: {}", e))?,
    };

    let mut interfaces: Vec<Interface> = Vec::with_capacity(names.len());
    for name in names {
        let interface = name.parse::<Interface>()?;
        if !interfaces.contains(&interface) {
            interfaces.push(interface);
        }
    }
    Ok(interfaces)
}

fn parse_deps(value: &Value) -> Result<Vec<DepRef>, String> {
    let deps = value
        .as_table()
        .ok_or_else(|| expected("a table of application to lib names", value))?;

    deps.iter()
        .map(|(app, names)| {
            if !is_plain_name(app) {
                return Err(format!("invalid application name `{}`", app));
            }
            let names = string_list(names).map_err(|e| format!("deps on `{}`: {}", app, e))?;
            if names.is_empty() {
                return Err(format!("deps on `{}` lists no libs", app));
            }
            Ok(DepRef {
                app: app.clone(),
                names,
            })
        })
        .collect()
}

/// Accept a string or an array of strings.
fn string_list(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| expected("a list of strings", item))
            })
            .collect(),
        other => Err(expected("a string or a list of strings", other)),
    }
}

fn path_list(value: &Value) -> Result<Vec<PathBuf>, String> {
    Ok(string_list(value)?.into_iter().map(PathBuf::from).collect())
}

fn validate_url(url: &str) -> Result<String, String> {
    if url.contains("://") {
        Url::parse(url).map_err(|e| format!("invalid url `{}`: {}", url, e))?;
    } else if url.trim().is_empty() {
        return Err("empty precompiled url".to_string());
    }
    Ok(url.to_string())
}

fn expected(what: &str, found: &Value) -> String {
    format!("expected {}, found {}", what, found.type_str())
}
