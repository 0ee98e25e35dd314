//! Script activation.
//!
//! The scanner never interprets script text as code. It hands the text to a
//! [`ScriptHost`], and the host decides what registrations the script stands
//! for. [`ModuleCatalog`] is the stock host: page components register named
//! modules up front and a script element lists the modules it activates.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::engine::Coordinator;
use crate::error::{Error, Result};

/// Activates the text content of a script element.
pub trait ScriptHost: Send + Sync {
    /// Activate `source`. Registrations go through `coordinator`.
    fn evaluate(&self, source: &str, coordinator: &Coordinator) -> Result<()>;
}

impl<F> ScriptHost for F
where
    F: Fn(&str, &Coordinator) -> Result<()> + Send + Sync,
{
    fn evaluate(&self, source: &str, coordinator: &Coordinator) -> Result<()> {
        self(source, coordinator)
    }
}

/// A named component's setup: usually one or more `register` calls.
pub type Module = Arc<dyn Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync>;

/// Host that maps module names to setup closures.
///
/// Script text format: module names separated by whitespace, commas or
/// semicolons; `//` starts a comment that runs to the end of the line.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    modules: BTreeMap<String, Module>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module.
    pub fn module<F>(mut self, name: impl Into<String>, setup: F) -> Self
    where
        F: Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert(name, setup);
        self
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, setup: F)
    where
        F: Fn(&Coordinator) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(setup));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Split script text into module names.
    pub fn parse(source: &str) -> Vec<&str> {
        source
            .lines()
            .map(|line| line.split("//").next().unwrap_or_default())
            .flat_map(|line| line.split(|c: char| c.is_whitespace() || c == ',' || c == ';'))
            .filter(|name| !name.is_empty())
            .collect()
    }
}

impl ScriptHost for ModuleCatalog {
    /// Every name must be known before any module runs. Modules then run in
    /// listed order; the first failure stops the rest of this script.
    fn evaluate(&self, source: &str, coordinator: &Coordinator) -> Result<()> {
        let names = Self::parse(source);
        if let Some(unknown) = names.iter().find(|name| !self.contains(name)) {
            return Err(Error::Evaluation(format!("unknown module {unknown:?}")));
        }

        for name in names {
            let setup = &self.modules[name];
            setup(coordinator)
                .map_err(|e| Error::Evaluation(format!("module {name:?}: {e:#}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strips_comments_and_separators() {
        let names = ModuleCatalog::parse("hero, slider // carousel\n\n  nav;footer\n// all done");
        assert_eq!(names, vec!["hero", "slider", "nav", "footer"]);
    }

    #[test]
    fn parse_blank_source() {
        assert!(ModuleCatalog::parse("  \n // only a comment \n").is_empty());
    }
}
