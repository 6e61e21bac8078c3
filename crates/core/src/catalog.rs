//! Room template catalog: loading, validation, repair, and selection queries.

pub mod builtin;
pub mod mask;
pub mod repair;
pub mod template;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub use builtin::keys;
pub use mask::CollisionMask;
pub use repair::RepairReport;
pub use template::{Prefab, PrefabKind, RoomTemplate, TemplateError};

use crate::types::Direction;
use template::TemplateDocument;

#[derive(Clone, Debug)]
pub struct TemplateCatalog {
    templates: Vec<RoomTemplate>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateCatalog {
    /// The catalog shipped with the crate, covering every exit combination.
    pub fn builtin() -> Self {
        Self::from_templates(builtin::default_templates())
    }

    /// The minimal start/exit pair used when nothing else is available.
    pub fn fallback() -> Self {
        Self::from_templates(Vec::from(builtin::fallback_pair()))
    }

    /// Loads every template from JSON `sources`. Never fails: broken templates are
    /// logged and skipped, and an empty result falls back to [`TemplateCatalog::fallback`].
    pub fn load<S: AsRef<str>>(sources: &[S]) -> Self {
        let mut templates = Vec::new();
        let mut seen_ids = BTreeSet::new();
        for (index, source) in sources.iter().enumerate() {
            let document: TemplateDocument = match serde_json::from_str(source.as_ref()) {
                Ok(document) => document,
                Err(error) => {
                    log::warn!("template source #{index}: {}", TemplateError::from(error));
                    continue;
                }
            };
            for raw in document.into_templates() {
                if !seen_ids.insert(raw.id().to_string()) {
                    let error = TemplateError::DuplicateId { id: raw.id().to_string() };
                    log::warn!("template source #{index}: {error}");
                    continue;
                }
                match raw.into_template() {
                    Ok(template) => templates.push(template),
                    Err(error) => log::warn!("template source #{index}: {error}"),
                }
            }
        }

        if templates.is_empty() {
            log::warn!("no room templates loaded, using the built-in fallback pair");
            return Self::fallback();
        }
        Self::from_templates(templates)
    }

    /// Loads every `*.json` file in `dir` (sorted by file name). I/O failures are logged.
    pub fn load_dir(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) => {
                log::warn!("cannot read template directory {}: {error}", dir.display());
                return Self::load::<String>(&[]);
            }
        };
        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|extension| extension == "json"))
            .collect();
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            match fs::read_to_string(&path) {
                Ok(source) => sources.push(source),
                Err(error) => log::warn!("cannot read template {}: {error}", path.display()),
            }
        }
        Self::load(&sources)
    }

    fn from_templates(mut templates: Vec<RoomTemplate>) -> Self {
        for template in &mut templates {
            let report = repair::repair_template(template);
            if !report.is_clean() {
                log::debug!("template `{}` repaired: {report:?}", template.id);
            }
        }
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn templates(&self) -> &[RoomTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&RoomTemplate> {
        self.templates.iter().find(|template| template.id == id)
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<&RoomTemplate>
    where
        P: Fn(&RoomTemplate) -> bool,
    {
        self.templates.iter().filter(|template| predicate(template)).collect()
    }

    pub fn start_templates(&self) -> Vec<&RoomTemplate> {
        self.filter(|template| template.is_start)
    }

    /// Non-start templates offering at least every exit in `required`.
    pub fn templates_with_exits(&self, required: &[Direction]) -> Vec<&RoomTemplate> {
        self.filter(|template| !template.is_start && template.has_exits(required))
    }
}
