use std::sync::Arc;

use super::Project;
use crate::config::ProjectConfig;
use crate::error::{PatchworkError, Result};
use crate::store::{DocStorage, Transport};

/// A slot holding at most one open project.
///
/// Binding layers keep one of these per editor instance and drive explicit
/// create/destroy calls through it. Misordered calls are rejected and logged
/// instead of touching the project.
#[derive(Default)]
pub struct ProjectHandle {
    project: Option<Project>,
}

impl ProjectHandle {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a project into the slot.
    pub fn create(&mut self, config: ProjectConfig) -> Result<&Project> {
        self.ensure_empty()?;
        Ok(self.project.insert(Project::open(config)?))
    }

    /// Open a project over explicit backends into the slot.
    pub fn create_with(
        &mut self,
        config: ProjectConfig,
        storage: Arc<dyn DocStorage>,
        transport: Option<Box<dyn Transport>>,
    ) -> Result<&Project> {
        self.ensure_empty()?;
        Ok(self
            .project
            .insert(Project::open_with(config, storage, transport)?))
    }

    /// Stop and release the project.
    pub fn destroy(&mut self) -> Result<()> {
        let Some(project) = self.project.take() else {
            log::warn!("destroy called on an empty project handle");
            return Err(PatchworkError::Configuration(
                "no project to destroy".to_string(),
            ));
        };
        // Already stopped is fine here; dropping flushes either way
        let _ = project.stop();
        drop(project);
        Ok(())
    }

    /// The open project.
    pub fn get(&self) -> Result<&Project> {
        self.project
            .as_ref()
            .ok_or_else(|| PatchworkError::Configuration("no project is open".to_string()))
    }

    /// Whether a project is open.
    pub fn is_open(&self) -> bool {
        self.project.is_some()
    }

    fn ensure_empty(&self) -> Result<()> {
        if self.project.is_some() {
            log::warn!("create called on a handle that already holds a project");
            return Err(PatchworkError::Configuration(
                "project handle is already in use".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_twice_is_rejected() {
        let mut handle = ProjectHandle::new();
        let doc_id = handle.create(ProjectConfig::default()).unwrap().get_doc_id();
        assert!(matches!(
            handle.create(ProjectConfig::default()),
            Err(PatchworkError::Configuration(_))
        ));
        // The original project is untouched
        assert_eq!(handle.get().unwrap().get_doc_id(), doc_id);
    }

    #[test]
    fn test_destroy_empty_is_rejected() {
        let mut handle = ProjectHandle::new();
        assert!(handle.destroy().is_err());

        handle.create(ProjectConfig::default()).unwrap();
        handle.destroy().unwrap();
        assert!(!handle.is_open());
        assert!(matches!(handle.destroy(), Err(PatchworkError::Configuration(_))));
        assert!(handle.get().is_err());
    }
}
