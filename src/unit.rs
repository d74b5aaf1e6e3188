use camino::{Utf8Path, Utf8PathBuf};

/// Interface to the build unit that owns a generation task.
///
/// The registrar and the re-run decision engine mutate the owning unit
/// through this seam: include search paths for newly generated headers,
/// generated sources fed into the unit's compile/link step, and the unit's
/// declared source list as seen by downstream consumers.
pub trait BuildUnit: Send {
    /// Register an include search path, deduplicated.
    fn add_include_path(&mut self, path: &Utf8Path);

    /// Feed a generated file into the unit's compile/link step. Errors when
    /// the unit has no such step; a generated file marked for linking into a
    /// unit that cannot link it is a configuration mistake.
    fn add_link_input(&mut self, path: &Utf8Path) -> anyhow::Result<()>;

    /// Append a file to the unit's declared sources, deduplicated.
    fn add_source(&mut self, path: &Utf8Path);

    /// The unit's currently declared sources.
    fn sources(&self) -> &[Utf8PathBuf];
}

/// In-memory build unit, usable as-is by simple hosts and by tests.
#[derive(Debug, Default)]
pub struct UnitState {
    pub includes: Vec<Utf8PathBuf>,
    pub sources: Vec<Utf8PathBuf>,
    pub link_inputs: Vec<Utf8PathBuf>,
    /// Whether this unit has a compile/link step to feed generated files
    /// into.
    pub has_link_step: bool,
}

impl UnitState {
    pub fn with_link_step() -> Self {
        Self {
            has_link_step: true,
            ..Default::default()
        }
    }
}

impl BuildUnit for UnitState {
    fn add_include_path(&mut self, path: &Utf8Path) {
        if !self.includes.iter().any(|p| p == path) {
            self.includes.push(path.to_owned());
        }
    }

    fn add_link_input(&mut self, path: &Utf8Path) -> anyhow::Result<()> {
        if !self.has_link_step {
            anyhow::bail!("unit has no link step to add {path} to");
        }
        if !self.link_inputs.iter().any(|p| p == path) {
            self.link_inputs.push(path.to_owned());
        }
        Ok(())
    }

    fn add_source(&mut self, path: &Utf8Path) {
        if !self.sources.iter().any(|p| p == path) {
            self.sources.push(path.to_owned());
        }
    }

    fn sources(&self) -> &[Utf8PathBuf] {
        &self.sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_paths_deduplicate() {
        let mut unit = UnitState::default();
        unit.add_include_path(Utf8Path::new("/bld/gen"));
        unit.add_include_path(Utf8Path::new("/bld/gen"));
        assert_eq!(unit.includes.len(), 1);
    }

    #[test]
    fn link_input_requires_link_step() {
        let mut unit = UnitState::default();
        assert!(unit.add_link_input(Utf8Path::new("a.cpp")).is_err());

        let mut unit = UnitState::with_link_step();
        unit.add_link_input(Utf8Path::new("a.cpp")).unwrap();
        unit.add_link_input(Utf8Path::new("a.cpp")).unwrap();
        assert_eq!(unit.link_inputs.len(), 1);
    }
}
