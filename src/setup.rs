//! Lifecycle callbacks run on registered objects before each phase of a solve.

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SetupPhase {
    /// Once, before the first time step.
    Initial,
    /// Before every time step.
    Timestep,
    /// Before every residual evaluation.
    Residual,
    /// Before every Jacobian evaluation.
    Jacobian,
}

/// Lifecycle callbacks of physics objects and postprocessors.
///
/// All callbacks default to doing nothing. Objects are shared between workers, so any state
/// updated by a callback needs interior mutability.
pub trait SetupHooks {
    fn initial_setup(&self) -> eyre::Result<()> {
        Ok(())
    }

    fn timestep_setup(&self) -> eyre::Result<()> {
        Ok(())
    }

    fn residual_setup(&self) -> eyre::Result<()> {
        Ok(())
    }

    fn jacobian_setup(&self) -> eyre::Result<()> {
        Ok(())
    }

    /// Runs the callback belonging to `phase`.
    fn setup(&self, phase: SetupPhase) -> eyre::Result<()> {
        match phase {
            SetupPhase::Initial => self.initial_setup(),
            SetupPhase::Timestep => self.timestep_setup(),
            SetupPhase::Residual => self.residual_setup(),
            SetupPhase::Jacobian => self.jacobian_setup(),
        }
    }
}
