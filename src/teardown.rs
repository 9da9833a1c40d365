// Ordered teardown
//
// Each component hands the engine a release action when it is created. The
// actions are kept in construction order and run in reverse, either when the
// engine is dropped or when initialization fails part-way.

use std::fmt;

/// Engine stages in construction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    GraphicsDevice,
    GeometryArena,
    Swapchain,
    RenderTargetSet,
    CommandExecutor,
    SyncGroup,
    Pipeline,
}

impl Stage {
    pub const CONSTRUCTION_ORDER: [Stage; 7] = [
        Stage::GraphicsDevice,
        Stage::GeometryArena,
        Stage::Swapchain,
        Stage::RenderTargetSet,
        Stage::CommandExecutor,
        Stage::SyncGroup,
        Stage::Pipeline,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::GraphicsDevice => "graphics device",
            Stage::GeometryArena => "geometry arena",
            Stage::Swapchain => "swapchain",
            Stage::RenderTargetSet => "render targets",
            Stage::CommandExecutor => "command executor",
            Stage::SyncGroup => "sync group",
            Stage::Pipeline => "pipeline",
        };
        f.write_str(name)
    }
}

type ReleaseFn<D> = Box<dyn FnOnce(&D)>;

/// Release actions, generic over the handle passed to them at teardown
/// (`ash::Device` in the engine).
pub struct TeardownStack<D> {
    entries: Vec<(Stage, ReleaseFn<D>)>,
}

impl<D> TeardownStack<D> {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(Stage::CONSTRUCTION_ORDER.len()),
        }
    }

    /// Record the release action of a freshly created stage.
    ///
    /// # Panics
    /// If `stage` does not come after every stage already pushed.
    pub fn push(&mut self, stage: Stage, release: impl FnOnce(&D) + 'static) {
        if let Some((last, _)) = self.entries.last() {
            assert!(
                stage > *last,
                "stage {stage} pushed after {last}, breaking construction order"
            );
        }
        log::debug!("Registered teardown for {}", stage);
        self.entries.push((stage, Box::new(release)));
    }

    /// Stages currently held, in construction order.
    #[cfg(test)]
    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.entries.iter().map(|(stage, _)| *stage)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every release action, newest first. Leaves the stack empty.
    pub fn unwind(&mut self, device: &D) {
        while let Some((stage, release)) = self.entries.pop() {
            log::info!("Destroying {}", stage);
            release(device);
        }
    }
}

impl<D> Default for TeardownStack<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> Drop for TeardownStack<D> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::error!(
                "Teardown stack dropped with {} stage(s) never released",
                self.entries.len()
            );
        }
    }
}
