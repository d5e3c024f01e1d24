//! Pluggable stage-type constructors.
//!
//! The substrate instantiates flow controllers by a string tag it reads
//! from the pipeline plan. Rather than a global mutable registration
//! table, constructors live in an explicit [`ControllerRegistry`] value
//! populated at process start and handed to whatever wires the pipeline.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use crate::controller::StageController;
use crate::topology::StageTopology;

/// Constructor for one stage kind: given the stage's topology, produce a
/// fully wired controller (work unit and outbox included).
pub type ControllerFactory = Arc<dyn Fn(&StageTopology) -> StageController + Send + Sync>;

/// Registry mapping a stage-kind tag to its constructor.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use creditgate::controller::StageController;
/// use creditgate::outbox::RecordingOutbox;
/// use creditgate::registry::ControllerRegistry;
/// use creditgate::topology::StageTopology;
/// use creditgate::types::StageId;
/// use creditgate::work::NoopWork;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = ControllerRegistry::new().with_factory("compute", Arc::new(|topology| {
///     StageController::new(topology, NoopWork, RecordingOutbox::default())
/// }));
///
/// let topology = StageTopology::builder(StageId(1)).build()?;
/// let controller = registry.build("compute", &topology)?;
/// assert_eq!(controller.id(), StageId(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct ControllerRegistry {
    factories: FxHashMap<String, ControllerFactory>,
}

impl ControllerRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Register a factory under `kind`, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, factory: ControllerFactory) -> &mut Self {
        self.factories.insert(kind.into(), factory);
        self
    }

    /// Builder-style registration for fluent construction.
    #[must_use]
    pub fn with_factory(mut self, kind: impl Into<String>, factory: ControllerFactory) -> Self {
        self.register(kind, factory);
        self
    }

    /// Construct a controller of the given kind for `topology`.
    pub fn build(
        &self,
        kind: &str,
        topology: &StageTopology,
    ) -> Result<StageController, RegistryError> {
        self.factories
            .get(kind)
            .map(|factory| factory(topology))
            .ok_or_else(|| RegistryError::UnknownStageKind {
                kind: kind.to_string(),
            })
    }

    /// Tags with a registered factory.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Registry lookup failures.
#[derive(Debug, Error, Diagnostic)]
pub enum RegistryError {
    /// No factory is registered under the requested tag.
    #[error("no factory registered for stage kind \"{kind}\"")]
    #[diagnostic(
        code(creditgate::registry::unknown_kind),
        help("Register every stage kind at process start, before the pipeline plan is instantiated.")
    )]
    UnknownStageKind { kind: String },
}
