// Configuration module
// Public interface for configuration loading

mod category;
pub mod constants;
mod loader;
mod settings;

pub use category::{CategoryDescriptor, CategoryRegistry, CompositeWeights, GateMetric};
pub use loader::load_config;
pub use settings::{Environment, GateConfig, GeneratorConfig, StorageConfig};
