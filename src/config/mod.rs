//! Layered experiment configuration.
//!
//! Configuration is a nested mapping (`serde_json::Map`, insertion ordered)
//! assembled from several tiers and then resolved to a fixed point:
//! 1. **Defaults** - `config_defaults.yaml` next to the scripts
//! 2. **Constants** - optional `constants.yaml` and workflow task defaults
//! 3. **Machine** - `machine/<machine>.yaml`
//! 4. **User** - the experiment's own config file
//! 5. **Overrides** - `KEY=VALUE` pairs from the command line
//!
//! ## Merge Strategy
//! Mappings merge key by key; anything else from a later tier replaces the
//! earlier value, including null.
//!
//! ## Templates
//! String values may contain `{{ ... }}` expressions referring to keys in the
//! same section, to `section.KEY` anywhere in the tree, or to environment
//! variables. Unresolvable expressions are left in place for later passes.

pub mod dereference;
pub mod document;
pub mod formats;
pub mod loader;
pub mod merge;
pub mod source;
pub mod value;

pub use dereference::{DEFAULT_MAX_ITERATIONS, Dereferencer, dereference, dereference_all};
pub use document::Config;
pub use formats::{ConfigFormat, FileFormat};
pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all, update_values};
pub use source::{ProcessEnv, StaticVars, VariableSource};
