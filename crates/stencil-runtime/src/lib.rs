//! Component invocation engine for the stencil rendering VM.
//!
//! Programs are flat op lists produced by [`program::ProgramBuilder`]. The
//! append [`vm::Vm`] runs them once against a host [`tree::TreeConstruction`]
//! and records updating ops; [`render::RenderResult::rerender`] replays only
//! the cache groups whose inputs changed. Components are driven through
//! host [`manager::ComponentManager`]s, gated by declared capabilities.

pub mod arguments;
pub mod capabilities;
pub mod checks;
pub mod curry;
pub mod destroyables;
pub mod effects;
pub mod element_operations;
pub mod environment;
pub mod error;
pub mod helper;
pub mod instance;
pub mod layout;
pub mod manager;
pub mod program;
pub mod references;
pub mod render;
pub mod render_tree;
pub mod resolution;
pub mod resolver;
pub mod scope;
pub mod state;
pub mod testing;
pub mod transaction;
pub mod tree;
pub mod value;
pub mod vm;

pub use arguments::{CapturedArguments, PreparedArguments, VmArguments};
pub use capabilities::{CapabilityFlags, ComponentCapabilities};
pub use curry::{CurriedComponentDefinition, CurriedInner, curry};
pub use environment::{DefaultDelegate, Environment, EnvironmentDelegate, EnvironmentOptions, in_transaction};
pub use error::{ResolutionError, Result, RuntimeError};
pub use helper::{HelperDefinition, ModifierDefinition, ModifierManager};
pub use instance::{ComponentInstance, InstanceDefinition, InstancePhase};
pub use layout::{CompiledLayout, ProgramSymbolTable, Template};
pub use manager::{ComponentDefinition, ComponentManager, CreateRequest, Destroyable};
pub use program::{Args, Expr, Invocation, Program, ProgramBuilder};
pub use render::{RenderResult, render_component, render_main};
pub use resolver::{ResolverRegistry, RuntimeResolver};
pub use scope::DynamicScope;
pub use tree::{Bounds, NodeId, TreeConstruction};
pub use value::{ObjectValue, Owner, Value};
