//! The scripting core: nodes, the dispatcher and the execution driver.
//!
//! Loading a script goes text → [`stmt::parse_tree`] (indentation tree) →
//! [`interp::build_section`] (each line through the [`loader::Loader`]) →
//! a [`interp::Section`] tree of shared, immutable nodes.  Running a trigger
//! hands that tree and a fresh [`context::Context`] to [`interp::run`].
//!
//! # Quick start
//!
//! ```rust
//! use lingo::engine::EngineBuilder;
//!
//! let engine = EngineBuilder::new().with_builtins().unwrap().build();
//! let scripts = engine.scripts();
//! scripts.load("demo", "command /double:\n    print arg-1 * 2\n");
//! let report = scripts.run_command("/double 21", None).unwrap();
//! assert_eq!(report.output, vec!["42"]);
//! ```

pub mod builtins;
pub mod change;
pub mod context;
pub mod effects;
pub mod expand;
pub mod expr;
pub mod flow;
pub mod interp;
pub mod loader;
pub mod multi;
pub mod node;
pub mod section;
pub mod stmt;
pub mod value;

// Re-exports for convenience.
pub use change::ChangeMode;
pub use context::{CommandInvocation, Context, EventHandle};
pub use flow::{ExitKind, Movement, Outcome};
pub use interp::Termination;
pub use multi::MultiResult;
pub use node::Node;
pub use value::Value;
