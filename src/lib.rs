//! modrt - runtime modules for a bytecode JavaScript engine
//!
//! A runtime module binds an immutable compiled unit to a live context:
//! - Code blocks and symbols are materialized on first use
//! - Lazy functions get their own child modules, compiled on demand
//! - Literal shapes and template objects are cached per module
//! - A tracing and compacting garbage collector owns the domains that
//!   group modules, and rewrites every module-held reference when it moves
//!   cells
//!
//! # Example
//! ```
//! use modrt::bytecode::BytecodeBuilder;
//! use modrt::runtime::{RuntimeModule, RuntimeModuleFlags};
//! use modrt::Context;
//!
//! let mut builder = BytecodeBuilder::new();
//! let name = builder.add_identifier("main");
//! builder.add_function(name, 0, 4, vec![0x01]);
//!
//! let mut ctx = Context::new();
//! let domain = ctx.create_domain();
//! let module = RuntimeModule::create(
//!     &mut ctx,
//!     domain,
//!     builder.build_shared(),
//!     RuntimeModuleFlags::new(),
//!     "main.js",
//! )
//! .unwrap();
//!
//! let block = module.get_code_block(&mut ctx, 0);
//! assert_eq!(block.frame_size(), 4);
//! ```

// Core modules
pub mod config;
pub mod context;
pub mod error;
pub mod value;

// Garbage collector
pub mod gc;

// Compiled units
pub mod bytecode;

// Runtime support
pub mod runtime;

// Re-export main types
pub use config::ContextConfig;
pub use context::{Context, MemoryStats, RootId};
pub use error::{Error, Result};
pub use runtime::{CodeBlock, Domain, RuntimeModule, RuntimeModuleFlags};
pub use value::Value;
