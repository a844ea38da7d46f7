// src/pac/mod.rs
pub mod cache;
pub mod downloader;
pub mod engine;
pub mod guard;
pub mod helpers;
mod natives;
pub mod policy;
pub mod resolver;

pub use cache::{MemoryCache, ResolutionResult, ResultCache};
pub use downloader::{ContentLoader, HttpContentLoader};
pub use engine::{PacEvaluator, SandboxedEvaluator, ScriptSource};
pub use guard::ReentrancyGuard;
pub use helpers::HelperLibrary;
pub use policy::{Capability, EvaluationLimits, SandboxPolicy};
pub use resolver::{
    ErrorReporter, ExitHook, LogReporter, PacDocument, PacResolver, PacResolverBuilder,
    ProcessExit, DEFAULT_ENTRY_POINT,
};
